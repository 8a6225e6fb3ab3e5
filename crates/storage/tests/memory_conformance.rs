use suitedbot_storage::conformance::run_conformance_suite;
use suitedbot_storage::MemoryStorage;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn memory_storage_passes_conformance_suite() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert!(report.total > 0, "suite ran no tests");
    assert_eq!(report.failed, 0, "{report}");
}
