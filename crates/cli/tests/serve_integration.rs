//! Integration tests for `suitedbot serve`.
//!
//! Each test spawns the binary on its own port with a temporary config file
//! and talks to it over raw HTTP/1.1.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::NamedTempFile;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

const POSTER: &str = "11111111-1111-4111-8111-111111111111";
const WORKER: &str = "22222222-2222-4222-8222-222222222222";
const STRANGER: &str = "33333333-3333-4333-8333-333333333333";
const BOT: &str = "44444444-4444-4444-8444-444444444444";
const CRON_SECRET: &str = "cron-test-secret";

const SEED_USERS: &str = r#"
[[users]]
id = "11111111-1111-4111-8111-111111111111"
display_name = "Poster"
salt_balance = "200"
token = "poster-token"

[[users]]
id = "22222222-2222-4222-8222-222222222222"
display_name = "Worker"
token = "worker-token"

[[users]]
id = "33333333-3333-4333-8333-333333333333"
display_name = "Stranger"
token = "stranger-token"

[[users]]
id = "44444444-4444-4444-8444-444444444444"
display_name = "worker-bot"
user_type = "bot"
master = "22222222-2222-4222-8222-222222222222"
token = "bot-token"
"#;

/// A running server, killed on drop.
struct Server {
    child: Child,
    port: u16,
    _config: NamedTempFile,
}

impl Drop for Server {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

fn start_server(cron_secret: Option<&str>) -> Server {
    let port = next_port();
    let mut config = NamedTempFile::new().expect("temp config");
    config
        .write_all(SEED_USERS.as_bytes())
        .expect("write config");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_suitedbot"));
    cmd.arg("serve")
        .arg("--listen")
        .arg(format!("127.0.0.1:{}", port))
        .arg("--config")
        .arg(config.path());
    cmd.env_remove("CRON_SECRET")
        .env_remove("AUTO_APPROVE_HOURS")
        .env_remove("SUITEDBOT_CONFIG");
    if let Some(secret) = cron_secret {
        cmd.arg("--cron-secret").arg(secret);
    }
    // Redirect stdout/stderr to avoid blocking
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start suitedbot serve");
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _config: config,
    }
}

/// Send one request and return (status, parsed JSON body).
fn request(
    port: u16,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<&Value>,
) -> (u16, Value) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let auth = token
        .map(|t| format!("Authorization: Bearer {}\r\n", t))
        .unwrap_or_default();
    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        method,
        path,
        port,
        auth,
        body.len(),
        body
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

fn get(port: u16, path: &str, token: Option<&str>) -> (u16, Value) {
    request(port, "GET", path, token, None)
}

fn post(port: u16, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    request(port, "POST", path, token, Some(&body))
}

/// Parse an HTTP response into (status_code, JSON body).
fn parse_http_response(response: &str) -> (u16, Value) {
    let (headers, body) = response.split_once("\r\n\r\n").unwrap_or((response, ""));
    let status = headers
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);
    let body = if headers.to_lowercase().contains("transfer-encoding: chunked") {
        decode_chunked(body)
    } else {
        body.to_string()
    };
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;
    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(0) | Err(_) => break,
            Ok(size) => size,
        };
        let start = line_end + 2;
        let end = (start + size).min(remaining.len());
        result.push_str(&remaining[start..end]);
        remaining = remaining.get(end + 2..).unwrap_or("");
    }
    result
}

/// Post a 100 salt task, have the worker offer, and accept it.
fn claimed_task(port: u16) -> String {
    let (status, body) = post(
        port,
        "/tasks",
        Some("poster-token"),
        json!({"title": "Transcribe a podcast", "budget": 100, "currency": "salt"}),
    );
    assert_eq!(status, 200, "{body}");
    let task_id = body["task"]["id"].as_str().unwrap().to_string();

    let (status, body) = post(
        port,
        &format!("/tasks/{task_id}/offer"),
        Some("worker-token"),
        json!({"offer_text": "I can do it tonight"}),
    );
    assert_eq!(status, 200, "{body}");
    let offer_id = body["offer"]["id"].as_str().unwrap().to_string();

    let (status, body) = post(
        port,
        &format!("/offers/{offer_id}/respond"),
        Some("poster-token"),
        json!({"action": "accept"}),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["offer"]["status"], "accepted");
    task_id
}

// ── Basics ───────────────────────────────────────────────────────────────────

#[test]
fn health_returns_ok_with_version() {
    let server = start_server(None);
    let (status, body) = get(server.port, "/health", None);
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "ok");
    assert!(body.get("version").is_some());
}

#[test]
fn unknown_route_is_404_envelope() {
    let server = start_server(None);
    let (status, body) = get(server.port, "/does-not-exist", None);
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[test]
fn creating_task_requires_authentication() {
    let server = start_server(None);
    let task = json!({"title": "t", "budget": 10, "currency": "salt"});

    let (status, body) = post(server.port, "/tasks", None, task.clone());
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    let (status, body) = post(server.port, "/tasks", Some("not-a-token"), task);
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Invalid API key");
}

#[test]
fn api_key_header_authenticates() {
    let server = start_server(None);
    let body = json!({"title": "Via header", "budget": 10, "currency": "salt"}).to_string();
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", server.port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let raw = format!(
        "POST /tasks HTTP/1.1\r\nHost: localhost\r\nX-API-Key: poster-token\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(raw.as_bytes()).unwrap();
    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    let (status, body) = parse_http_response(&response);
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["task"]["poster_id"], POSTER);
}

// ── Tasks ────────────────────────────────────────────────────────────────────

#[test]
fn task_validation_and_escrow() {
    let server = start_server(None);
    let port = server.port;

    let (status, body) = post(port, "/tasks", Some("poster-token"), json!({"title": "No budget"}));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Missing required fields");

    let (status, body) = post(
        port,
        "/tasks",
        Some("worker-token"),
        json!({"title": "Broke", "budget": 100, "currency": "salt"}),
    );
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Insufficient salt balance");

    let (status, body) = post(
        port,
        "/tasks",
        Some("poster-token"),
        json!({"title": "Fine", "budget": 100, "currency": "salt", "category": "audio"}),
    );
    assert_eq!(status, 200);
    assert_eq!(body["task"]["status"], "active");
    assert_eq!(body["task"]["budget"]["currency"], "salt");

    let (status, body) = get(port, "/tasks?category=audio", None);
    assert_eq!(status, 200);
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["poster_display_name"], "Poster");

    let (status, body) = get(port, "/tasks?status=bogus", None);
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[test]
fn unknown_task_is_404() {
    let server = start_server(None);
    let (status, body) = get(
        server.port,
        "/tasks/99999999-9999-4999-8999-999999999999",
        None,
    );
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Task not found");
    let (status, _) = get(server.port, "/tasks/not-a-uuid", None);
    assert_eq!(status, 404);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn full_lifecycle_over_http() {
    let server = start_server(None);
    let port = server.port;
    let task_id = claimed_task(port);

    let (status, body) = get(port, &format!("/tasks/{task_id}"), None);
    assert_eq!(status, 200);
    assert_eq!(body["task"]["status"], "claimed");
    assert_eq!(body["task"]["claimed_by"], WORKER);
    assert_eq!(body["task"]["offers"].as_array().unwrap().len(), 1);

    // A second accept on a claimed task is a conflict.
    let (_, body) = post(
        port,
        &format!("/tasks/{task_id}/offer"),
        Some("stranger-token"),
        json!({"offer_text": "Me too"}),
    );
    assert_eq!(body["offer"]["offerer_id"], STRANGER);
    let late_offer = body["offer"]["id"].as_str().unwrap().to_string();
    let (status, body) = post(
        port,
        &format!("/offers/{late_offer}/respond"),
        Some("poster-token"),
        json!({"action": "accept"}),
    );
    assert_eq!(status, 409, "{body}");

    let (status, body) = post(
        port,
        &format!("/tasks/{task_id}/submit"),
        Some("stranger-token"),
        json!({"content": "Not mine"}),
    );
    assert_eq!(status, 403, "{body}");

    let (status, body) = post(
        port,
        &format!("/tasks/{task_id}/submit"),
        Some("worker-token"),
        json!({"content": "Transcript attached", "proof_url": "https://files.example/t.txt"}),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["submission"]["status"], "pending");
    assert!(body["submission"]["auto_approve_at"].is_string());
    assert_eq!(body["auto_approve_at"], body["submission"]["auto_approve_at"]);
    let submission_id = body["submission"]["id"].as_str().unwrap().to_string();

    let review_path = format!("/submissions/{submission_id}/review");
    let (status, body) = get(port, &review_path, Some("worker-token"));
    assert_eq!(status, 200);
    assert_eq!(body["countdown"]["deadline_passed"], false);
    let (status, _) = get(port, &review_path, Some("stranger-token"));
    assert_eq!(status, 403);
    let (status, _) = get(port, &review_path, None);
    assert_eq!(status, 401);

    let (status, body) = post(port, &review_path, Some("poster-token"), json!({"action": "maybe"}));
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid action"));

    let (status, body) = post(
        port,
        &review_path,
        Some("poster-token"),
        json!({"action": "approve", "notes": "Perfect"}),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["submission"]["status"], "approved");
    assert!(body["submission"]["auto_approve_at"].is_null());
    assert_eq!(body["task"]["status"], "completed");
    assert_eq!(body["can_review_worker"], true);
    assert_eq!(body["transaction"]["completer_id"], WORKER);

    let (status, _) = post(port, &review_path, Some("poster-token"), json!({"action": "approve"}));
    assert_eq!(status, 400);

    // Reviews
    let review_poster = format!("/tasks/{task_id}/review-poster");
    let (status, body) = post(port, &review_poster, Some("worker-token"), json!({"rating": 6}));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Rating must be between 1 and 5");

    let (status, body) = post(
        port,
        &review_poster,
        Some("worker-token"),
        json!({
            "rating": 5,
            "clarity_rating": 8,
            "communication_rating": "great",
            "payment_speed_rating": 4.5,
            "comment": "Clear brief",
        }),
    );
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["review"]["rating"], 5);
    assert!(body["review"]["clarity_rating"].is_null());
    assert!(body["review"]["communication_rating"].is_null());
    assert!(body["review"]["payment_speed_rating"].is_null());

    let (status, body) = post(port, &review_poster, Some("worker-token"), json!({"rating": 4}));
    assert_eq!(status, 400);
    assert_eq!(body["error"], "You have already reviewed this task");

    let (status, body) = post(
        port,
        &format!("/tasks/{task_id}/review-worker"),
        Some("poster-token"),
        json!({"rating": 4}),
    );
    assert_eq!(status, 200, "{body}");

    let (status, body) = get(port, &review_poster, None);
    assert_eq!(status, 200);
    assert_eq!(body["reviews"].as_array().unwrap().len(), 2);

    let (status, body) = get(port, &format!("/users/{POSTER}/poster-reviews?limit=500"), None);
    assert_eq!(status, 200);
    assert_eq!(body["stats"]["would_work_again_percent"], 100);
    assert_eq!(body["stats"]["rating_distribution"]["5"], 1);
    assert_eq!(body["pagination"]["limit"], 50);
    assert_eq!(body["user"]["poster_reviews_count"], 1);
    assert_eq!(body["reviews"].as_array().unwrap().len(), 1);
}

// ── Bots ─────────────────────────────────────────────────────────────────────

#[test]
fn bot_suggestion_approved_by_master() {
    let server = start_server(None);
    let port = server.port;
    let (_, body) = post(
        port,
        "/tasks",
        Some("poster-token"),
        json!({"title": "Tag images", "budget": 50, "currency": "salt"}),
    );
    let task_id = body["task"]["id"].as_str().unwrap().to_string();

    let (status, body) = post(port, "/bot/suggest", Some("bot-token"), json!({"task_id": task_id}));
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["suggestion"]["status"], "pending_master_approval");
    assert_eq!(body["suggestion"]["offerer_id"], BOT);
    let offer_id = body["suggestion"]["id"].as_str().unwrap().to_string();

    let body_json = json!({"task_id": task_id});
    let (status, body) = post(port, "/bot/suggest", Some("worker-token"), body_json);
    assert_eq!(status, 403, "{body}");

    let (status, body) = get(port, "/bot/master-approve", Some("worker-token"));
    assert_eq!(status, 200);
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 1);
    assert_eq!(body["suggestions"][0]["bot_display_name"], "worker-bot");

    let decision = json!({"offer_id": offer_id, "action": "approve"});
    let (status, _) = post(port, "/bot/master-approve", Some("stranger-token"), decision.clone());
    assert_eq!(status, 403);
    let (status, body) = post(port, "/bot/master-approve", Some("worker-token"), decision.clone());
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["offer"]["status"], "pending");
    let (status, _) = post(port, "/bot/master-approve", Some("worker-token"), decision);
    assert_eq!(status, 404);

    let (_, body) = get(port, &format!("/tasks/{task_id}"), None);
    assert_eq!(body["task"]["offer_count"], 1);
}

#[test]
fn bot_scan_ranks_open_tasks() {
    let server = start_server(None);
    let port = server.port;
    let (status, body) = post(
        port,
        "/tasks",
        Some("poster-token"),
        json!({"title": "Clean a CSV", "budget": 15, "currency": "usdc", "category": "data"}),
    );
    assert_eq!(status, 200, "{body}");
    let task_id = body["task"]["id"].clone();
    claimed_task(port);

    let (status, body) = get(port, "/bot/scan", Some("bot-token"));
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["count"], 1);
    assert!(body["scanned_at"].is_string());
    let scanned = &body["tasks"][0];
    assert_eq!(scanned["id"], task_id);
    assert_eq!(scanned["match_score"], 80);
    assert_eq!(scanned["recommendation"], "low-value");

    let (status, _) = get(port, "/bot/scan", Some("worker-token"));
    assert_eq!(status, 403);
    let (status, _) = get(port, "/bot/scan", None);
    assert_eq!(status, 401);
    let (status, body) = get(port, "/bot/scan?limit=lots", Some("bot-token"));
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);
}

#[test]
fn bot_auto_accept_conflicts_once_claimed() {
    let server = start_server(None);
    let port = server.port;
    let task_id = claimed_task(port);

    let body_json = json!({"task_id": task_id});
    let (status, body) = post(port, "/bot/auto-accept", Some("bot-token"), body_json);
    assert_eq!(status, 409, "{body}");
    assert_eq!(body["error"], "Task already claimed");

    let (status, _) = post(port, "/bot/auto-accept", Some("bot-token"), json!({}));
    assert_eq!(status, 400);
}

// ── Sweeper endpoint ─────────────────────────────────────────────────────────

#[test]
fn cron_refuses_when_secret_unconfigured() {
    let server = start_server(None);
    let path = "/cron/auto-approve-submissions";
    let (status, body) = post(server.port, path, Some("anything"), json!({}));
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
    let (status, _) = get(server.port, "/cron/auto-approve-submissions", None);
    assert_eq!(status, 401);
}

#[test]
fn cron_requires_matching_secret() {
    let server = start_server(Some(CRON_SECRET));
    let path = "/cron/auto-approve-submissions";

    let (status, _) = get(server.port, path, None);
    assert_eq!(status, 401);
    let (status, _) = get(server.port, path, Some("poster-token"));
    assert_eq!(status, 401);

    let (status, body) = get(server.port, path, Some(CRON_SECRET));
    assert_eq!(status, 200, "{body}");
    assert_eq!(body["processed"], 0);
    assert_eq!(body["approved"], 0);
    assert_eq!(body["message"], "Auto-approved 0/0 submissions");

    let (status, _) = post(server.port, path, Some(CRON_SECRET), json!({}));
    assert_eq!(status, 200);
}

#[test]
fn sweep_command_triggers_running_server() {
    let server = start_server(Some(CRON_SECRET));
    let url = format!("http://127.0.0.1:{}", server.port);

    let output = Command::new(env!("CARGO_BIN_EXE_suitedbot"))
        .args(["sweep", "--url", &url, "--cron-secret", CRON_SECRET])
        .output()
        .expect("run sweep");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: Value = serde_json::from_slice(&output.stdout).expect("JSON report");
    assert_eq!(report["processed"], 0);

    let output = Command::new(env!("CARGO_BIN_EXE_suitedbot"))
        .args(["sweep", "--url", &url, "--cron-secret", "wrong"])
        .output()
        .expect("run sweep");
    assert!(!output.status.success());
}

#[test]
fn reviews_wait_for_completion() {
    let server = start_server(None);
    let port = server.port;
    let task_id = claimed_task(port);
    let (status, body) = post(
        port,
        &format!("/tasks/{task_id}/review-poster"),
        Some("worker-token"),
        json!({"rating": 5}),
    );
    assert_eq!(status, 400, "{body}");
    assert_eq!(body["error"], "Can only review posters for completed tasks");

    let (status, _) = post(
        port,
        &format!("/tasks/{task_id}/review-worker"),
        Some("stranger-token"),
        json!({"rating": 5}),
    );
    assert_eq!(status, 400);
}
