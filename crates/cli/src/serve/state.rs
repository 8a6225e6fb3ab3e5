//! Application state shared across request handlers.

use suitedbot_market::{Marketplace, SystemClock};
use suitedbot_storage::MemoryStorage;

use crate::identity::IdentityProvider;

pub(crate) type Market = Marketplace<MemoryStorage, SystemClock>;

pub(crate) struct AppState {
    pub(crate) market: Market,
    pub(crate) identity: Box<dyn IdentityProvider>,
    /// SHA-256 of the sweeper secret. `None` when unconfigured.
    pub(crate) cron_secret_digest: Option<String>,
}
