use time::Duration;

/// Hours a pending submission waits for review before the sweeper approves it.
pub const DEFAULT_AUTO_APPROVE_HOURS: i64 = 48;

/// Reputation credited to a worker when a salt task settles.
pub const COMPLETION_REPUTATION_AWARD: i64 = 10;

/// Tunables for the lifecycle services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketConfig {
    pub auto_approve_after: Duration,
    pub completion_reputation_award: i64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            auto_approve_after: Duration::hours(DEFAULT_AUTO_APPROVE_HOURS),
            completion_reputation_award: COMPLETION_REPUTATION_AWARD,
        }
    }
}

impl MarketConfig {
    pub fn with_auto_approve_hours(mut self, hours: i64) -> Self {
        self.auto_approve_after = Duration::hours(hours);
        self
    }

    pub fn with_completion_reputation_award(mut self, award: i64) -> Self {
        self.completion_reputation_award = award;
        self
    }

    pub fn auto_approve_hours(&self) -> i64 {
        self.auto_approve_after.whole_hours()
    }
}
