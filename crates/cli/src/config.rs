//! Server configuration file.
//!
//! Optional TOML passed with `--config`. Command-line flags override the
//! `[market]` values. `[[users]]` seeds the in-memory store with accounts and
//! the bearer tokens they authenticate with.
//!
//! # Example
//!
//! ```toml
//! [market]
//! auto_approve_hours = 48
//! completion_reputation_award = 10
//! cron_secret = "change-me"
//!
//! [[users]]
//! id = "5f7c6a52-46c5-4d0e-9b4e-0f4c1f1b7a10"
//! display_name = "Ada"
//! salt_balance = "500"
//! token = "ada-token"
//!
//! [[users]]
//! display_name = "ada-helper"
//! user_type = "bot"
//! master = "5f7c6a52-46c5-4d0e-9b4e-0f4c1f1b7a10"
//! token = "ada-helper-token"
//! ```

use std::collections::HashSet;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use suitedbot_core::{UserAccount, UserId, UserType, MAX_AMOUNT};
use suitedbot_market::MarketConfig;
use time::OffsetDateTime;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("could not parse '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub market: MarketSection,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

/// `[market]`: lifecycle tunables and the sweeper secret.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketSection {
    pub auto_approve_hours: Option<i64>,
    pub completion_reputation_award: Option<i64>,
    pub cron_secret: Option<String>,
}

/// One `[[users]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedUser {
    /// Generated when omitted. Required for accounts other entries name as
    /// their `master`.
    pub id: Option<UserId>,
    pub display_name: String,
    #[serde(default = "default_user_type")]
    pub user_type: UserType,
    pub master: Option<UserId>,
    #[serde(default)]
    pub salt_balance: Decimal,
    pub token: Option<String>,
}

fn default_user_type() -> UserType {
    UserType::Human
}

impl SeedUser {
    pub fn to_account(&self, now: OffsetDateTime) -> UserAccount {
        let mut account = UserAccount::new(self.display_name.clone(), self.user_type, now);
        if let Some(id) = self.id {
            account.id = id;
        }
        account.master_id = self.master;
        account.salt_balance = self.salt_balance;
        account
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Read, parse, and validate a config file.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config = parse(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn parse(content: &str) -> Result<FileConfig, toml::de::Error> {
    toml::from_str(content)
}

impl FileConfig {
    /// Checks that cannot be expressed in the schema: positive timeout,
    /// bounded balances, unique ids and tokens, masters that exist and are
    /// not bots.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(hours) = self.market.auto_approve_hours {
            if hours <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "auto_approve_hours must be positive, got {hours}"
                )));
            }
        }

        let mut ids = HashSet::new();
        let mut tokens = HashSet::new();
        for user in &self.users {
            if user.salt_balance < Decimal::ZERO || user.salt_balance > MAX_AMOUNT {
                return Err(ConfigError::Invalid(format!(
                    "user '{}' salt_balance must be between 0 and {MAX_AMOUNT}",
                    user.display_name
                )));
            }
            if let Some(id) = user.id {
                if !ids.insert(id) {
                    return Err(ConfigError::Invalid(format!("duplicate user id {id}")));
                }
            }
            if let Some(token) = &user.token {
                if token.is_empty() || !tokens.insert(token.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "user '{}' has an empty or duplicate token",
                        user.display_name
                    )));
                }
            }
        }

        for user in &self.users {
            let Some(master) = user.master else { continue };
            let found = self.users.iter().find(|u| u.id == Some(master));
            match found {
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "user '{}' names unknown master {master}",
                        user.display_name
                    )))
                }
                Some(m) if m.user_type == UserType::Bot => {
                    return Err(ConfigError::Invalid(format!(
                        "user '{}' names bot '{}' as master",
                        user.display_name, m.display_name
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// File values over the defaults. Flags are applied on top by the caller.
    pub fn market_config(&self) -> MarketConfig {
        let mut config = MarketConfig::default();
        if let Some(hours) = self.market.auto_approve_hours {
            config = config.with_auto_approve_hours(hours);
        }
        if let Some(award) = self.market.completion_reputation_award {
            config = config.with_completion_reputation_award(award);
        }
        config
    }
}
