use rust_decimal::Decimal;
use suitedbot_core::{UserAccount, UserId, MAX_AMOUNT};
use suitedbot_storage::MarketStorage;
use tracing::info;

use crate::{Clock, MarketError, Marketplace, Result};

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Create an account. Used to load seed users at startup.
    pub async fn register_user(&self, user: UserAccount) -> Result<UserAccount> {
        if user.salt_balance < Decimal::ZERO || user.salt_balance > MAX_AMOUNT {
            return Err(MarketError::validation(format!(
                "Salt balance must be between 0 and {MAX_AMOUNT}"
            )));
        }
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self
            .storage
            .insert_user(&mut snap, user.clone())
            .await
            .map_err(MarketError::from);
        self.finish(snap, result).await?;
        info!(user_id = %user.id, user_type = user.user_type.as_str(), "user registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<UserAccount> {
        Ok(self.storage.get_user(id).await?)
    }
}
