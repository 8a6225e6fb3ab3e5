//! Currencies and budgets.
//!
//! A task is priced in exactly one currency. [`Budget`] carries the currency
//! and the amount together, so a record can never hold a salt amount while
//! claiming to be a USDC task.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// In-system token; escrowed and credited by the marketplace itself.
    Salt,
    /// External stablecoin; settled on an outside payment rail.
    Usdc,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Salt => "salt",
            Currency::Usdc => "usdc",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "salt" => Ok(Currency::Salt),
            "usdc" => Ok(Currency::Usdc),
            other => Err(BudgetError::UnknownCurrency(other.to_string())),
        }
    }
}

/// Largest budget or account balance the marketplace accepts: 10^15.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

/// Errors raised while constructing a [`Budget`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    #[error("unknown currency '{0}' (expected 'salt' or 'usdc')")]
    UnknownCurrency(String),
    #[error("budget must be greater than zero, got {0}")]
    NotPositive(Decimal),
    #[error("budget must not exceed {MAX_AMOUNT}, got {0}")]
    TooLarge(Decimal),
}

/// An amount tagged with its currency.
///
/// Serialized as `{"currency": "salt", "amount": "100"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "currency", content = "amount", rename_all = "lowercase")]
pub enum Budget {
    Salt(Decimal),
    Usdc(Decimal),
}

impl Budget {
    /// Build a budget, rejecting zero, negative, and oversized amounts.
    pub fn new(currency: Currency, amount: Decimal) -> Result<Self, BudgetError> {
        if amount <= Decimal::ZERO {
            return Err(BudgetError::NotPositive(amount));
        }
        if amount > MAX_AMOUNT {
            return Err(BudgetError::TooLarge(amount));
        }
        Ok(match currency {
            Currency::Salt => Budget::Salt(amount),
            Currency::Usdc => Budget::Usdc(amount),
        })
    }

    pub fn currency(&self) -> Currency {
        match self {
            Budget::Salt(_) => Currency::Salt,
            Budget::Usdc(_) => Currency::Usdc,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Budget::Salt(a) | Budget::Usdc(a) => *a,
        }
    }

    /// The amount if this budget is held in salt.
    pub fn salt(&self) -> Option<Decimal> {
        match self {
            Budget::Salt(a) => Some(*a),
            Budget::Usdc(_) => None,
        }
    }

    /// The amount if this budget is held in USDC.
    pub fn usdc(&self) -> Option<Decimal> {
        match self {
            Budget::Usdc(a) => Some(*a),
            Budget::Salt(_) => None,
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::Salt(a) => write!(f, "{a} Salt"),
            Budget::Usdc(a) => write!(f, "${a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_carries_exactly_one_amount() {
        let b = Budget::new(Currency::Salt, Decimal::from(100)).unwrap();
        assert_eq!(b.salt(), Some(Decimal::from(100)));
        assert_eq!(b.usdc(), None);
        assert_eq!(b.currency(), Currency::Salt);

        let u = Budget::new(Currency::Usdc, Decimal::new(2550, 2)).unwrap();
        assert_eq!(u.usdc(), Some(Decimal::new(2550, 2)));
        assert_eq!(u.salt(), None);
    }

    #[test]
    fn zero_or_negative_budget_rejected() {
        assert_eq!(
            Budget::new(Currency::Salt, Decimal::ZERO),
            Err(BudgetError::NotPositive(Decimal::ZERO))
        );
        assert!(Budget::new(Currency::Usdc, Decimal::from(-5)).is_err());
    }

    #[test]
    fn budget_above_cap_rejected() {
        assert_eq!(MAX_AMOUNT, Decimal::from(1_000_000_000_000_000_i64));
        assert!(Budget::new(Currency::Salt, MAX_AMOUNT).is_ok());
        assert_eq!(
            Budget::new(Currency::Salt, Decimal::MAX),
            Err(BudgetError::TooLarge(Decimal::MAX))
        );
    }

    #[test]
    fn budget_json_shape_is_tagged() {
        let b = Budget::Salt(Decimal::from(100));
        let json = serde_json::to_value(b).unwrap();
        assert_eq!(json["currency"], "salt");
        assert_eq!(json["amount"], "100");

        let back: Budget =
            serde_json::from_value(serde_json::json!({"currency": "usdc", "amount": "12.5"}))
                .unwrap();
        assert_eq!(back, Budget::Usdc(Decimal::new(125, 1)));
    }

    #[test]
    fn currency_parses_lowercase_names_only() {
        assert_eq!("salt".parse::<Currency>().unwrap(), Currency::Salt);
        assert_eq!("usdc".parse::<Currency>().unwrap(), Currency::Usdc);
        assert!("SALT".parse::<Currency>().is_err());
    }

    #[test]
    fn display_matches_marketplace_wording() {
        assert_eq!(Budget::Salt(Decimal::from(40)).to_string(), "40 Salt");
        assert_eq!(Budget::Usdc(Decimal::from(15)).to_string(), "$15");
    }
}
