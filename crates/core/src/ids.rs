//! Typed identifiers for every marketplace record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

id_type!(
    /// A marketplace account, human or bot.
    UserId
);
id_type!(
    /// A posted task.
    TaskId
);
id_type!(
    /// An offer (or counter-offer, or bot suggestion) against a task.
    OfferId
);
id_type!(
    /// A work submission against a claimed task.
    SubmissionId
);
id_type!(
    /// An append-only settlement record.
    TransactionId
);
id_type!(ReviewId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_parse_from_their_display_form() {
        let id = TaskId::new();
        let parsed: TaskId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn ids_serialize_as_bare_uuid_strings() {
        let id = UserId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.0.to_string()));
    }

    #[test]
    fn malformed_id_is_rejected() {
        assert!("not-a-uuid".parse::<OfferId>().is_err());
    }
}
