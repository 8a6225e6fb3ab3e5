//! Resolving request credentials to marketplace users.

use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use suitedbot_core::UserId;

/// Maps a bearer credential to the user it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// `None` when the credential is not recognised.
    async fn resolve(&self, credential: &str) -> Option<UserId>;
}

/// Hex-encoded SHA-256 of a credential.
pub fn digest(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// A fixed token table loaded at startup. Only digests are kept in memory.
#[derive(Debug, Default)]
pub struct StaticTokens {
    by_digest: HashMap<String, UserId>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: &str, user: UserId) {
        self.by_digest.insert(digest(token), user);
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokens {
    async fn resolve(&self, credential: &str) -> Option<UserId> {
        self.by_digest.get(&digest(credential)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256_hex() {
        assert_eq!(
            digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn resolves_known_tokens_only() {
        let user = UserId::new();
        let mut tokens = StaticTokens::new();
        tokens.insert("ada-token", user);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.resolve("ada-token").await, Some(user));
        assert_eq!(tokens.resolve("ada-tokens").await, None);
        assert!(!tokens.by_digest.contains_key("ada-token"));
    }
}
