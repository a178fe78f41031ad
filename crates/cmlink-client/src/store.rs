//! Device token persistence boundary.

use std::collections::HashMap;

use cmlink_core::protocol::SentryToken;

/// Where the per-account device token lives between sessions.
///
/// The host usually backs this with its account settings.
pub trait CredentialStore {
    /// Token stored for `account`, if any.
    fn sentry_token(&self, account: &str) -> Option<SentryToken>;

    /// Replace the token stored for `account`.
    fn set_sentry_token(&mut self, account: &str, token: SentryToken);
}

/// In-memory store, for tests and hosts without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    tokens: HashMap<String, SentryToken>,
}

impl MemoryCredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with a stored token.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is stored.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn sentry_token(&self, account: &str) -> Option<SentryToken> {
        self.tokens.get(account).cloned()
    }

    fn set_sentry_token(&mut self, account: &str, token: SentryToken) {
        tracing::debug!(account, "storing device token");
        self.tokens.insert(account.to_owned(), token);
    }
}

impl<C: CredentialStore + ?Sized> CredentialStore for &mut C {
    fn sentry_token(&self, account: &str) -> Option<SentryToken> {
        (**self).sentry_token(account)
    }

    fn set_sentry_token(&mut self, account: &str, token: SentryToken) {
        (**self).set_sentry_token(account, token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_token_wins() {
        let mut store = MemoryCredentialStore::new();
        assert_eq!(store.sentry_token("alice"), None);

        store.set_sentry_token("alice", SentryToken::new(vec![1]));
        store.set_sentry_token("alice", SentryToken::new(vec![2]));

        assert_eq!(store.sentry_token("alice"), Some(SentryToken::new(vec![2])));
        assert_eq!(store.len(), 1);
    }
}
