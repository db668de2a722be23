//! Credential persistence boundary.
//!
//! Handshake state (temporary request tokens, CSRF nonces) and access
//! credentials survive across process boundaries through this trait; the
//! library never assumes where they live. Values are opaque strings, JSON
//! in practice.

use dashmap::DashMap;

/// Key/value persistence for handshake state and access credentials.
///
/// Keys are namespaced by provider name (`"twitter:access"`,
/// `"facebook:state"`), so one store can back several connections.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn delete(&self, key: &str);
}

/// Process-local store for tests and single-process tools. Anything with a
/// session or a database should implement [`CredentialStore`] instead.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}
