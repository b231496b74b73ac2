//! Session marker
//!
//! After a successful verification the id of the satisfying method is kept
//! in the login session, so the user is not prompted again until logout.

use std::collections::HashMap;

use super::types::MethodId;

/// Session key holding the verified method id
pub const SESSION_KEY: &str = "2fa_method";

/// Session-scoped key/value storage owned by the login session
pub trait Session: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&mut self, key: &str, value: String);
    fn forget(&mut self, key: &str);
}

/// In-process session, used by the admin tool and tests
#[derive(Debug, Clone, Default)]
pub struct MemorySession {
    values: HashMap<String, String>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Session for MemorySession {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn forget(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Reads and writes the `2fa_method` marker
pub struct SessionMarker;

impl SessionMarker {
    pub fn record<S: Session + ?Sized>(session: &mut S, method_id: &MethodId) {
        session.put(SESSION_KEY, method_id.to_string());
    }

    pub fn current<S: Session + ?Sized>(session: &S) -> Option<MethodId> {
        session.get(SESSION_KEY).map(MethodId::from)
    }

    /// Logout
    pub fn clear<S: Session + ?Sized>(session: &mut S) {
        session.forget(SESSION_KEY);
    }
}
