//! Storage for a remembered master password.

use secrecy::SecretString;
use std::sync::Mutex;

/// Where a remembered master password lives between open attempts.
///
/// Implementations may be backed by an OS keyring; the core only needs
/// these three operations.
pub trait MasterPasswordStore: Send + Sync {
    fn load(&self) -> Option<SecretString>;
    fn store(&self, password: SecretString);
    fn forget(&self);
}

/// Process-memory password store.
#[derive(Default)]
pub struct MemoryPasswordStore {
    password: Mutex<Option<SecretString>>,
}

impl MemoryPasswordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(password: SecretString) -> Self {
        Self {
            password: Mutex::new(Some(password)),
        }
    }
}

impl MasterPasswordStore for MemoryPasswordStore {
    fn load(&self) -> Option<SecretString> {
        self.password
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn store(&self, password: SecretString) {
        let mut guard = self
            .password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(password);
    }

    fn forget(&self) {
        let mut guard = self
            .password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}

/// Store that never remembers anything.
pub struct NoPasswordStore;

impl MasterPasswordStore for NoPasswordStore {
    fn load(&self) -> Option<SecretString> {
        None
    }

    fn store(&self, _password: SecretString) {}

    fn forget(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn memory_store_remembers_and_forgets() {
        let store = MemoryPasswordStore::new();
        assert!(store.load().is_none());

        store.store(SecretString::from("pw".to_string()));
        assert_eq!(store.load().unwrap().expose_secret(), "pw");

        store.forget();
        assert!(store.load().is_none());
    }

    #[test]
    fn no_store_never_remembers() {
        let store = NoPasswordStore;
        store.store(SecretString::from("pw".to_string()));
        assert!(store.load().is_none());
    }
}
