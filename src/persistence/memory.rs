//! Volatile credential store.

use super::{CredentialStore, StoreError};
use crate::config::Credentials;
use std::sync::Mutex;

/// In-memory [`CredentialStore`]. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<Credentials>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `credentials`.
    pub fn with(credentials: Credentials) -> Self {
        Self {
            slot: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Option<Credentials> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
        *self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credentials.clone());
        Ok(())
    }
}
