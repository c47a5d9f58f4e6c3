//! In-memory credential store for tests and embedding.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::CredentialStore;

/// Credential store backed by a shared map. Clones share the same map.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.into(), value.into());
        }
        self
    }

    /// Plaintext snapshot of a value, for assertions.
    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;
        Ok(values.get(key).map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;
        values.insert(key.to_string(), value.expose_secret().to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("credential map lock poisoned"))?;
        values.remove(key);
        Ok(())
    }
}
