//! Credential storage abstraction.
//!
//! The login flow reads the account's email, password and OTP material from a
//! [`CredentialStore`] and writes back the mutable pieces: the bearer token,
//! the notifications token, the platform user id and the HOTP counter.
//!
//! # Configuration
//!
//! The `[credentials]` table of `synack-auth.toml` picks a backend:
//!
//! ```toml
//! [credentials]
//! backend = "file"
//! path = "credentials.json"
//! ```

mod config;
mod fields;
mod file;
mod memory;
#[cfg(feature = "pass")]
mod pass;
#[cfg(feature = "prompt")]
mod prompt;

pub use config::CredentialConfig;
pub use fields::{CredentialField, Credentials};
pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;
#[cfg(feature = "pass")]
pub use pass::{PassConfig, PassCredentialStore};
#[cfg(feature = "prompt")]
pub use prompt::PromptingStore;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;

/// A key-value store for credentials.
///
/// Keys are the names returned by [`CredentialField::key`]. Backends map them
/// to their own storage locations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get(&self, key: &str) -> Result<Option<SecretString>>;

    /// Store a credential. Must be durable when this returns.
    async fn set(&self, key: &str, value: SecretString) -> Result<()>;

    /// Remove a credential. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if this store supports writes.
    fn supports_write(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    fn supports_write(&self) -> bool {
        (**self).supports_write()
    }
}
