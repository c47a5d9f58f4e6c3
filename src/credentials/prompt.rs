//! Interactive fallback for credentials nobody has provisioned yet.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Input, Password};
use secrecy::SecretString;

use super::{CredentialField, CredentialStore};

/// Wraps a store and asks on the terminal for missing account fields.
///
/// Answers are written through to the inner store, so each field is asked for
/// once. An empty OTP secret answer is stored too and selects the push factor.
pub struct PromptingStore<S> {
    inner: S,
}

impl<S: CredentialStore> PromptingStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    fn should_prompt(key: &str) -> Option<CredentialField> {
        CredentialField::from_key(key).filter(|field| {
            matches!(
                field,
                CredentialField::Email | CredentialField::Password | CredentialField::OtpSecret
            )
        })
    }

    async fn ask(field: CredentialField) -> Result<String> {
        tokio::task::spawn_blocking(move || {
            let label = match field {
                CredentialField::Email => "Synack email",
                CredentialField::Password => "Synack password",
                CredentialField::OtpSecret => "Duo HOTP secret (empty for push)",
                _ => field.key(),
            };
            if field.is_secret() {
                Password::new()
                    .with_prompt(label)
                    .allow_empty_password(field == CredentialField::OtpSecret)
                    .interact()
            } else {
                Input::<String>::new().with_prompt(label).interact_text()
            }
        })
        .await
        .context("Prompt task failed")?
        .with_context(|| format!("Failed to read {field} from terminal"))
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialStore for PromptingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        if let Some(value) = self.inner.get(key).await? {
            return Ok(Some(value));
        }

        let Some(field) = Self::should_prompt(key) else {
            return Ok(None);
        };

        let answer = Self::ask(field).await?;
        if self.inner.supports_write() {
            self.inner
                .set(key, SecretString::from(answer.clone()))
                .await?;
        }
        Ok(Some(SecretString::from(answer)))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    fn supports_write(&self) -> bool {
        self.inner.supports_write()
    }
}
