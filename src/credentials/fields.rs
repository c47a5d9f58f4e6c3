use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

use super::CredentialStore;

/// The fields the authentication flow reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialField {
    Email,
    Password,
    OtpSecret,
    OtpCount,
    ApiToken,
    NotificationsToken,
    UserId,
}

impl CredentialField {
    pub const ALL: [CredentialField; 7] = [
        CredentialField::Email,
        CredentialField::Password,
        CredentialField::OtpSecret,
        CredentialField::OtpCount,
        CredentialField::ApiToken,
        CredentialField::NotificationsToken,
        CredentialField::UserId,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CredentialField::Email => "email",
            CredentialField::Password => "password",
            CredentialField::OtpSecret => "otp_secret",
            CredentialField::OtpCount => "otp_count",
            CredentialField::ApiToken => "api_token",
            CredentialField::NotificationsToken => "notifications_token",
            CredentialField::UserId => "user_id",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Whether the value must stay hidden when echoed (prompts, logs).
    pub fn is_secret(self) -> bool {
        matches!(
            self,
            CredentialField::Password
                | CredentialField::OtpSecret
                | CredentialField::ApiToken
                | CredentialField::NotificationsToken
        )
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Typed view over a [`CredentialStore`].
///
/// Cheap to clone; every clone talks to the same backend.
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
}

impl Credentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub fn from_store(store: impl CredentialStore + 'static) -> Self {
        Self::new(Arc::new(store))
    }

    /// Non-empty value for a field, if present.
    async fn optional(&self, field: CredentialField) -> Result<Option<SecretString>> {
        let value = self
            .store
            .get(field.key())
            .await
            .with_context(|| format!("Failed to read credential {field}"))?;
        Ok(value.filter(|v| !v.expose_secret().trim().is_empty()))
    }

    async fn required(&self, field: CredentialField) -> Result<SecretString> {
        self.optional(field)
            .await?
            .with_context(|| format!("Missing required credential {field}"))
    }

    async fn write(&self, field: CredentialField, value: &str) -> Result<()> {
        self.store
            .set(field.key(), SecretString::from(value.to_string()))
            .await
            .with_context(|| format!("Failed to store credential {field}"))
    }

    pub async fn email(&self) -> Result<SecretString> {
        self.required(CredentialField::Email).await
    }

    pub async fn password(&self) -> Result<SecretString> {
        self.required(CredentialField::Password).await
    }

    /// The base32 HOTP secret. `None` selects the push factor.
    pub async fn otp_secret(&self) -> Result<Option<SecretString>> {
        self.optional(CredentialField::OtpSecret).await
    }

    /// The next unused HOTP counter value. Defaults to 0.
    pub async fn otp_count(&self) -> Result<u64> {
        match self.optional(CredentialField::OtpCount).await? {
            Some(raw) => raw
                .expose_secret()
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}", CredentialField::OtpCount)),
            None => Ok(0),
        }
    }

    pub async fn set_otp_count(&self, count: u64) -> Result<()> {
        self.write(CredentialField::OtpCount, &count.to_string())
            .await
    }

    pub async fn api_token(&self) -> Result<Option<SecretString>> {
        self.optional(CredentialField::ApiToken).await
    }

    pub async fn set_api_token(&self, token: &str) -> Result<()> {
        self.write(CredentialField::ApiToken, token).await
    }

    pub async fn notifications_token(&self) -> Result<Option<SecretString>> {
        self.optional(CredentialField::NotificationsToken).await
    }

    pub async fn set_notifications_token(&self, token: &str) -> Result<()> {
        self.write(CredentialField::NotificationsToken, token).await
    }

    pub async fn clear_notifications_token(&self) -> Result<()> {
        self.store
            .delete(CredentialField::NotificationsToken.key())
            .await
            .context("Failed to clear notifications token")
    }

    pub async fn user_id(&self) -> Result<Option<String>> {
        Ok(self
            .optional(CredentialField::UserId)
            .await?
            .map(|id| id.expose_secret().to_string()))
    }

    pub async fn set_user_id(&self, user_id: &str) -> Result<()> {
        self.write(CredentialField::UserId, user_id).await
    }
}
