use std::path::{Path, PathBuf};

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};

use super::duo::{DuoFlow, MfaConfig};
use super::{script, token};
use crate::error::{AuthError, AuthResult};
use crate::extract::meta_content;
use crate::http::{ApiClient, EndpointGroup, RequestOptions};

const CSRF_META: &str = "csrf-token";

#[derive(Debug, Default, Deserialize)]
struct AuthenticateResponse {
    #[serde(default)]
    duo_auth_url: Option<String>,
    #[serde(default)]
    progress_token: Option<String>,
    #[serde(default)]
    grant_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationsToken {
    token: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Produces a bearer token for the platform API.
///
/// Reuses the stored token when the platform still accepts it, otherwise
/// logs in with email and password, clears the MFA challenge and exchanges
/// the resulting grant token.
pub struct Authenticator {
    client: ApiClient,
    mfa: MfaConfig,
    config_dir: PathBuf,
}

impl Authenticator {
    pub fn new(client: ApiClient, mfa: MfaConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            mfa,
            config_dir: config_dir.into(),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Return a working bearer token, logging in only when needed.
    ///
    /// Takes `&mut self` so one authenticator never runs two flows at once.
    pub async fn obtain_bearer_token(&mut self) -> AuthResult<SecretString> {
        if let Some(token) = self.probe().await? {
            tracing::info!("stored bearer token is valid");
            return Ok(token);
        }

        let csrf = self.login_csrf().await?;
        let response = self.submit_credentials(csrf.clone()).await?;

        let grant_token = match non_empty(response.duo_auth_url) {
            Some(auth_url) => {
                tracing::info!("MFA challenge issued");
                DuoFlow::new(&self.client, &self.mfa)
                    .grant_token(&auth_url)
                    .await?
            }
            None => match non_empty(response.grant_token) {
                Some(grant) => grant,
                None => {
                    let progress = non_empty(response.progress_token).ok_or_else(|| {
                        AuthError::ProtocolExtraction {
                            what: "MFA challenge URL, grant token or progress token",
                            url: self.client.endpoints().resolve(EndpointGroup::Login, "authenticate"),
                        }
                    })?;
                    self.redeem_progress_token(&csrf, &progress).await?
                }
            },
        };

        let bearer = token::exchange(&self.client, &grant_token).await?;
        script::write(&self.config_dir, self.client.endpoints(), bearer.expose_secret()).await?;
        tracing::info!("login complete");
        Ok(bearer)
    }

    /// Fetch a notifications token with the current bearer token and store it.
    pub async fn obtain_notifications_token(&mut self) -> AuthResult<SecretString> {
        let outcome = self
            .client
            .get(EndpointGroup::Platform, "users/notifications_token")
            .await?
            .error_for_status()?;
        let token = outcome.json::<NotificationsToken>()?.token;
        self.client
            .credentials()
            .set_notifications_token(&token)
            .await?;
        Ok(SecretString::from(token))
    }

    /// `Some(token)` when the stored token still opens the profile endpoint.
    async fn probe(&self) -> AuthResult<Option<SecretString>> {
        let credentials = self.client.credentials();
        let Some(token) = credentials.api_token().await? else {
            return Ok(None);
        };

        let outcome = self
            .client
            .get(EndpointGroup::Platform, "profiles/me")
            .await?;
        if !outcome.is_success() {
            tracing::debug!(status = outcome.status.as_u16(), "stored bearer token rejected");
            return Ok(None);
        }

        let profile: Value = outcome.json()?;
        let user_id = match profile.get("user_id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        if let Some(user_id) = user_id {
            credentials.set_user_id(&user_id).await?;
        }
        Ok(Some(token))
    }

    async fn login_csrf(&self) -> AuthResult<String> {
        let url = self.client.endpoints().login_root().to_string();
        let outcome = self
            .client
            .execute(Method::GET, EndpointGroup::Login, &url, RequestOptions::third_party())
            .await?
            .error_for_status()?;
        meta_content(CSRF_META, &outcome.body).ok_or(AuthError::ProtocolExtraction {
            what: "login CSRF token",
            url: outcome.url,
        })
    }

    /// POST email and password. A 400 means the CSRF token went stale: fetch
    /// a fresh one and try exactly once more.
    async fn submit_credentials(&self, csrf: String) -> AuthResult<AuthenticateResponse> {
        let mut csrf = csrf;
        let mut refreshed = false;
        loop {
            let credentials = self.client.credentials();
            let body = json!({
                "email": credentials.email().await?.expose_secret(),
                "password": credentials.password().await?.expose_secret(),
            });
            let options = RequestOptions::new()
                .header("X-CSRF-Token", csrf.clone())
                .body(body);
            let outcome = self
                .client
                .execute(Method::POST, EndpointGroup::Login, "authenticate", options)
                .await?;

            if outcome.status.as_u16() == 400 && !refreshed {
                tracing::warn!("login rejected with 400; refreshing CSRF token");
                csrf = self.login_csrf().await?;
                refreshed = true;
                continue;
            }

            let outcome = outcome.error_for_status()?;
            if outcome.body.trim().is_empty() {
                return Ok(AuthenticateResponse::default());
            }
            return outcome.json();
        }
    }

    async fn redeem_progress_token(&self, csrf: &str, progress_token: &str) -> AuthResult<String> {
        let options = RequestOptions::new()
            .header("X-CSRF-Token", csrf)
            .body(json!({ "progress_token": progress_token }));
        let outcome = self
            .client
            .execute(Method::POST, EndpointGroup::Login, "authenticate", options)
            .await?
            .error_for_status()?;
        let response: AuthenticateResponse = outcome.json()?;
        non_empty(response.grant_token).ok_or(AuthError::ProtocolExtraction {
            what: "grant token",
            url: outcome.url,
        })
    }
}
