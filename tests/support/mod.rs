#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use synack_auth::auth::MfaConfig;
use synack_auth::clock::RecordingSleeper;
use synack_auth::credentials::{Credentials, MemoryCredentialStore};
use synack_auth::http::{ApiClient, Endpoints, HttpSession, RetryConfig};
use synack_auth::Authenticator;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// RFC 4226 test secret ("12345678901234567890").
pub const OTP_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

/// RFC 4226 codes for counters 0..=9.
pub const RFC_CODES: [&str; 10] = [
    "755224", "287082", "359152", "969429", "338314", "254676", "287922", "162583", "399871",
    "520489",
];

pub const AUTH_PATH: &str = "/frame/frameless/v4/auth";

/// Three stand-ins for the platform hosts plus one for the MFA provider.
pub struct Harness {
    pub login: MockServer,
    pub platform: MockServer,
    pub notifications: MockServer,
    pub duo: MockServer,
    pub store: MemoryCredentialStore,
    pub sleeper: RecordingSleeper,
}

impl Harness {
    pub async fn start(store: MemoryCredentialStore) -> Self {
        Self {
            login: MockServer::start().await,
            platform: MockServer::start().await,
            notifications: MockServer::start().await,
            duo: MockServer::start().await,
            store,
            sleeper: RecordingSleeper::new(),
        }
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        Ok(Endpoints::with_roots(
            &self.login.uri(),
            &self.platform.uri(),
            &self.notifications.uri(),
        )?)
    }

    pub fn client(&self) -> Result<ApiClient> {
        Ok(ApiClient::new(
            HttpSession::new(None),
            self.endpoints()?,
            Credentials::from_store(self.store.clone()),
            RetryConfig::default(),
        )
        .with_sleeper(Arc::new(self.sleeper.clone())))
    }

    pub fn authenticator(&self, config_dir: &Path) -> Result<Authenticator> {
        Ok(Authenticator::new(
            self.client()?,
            MfaConfig::default(),
            config_dir,
        ))
    }

    /// Challenge URL handed out by the authenticate endpoint.
    pub fn auth_url(&self) -> String {
        format!("{}{AUTH_PATH}?sid=SID1&tx=TXCOOKIE", self.duo.uri())
    }

    /// Mount the challenge page and the session-variable form handler.
    ///
    /// The form POST is expected exactly twice.
    pub async fn mount_challenge_page(&self) {
        Mock::given(method("GET"))
            .and(path(AUTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(challenge_html(), "text/html"))
            .expect(1)
            .mount(&self.duo)
            .await;

        Mock::given(method("POST"))
            .and(path(AUTH_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(challenge_html(), "text/html"))
            .expect(2)
            .mount(&self.duo)
            .await;
    }

    /// Mount the prompt endpoint returning transaction `TX1`.
    pub async fn mount_prompt(&self) {
        Mock::given(method("POST"))
            .and(path("/frame/v4/prompt"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"stat":"OK","response":{"txid":"TX1"}}"#,
                "application/json",
            ))
            .expect(1)
            .mount(&self.duo)
            .await;
    }

    /// Mount the exit endpoint redirecting to the platform with `grant_token`.
    pub async fn mount_exit(&self, grant_token: &str) {
        let location = format!(
            "{}/?foo=1&grant_token={grant_token}&bar=2",
            self.platform.uri()
        );
        Mock::given(method("POST"))
            .and(path("/frame/v4/oidc/exit"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", location.as_str()))
            .expect(1)
            .mount(&self.duo)
            .await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&self.platform)
            .await;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeper.sleeps()
    }
}

pub fn status_body(status_enum: i64) -> String {
    let result = if status_enum == 5 { "SUCCESS" } else { "" };
    format!(r#"{{"stat":"OK","response":{{"status_enum":{status_enum},"result":"{result}"}}}}"#)
}

pub fn challenge_html() -> &'static str {
    r#"<!DOCTYPE html>
<html>
<body>
<form id="endpoint-health-form" method="POST">
  <input type="hidden" name="tx" value="TX-STATE">
  <input type="hidden" name="parent" value="None">
  <input type="hidden" value="XSRF1" name="_xsrf">
  <input type="hidden" name="version" value="v4">
  <input type="hidden" name="akey" value="AKEY1">
  <input type="hidden" name="has_session_trust_analysis_feature" value="False">
  <input type="hidden" name="session_trust_extension_id" value="">
  <input type="hidden" name="java_version" value="">
  <input type="hidden" name="flash_version" value="">
</form>
</body>
</html>"#
}

pub fn login_page(csrf: &str) -> String {
    format!(
        r#"<html><head><meta name="csrf-token" content="{csrf}"></head><body></body></html>"#
    )
}
