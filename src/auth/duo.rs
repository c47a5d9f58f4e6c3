//! Duo Universal Prompt driver.
//!
//! Walks the provider's frame flow the way a browser does and returns the
//! grant token issued on the OIDC exit redirect. Each step is one call
//! through [`ApiClient`], in a fixed order:
//!
//! 1. `INIT`: GET the challenge URL and scrape the session form.
//! 2. `SESSION_VARS_POSTED`: POST the form back, twice.
//! 3. `FACTOR_RESOLVED`: HOTP passcode if a secret is configured, otherwise
//!    the first device offering Duo Push.
//! 4. `TXID_OBTAINED`: POST the prompt and read the transaction id.
//! 5. `STATUS_POLLING`: poll the transaction until it settles.
//! 6. `GRANT_TOKEN_OBTAINED`: POST the exit form and read `grant_token`
//!    from the final redirect URL.

use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{Method, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::hotp;
use super::status::MfaStatus;
use crate::duration::{deserialize_duration, serialize_duration};
use crate::error::{AuthError, AuthResult};
use crate::extract::{form_field, query_param};
use crate::http::{ApiClient, EndpointGroup, RequestOptions, RequestOutcome};

const PASSCODE_FACTOR: &str = "Passcode";
const PUSH_FACTOR: &str = "Duo Push";
const NULL_DEVICE: &str = "null";
const POST_AUTH_ACTION: &str = "OIDC_EXIT";
const BROWSER_FEATURES: &str =
    r#"{"touch_supported":false,"platform_authenticator_status":"unavailable","webauthn_supported":true}"#;
const DOCUMENT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

const CLIENT_HINT_HEADERS: [(&str, &str); 3] = [
    ("Sec-Ch-Ua", r#""Chromium";v="131", "Not_A Brand";v="24""#),
    ("Sec-Ch-Ua-Mobile", "?0"),
    ("Sec-Ch-Ua-Platform", r#""Linux""#),
];

/// Hidden fields scraped from the challenge page; the flow cannot continue
/// without them.
const REQUIRED_FIELDS: [(&str, &str); 5] = [
    ("tx", "transaction id (tx)"),
    ("parent", "parent URL"),
    ("_xsrf", "provider xsrf token"),
    ("version", "frame version"),
    ("akey", "application key"),
];

/// Hidden fields passed through when present.
const OPTIONAL_FIELDS: [&str; 4] = [
    "has_session_trust_analysis_feature",
    "session_trust_extension_id",
    "java_version",
    "flash_version",
];

fn default_poll_attempts() -> u32 {
    5
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_stale_code_step() -> u64 {
    5
}

/// MFA polling and counter resynchronisation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfaConfig {
    pub poll_attempts: u32,
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub poll_interval: Duration,
    /// Counter advance, relative to the spent code, after a stale-code status.
    pub stale_code_step: u64,
}

impl Default for MfaConfig {
    fn default() -> Self {
        Self {
            poll_attempts: default_poll_attempts(),
            poll_interval: default_poll_interval(),
            stale_code_step: default_stale_code_step(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MfaState {
    Init,
    SessionVarsPosted,
    FactorResolved,
    TxidObtained,
    StatusPolling,
    GrantTokenObtained,
}

impl fmt::Display for MfaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MfaState::Init => "INIT",
            MfaState::SessionVarsPosted => "SESSION_VARS_POSTED",
            MfaState::FactorResolved => "FACTOR_RESOLVED",
            MfaState::TxidObtained => "TXID_OBTAINED",
            MfaState::StatusPolling => "STATUS_POLLING",
            MfaState::GrantTokenObtained => "GRANT_TOKEN_OBTAINED",
        })
    }
}

/// The second factor presented to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Factor {
    /// HOTP code computed from `counter`.
    Passcode { passcode: String, counter: u64 },
    /// Push to the phone at `device_index`, identified by `device_key`.
    Push {
        device_key: String,
        device_index: String,
    },
}

impl Factor {
    pub fn name(&self) -> &'static str {
        match self {
            Factor::Passcode { .. } => PASSCODE_FACTOR,
            Factor::Push { .. } => PUSH_FACTOR,
        }
    }

    /// Value of the prompt's `device` field.
    fn device(&self) -> &str {
        match self {
            Factor::Passcode { .. } => NULL_DEVICE,
            Factor::Push { device_index, .. } => device_index,
        }
    }

    /// Value of the exit form's `device_key` field.
    fn exit_device_key(&self) -> &str {
        match self {
            Factor::Passcode { .. } => NULL_DEVICE,
            Factor::Push { device_key, .. } => device_key,
        }
    }
}

/// Per-attempt provider state. Dropped when the flow ends.
#[derive(Debug, Clone)]
struct ProviderSession {
    base_url: String,
    sid: String,
    xsrf: String,
    referrer: String,
    form: Vec<(String, String)>,
}

impl ProviderSession {
    fn prompt_referrer(&self) -> String {
        format!("{}/frame/v4/auth/prompt?sid={}", self.base_url, self.sid)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/frame/v4/{path}", self.base_url)
    }

    /// Headers for the frame's XHR calls.
    fn xhr_options(&self) -> RequestOptions {
        RequestOptions::third_party()
            .headers(CLIENT_HINT_HEADERS)
            .header("Referer", self.prompt_referrer())
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Dest", "empty")
            .header("Accept", "*/*")
            .header(
                "Content-Type",
                "application/x-www-form-urlencoded;charset=UTF-8",
            )
            .header("X-Xsrftoken", self.xsrf.clone())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientHints {
    brands: [Brand; 2],
    full_version_list: [Brand; 0],
    mobile: bool,
    platform: &'static str,
    platform_version: &'static str,
    ua_full_version: &'static str,
}

#[derive(Serialize)]
struct Brand {
    brand: &'static str,
    version: &'static str,
}

/// Base64 of the synthetic Chromium client-hints JSON the frame expects.
pub fn client_hints() -> String {
    let hints = ClientHints {
        brands: [
            Brand {
                brand: "Chromium",
                version: "131",
            },
            Brand {
                brand: "Not_A Brand",
                version: "24",
            },
        ],
        full_version_list: [],
        mobile: false,
        platform: "Linux",
        platform_version: "",
        ua_full_version: "",
    };
    // Serializing plain structs of strings and bools is infallible.
    let json = serde_json::to_string(&hints).unwrap_or_default();
    STANDARD.encode(json)
}

/// Fixed fingerprint values a desktop browser would submit with the form.
fn fingerprint_fields() -> Vec<(String, String)> {
    [
        ("screen_resolution_width", "3422".to_string()),
        ("screen_resolution_height", "1465".to_string()),
        ("extension_instance_key", String::new()),
        ("color_depth", "24".to_string()),
        ("has_touch_capability", "false".to_string()),
        ("ch_ua_error", String::new()),
        ("client_hints", client_hints()),
        ("is_cef_browser", "false".to_string()),
        ("is_ipad_os", "false".to_string()),
        ("is_ie_compatibility_mode", String::new()),
        (
            "is_user_verifying_platform_authenticator_available",
            "false".to_string(),
        ),
        (
            "user_verifying_platform_authenticator_available_error",
            String::new(),
        ),
        ("acting_ie_version", String::new()),
        ("react_support", "false".to_string()),
        ("react_support_error_message", String::new()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Pick the phone that receives Duo Push.
///
/// Takes the first `auth_method_order` entry with factor `Duo Push`, then
/// the phone with the same key. Returns `(device_key, device_index)`.
/// Accepts the bare payload or one wrapped in `{"response": ...}`.
pub fn select_push_device(body: &Value) -> Option<(String, String)> {
    let data = body.get("response").unwrap_or(body);
    let device_key = data
        .get("auth_method_order")?
        .as_array()?
        .iter()
        .find(|method| method.get("factor").and_then(Value::as_str) == Some(PUSH_FACTOR))?
        .get("deviceKey")?
        .as_str()?
        .to_string();

    let index = data
        .get("phones")?
        .as_array()?
        .iter()
        .find(|phone| phone.get("key").and_then(Value::as_str) == Some(device_key.as_str()))?
        .get("index")?;
    let index = match index {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some((device_key, index))
}

fn object_to_form(fields: &[(String, String)]) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}

/// Drives one MFA attempt.
///
/// Holds no state between attempts. Callers must not run two flows for the
/// same credentials at once, since both would spend the same HOTP counter.
pub struct DuoFlow<'a> {
    client: &'a ApiClient,
    config: &'a MfaConfig,
}

impl<'a> DuoFlow<'a> {
    pub fn new(client: &'a ApiClient, config: &'a MfaConfig) -> Self {
        Self { client, config }
    }

    /// Run the full flow for the challenge at `auth_url` and return the
    /// grant token.
    pub async fn grant_token(&self, auth_url: &str) -> AuthResult<String> {
        let mut session = self.init(auth_url).await?;

        self.post_session_vars(&mut session).await?;
        self.post_session_vars(&mut session).await?;
        self.enter(MfaState::SessionVarsPosted, &session);

        let factor = self.resolve_factor(&session).await?;
        tracing::info!(factor = factor.name(), "MFA factor resolved");
        self.enter(MfaState::FactorResolved, &session);

        let txid = self.submit_prompt(&session, &factor).await?;
        self.enter(MfaState::TxidObtained, &session);

        self.enter(MfaState::StatusPolling, &session);
        self.poll_status(&session, &txid, &factor).await?;

        let grant_token = self.exit(&session, &txid, &factor).await?;
        self.enter(MfaState::GrantTokenObtained, &session);
        Ok(grant_token)
    }

    fn enter(&self, state: MfaState, session: &ProviderSession) {
        tracing::debug!(state = %state, sid = %session.sid, "MFA state");
    }

    async fn init(&self, auth_url: &str) -> AuthResult<ProviderSession> {
        let login_referrer = format!("{}/", self.client.endpoints().login_root());
        let options = RequestOptions::third_party()
            .headers(CLIENT_HINT_HEADERS)
            .header("Referer", login_referrer)
            .header("Sec-Fetch-Site", "cross-site")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-User", "?1")
            .header("Sec-Fetch-Dest", "document");
        let outcome = self
            .client
            .execute(Method::GET, EndpointGroup::Login, auth_url, options)
            .await?
            .error_for_status()?;

        let missing = |what: &'static str| AuthError::ProtocolExtraction {
            what,
            url: outcome.url.clone(),
        };
        let sid = query_param("sid", &outcome.url).ok_or_else(|| missing("session id (sid)"))?;
        let base_url = origin_of(&outcome.url).ok_or_else(|| missing("provider base URL"))?;

        let mut form = Vec::new();
        for (name, what) in REQUIRED_FIELDS {
            let value = form_field(name, &outcome.body).ok_or_else(|| missing(what))?;
            form.push((name.to_string(), value));
        }
        for name in OPTIONAL_FIELDS {
            form.push((
                name.to_string(),
                form_field(name, &outcome.body).unwrap_or_default(),
            ));
        }
        form.extend(fingerprint_fields());

        let xsrf = form
            .iter()
            .find(|(name, _)| name == "_xsrf")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        let session = ProviderSession {
            base_url,
            sid,
            xsrf,
            referrer: outcome.url.clone(),
            form,
        };
        self.enter(MfaState::Init, &session);
        Ok(session)
    }

    async fn post_session_vars(&self, session: &mut ProviderSession) -> AuthResult<()> {
        let options = RequestOptions::third_party()
            .headers(CLIENT_HINT_HEADERS)
            .header("Referer", session.referrer.clone())
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Dest", "document")
            .header("Accept", DOCUMENT_ACCEPT)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(object_to_form(&session.form));
        let outcome = self
            .client
            .execute(
                Method::POST,
                EndpointGroup::Login,
                &session.referrer,
                options,
            )
            .await?
            .error_for_status()?;
        session.referrer = outcome.url;
        Ok(())
    }

    async fn resolve_factor(&self, session: &ProviderSession) -> AuthResult<Factor> {
        let credentials = self.client.credentials();
        if let Some(secret) = credentials.otp_secret().await? {
            let key = hotp::decode_secret(secret.expose_secret())?;
            let counter = credentials.otp_count().await?;
            let passcode = hotp::passcode(&key, counter)?;
            // Reserve the counter before the code leaves the process.
            credentials.set_otp_count(counter + 1).await?;
            return Ok(Factor::Passcode { passcode, counter });
        }

        let options = session
            .xhr_options()
            .query("post_auth_action", POST_AUTH_ACTION)
            .query("browser_features", BROWSER_FEATURES)
            .query("sid", session.sid.clone());
        let outcome = self
            .client
            .execute(
                Method::GET,
                EndpointGroup::Login,
                &session.endpoint("auth/prompt/data"),
                options,
            )
            .await?
            .error_for_status()?;
        let body: Value = outcome.json()?;
        let (device_key, device_index) = select_push_device(&body).ok_or_else(|| {
            AuthError::Configuration(
                "no OTP secret configured and no Duo Push device enrolled".to_string(),
            )
        })?;
        Ok(Factor::Push {
            device_key,
            device_index,
        })
    }

    async fn submit_prompt(&self, session: &ProviderSession, factor: &Factor) -> AuthResult<String> {
        let mut body = json!({
            "device": factor.device(),
            "factor": factor.name(),
            "postAuthDestination": POST_AUTH_ACTION,
            "browser_features": BROWSER_FEATURES,
            "sid": session.sid,
        });
        if let Factor::Passcode { passcode, .. } = factor {
            body["passcode"] = Value::String(passcode.clone());
        }

        let outcome = self
            .client
            .execute(
                Method::POST,
                EndpointGroup::Login,
                &session.endpoint("prompt"),
                session.xhr_options().body(body).no_retry(),
            )
            .await?
            .error_for_status()?;
        let reply: Value = outcome.json()?;
        reply
            .get("response")
            .and_then(|r| r.get("txid"))
            .and_then(Value::as_str)
            .filter(|txid| !txid.is_empty())
            .map(str::to_string)
            .ok_or(AuthError::ProtocolExtraction {
                what: "transaction id (txid)",
                url: outcome.url,
            })
    }

    async fn poll_status(
        &self,
        session: &ProviderSession,
        txid: &str,
        factor: &Factor,
    ) -> AuthResult<()> {
        let attempts = self.config.poll_attempts.max(1);
        for poll in 1..=attempts {
            if poll > 1 {
                self.client.sleeper().sleep(self.config.poll_interval).await;
            }

            let outcome = self.status(session, txid).await?;
            let Ok(body) = outcome.json::<Value>() else {
                return Err(AuthError::MfaUnexpectedStatus { body: outcome.body });
            };
            let status = MfaStatus::classify(&body);
            tracing::debug!(poll, status = ?status, "MFA status");

            match status {
                MfaStatus::Success => return Ok(()),
                MfaStatus::AwaitingPush => continue,
                MfaStatus::Declined { suspicious } => {
                    return Err(AuthError::MfaDeclined { suspicious })
                }
                MfaStatus::Blocked => return Err(AuthError::MfaBlocked),
                MfaStatus::BadCode => {
                    let counter = self.client.credentials().otp_count().await?;
                    return Err(AuthError::MfaCodeMismatch {
                        stale: false,
                        counter,
                    });
                }
                MfaStatus::StaleCode => {
                    let counter = self.resynchronize(factor).await?;
                    return Err(AuthError::MfaCodeMismatch {
                        stale: true,
                        counter,
                    });
                }
                MfaStatus::BadRequest | MfaStatus::Unrecognized => {
                    return Err(AuthError::MfaUnexpectedStatus { body: outcome.body })
                }
            }
        }
        Err(AuthError::MfaTimeout { polls: attempts })
    }

    async fn status(&self, session: &ProviderSession, txid: &str) -> AuthResult<RequestOutcome> {
        let options = session.xhr_options().body(json!({
            "txid": txid,
            "sid": session.sid,
        }));
        self.client
            .execute(
                Method::POST,
                EndpointGroup::Login,
                &session.endpoint("status"),
                options,
            )
            .await?
            .error_for_status()
    }

    /// Jump the counter past the provider's window after a stale code.
    async fn resynchronize(&self, factor: &Factor) -> AuthResult<u64> {
        let credentials = self.client.credentials();
        let current = credentials.otp_count().await?;
        let Factor::Passcode { counter: used, .. } = factor else {
            return Ok(current);
        };
        let next = current.max(used + self.config.stale_code_step);
        credentials.set_otp_count(next).await?;
        tracing::warn!(used, next, "stale passcode; OTP counter advanced");
        Ok(next)
    }

    async fn exit(&self, session: &ProviderSession, txid: &str, factor: &Factor) -> AuthResult<String> {
        let options = session.xhr_options().body(json!({
            "sid": session.sid,
            "txid": txid,
            "factor": factor.name(),
            "device_key": factor.exit_device_key(),
            "_xsrf": session.xsrf,
            "dampen_choice": "false",
        }))
        .no_retry();
        let outcome = self
            .client
            .execute(
                Method::POST,
                EndpointGroup::Login,
                &session.endpoint("oidc/exit"),
                options,
            )
            .await?;

        if let Some(token) = query_param("grant_token", &outcome.url) {
            return Ok(token);
        }
        let outcome = outcome.error_for_status()?;
        Err(AuthError::ProtocolExtraction {
            what: "grant_token",
            url: outcome.url,
        })
    }
}
