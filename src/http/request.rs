//! The request layer every platform and provider call goes through.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::endpoints::{EndpointGroup, Endpoints};
use super::outcome::{Classification, RequestOutcome};
use super::session::HttpSession;
use crate::clock::{Sleeper, TokioSleeper};
use crate::credentials::Credentials;
use crate::duration::{deserialize_duration, serialize_duration};
use crate::error::{AuthError, AuthResult};

const USER_ID_HEADER: &str = "user_id";
const REDACTED: &str = "<redacted>";

fn default_max_retries() -> u32 {
    5
}

fn default_rate_limit_backoff() -> Duration {
    Duration::from_secs(30)
}

/// Retry limits for rate-limited and failing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt; the request is sent at most this + 1 times.
    pub max_retries: u32,

    /// Wait before retrying a 429.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub rate_limit_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            rate_limit_backoff: default_rate_limit_backoff(),
        }
    }
}

/// Per-call headers, query, body and flags.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    include_standard_headers: bool,
    retry: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            include_standard_headers: true,
            retry: true,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for traffic that must never carry the platform bearer token.
    pub fn third_party() -> Self {
        Self {
            include_standard_headers: false,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Request body. Sent as a form when the headers declare url-encoding,
    /// otherwise as JSON.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Disable status-driven retries, for single-use requests.
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    fn declares_form(&self) -> bool {
        self.headers.iter().any(|(name, value)| {
            name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) && value.contains("urlencoded")
        })
    }
}

/// Flatten a JSON object into form pairs. Strings are sent bare, null as empty.
fn form_pairs(body: &Value) -> Vec<(String, String)> {
    match body {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == AUTHORIZATION {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.to_string(), shown)
        })
        .collect()
}

/// Keys whose values are credentials. Matched in bodies, queries and URLs.
const SECRET_KEYS: &[&str] = &[
    "password",
    "passcode",
    "access_token",
    "token",
    "grant_token",
    "progress_token",
];

fn is_secret_key(key: &str) -> bool {
    SECRET_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k))
}

fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if is_secret_key(key) {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_json(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        _ => {}
    }
}

fn redact_body(body: &Option<Value>) -> Option<Value> {
    let mut body = body.clone()?;
    redact_json(&mut body);
    Some(body)
}

fn redact_query(query: &[(String, String)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| {
            let shown = if is_secret_key(k) { REDACTED } else { v.as_str() };
            (k.clone(), shown.to_string())
        })
        .collect()
}

/// The URL with secret query parameters blanked. Unparseable input is shown as is.
pub(crate) fn redact_url(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.iter().any(|(k, _)| is_secret_key(k)) {
        return url.to_string();
    }
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(redact_query(&pairs));
    parsed.to_string()
}

/// Response text for the log. JSON bodies have their secret keys blanked.
fn redact_content(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(mut value) => {
            redact_json(&mut value);
            value.to_string()
        }
        Err(_) => content.to_string(),
    }
}

fn insert_header(map: &mut HeaderMap, name: &str, value: &str) -> AuthResult<()> {
    let header_name = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
        .map_err(|e| AuthError::Configuration(format!("invalid header name {name:?}: {e}")))?;
    let header_value = HeaderValue::from_str(value)
        .map_err(|e| AuthError::Configuration(format!("invalid value for header {name}: {e}")))?;
    map.insert(header_name, header_value);
    Ok(())
}

/// Routes, decorates, sends, logs and retries requests.
///
/// Owns the process's [`HttpSession`]; every network call of the login and
/// MFA flows goes through [`ApiClient::execute`].
pub struct ApiClient {
    session: HttpSession,
    endpoints: Endpoints,
    credentials: Credentials,
    retry: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl ApiClient {
    pub fn new(
        session: HttpSession,
        endpoints: Endpoints,
        credentials: Credentials,
        retry: RetryConfig,
    ) -> Self {
        Self {
            session,
            endpoints,
            credentials,
            retry,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub async fn get(&self, group: EndpointGroup, path: &str) -> AuthResult<RequestOutcome> {
        self.execute(Method::GET, group, path, RequestOptions::new())
            .await
    }

    /// Send a request and apply the retry policy.
    ///
    /// `path` is relative to the group's API base unless it is an absolute
    /// URL. Returns the final outcome whatever its status; transport failures
    /// and malformed options are the only errors.
    pub async fn execute(
        &self,
        method: Method,
        group: EndpointGroup,
        path: &str,
        options: RequestOptions,
    ) -> AuthResult<RequestOutcome> {
        if ![
            Method::GET,
            Method::HEAD,
            Method::PATCH,
            Method::POST,
            Method::PUT,
        ]
        .contains(&method)
        {
            return Err(AuthError::Configuration(format!(
                "unsupported HTTP method {method}"
            )));
        }

        let url = self.endpoints.resolve(group, path);
        let headers = self.build_headers(group, &url, &options).await?;

        let mut attempt = 1;
        loop {
            let mut outcome = self
                .send_once(&method, &url, &headers, &options, attempt)
                .await?;

            if group == EndpointGroup::Notifications
                && outcome.status == StatusCode::UNPROCESSABLE_ENTITY
            {
                warn!(
                    url = %redact_url(&outcome.url),
                    "notifications token rejected; clearing it"
                );
                self.credentials.clear_notifications_token().await?;
                outcome.classification = Classification::SessionInvalidated;
                return Ok(outcome);
            }

            let retries_left = options.retry && attempt <= self.retry.max_retries;
            match outcome.classification {
                Classification::RateLimited if retries_left => {
                    warn!(
                        url = %redact_url(&outcome.url),
                        attempt,
                        backoff = ?self.retry.rate_limit_backoff,
                        "rate limited; backing off"
                    );
                    self.sleeper.sleep(self.retry.rate_limit_backoff).await;
                }
                Classification::TransientFailure if retries_left => {
                    warn!(
                        url = %redact_url(&outcome.url),
                        status = outcome.status.as_u16(),
                        attempt,
                        "request failed; retrying"
                    );
                }
                _ => return Ok(outcome),
            }
            attempt += 1;
        }
    }

    async fn build_headers(
        &self,
        group: EndpointGroup,
        url: &str,
        options: &RequestOptions,
    ) -> AuthResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        if options.include_standard_headers && self.endpoints.is_platform_api(url) {
            if let Some(token) = self.credentials.api_token().await? {
                insert_header(
                    &mut headers,
                    AUTHORIZATION.as_str(),
                    &format!("Bearer {}", token.expose_secret()),
                )?;
            }
            if let Some(user_id) = self.credentials.user_id().await? {
                insert_header(&mut headers, USER_ID_HEADER, &user_id)?;
            }
        }

        for (name, value) in &options.headers {
            insert_header(&mut headers, name, value)?;
        }

        if group == EndpointGroup::Notifications {
            let token = self.credentials.notifications_token().await?;
            let token = token.as_ref().map(|t| t.expose_secret()).unwrap_or_default();
            insert_header(&mut headers, AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        }

        Ok(headers)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        options: &RequestOptions,
        attempt: u32,
    ) -> AuthResult<RequestOutcome> {
        let client = self.session.client().await?;
        let request_id = Uuid::new_v4();

        let mut request = client
            .request(method.clone(), url)
            .headers(headers.clone());
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(body) = &options.body {
            if *method != Method::GET && *method != Method::HEAD {
                request = if options.declares_form() {
                    request.form(&form_pairs(body))
                } else {
                    request.json(body)
                };
            }
        }

        let transport = |source| AuthError::Transport {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let final_url = response.url().to_string();
        let response_headers = response.headers().clone();
        let body = response.text().await.map_err(transport)?;

        debug!(
            %request_id,
            status = status.as_u16(),
            method = %method,
            url = %redact_url(url),
            final_url = %redact_url(&final_url),
            attempt,
            headers = ?redact_headers(headers),
            query = ?redact_query(&options.query),
            body = ?redact_body(&options.body),
            content = %redact_content(&body),
            "network request"
        );

        Ok(RequestOutcome {
            method: method.clone(),
            status,
            url: final_url,
            headers: response_headers,
            body,
            attempts: attempt,
            classification: Classification::from_status(status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn form_detection_is_case_insensitive() {
        let options = RequestOptions::third_party()
            .header("content-type", "application/x-www-form-urlencoded;charset=UTF-8");
        assert!(options.declares_form());
        assert!(!RequestOptions::new()
            .header("Content-Type", "application/json")
            .declares_form());
    }

    #[test]
    fn form_pairs_stringify_scalars() {
        let pairs = form_pairs(&json!({"a": "x", "b": false, "c": 3, "d": null}));
        assert_eq!(
            pairs,
            vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "false".to_string()),
                ("c".to_string(), "3".to_string()),
                ("d".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn password_and_authorization_are_redacted() {
        let body = redact_body(&Some(json!({"email": "a@b.c", "password": "hunter2"})))
            .expect("body present");
        assert_eq!(body["password"], REDACTED);
        assert_eq!(body["email"], "a@b.c");

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, "Authorization", "Bearer secret").expect("valid header");
        insert_header(&mut headers, "user_id", "u1").expect("valid header");
        let shown = redact_headers(&headers);
        assert!(shown.contains(&("authorization".to_string(), REDACTED.to_string())));
        assert!(shown.contains(&("user_id".to_string(), "u1".to_string())));
    }

    #[test]
    fn token_fields_are_redacted_everywhere() {
        let content = redact_content(r#"{"access_token":"B1","nested":[{"token":"N1"}],"ok":1}"#);
        assert!(!content.contains("B1"));
        assert!(!content.contains("N1"));
        assert!(content.contains(r#""ok":1"#));
        assert_eq!(redact_content("<html>plain</html>"), "<html>plain</html>");

        let query = redact_query(&[
            ("grant_token".to_string(), "G1".to_string()),
            ("sid".to_string(), "S1".to_string()),
        ]);
        assert_eq!(query[0].1, REDACTED);
        assert_eq!(query[1].1, "S1");

        let url = redact_url("https://platform.example.com/?foo=1&grant_token=G1&bar=2");
        assert!(!url.contains("G1"));
        assert!(url.contains("foo=1") && url.contains("bar=2"));
        let plain = "https://platform.example.com/api/targets?page=2";
        assert_eq!(redact_url(plain), plain);
    }

    #[test]
    fn default_retry_policy() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.rate_limit_backoff, Duration::from_secs(30));
    }
}
