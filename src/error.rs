//! Error taxonomy for the request layer and the authentication flow.

/// Failures surfaced by [`ApiClient`](crate::http::ApiClient) and the
/// authentication flow. HTTP-derived variants carry the last status and URL.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authentication failed: HTTP {status} from {url}")]
    AuthenticationFailure { status: u16, url: String },

    #[error("session invalidated: HTTP {status} from {url}; re-authenticate")]
    SessionInvalidated { status: u16, url: String },

    #[error("rate limited: HTTP {status} from {url} after {attempts} attempts")]
    RateLimited {
        status: u16,
        url: String,
        attempts: u32,
    },

    #[error("request failed: HTTP {status} from {url} after {attempts} attempts")]
    TransientFailure {
        status: u16,
        url: String,
        attempts: u32,
    },

    #[error("push notification declined (suspicious: {suspicious})")]
    MfaDeclined { suspicious: bool },

    #[error("MFA blocked by the provider")]
    MfaBlocked,

    #[error("passcode rejected (stale: {stale}); counter is now {counter}")]
    MfaCodeMismatch { stale: bool, counter: u64 },

    #[error("MFA not resolved after {polls} status polls")]
    MfaTimeout { polls: u32 },

    #[error("unexpected MFA status: {body}")]
    MfaUnexpectedStatus { body: String },

    #[error("could not find {what} in response from {url}")]
    ProtocolExtraction { what: &'static str, url: String },

    #[error("grant token exchange failed: HTTP {status} from {url}")]
    TokenExchange { status: u16, url: String },

    #[error("invalid JSON from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP transport error for {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthError {
    /// Last HTTP status involved, if the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::AuthenticationFailure { status, .. }
            | AuthError::SessionInvalidated { status, .. }
            | AuthError::RateLimited { status, .. }
            | AuthError::TransientFailure { status, .. }
            | AuthError::TokenExchange { status, .. } => Some(*status),
            AuthError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Last URL involved, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            AuthError::AuthenticationFailure { url, .. }
            | AuthError::SessionInvalidated { url, .. }
            | AuthError::RateLimited { url, .. }
            | AuthError::TransientFailure { url, .. }
            | AuthError::ProtocolExtraction { url, .. }
            | AuthError::TokenExchange { url, .. }
            | AuthError::Decode { url, .. }
            | AuthError::Transport { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether the caller should run the login flow again before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::AuthenticationFailure { .. } | AuthError::SessionInvalidated { .. }
        )
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
