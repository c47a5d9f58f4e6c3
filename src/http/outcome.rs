use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{AuthError, AuthResult};

/// How the request layer treats a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Below 400.
    Success,
    /// 400 and 401: bad credentials or token. Not retried.
    AuthenticationFailure,
    /// 403: the platform dropped the session. Not retried.
    SessionInvalidated,
    /// 429: retried after a fixed backoff.
    RateLimited,
    /// Any other status of 400 or above: retried immediately.
    TransientFailure,
}

impl Classification {
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            s if s < 400 => Classification::Success,
            400 | 401 => Classification::AuthenticationFailure,
            403 => Classification::SessionInvalidated,
            429 => Classification::RateLimited,
            _ => Classification::TransientFailure,
        }
    }
}

/// A completed exchange, after any retries.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub method: Method,
    pub status: StatusCode,
    /// URL of the final response, after redirects.
    pub url: String,
    pub headers: HeaderMap,
    pub body: String,
    /// Requests sent for this call, including the first.
    pub attempts: u32,
    pub classification: Classification,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }

    pub fn reason(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown")
    }

    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_str(&self.body).map_err(|source| AuthError::Decode {
            url: self.url.clone(),
            source,
        })
    }

    /// Turn a non-success classification into the matching typed error.
    pub fn error_for_status(self) -> AuthResult<Self> {
        let status = self.status.as_u16();
        match self.classification {
            Classification::Success => Ok(self),
            Classification::AuthenticationFailure => Err(AuthError::AuthenticationFailure {
                status,
                url: self.url,
            }),
            Classification::SessionInvalidated => Err(AuthError::SessionInvalidated {
                status,
                url: self.url,
            }),
            Classification::RateLimited => Err(AuthError::RateLimited {
                status,
                url: self.url,
                attempts: self.attempts,
            }),
            Classification::TransientFailure => Err(AuthError::TransientFailure {
                status,
                url: self.url,
                attempts: self.attempts,
            }),
        }
    }
}
