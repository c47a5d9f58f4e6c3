//! The process-wide cookie-bearing HTTP client.

use std::time::Duration;

use reqwest::{Client, Proxy};
use tokio::sync::OnceCell;

use crate::error::{AuthError, AuthResult};

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Proxy endpoints for plain and TLS traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxySettings {
    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }
}

/// Lazily built client shared by every request in the process.
///
/// Certificate verification is off whenever a proxy is configured, so an
/// intercepting debug proxy can sit in the middle.
#[derive(Debug, Default)]
pub struct HttpSession {
    proxy: Option<ProxySettings>,
    client: OnceCell<Client>,
}

impl HttpSession {
    pub fn new(proxy: Option<ProxySettings>) -> Self {
        Self {
            proxy: proxy.filter(|p| !p.is_empty()),
            client: OnceCell::new(),
        }
    }

    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    pub async fn client(&self) -> AuthResult<&Client> {
        self.client.get_or_try_init(|| async { self.build() }).await
    }

    fn build(&self) -> AuthResult<Client> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT);

        if let Some(proxy) = &self.proxy {
            if let Some(url) = &proxy.http {
                builder = builder.proxy(Proxy::http(url).map_err(|e| {
                    AuthError::Configuration(format!("invalid http proxy {url:?}: {e}"))
                })?);
            }
            if let Some(url) = &proxy.https {
                builder = builder.proxy(Proxy::https(url).map_err(|e| {
                    AuthError::Configuration(format!("invalid https proxy {url:?}: {e}"))
                })?);
            }
            builder = builder.danger_accept_invalid_certs(true);
            tracing::warn!("proxy configured; TLS certificate verification disabled");
        }

        builder
            .build()
            .map_err(|e| AuthError::Configuration(format!("failed to build HTTP client: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proxy_settings_are_ignored() {
        let session = HttpSession::new(Some(ProxySettings::default()));
        assert!(session.proxy().is_none());
    }

    #[tokio::test]
    async fn proxied_client_builds() -> AuthResult<()> {
        let session = HttpSession::new(Some(ProxySettings {
            http: Some("http://127.0.0.1:8080".to_string()),
            https: Some("http://127.0.0.1:8080".to_string()),
        }));
        assert!(session.proxy().is_some());
        session.client().await?;
        Ok(())
    }

    #[tokio::test]
    async fn client_is_built_once() -> AuthResult<()> {
        let session = HttpSession::new(None);
        let first = session.client().await? as *const Client;
        let second = session.client().await? as *const Client;
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn bad_proxy_url_is_a_configuration_error() {
        let session = HttpSession::new(Some(ProxySettings {
            http: Some("::not a proxy::".to_string()),
            https: None,
        }));
        assert!(matches!(
            session.client().await,
            Err(AuthError::Configuration(_))
        ));
    }
}
