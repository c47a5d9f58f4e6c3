use reqwest::Url;

use crate::error::{AuthError, AuthResult};

/// The three logical API hosts requests are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointGroup {
    Login,
    Platform,
    Notifications,
}

/// Base URLs for each endpoint group.
///
/// Roots are stored without a trailing slash. API bases always end in `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    login_root: String,
    platform_root: String,
    notifications_root: String,
}

fn normalize_root(name: &str, raw: &str) -> AuthResult<String> {
    let url = Url::parse(raw)
        .map_err(|e| AuthError::Configuration(format!("invalid {name} URL {raw:?}: {e}")))?;
    if url.host_str().is_none() {
        return Err(AuthError::Configuration(format!(
            "{name} URL {raw:?} has no host"
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// True for anything that carries its own scheme and bypasses group routing.
pub fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

impl Endpoints {
    /// `https://login.<domain>`, `https://platform.<domain>`, `https://notifications.<domain>`.
    pub fn for_domain(domain: &str) -> AuthResult<Self> {
        let domain = domain.trim().trim_matches('.');
        if domain.is_empty() {
            return Err(AuthError::Configuration("empty platform domain".to_string()));
        }
        Self::with_roots(
            &format!("https://login.{domain}"),
            &format!("https://platform.{domain}"),
            &format!("https://notifications.{domain}"),
        )
    }

    /// Explicit roots, e.g. local mock servers.
    pub fn with_roots(login: &str, platform: &str, notifications: &str) -> AuthResult<Self> {
        Ok(Self {
            login_root: normalize_root("login", login)?,
            platform_root: normalize_root("platform", platform)?,
            notifications_root: normalize_root("notifications", notifications)?,
        })
    }

    pub fn login_root(&self) -> &str {
        &self.login_root
    }

    pub fn platform_root(&self) -> &str {
        &self.platform_root
    }

    pub fn notifications_root(&self) -> &str {
        &self.notifications_root
    }

    pub fn api_base(&self, group: EndpointGroup) -> String {
        match group {
            EndpointGroup::Login => format!("{}/api/", self.login_root),
            EndpointGroup::Platform => format!("{}/api/", self.platform_root),
            EndpointGroup::Notifications => format!("{}/api/v2/", self.notifications_root),
        }
    }

    /// Absolute URL for `path` in `group`. Absolute paths pass through untouched.
    pub fn resolve(&self, group: EndpointGroup, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        format!("{}{}", self.api_base(group), path.trim_start_matches('/'))
    }

    /// Whether `url` targets one of the platform's own API bases.
    pub fn is_platform_api(&self, url: &str) -> bool {
        [
            EndpointGroup::Login,
            EndpointGroup::Platform,
            EndpointGroup::Notifications,
        ]
        .into_iter()
        .any(|group| url.starts_with(&self.api_base(group)))
    }
}
