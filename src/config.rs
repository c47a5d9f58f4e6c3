use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{Authenticator, MfaConfig};
use crate::clock::Sleeper;
use crate::credentials::{CredentialConfig, CredentialStore, Credentials};
use crate::http::{ApiClient, Endpoints, HttpSession, ProxySettings, RetryConfig};

const CONFIG_FILE: &str = "synack-auth.toml";
const DEFAULT_PROXY: &str = "http://localhost:8080";

fn default_domain() -> String {
    "synack.com".to_string()
}

/// Per-group base URL overrides. Unset groups derive from `domain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    pub login: Option<String>,
    pub platform: Option<String>,
    pub notifications: Option<String>,
}

/// Outbound proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Route traffic through the proxy. Also disables certificate checks.
    pub enabled: bool,

    /// Proxy for plain HTTP. Defaults to `http://localhost:8080` when enabled.
    pub http: Option<String>,

    /// Proxy for HTTPS. Defaults to `http://localhost:8080` when enabled.
    pub https: Option<String>,
}

impl ProxyConfig {
    pub fn settings(&self) -> Option<ProxySettings> {
        if !self.enabled {
            return None;
        }
        Some(ProxySettings {
            http: Some(self.http.clone().unwrap_or_else(|| DEFAULT_PROXY.to_string())),
            https: Some(self.https.clone().unwrap_or_else(|| DEFAULT_PROXY.to_string())),
        })
    }
}

/// Application configuration, as written in `synack-auth.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Platform domain. Hosts are `login.`, `platform.` and `notifications.` under it.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Directory for generated files such as `login.js`. If relative,
    /// resolved from the config file location. Defaults to the user config
    /// directory's `synack` folder.
    pub config_dir: Option<PathBuf>,

    pub endpoints: EndpointOverrides,
    pub proxy: ProxyConfig,
    pub retry: RetryConfig,
    pub mfa: MfaConfig,
    pub credentials: CredentialConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            config_dir: None,
            endpoints: EndpointOverrides::default(),
            proxy: ProxyConfig::default(),
            retry: RetryConfig::default(),
            mfa: MfaConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Resolve the output directory against the config file's directory.
    pub fn resolve_config_dir(&self, base_dir: &Path) -> PathBuf {
        match &self.config_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base_dir.join(dir),
            None => dirs::config_dir()
                .map(|dir| dir.join("synack"))
                .unwrap_or_else(|| base_dir.to_path_buf()),
        }
    }

    /// Base URLs for the three endpoint groups.
    pub fn endpoints(&self) -> Result<Endpoints> {
        let defaults = Endpoints::for_domain(&self.domain)?;
        let login = self
            .endpoints
            .login
            .as_deref()
            .unwrap_or(defaults.login_root());
        let platform = self
            .endpoints
            .platform
            .as_deref()
            .unwrap_or(defaults.platform_root());
        let notifications = self
            .endpoints
            .notifications
            .as_deref()
            .unwrap_or(defaults.notifications_root());
        Ok(Endpoints::with_roots(login, platform, notifications)?)
    }
}

/// Loaded configuration with resolved paths and endpoints.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory `login.js` is written to.
    pub config_dir: PathBuf,

    /// Directory relative credential paths resolve against.
    pub base_dir: PathBuf,

    pub domain: String,
    pub endpoints: Endpoints,
    pub proxy: Option<ProxySettings>,
    pub retry: RetryConfig,
    pub mfa: MfaConfig,
    pub credentials: CredentialConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./synack-auth.toml` if it exists in current directory
/// 2. `~/.config/synack/synack-auth.toml`
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE);
    if local_config.exists() {
        return local_config;
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("synack").join(CONFIG_FILE);
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let base_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Self::resolve(config, base_dir)
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let base_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Self::resolve(Config::default(), base_dir)
    }

    fn resolve(config: Config, base_dir: &Path) -> Result<Self> {
        Ok(Self {
            config_dir: config.resolve_config_dir(base_dir),
            base_dir: base_dir.to_path_buf(),
            endpoints: config.endpoints()?,
            proxy: config.proxy.settings(),
            domain: config.domain,
            retry: config.retry,
            mfa: config.mfa,
            credentials: config.credentials,
        })
    }

    /// Open the configured credential backend.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>> {
        self.credentials.build(&self.base_dir)
    }

    /// Wire an [`Authenticator`] over `store`.
    pub fn authenticator(
        &self,
        store: Arc<dyn CredentialStore>,
        sleeper: Option<Arc<dyn Sleeper>>,
    ) -> Authenticator {
        let mut client = ApiClient::new(
            HttpSession::new(self.proxy.clone()),
            self.endpoints.clone(),
            Credentials::new(store),
            self.retry.clone(),
        );
        if let Some(sleeper) = sleeper {
            client = client.with_sleeper(sleeper);
        }
        Authenticator::new(client, self.mfa.clone(), self.config_dir.clone())
    }
}
