//! Credential backend selection, as found in the `[credentials]` config table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::file::FileCredentialStore;
#[cfg(feature = "pass")]
use super::pass::{PassConfig, PassCredentialStore};
use super::CredentialStore;

/// Configuration for a credential store.
///
/// ```toml
/// [credentials]
/// backend = "pass"
/// path = "work/synack"
///
/// [credentials.fields]
/// otp_secret = "duo-hotp"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum CredentialConfig {
    /// Local JSON file. Relative paths resolve against the config directory.
    File {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Password-store (pass) backend.
    #[cfg(feature = "pass")]
    Pass {
        #[serde(flatten)]
        config: PassConfig,
    },
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::File { path: None }
    }
}

impl CredentialConfig {
    /// Build a credential store from this configuration.
    pub fn build(&self, config_dir: &Path) -> Result<Arc<dyn CredentialStore>> {
        match self {
            CredentialConfig::File { path } => {
                let path = match path {
                    Some(p) if p.is_absolute() => p.clone(),
                    Some(p) => config_dir.join(p),
                    None => config_dir.join("credentials.json"),
                };
                Ok(Arc::new(FileCredentialStore::new(path)))
            }
            #[cfg(feature = "pass")]
            CredentialConfig::Pass { config } => {
                Ok(Arc::new(PassCredentialStore::new(config.clone())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        credentials: CredentialConfig,
    }

    #[test]
    fn parses_file_backend() -> Result<()> {
        let parsed: Wrapper = toml::from_str(
            r#"
[credentials]
backend = "file"
path = "creds.json"
"#,
        )?;

        match parsed.credentials {
            CredentialConfig::File { path } => {
                assert_eq!(path, Some(PathBuf::from("creds.json")));
            }
            #[allow(unreachable_patterns)]
            other => panic!("unexpected backend: {other:?}"),
        }
        Ok(())
    }

    #[cfg(feature = "pass")]
    #[test]
    fn parses_pass_backend_with_field_mapping() -> Result<()> {
        let parsed: Wrapper = toml::from_str(
            r#"
[credentials]
backend = "pass"
path = "work/synack"

[credentials.fields]
otp_secret = "duo-hotp"
"#,
        )?;

        match parsed.credentials {
            CredentialConfig::Pass { config } => {
                assert_eq!(config.path, "work/synack");
                assert_eq!(
                    config.fields.get("otp_secret").map(String::as_str),
                    Some("duo-hotp")
                );
            }
            other => panic!("unexpected backend: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn default_file_lands_in_config_dir() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let store = CredentialConfig::default().build(dir.path())?;
        assert!(store.supports_write());
        Ok(())
    }
}
