//! Password-store (pass) credential backend.
//!
//! One pass entry holds the whole account. The first line is the password and
//! every further line is a `field: value` pair:
//!
//! ```text
//! hunter2
//! email: researcher@example.com
//! otp_secret: JBSWY3DPEHPK3PXP
//! otp_count: 17
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Mutex;

use super::CredentialStore;

const PASSWORD_FIELD: &str = "password";

/// Configuration for a pass credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassConfig {
    /// The pass entry path (e.g., "work/synack").
    pub path: String,

    /// Mapping from logical key names to field names in the pass entry.
    /// Unmapped keys are used as-is.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

/// Credential store backed by password-store (pass).
pub struct PassCredentialStore {
    config: PassConfig,
    write_lock: Mutex<()>,
}

impl PassCredentialStore {
    pub fn new(config: PassConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.config
            .fields
            .get(key)
            .map(String::as_str)
            .unwrap_or(key)
    }

    async fn read_entry(&self) -> Result<PassEntry> {
        let output = Command::new("pass")
            .arg("show")
            .arg(&self.config.path)
            .output()
            .await
            .context("Failed to run pass command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("pass show {} failed: {}", self.config.path, stderr.trim());
        }

        let content = String::from_utf8(output.stdout).context("Invalid UTF-8 in pass output")?;
        Ok(PassEntry::parse(&content))
    }

    async fn write_entry(&self, entry: &PassEntry) -> Result<()> {
        let mut child = Command::new("pass")
            .arg("insert")
            .arg("--multiline")
            .arg("--force")
            .arg(&self.config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .context("Failed to spawn pass command")?;

        let mut stdin = child.stdin.take().context("pass stdin unavailable")?;
        stdin
            .write_all(entry.to_string().as_bytes())
            .await
            .context("Failed to write to pass stdin")?;
        drop(stdin);

        let status = child.wait().await.context("Failed to wait for pass command")?;
        if !status.success() {
            anyhow::bail!("pass insert {} failed", self.config.path);
        }
        Ok(())
    }

    async fn modify(&self, apply: impl FnOnce(&mut PassEntry)) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entry = self.read_entry().await?;
        apply(&mut entry);
        self.write_entry(&entry).await
    }
}

#[async_trait]
impl CredentialStore for PassCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let entry = self.read_entry().await?;
        Ok(entry
            .get(self.field_name(key))
            .map(|v| SecretString::from(v.to_string())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        let field = self.field_name(key).to_string();
        let value = value.expose_secret().to_string();
        self.modify(|entry| entry.set(field, value)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let field = self.field_name(key).to_string();
        self.modify(|entry| entry.remove(&field)).await
    }
}

/// Parsed pass entry.
#[derive(Debug, Default, PartialEq)]
struct PassEntry {
    password: Option<String>,
    fields: BTreeMap<String, String>,
}

impl PassEntry {
    fn parse(content: &str) -> Self {
        let mut lines = content.lines();
        let password = lines.next().map(str::to_string).filter(|p| !p.is_empty());

        let fields = lines
            .filter_map(|line| line.split_once(": "))
            .map(|(key, value)| (key.to_string(), value.replace("\\n", "\n")))
            .collect();

        Self { password, fields }
    }

    fn get(&self, field: &str) -> Option<&str> {
        if field == PASSWORD_FIELD {
            return self.password.as_deref();
        }
        self.fields.get(field).map(String::as_str)
    }

    fn set(&mut self, field: String, value: String) {
        if field == PASSWORD_FIELD {
            self.password = Some(value);
        } else {
            self.fields.insert(field, value);
        }
    }

    fn remove(&mut self, field: &str) {
        if field == PASSWORD_FIELD {
            self.password = None;
        } else {
            self.fields.remove(field);
        }
    }
}

impl fmt::Display for PassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.password.as_deref().unwrap_or_default())?;
        for (key, value) in &self.fields {
            writeln!(f, "{key}: {}", value.replace('\n', "\\n"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_password_line_and_fields() {
        let entry = PassEntry::parse("hunter2\nemail: r@example.com\notp_count: 3\nnot a field");

        assert_eq!(entry.get("password"), Some("hunter2"));
        assert_eq!(entry.get("email"), Some("r@example.com"));
        assert_eq!(entry.get("otp_count"), Some("3"));
        assert_eq!(entry.fields.len(), 2);
    }

    #[test]
    fn set_and_remove_update_the_right_slot() {
        let mut entry = PassEntry::parse("hunter2\nemail: r@example.com");

        entry.set("otp_count".to_string(), "9".to_string());
        entry.set("password".to_string(), "new".to_string());
        entry.remove("email");

        assert_eq!(entry.get("password"), Some("new"));
        assert_eq!(entry.get("otp_count"), Some("9"));
        assert_eq!(entry.get("email"), None);
    }

    #[test]
    fn serialized_entry_parses_back() {
        let entry = PassEntry::parse("pw\napi_token: abc\nnote: line1\\nline2");
        assert_eq!(PassEntry::parse(&entry.to_string()), entry);
    }

    #[test]
    fn field_mapping_falls_back_to_key() {
        let mut fields = BTreeMap::new();
        fields.insert("otp_secret".to_string(), "duo-secret".to_string());
        let store = PassCredentialStore::new(PassConfig {
            path: "work/synack".to_string(),
            fields,
        });

        assert_eq!(store.field_name("otp_secret"), "duo-secret");
        assert_eq!(store.field_name("email"), "email");
    }
}
