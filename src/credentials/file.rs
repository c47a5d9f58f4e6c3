//! JSON-file credential backend.
//!
//! Keeps every field in one local file. Writes go through a temp file in the
//! same directory and an atomic rename, so a crash never leaves a half-written
//! counter behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::CredentialStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    fields: BTreeMap<String, String>,

    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// Credential store persisted as a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials file: {:?}", self.path))?;
        if content.trim().is_empty() {
            return Ok(CredentialFile::default());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credentials file: {:?}", self.path))
    }

    fn save(&self, file: &CredentialFile) -> Result<()> {
        let dir = self
            .path
            .parent()
            .context("Credentials path has no parent directory")?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create credentials dir: {dir:?}"))?;

        let content = serde_json::to_string_pretty(file).context("Failed to serialize credentials")?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {dir:?}"))?;
        tmp.write_all(content.as_bytes())
            .context("Failed to write credentials")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush credentials")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace credentials file: {:?}", self.path))?;

        Ok(())
    }

    async fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut file = self.load()?;
        apply(&mut file.fields);
        file.updated_at = Some(Utc::now());
        self.save(&file)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>> {
        let file = self.load()?;
        Ok(file.fields.get(key).map(|v| SecretString::from(v.clone())))
    }

    async fn set(&self, key: &str, value: SecretString) -> Result<()> {
        let value = value.expose_secret().to_string();
        self.update(|fields| {
            fields.insert(key.to_string(), value);
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.update(|fields| {
            fields.remove(key);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_reads_as_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));

        assert!(store.get("email").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn set_is_visible_to_a_fresh_store() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::new(&path);
        store.set("otp_count", SecretString::from("4".to_string())).await?;
        store.set("email", SecretString::from("a@b.c".to_string())).await?;

        let reopened = FileCredentialStore::new(&path);
        let count = reopened.get("otp_count").await?.context("count missing")?;
        assert_eq!(count.expose_secret(), "4");

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("\"updated_at\""));
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_only_that_key() -> Result<()> {
        let dir = TempDir::new()?;
        let store = FileCredentialStore::new(dir.path().join("credentials.json"));
        store.set("a", SecretString::from("1".to_string())).await?;
        store.set("b", SecretString::from("2".to_string())).await?;

        store.delete("a").await?;
        store.delete("missing").await?;

        assert!(store.get("a").await?.is_none());
        assert!(store.get("b").await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json")?;

        let store = FileCredentialStore::new(&path);
        assert!(store.get("email").await.is_err());
        Ok(())
    }
}
