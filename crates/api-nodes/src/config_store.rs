//! JSON config file holding the API key
//!
//! The file is a flat JSON object; other keys written by related tools are
//! preserved when the key is updated. No locking is done. The key is read
//! synchronously when a node is built; saving happens on the async run path
//! and goes through `tokio::fs`.

use crate::error::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "Comflyapi.json";
pub const API_KEY_FIELD: &str = "api_key";

#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    path: PathBuf,
}

impl ApiKeyStore {
    /// Store at `{config_dir}/Comflyapi.json`
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(CONFIG_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current mapping; a missing or unreadable file reads as empty
    pub fn read(&self) -> Map<String, Value> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => self.parse(&content),
            Err(_) => Map::new(),
        }
    }

    async fn read_async(&self) -> Map<String, Value> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => self.parse(&content),
            Err(_) => Map::new(),
        }
    }

    fn parse(&self, content: &str) -> Map<String, Value> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "Ignoring malformed config file");
                Map::new()
            }
        }
    }

    /// Stored API key, if any
    pub fn api_key(&self) -> Option<String> {
        self.read()
            .get(API_KEY_FIELD)
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }

    /// Persist `api_key`, keeping the other entries
    pub async fn save_api_key(&self, api_key: &str) -> Result<()> {
        let mut config = self.read_async().await;
        config.insert(API_KEY_FIELD.to_string(), Value::String(api_key.to_string()));

        let mut bytes = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
        serde::Serialize::serialize(&config, &mut serializer)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        tracing::debug!(path = %self.path.display(), "Saved API key");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(dir.path());
        assert!(store.read().is_empty());
        assert_eq!(store.api_key(), None);
    }

    #[tokio::test]
    async fn test_round_trip_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(dir.path());
        std::fs::write(store.path(), r#"{"other": 1}"#).unwrap();

        store.save_api_key("sk-test").await.unwrap();
        assert_eq!(store.api_key().as_deref(), Some("sk-test"));
        assert_eq!(store.read().get("other"), Some(&Value::from(1)));

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\n    \"api_key\": \"sk-test\""));
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(dir.path());
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.read().is_empty());
        store.save_api_key("k").await.unwrap();
        assert_eq!(store.api_key().as_deref(), Some("k"));
    }

    #[tokio::test]
    async fn test_save_creates_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApiKeyStore::new(&dir.path().join("nested").join("config"));
        store.save_api_key("sk-new").await.unwrap();
        assert_eq!(store.api_key().as_deref(), Some("sk-new"));
    }
}
