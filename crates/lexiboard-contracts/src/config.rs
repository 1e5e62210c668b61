use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Which image-generation strategy the controller should dispatch to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSelection {
    /// Async create-task / poll-until-done protocol.
    #[default]
    Kie,
    /// Synchronous single-call protocol.
    Yunwu,
}

impl ProviderSelection {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderSelection::Kie => "kie",
            ProviderSelection::Yunwu => "yunwu",
        }
    }

    pub fn parse(raw: &str) -> Option<ProviderSelection> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kie" => Some(ProviderSelection::Kie),
            "yunwu" => Some(ProviderSelection::Yunwu),
            _ => None,
        }
    }
}

/// Credentials and endpoints the controller needs per session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterConfig {
    #[serde(default)]
    pub image_api_key: String,
    #[serde(default)]
    pub text_api_url: String,
    #[serde(default)]
    pub text_api_key: String,
    #[serde(default)]
    pub text_api_model: String,
    #[serde(default)]
    pub image_provider: ProviderSelection,
}

impl PosterConfig {
    /// Complete when every credential field is filled in.
    pub fn is_valid(&self) -> bool {
        !self.image_api_key.trim().is_empty()
            && !self.text_api_url.trim().is_empty()
            && !self.text_api_key.trim().is_empty()
            && !self.text_api_model.trim().is_empty()
    }
}

/// JSON-file-backed configuration store.
///
/// The store is handed to callers explicitly; nothing reads it ambiently.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `None` when no configuration has been saved yet, or when the
    /// file on disk is unreadable or corrupt.
    pub fn load(&self) -> Option<PosterConfig> {
        let raw = fs::read_to_string(&self.path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn save(&self, config: &PosterConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove {}", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> PosterConfig {
        PosterConfig {
            image_api_key: "img-key".to_string(),
            text_api_url: "https://api.example.com/v1/chat/completions".to_string(),
            text_api_key: "txt-key".to_string(),
            text_api_model: "gpt-4o-mini".to_string(),
            image_provider: ProviderSelection::Yunwu,
        }
    }

    #[test]
    fn save_then_load_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ConfigStore::new(temp.path().join("config.json"));
        assert!(store.load().is_none());

        store.save(&sample_config())?;
        assert_eq!(store.load(), Some(sample_config()));
        Ok(())
    }

    #[test]
    fn clear_removes_saved_config() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ConfigStore::new(temp.path().join("config.json"));
        store.save(&sample_config())?;
        store.clear()?;
        assert!(store.load().is_none());
        store.clear()?;
        Ok(())
    }

    #[test]
    fn corrupt_file_reads_as_absent() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        fs::write(&path, "not json")?;
        let store = ConfigStore::new(path);
        assert!(store.load().is_none());
        Ok(())
    }

    #[test]
    fn validity_requires_every_credential() {
        let mut config = sample_config();
        assert!(config.is_valid());
        config.text_api_model.clear();
        assert!(!config.is_valid());
    }

    #[test]
    fn provider_selection_parses_known_names() {
        assert_eq!(ProviderSelection::parse(" KIE "), Some(ProviderSelection::Kie));
        assert_eq!(ProviderSelection::parse("yunwu"), Some(ProviderSelection::Yunwu));
        assert_eq!(ProviderSelection::parse("dall-e"), None);
        assert_eq!(ProviderSelection::default().as_str(), "kie");
    }
}
