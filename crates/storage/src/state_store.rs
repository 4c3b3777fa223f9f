use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashwatch_core::{Error, ExtensionState, Paths, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::migrate::{UpcasterRegistry, CURRENT_STATE_VERSION};

/// Persistence port for the process-wide state.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<ExtensionState>>;
    async fn save(&self, state: &ExtensionState) -> Result<()>;
}

#[derive(Serialize)]
struct StateDocument<'a> {
    version: u32,
    #[serde(flatten)]
    state: &'a ExtensionState,
}

/// Versioned JSON document on disk.
pub struct JsonStateStore {
    path: PathBuf,
    upcasters: UpcasterRegistry,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            upcasters: UpcasterRegistry::default(),
        }
    }

    pub fn from_paths(paths: &Paths) -> Self {
        Self::new(paths.state_file())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode a raw document, migrating older versions.
    pub fn decode(&self, content: &str) -> Result<ExtensionState> {
        let raw: Value = serde_json::from_str(content)?;
        let doc = self.upcasters.upgrade(raw)?;
        Ok(serde_json::from_value(doc)?)
    }

    pub fn encode(state: &ExtensionState) -> Result<String> {
        let doc = StateDocument {
            version: CURRENT_STATE_VERSION,
            state,
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

#[async_trait]
impl StateStorage for JsonStateStore {
    async fn load(&self) -> Result<Option<ExtensionState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        let state = self.decode(&content).map_err(|e| {
            Error::Storage(format!("failed to load {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), tabs = state.tabs.len(), "Loaded state");
        Ok(Some(state))
    }

    async fn save(&self, state: &ExtensionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = Self::encode(state)?;
        // Write then rename so readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
