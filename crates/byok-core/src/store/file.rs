//! JSON file preference store.
//!
//! File format: `~/.byok/preferences.json`
//! ```json
//! { "version": 1, "preferences": [ { "userId": "...", "provider": "openai", ... } ] }
//! ```
//!
//! Rows are cached in memory; every mutation rewrites the file through a
//! temp file + rename so a crash never leaves a half-written store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{apply_usage, PreferenceStore};
use crate::types::{ConnectionStatus, ProviderPreference};

const FILE_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    version: u32,
    #[serde(default)]
    preferences: Vec<ProviderPreference>,
}

/// File-backed preference store.
///
/// A single `Mutex` serializes mutations, so each read-modify-write of a row
/// (usage counters, status) is atomic within this process.
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    rows: Mutex<HashMap<String, ProviderPreference>>,
}

impl JsonFilePreferenceStore {
    /// Open the store at `path`, loading existing rows if the file exists.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            let data = tokio::fs::read_to_string(&path).await?;
            let file: PreferenceFile = serde_json::from_str(&data)
                .map_err(|e| anyhow::anyhow!("failed to parse preference store: {}", e))?;
            if file.version != FILE_VERSION {
                anyhow::bail!("unsupported preference store version {}", file.version);
            }
            file.preferences
                .into_iter()
                .map(|p| (p.user_id.clone(), p))
                .collect()
        } else {
            debug!(path = %path.display(), "no preference store file, starting empty");
            HashMap::new()
        };

        info!(path = %path.display(), rows = rows.len(), "opened preference store");
        Ok(Self {
            path,
            rows: Mutex::new(rows),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write all rows to disk. Caller holds the lock.
    async fn persist(&self, rows: &HashMap<String, ProviderPreference>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut preferences: Vec<ProviderPreference> = rows.values().cloned().collect();
        preferences.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let file = PreferenceFile {
            version: FILE_VERSION,
            preferences,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), rows = rows.len(), "saved preference store");
        Ok(())
    }
}

/// Owner-only read/write; the file holds encrypted keys.
#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}

#[async_trait]
impl PreferenceStore for JsonFilePreferenceStore {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<ProviderPreference>> {
        Ok(self.rows.lock().await.get(user_id).cloned())
    }

    async fn upsert(&self, preference: ProviderPreference) -> anyhow::Result<()> {
        let mut rows = self.rows.lock().await;
        rows.insert(preference.user_id.clone(), preference);
        self.persist(&rows).await
    }

    async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        if rows.remove(user_id).is_none() {
            return Ok(false);
        }
        self.persist(&rows).await?;
        Ok(true)
    }

    async fn record_usage(&self, user_id: &str, tokens: u64) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(pref) = rows.get_mut(user_id) else {
            return Ok(false);
        };
        apply_usage(pref, tokens);
        self.persist(&rows).await?;
        Ok(true)
    }

    async fn set_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> anyhow::Result<bool> {
        let mut rows = self.rows.lock().await;
        let Some(pref) = rows.get_mut(user_id) else {
            return Ok(false);
        };
        pref.connection_status = status;
        self.persist(&rows).await?;
        Ok(true)
    }
}
