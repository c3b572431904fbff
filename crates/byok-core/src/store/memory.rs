//! In-memory preference store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{apply_usage, PreferenceStore};
use crate::types::{ConnectionStatus, ProviderPreference};

/// Preference rows held in a `RwLock<HashMap>` keyed by user id.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    rows: RwLock<HashMap<String, ProviderPreference>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<ProviderPreference>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, preference: ProviderPreference) -> anyhow::Result<()> {
        debug!(user_id = %preference.user_id, provider = %preference.provider, "upsert preference");
        self.rows
            .write()
            .await
            .insert(preference.user_id.clone(), preference);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.rows.write().await.remove(user_id).is_some())
    }

    async fn record_usage(&self, user_id: &str, tokens: u64) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(user_id) {
            Some(pref) => {
                apply_usage(pref, tokens);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> anyhow::Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(user_id) {
            Some(pref) => {
                pref.connection_status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{EncryptedBlob, ProviderSettings};
    use chrono::Utc;
    use std::sync::Arc;

    pub(crate) fn make_pref(user_id: &str, provider: &str) -> ProviderPreference {
        let now = Utc::now();
        ProviderPreference {
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            encrypted_api_key: EncryptedBlob::from_encoded("v1.opaque"),
            key_hint: Some("sk-...abcd".to_string()),
            model: None,
            custom_endpoint: None,
            temperature: 0.7,
            max_tokens: 1000,
            provider_settings: ProviderSettings::default(),
            is_active: true,
            request_count: 0,
            token_count: 0,
            connection_status: ConnectionStatus::Untested,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = MemoryPreferenceStore::new();
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let store = MemoryPreferenceStore::new();
        store.upsert(make_pref("u1", "openai")).await.unwrap();
        store.upsert(make_pref("u1", "google")).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load("u1").await.unwrap().unwrap().provider, "google");
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryPreferenceStore::new();
        store.upsert(make_pref("u1", "openai")).await.unwrap();
        assert!(store.delete("u1").await.unwrap());
        assert!(!store.delete("u1").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_record_usage_missing_row() {
        let store = MemoryPreferenceStore::new();
        assert!(!store.record_usage("ghost", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_usage_is_not_lost() {
        let store = Arc::new(MemoryPreferenceStore::new());
        store.upsert(make_pref("u1", "openai")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.record_usage("u1", 3).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let pref = store.load("u1").await.unwrap().unwrap();
        assert_eq!(pref.request_count, 50);
        assert_eq!(pref.token_count, 150);
    }

    #[tokio::test]
    async fn test_set_connection_status() {
        let store = MemoryPreferenceStore::new();
        store.upsert(make_pref("u1", "openai")).await.unwrap();
        assert!(store
            .set_connection_status("u1", ConnectionStatus::QuotaExceeded)
            .await
            .unwrap());
        assert_eq!(
            store.load("u1").await.unwrap().unwrap().connection_status,
            ConnectionStatus::QuotaExceeded
        );
    }
}
