//! Preference persistence contract and the two bundled stores.
//!
//! The host application normally backs this with its relational database;
//! `MemoryPreferenceStore` serves tests and single-process deployments, and
//! `JsonFilePreferenceStore` persists rows to a single JSON file.
//!
//! Stores hold exactly one row per user id. `upsert` is last-write-wins:
//! there is no version column, so concurrent saves for the same user race.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use crate::types::{ConnectionStatus, ProviderPreference};

pub use file::JsonFilePreferenceStore;
pub use memory::MemoryPreferenceStore;

/// Storage backend for per-user provider preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Load the user's active preference, if any.
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<ProviderPreference>>;

    /// Insert or replace the user's preference (keyed by `preference.user_id`).
    async fn upsert(&self, preference: ProviderPreference) -> anyhow::Result<()>;

    /// Remove the user's preference. Returns `true` if a row existed.
    async fn delete(&self, user_id: &str) -> anyhow::Result<bool>;

    /// Add one request and `tokens` tokens to the user's counters.
    ///
    /// Must be atomic with respect to concurrent calls for the same user.
    /// Returns `false` if the user has no row.
    async fn record_usage(&self, user_id: &str, tokens: u64) -> anyhow::Result<bool>;

    /// Update the connection status column. Returns `false` if the user has no row.
    async fn set_connection_status(
        &self,
        user_id: &str,
        status: ConnectionStatus,
    ) -> anyhow::Result<bool>;
}

/// Apply a usage increment to a row in place.
pub(crate) fn apply_usage(pref: &mut ProviderPreference, tokens: u64) {
    pref.request_count = pref.request_count.saturating_add(1);
    pref.token_count = pref.token_count.saturating_add(tokens);
}
