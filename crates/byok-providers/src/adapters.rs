//! Wire format → adapter map handed to the dispatcher at construction.
//!
//! The set is the only place that knows which adapter speaks which wire
//! format; the dispatcher looks up `capability.wire_format` here and never
//! branches on provider ids. Tests substitute adapters with [`AdapterSet::with`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use byok_core::registry::WireFormat;

use crate::anthropic::AnthropicAdapter;
use crate::custom::CustomAdapter;
use crate::google::GoogleAdapter;
use crate::http::build_client;
use crate::openai_compat::OpenAiCompatibleAdapter;
use crate::traits::ProviderAdapter;

#[derive(Clone, Default)]
pub struct AdapterSet {
    adapters: HashMap<WireFormat, Arc<dyn ProviderAdapter>>,
}

impl AdapterSet {
    /// Empty set; add adapters with [`AdapterSet::with`].
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per built-in wire format, sharing a single HTTP client.
    pub fn default_set(timeout: Duration) -> Self {
        let client = build_client(timeout);
        Self::new()
            .with(Arc::new(OpenAiCompatibleAdapter::new(client.clone())))
            .with(Arc::new(AnthropicAdapter::new(client.clone())))
            .with(Arc::new(GoogleAdapter::new(client.clone())))
            .with(Arc::new(CustomAdapter::new(client)))
    }

    /// Register `adapter` under its own wire format, replacing any previous one.
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.insert(adapter.wire_format(), adapter);
        self
    }

    pub fn get(&self, format: WireFormat) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&format).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<&str> = self.adapters.keys().map(|w| w.as_str()).collect();
        formats.sort_unstable();
        f.debug_struct("AdapterSet").field("formats", &formats).finish()
    }
}
