//! Provider adapter layer for byok.
//!
//! Direct HTTP clients for each provider wire format, all behind one trait.
//!
//! # Architecture
//!
//! - [`traits::ProviderAdapter`]: trait every wire-format adapter implements
//! - [`openai_compat`]: chat-completions (OpenAI, DeepSeek, Mistral)
//! - [`anthropic`]: Anthropic Messages API
//! - [`google`]: Gemini `generateContent`
//! - [`custom`]: user endpoints, OpenAI-shaped or raw pass-through
//! - [`adapters::AdapterSet`]: wire format → adapter map for the dispatcher

pub mod adapters;
pub mod anthropic;
pub mod custom;
pub mod google;
pub mod http;
pub mod openai_compat;
pub mod traits;

// Re-export main types for convenience
pub use adapters::AdapterSet;
pub use anthropic::AnthropicAdapter;
pub use custom::CustomAdapter;
pub use google::GoogleAdapter;
pub use openai_compat::OpenAiCompatibleAdapter;
pub use traits::{Credentials, ProviderAdapter};
