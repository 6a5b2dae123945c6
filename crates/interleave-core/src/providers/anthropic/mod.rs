//! Anthropic Messages API provider.
//!
//! The system prompt block carries an ephemeral cache breakpoint so repeated
//! continuation rounds within a turn reuse the cached prefix.

pub mod api;
mod shared;
pub mod sse;
pub(crate) mod types;

pub use api::{AnthropicClient, AnthropicConfig, DEFAULT_BASE_URL};
