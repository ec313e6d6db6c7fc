//! LLM assistant over the capture history.
//!
//! [`AnthropicClient`] talks to the Messages API, [`context`] decides which
//! captures to show the model, and [`relay`] streams replies back to HTTP
//! clients while persisting them.

pub mod client;
pub mod context;
pub mod relay;
pub mod sse;

pub use client::{build_messages, AnthropicClient, ApiMessage};
pub use context::{build_context_prompt, extract_search_terms, parse_time_range, TimeRange};
pub use relay::spawn_relay;
pub use sse::{delta_text, SseDecoder};
