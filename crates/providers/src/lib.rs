//! Remote worker client implementations for deskhive.
//!
//! All clients implement the `deskhive_core::WorkerClient` trait. The
//! factory mints one exclusive client per started worker.

pub mod anthropic;
pub mod factory;

pub use anthropic::AnthropicClient;
pub use factory::AnthropicFactory;
