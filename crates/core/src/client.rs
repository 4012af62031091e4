//! Remote worker client traits — the abstraction over the network-bound
//! language-model API.
//!
//! A `WorkerClient` sends one trimmed conversation window and returns the
//! reply text. The lifecycle manager never sees the wire format; it only
//! sees this contract. A `WorkerClientFactory` mints one client per started
//! worker, so every worker exclusively owns its handle.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ClientError;
use crate::message::ChatMessage;
use crate::worker::WorkerRole;

/// The remote worker client contract.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// A human-readable name for this client (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send the trimmed conversation window to `model` and return the reply.
    async fn send_conversation(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> std::result::Result<String, ClientError>;
}

/// Builds one exclusive client handle per worker start.
pub trait WorkerClientFactory: Send + Sync {
    /// Construct a fresh client for `role`. Called under the role's spawn
    /// lock; a failure here is routed to the crash handler by the caller.
    fn create(&self, role: WorkerRole) -> std::result::Result<Arc<dyn WorkerClient>, ClientError>;
}
