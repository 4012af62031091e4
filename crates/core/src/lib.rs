//! # Deskhive Core
//!
//! Domain types, traits, and error definitions for the deskhive assistant
//! runtime. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod client;
pub mod error;
pub mod estimate;
pub mod event;
pub mod layer;
pub mod message;
pub mod worker;

// Re-export key types at crate root for ergonomics
pub use client::{WorkerClient, WorkerClientFactory};
pub use error::{ClientError, ContextError, Error, Result, WorkerError};
pub use estimate::TokenEstimator;
pub use event::{DomainEvent, EventBus};
pub use layer::{ContextLayer, LayerId, LayerOrigin, LayerPatch, LayerTier};
pub use message::{ChatMessage, ChatRole, ConversationWindow};
pub use worker::{RoleProfile, WorkerRole, WorkerStatus};
