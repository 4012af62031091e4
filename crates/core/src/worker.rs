//! Worker roles, statuses, and per-role configuration records.
//!
//! The assistant runs a fixed set of named workers. Roles are a closed
//! enumeration — unknown keys are rejected when parsed at the boundary, not
//! discovered missing deep inside the lifecycle machinery.

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// The closed set of worker roles the assistant multiplexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerRole {
    /// The primary conversational assistant
    Main,
    /// Curates and reorganizes workspace context
    ContextManager,
    /// Produces compact summaries of long content
    Summarizer,
    /// Breaks goals into ordered steps
    Planner,
}

impl WorkerRole {
    /// Every configured role, in display order.
    pub const fn all() -> [WorkerRole; 4] {
        [
            WorkerRole::Main,
            WorkerRole::ContextManager,
            WorkerRole::Summarizer,
            WorkerRole::Planner,
        ]
    }

    /// The stable string key for this role (config sections, event payloads).
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Main => "main",
            WorkerRole::ContextManager => "context-manager",
            WorkerRole::Summarizer => "summarizer",
            WorkerRole::Planner => "planner",
        }
    }

    /// Human-readable name for status displays.
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkerRole::Main => "Assistant",
            WorkerRole::ContextManager => "Context Manager",
            WorkerRole::Summarizer => "Summarizer",
            WorkerRole::Planner => "Planner",
        }
    }

    /// The built-in seed prompt for this role, used when configuration does
    /// not override it.
    pub fn default_seed_prompt(&self) -> &'static str {
        match self {
            WorkerRole::Main => {
                "You are the primary desktop assistant. Answer directly and \
                 concisely, using any workspace context provided in the \
                 conversation."
            }
            WorkerRole::ContextManager => {
                "You curate workspace context. Given fragments of notes, \
                 files and conversation, decide what is worth keeping, \
                 merge duplicates, and answer questions about what is known."
            }
            WorkerRole::Summarizer => {
                "You summarize. Reply with a faithful, compact summary of \
                 the provided content and nothing else."
            }
            WorkerRole::Planner => {
                "You plan. Break the user's goal into a short, ordered list \
                 of concrete steps with no filler."
            }
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WorkerRole {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(WorkerRole::Main),
            "context-manager" => Ok(WorkerRole::ContextManager),
            "summarizer" => Ok(WorkerRole::Summarizer),
            "planner" => Ok(WorkerRole::Planner),
            other => Err(WorkerError::UnknownRole(other.to_string())),
        }
    }
}

/// The resolved configuration record for one worker role.
///
/// Built by the configuration layer from built-in role defaults plus any
/// per-role overrides; immutable for the lifetime of the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleProfile {
    /// Human-readable name
    pub display_name: String,

    /// System prompt the conversation is seeded with on every (re)start
    pub seed_prompt: String,

    /// Model identifier sent to the remote API
    pub model_id: String,
}

/// Lifecycle state of a single worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Created but never started, or stopped by shutdown
    Idle,
    /// Live client handle, accepting sends
    Running,
    /// Remote failure observed, restart not yet scheduled
    Crashed,
    /// Restart scheduled, waiting for the backoff delay
    Restarting,
    /// Restart budget exhausted; only a manual start leaves this state
    Failed,
}

impl WorkerStatus {
    /// Whether the lifecycle machinery will act on this worker again
    /// without external intervention.
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Failed)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Running => "running",
            WorkerStatus::Crashed => "crashed",
            WorkerStatus::Restarting => "restarting",
            WorkerStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
