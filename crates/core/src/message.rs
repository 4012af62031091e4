//! Chat message and conversation-window domain types.
//!
//! These are the value objects that flow between the worker lifecycle manager
//! and the remote worker client: the shell sends a message → the worker's
//! window is trimmed → the remote API answers → the reply joins the window.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions (the worker's seed prompt)
    System,
    /// The end user
    User,
    /// The AI worker
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who sent this message
    pub role: ChatRole,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A bounded sliding window over a conversation.
///
/// Keeps the most recent `capacity` messages; pushing beyond the bound drops
/// the oldest entries. Dropped messages are gone from the window's point of
/// view — archival is someone else's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationWindow {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl ConversationWindow {
    /// Create an empty window holding at most `capacity` messages.
    /// A zero capacity is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a message, dropping the oldest entries beyond the bound.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// The current window contents, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all messages, keeping the capacity.
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
