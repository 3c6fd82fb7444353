
use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

pub const DEFAULT_MAX_MESSAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("User"),
            Self::Assistant => f.write_str("Assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    #[inline]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[inline]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Sliding window over the most recent turns of one conversation.
/// Appending past capacity evicts the oldest turn.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    turns: VecDeque<ConversationTurn>,
    max_messages: usize,
}

impl Default for ConversationMemory {
    #[inline]
    fn default() -> Self {
        Self {
            turns: VecDeque::with_capacity(DEFAULT_MAX_MESSAGES),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

impl ConversationMemory {
    #[inline]
    pub fn new(max_messages: usize) -> Result<Self> {
        if max_messages == 0 {
            return Err(RagError::InvalidParameter(
                "memory must hold at least one message".to_string(),
            ));
        }
        Ok(Self {
            turns: VecDeque::with_capacity(max_messages),
            max_messages,
        })
    }

    #[inline]
    pub fn append(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.max_messages {
            if let Some(evicted) = self.turns.pop_front() {
                debug!("Evicting {} turn from memory", evicted.role);
            }
        }
        self.turns.push_back(turn);
    }

    /// Oldest first
    #[inline]
    pub fn as_ordered_turns(&self) -> Vec<&ConversationTurn> {
        self.turns.iter().collect()
    }

    /// The last `count` turns, oldest first
    #[inline]
    pub fn recent(&self, count: usize) -> Vec<&ConversationTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[inline]
    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    #[inline]
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
