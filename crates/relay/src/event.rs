//! Relay-level streaming events.
//!
//! `RelayEvent` is what a streaming caller observes: zero or more fragments
//! followed by exactly one terminal event (`done` or `error`).

use mailmate_core::{ErrorKind, RelayError, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A piece of model output, in provider order.
    Fragment { text: String },

    /// The stream completed; `full_text` is every fragment concatenated.
    Done {
        full_text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// The stream failed. `partial` is true when fragments were already sent.
    Error {
        kind: ErrorKind,
        message: String,
        partial: bool,
    },
}

impl RelayEvent {
    pub fn fragment(text: impl Into<String>) -> Self {
        Self::Fragment { text: text.into() }
    }

    /// Terminal error event carrying only the caller-safe message.
    pub fn failure(err: &RelayError, partial: bool) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.public_message(),
            partial,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "fragment",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fragment { .. })
    }
}
