//! Context management: turn validation, size estimation and the
//! budget-bounded conversation window sent upstream.

pub mod token;
pub mod window;

pub use token::{estimate_tokens, estimate_turn_tokens, estimate_turns_tokens};
pub use window::{ContextBudget, ConversationWindow, build_window};
