//! # mailmate-relay
//!
//! The conversation relay behind MailMate.
//!
//! A request flows through three stages:
//!
//! 1. **Context** ([`context`]) validates history and trims it to budget
//! 2. **Composition** ([`composer`]) renders the task-mode instruction
//! 3. **Invocation** ([`model_gateway`]) runs a bounded, cancellable exchange
//!
//! [`RelayController`] drives the stages, retries transient failures and
//! produces either a completed reply or an ordered [`RelayEvent`] stream.

pub mod composer;
pub mod context;
pub mod controller;
pub mod event;
pub mod mode;
pub mod model_gateway;
pub mod retry;

#[cfg(test)]
mod test_helpers;

pub use composer::{ComposedPrompt, TaskParams, compose};
pub use context::{ContextBudget, ConversationWindow, build_window};
pub use controller::{RelayController, RelayOutcome, RelayRequest, RelayState, RelayStream};
pub use event::RelayEvent;
pub use mode::{DEFAULT_SYSTEM_PROMPT, ModeSpec, TaskMode};
pub use model_gateway::{FragmentStream, Invocation, ModelGateway};
pub use retry::RetryPolicy;
