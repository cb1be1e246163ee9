//! # MailMate Core
//!
//! Domain types, traits, and error definitions for the MailMate email
//! assistant relay. This crate has **no framework dependencies**: it defines
//! the vocabulary (turns, prompts, provider exchanges, error taxonomy) that
//! the relay, provider and gateway crates implement against.

pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{ErrorKind, ProviderError, RelayError, ValidationError};
pub use message::{HistoryEntry, Role, Turn};
pub use provider::{
    ChunkReceiver, PromptMessage, PromptRole, Provider, ProviderRequest, ProviderResponse,
    StreamChunk, Usage,
};
