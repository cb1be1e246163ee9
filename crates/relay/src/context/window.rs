//! Conversation window construction.
//!
//! Validates caller-supplied history and trims it to a [`ContextBudget`].
//! The new input always survives trimming; history is dropped oldest first.
//!
//! # Determinism
//!
//! `build_window` is pure apart from stamping turns that arrive without a
//! timestamp. Identical history, input and budget always keep the same turns.

use chrono::Utc;
use mailmate_config::ContextConfig;
use mailmate_core::{HistoryEntry, Role, Turn, ValidationError};
use serde::Serialize;

use crate::context::token;

// ── Budget ────────────────────────────────────────────────────────────────

/// Limits applied to the history sent upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Maximum turns in the window, the new input included.
    pub max_turns: usize,
    /// Maximum estimated tokens across the window, the new input included.
    pub max_tokens: usize,
    /// Histories longer than this are rejected outright.
    pub max_history_entries: usize,
}

impl ContextBudget {
    /// A budget that only limits the number of turns.
    pub fn turns(max_turns: usize) -> Self {
        Self {
            max_turns,
            max_tokens: usize::MAX,
            max_history_entries: usize::MAX,
        }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextBudget {
    fn from(config: &ContextConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            max_tokens: config.max_tokens,
            max_history_entries: config.max_history_entries,
        }
    }
}

// ── Window ────────────────────────────────────────────────────────────────

/// The retained history plus the new input, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationWindow {
    history: Vec<Turn>,
    input: Turn,
    dropped: usize,
    estimated_tokens: usize,
}

impl ConversationWindow {
    /// Retained prior turns, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// The new user input. Never trimmed.
    pub fn input(&self) -> &Turn {
        &self.input
    }

    /// All turns in order, ending with the input.
    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter().chain(std::iter::once(&self.input))
    }

    pub fn len(&self) -> usize {
        self.history.len() + 1
    }

    /// A window always holds at least the input.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// How many history turns were trimmed to fit the budget.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn estimated_tokens(&self) -> usize {
        self.estimated_tokens
    }
}

/// Validate `history`, append `new_input` and trim to `budget`.
///
/// Fails if any entry has an unrecognized role or no content, or if the
/// history has more entries than `budget.max_history_entries`. When the
/// input alone exceeds the budget the window holds just the input.
pub fn build_window(
    history: &[HistoryEntry],
    new_input: &str,
    budget: &ContextBudget,
) -> Result<ConversationWindow, ValidationError> {
    if history.len() > budget.max_history_entries {
        return Err(ValidationError::HistoryTooLong {
            len: history.len(),
            max: budget.max_history_entries,
        });
    }

    let now = Utc::now();
    let mut turns = history
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let role = entry
                .role
                .parse::<Role>()
                .map_err(|role| ValidationError::UnknownRole { index, role })?;
            let text = entry
                .content
                .as_deref()
                .ok_or(ValidationError::MissingContent { index })?;
            Ok(Turn::new(role, text, entry.timestamp.unwrap_or(now)))
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;

    let input = Turn::new(Role::User, new_input, now);
    let history_slots = budget.max_turns.saturating_sub(1);

    // Walk newest to oldest and keep the longest suffix that fits.
    let mut estimated_tokens = token::estimate_turn_tokens(&input);
    let mut keep_from = turns.len();
    for (index, turn) in turns.iter().enumerate().rev() {
        if turns.len() - index > history_slots {
            break;
        }
        let cost = token::estimate_turn_tokens(turn);
        if estimated_tokens.saturating_add(cost) > budget.max_tokens {
            break;
        }
        estimated_tokens += cost;
        keep_from = index;
    }

    let kept = turns.split_off(keep_from);

    Ok(ConversationWindow {
        history: kept,
        input,
        dropped: keep_from,
        estimated_tokens,
    })
}
