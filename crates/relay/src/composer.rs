//! Prompt composition.
//!
//! Turns a task mode, its parameters and a conversation window into the
//! role-tagged message list sent upstream:
//!
//! `[system prompt] + [prior turns, oldest first] + [user: rendered instruction]`
//!
//! Composition is pure. Identical inputs always yield an identical prompt.

use std::collections::BTreeMap;

use mailmate_core::{PromptMessage, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ConversationWindow;
use crate::mode::{ModeSpec, TaskMode};

/// Rendered for an empty `{input}` or an empty `fields` object.
const NONE_PROVIDED: &str = "(none provided)";

// ── Params ────────────────────────────────────────────────────────────────

/// Mode parameters as sent by the caller. Unrecognized keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskParams(BTreeMap<String, Value>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Look up `key`, falling back to any alias of it. Null counts as absent.
    fn lookup(&self, key: &str, spec: &ModeSpec) -> Option<(&str, &Value)> {
        let direct = self.0.get_key_value(key);
        let aliased = || {
            spec.aliases
                .iter()
                .filter(|(_, canonical)| *canonical == key)
                .find_map(|(alias, _)| self.0.get_key_value(*alias))
        };
        direct
            .filter(|(_, v)| !v.is_null())
            .or_else(|| aliased().filter(|(_, v)| !v.is_null()))
            .map(|(k, v)| (k.as_str(), v))
    }
}

impl From<BTreeMap<String, Value>> for TaskParams {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for TaskParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ── Prompt ────────────────────────────────────────────────────────────────

/// The exact message list sent to the model for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedPrompt {
    mode: TaskMode,
    messages: Vec<PromptMessage>,
}

impl ComposedPrompt {
    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    /// The rendered instruction (always the last message).
    pub fn instruction(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }

    pub fn into_messages(self) -> Vec<PromptMessage> {
        self.messages
    }
}

/// Compose the prompt for `mode` over `window`.
///
/// Fails if a required parameter is missing or blank, if a parameter has
/// the wrong JSON type, or if the input is blank outside template mode.
/// Never touches the network.
pub fn compose(
    mode: TaskMode,
    window: &ConversationWindow,
    params: &TaskParams,
    system_prompt: &str,
) -> Result<ComposedPrompt, ValidationError> {
    let values = resolve_params(mode, params)?;
    let input = window.input().text();
    let input = if !input.trim().is_empty() {
        input
    } else if mode == TaskMode::Template {
        NONE_PROVIDED
    } else {
        return Err(ValidationError::MissingParameter {
            mode: mode.as_str(),
            field: "message",
        });
    };

    let instruction = if mode == TaskMode::Chat {
        input.to_string()
    } else {
        render(mode.spec().template, |name| match name {
            "input" => Some(input),
            other => values.get(other).map(String::as_str),
        })
    };

    let mut messages = Vec::with_capacity(window.len() + 1);
    messages.push(PromptMessage::system(system_prompt));
    messages.extend(
        window
            .history()
            .iter()
            .map(|turn| PromptMessage::new(turn.role().into(), turn.text())),
    );
    messages.push(PromptMessage::user(instruction));

    Ok(ComposedPrompt { mode, messages })
}

/// Validate `params` against the mode and produce placeholder values.
fn resolve_params(
    mode: TaskMode,
    params: &TaskParams,
) -> Result<BTreeMap<&'static str, String>, ValidationError> {
    let spec = mode.spec();
    let mut values = BTreeMap::new();

    for &field in spec.required {
        let text = match params.lookup(field, spec) {
            Some((key, value)) => scalar(key, value)?,
            None => String::new(),
        };
        if text.trim().is_empty() {
            return Err(ValidationError::MissingParameter {
                mode: mode.as_str(),
                field,
            });
        }
        values.insert(field, text.trim().to_string());
    }

    for &(field, default) in spec.optional {
        let text = match params.lookup(field, spec) {
            Some((key, value)) => scalar(key, value)?,
            None => String::new(),
        };
        let text = if text.trim().is_empty() {
            default.to_string()
        } else {
            text.trim().to_string()
        };
        values.insert(field, text);
    }

    if mode == TaskMode::Template {
        values.insert("fields", render_fields(params.get("fields"))?);
    }

    Ok(values)
}

/// A parameter rendered as text. Strings and numbers only.
fn scalar(key: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(ValidationError::InvalidParameter {
            field: key.to_string(),
            reason: format!("expected a string, got {}", json_type(other)),
        }),
    }
}

/// Render the template `fields` object as `- key: value` lines, keys sorted.
fn render_fields(fields: Option<&Value>) -> Result<String, ValidationError> {
    let map = match fields {
        None | Some(Value::Null) => return Ok(NONE_PROVIDED.to_string()),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(ValidationError::InvalidParameter {
                field: "fields".into(),
                reason: format!("expected an object, got {}", json_type(other)),
            });
        }
    };

    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut lines = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            other => {
                return Err(ValidationError::InvalidParameter {
                    field: format!("fields.{key}"),
                    reason: format!("expected a scalar, got {}", json_type(other)),
                });
            }
        };
        lines.push(format!("- {key}: {text}"));
    }

    if lines.is_empty() {
        Ok(NONE_PROVIDED.to_string())
    } else {
        Ok(lines.join("\n"))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fill `{name}` placeholders in one pass over `template`.
///
/// Substituted values are never rescanned, so braces inside an email body
/// come through untouched. Unknown placeholders are left as written.
fn render<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len() + 256);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
