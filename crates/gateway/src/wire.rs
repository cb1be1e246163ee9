//! Response shapes shared by every relay endpoint.
//!
//! Non-streaming replies are a single `{code, data, msg}` object. Streaming
//! replies are newline-delimited JSON, one [`StreamLine`] per relay event.

use mailmate_core::{ErrorKind, RelayError};
use mailmate_relay::RelayEvent;
use serde::{Deserialize, Serialize};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const SUCCESS: &str = "Success";

/// Body of a non-streaming reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// 200 on success, 400 on any failure
    pub code: u16,
    pub data: Option<String>,
    pub msg: String,
}

impl ApiResponse {
    pub fn success(text: String) -> Self {
        Self {
            code: 200,
            data: Some(text),
            msg: SUCCESS.into(),
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            code: 400,
            data: None,
            msg: msg.into(),
        }
    }
}

impl From<&RelayError> for ApiResponse {
    fn from(err: &RelayError) -> Self {
        Self::failure(err.public_message())
    }
}

/// One line of an NDJSON reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamLine {
    pub code: u16,
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
    pub msg: String,
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl StreamLine {
    /// Terminal failure line for an error raised before streaming began.
    pub fn rejected(err: &RelayError) -> Self {
        Self::from(RelayEvent::failure(err, false))
    }

    /// Serialized line including the trailing newline.
    pub fn to_ndjson(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

impl From<RelayEvent> for StreamLine {
    fn from(event: RelayEvent) -> Self {
        match event {
            RelayEvent::Fragment { text } => Self {
                code: 200,
                data: Some(text),
                full: None,
                msg: SUCCESS.into(),
                done: false,
                kind: None,
                partial: None,
            },
            RelayEvent::Done { full_text, .. } => Self {
                code: 200,
                data: Some(String::new()),
                full: Some(full_text),
                msg: SUCCESS.into(),
                done: true,
                kind: None,
                partial: None,
            },
            RelayEvent::Error {
                kind,
                message,
                partial,
            } => Self {
                code: 400,
                data: None,
                full: None,
                msg: message,
                done: true,
                kind: Some(kind),
                partial: Some(partial),
            },
        }
    }
}
