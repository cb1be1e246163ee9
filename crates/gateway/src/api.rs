//! Relay endpoints.
//!
//! - `POST /chat`, `POST /chat/stream`: generic relay
//! - `POST /{mode}`, `POST /{mode}/stream`: one per task mode
//!
//! Every endpoint answers `{code, data, msg}`, or NDJSON when streaming.

use std::collections::BTreeMap;

use axum::{
    Router,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{MethodRouter, post},
};
use mailmate_core::{HistoryEntry, RelayError, ValidationError};
use mailmate_relay::{RelayOutcome, RelayRequest, TaskMode, TaskParams};
use serde::Deserialize;
use serde_json::Value;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppState;
use crate::wire::{ApiResponse, NDJSON_CONTENT_TYPE, StreamLine};

// ── Request bodies ────────────────────────────────────────────────────────

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatBody {
    #[serde(default, alias = "action")]
    pub mode: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, alias = "parameters")]
    pub params: Option<TaskParams>,
}

/// Body of a per-mode endpoint. Everything besides `history` and `stream`
/// is a mode parameter, apart from the mode's input field.
#[derive(Debug, Deserialize)]
pub struct TaskBody {
    #[serde(default)]
    pub history: Option<Vec<HistoryEntry>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

/// The body field holding a mode's input, and whether it may be blank.
fn input_field(mode: TaskMode) -> (&'static str, bool) {
    match mode {
        TaskMode::Template => ("notes", true),
        TaskMode::FollowUp => ("previous_email", false),
        TaskMode::Chat => ("message", false),
        TaskMode::Analyze | TaskMode::Rewrite | TaskMode::Translate | TaskMode::Summarize => {
            ("email_content", false)
        }
    }
}

/// Remove the mode's input field from `params`. `None` when absent or null.
fn take_input(
    mode: TaskMode,
    params: &mut TaskParams,
) -> Result<Option<String>, ValidationError> {
    let (field, _) = input_field(mode);
    match params.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(ValidationError::InvalidParameter {
            field: field.into(),
            reason: "expected a string".into(),
        }),
    }
}

// ── Router ────────────────────────────────────────────────────────────────

pub fn relay_router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler));

    for mode in TaskMode::ALL {
        if mode == TaskMode::Chat {
            continue;
        }
        router = router
            .route(&format!("/{mode}"), task_route(mode, false))
            .route(&format!("/{mode}/stream"), task_route(mode, true));
    }
    router
}

fn task_route(mode: TaskMode, force_stream: bool) -> MethodRouter<AppState> {
    post(
        move |State(state): State<AppState>, body: Result<Json<TaskBody>, JsonRejection>| async move {
            task_handler(state, mode, body, force_stream).await
        },
    )
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    chat(state, body, false).await
}

async fn chat_stream_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Response {
    chat(state, body, true).await
}

async fn chat(
    state: AppState,
    body: Result<Json<ChatBody>, JsonRejection>,
    force_stream: bool,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection, force_stream),
    };
    let stream = force_stream || body.stream;

    let mode = match body.mode.as_deref() {
        None => TaskMode::Chat,
        Some(name) => match name.parse::<TaskMode>() {
            Ok(mode) => mode,
            Err(e) => return failure(&RelayError::from(e), stream),
        },
    };

    // A task sent through /chat carries its email in `params` under the
    // same field the mode's own endpoint reads; `message` is the fallback.
    let mut params = body.params.unwrap_or_default();
    let input = match mode {
        TaskMode::Chat => body.message,
        _ => match take_input(mode, &mut params) {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => body.message,
            Err(e) => return failure(&e.into(), stream),
        },
    };

    let request = RelayRequest::new(mode, input)
        .with_history(body.history.unwrap_or_default())
        .with_params(params)
        .streaming(stream);
    relay(state, request).await
}

async fn task_handler(
    state: AppState,
    mode: TaskMode,
    body: Result<Json<TaskBody>, JsonRejection>,
    force_stream: bool,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection, force_stream),
    };
    let stream = force_stream || body.stream;
    let TaskBody { history, fields, .. } = body;
    let mut params = TaskParams::from(fields);

    let (field, may_be_blank) = input_field(mode);
    let input = match take_input(mode, &mut params) {
        Ok(input) => input.unwrap_or_default(),
        Err(e) => return failure(&e.into(), stream),
    };
    if !may_be_blank && input.trim().is_empty() {
        let err = ValidationError::MissingParameter {
            mode: mode.as_str(),
            field,
        };
        return failure(&err.into(), stream);
    }

    let request = RelayRequest::new(mode, input)
        .with_history(history.unwrap_or_default())
        .with_params(params)
        .streaming(stream);
    relay(state, request).await
}

/// Run a request through the relay and shape the reply.
async fn relay(state: AppState, request: RelayRequest) -> Response {
    let stream = request.stream;
    info!(
        mode = %request.mode,
        stream,
        history = request.history.len(),
        "Relay request"
    );

    // A disconnecting client drops the response body, which drops the relay
    // stream and cancels the exchange.
    match state.controller.handle(request, CancellationToken::new()).await {
        Ok(RelayOutcome::Completed { text, .. }) => {
            (StatusCode::OK, Json(ApiResponse::success(text))).into_response()
        }
        Ok(RelayOutcome::Streaming(events)) => ndjson(StatusCode::OK, events.map(StreamLine::from)),
        Err(err) => failure(&err, stream),
    }
}

fn failure(err: &RelayError, stream: bool) -> Response {
    warn!(kind = %err.kind(), error = %err, "Relay request failed");
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    if stream {
        ndjson(status, tokio_stream::once(StreamLine::rejected(err)))
    } else {
        (status, Json(ApiResponse::from(err))).into_response()
    }
}

fn malformed(rejection: JsonRejection, stream: bool) -> Response {
    warn!(error = %rejection.body_text(), "Malformed request body");
    let msg = format!("invalid request body: {}", rejection.body_text());
    if stream {
        let line = StreamLine::from(mailmate_relay::RelayEvent::Error {
            kind: mailmate_core::ErrorKind::Validation,
            message: msg,
            partial: false,
        });
        ndjson(StatusCode::BAD_REQUEST, tokio_stream::once(line))
    } else {
        (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(msg))).into_response()
    }
}

fn ndjson<S>(status: StatusCode, lines: S) -> Response
where
    S: tokio_stream::Stream<Item = StreamLine> + Send + 'static,
{
    let body = Body::from_stream(
        lines.map(|line| Ok::<_, std::convert::Infallible>(line.to_ndjson())),
    );
    (
        status,
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}
