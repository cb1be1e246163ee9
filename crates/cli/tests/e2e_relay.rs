//! End-to-end tests for the MailMate relay.
//!
//! These tests drive the full pipeline from an HTTP request through the
//! context window, prompt composition, retry policy and NDJSON streaming,
//! with a scripted provider standing in for the model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mailmate_config::AppConfig;
use mailmate_core::{
    ChunkReceiver, PromptRole, Provider, ProviderError, ProviderRequest, ProviderResponse,
    StreamChunk,
};
use mailmate_gateway::{AppState, build_router};
use mailmate_relay::{
    ContextBudget, ModelGateway, RelayController, RelayEvent, RelayOutcome, RelayRequest,
    RetryPolicy, TaskMode, TaskParams,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

enum Reply {
    Text(Vec<&'static str>),
    Fail(ProviderError),
}

/// A mock provider that plays scripted replies in sequence.
struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn text(parts: Vec<&'static str>) -> Arc<Self> {
        Self::new(vec![Reply::Text(parts)])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }

    fn next(&self, request: ProviderRequest) -> Result<Vec<&'static str>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        match self.replies.lock().unwrap().pop_front() {
            Some(Reply::Text(parts)) => Ok(parts),
            Some(Reply::Fail(err)) => Err(err),
            None => Err(ProviderError::NotConfigured("no scripted reply left".into())),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let parts = self.next(request)?;
        Ok(ProviderResponse {
            text: parts.concat(),
            usage: None,
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let parts = self.next(request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(parts.len() + 1);
        for part in parts {
            let _ = tx.send(Ok(StreamChunk::text(part))).await;
        }
        let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        Ok(rx)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn controller(provider: Arc<ScriptedProvider>) -> RelayController {
    let gateway = ModelGateway::new(provider, "e2e-model");
    RelayController::new(gateway).with_retry(RetryPolicy::new(
        3,
        Duration::from_millis(1),
        Duration::from_millis(5),
    ))
}

fn app(controller: RelayController) -> axum::Router {
    build_router(
        AppState::new(Arc::new(controller)),
        &AppConfig::default().gateway,
    )
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn translate_over_http() {
    let provider = ScriptedProvider::text(vec!["Bonjour l'équipe"]);
    let app = app(controller(provider.clone()));

    let response = app
        .oneshot(post(
            "/translate",
            json!({"email_content": "Hello team", "target_language": "French"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["code"], 200);
    assert_eq!(json["data"], "Bonjour l'équipe");

    let request = provider.request(0);
    assert_eq!(request.model, "e2e-model");
    assert_eq!(request.messages[0].role, PromptRole::System);
    assert!(request.messages[1].content.contains("into French"));
}

#[tokio::test]
async fn stream_over_http_retries_before_first_fragment() {
    let provider = ScriptedProvider::new(vec![
        Reply::Fail(ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        }),
        Reply::Text(vec!["Hi ", "Dana,", " thanks!"]),
    ]);
    let app = app(controller(provider.clone()));

    let response = app
        .oneshot(post("/chat/stream", json!({"message": "Reply to Dana"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let fragments: Vec<&str> = lines
        .iter()
        .filter(|l| l["done"] == false)
        .map(|l| l["data"].as_str().unwrap())
        .collect();
    assert_eq!(fragments, vec!["Hi ", "Dana,", " thanks!"]);

    let last = lines.last().unwrap();
    assert_eq!(last["done"], true);
    assert_eq!(last["full"], "Hi Dana, thanks!");
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn history_is_trimmed_to_budget_before_sending() {
    let provider = ScriptedProvider::text(vec!["Sure."]);
    let relay = controller(provider.clone()).with_budget(ContextBudget::turns(3));

    let history: Vec<Value> = (0..5)
        .map(|i| {
            let role = if i % 2 == 0 { "user" } else { "assistant" };
            json!({"role": role, "content": format!("turn {i}")})
        })
        .collect();

    let response = app(relay)
        .oneshot(post("/chat", json!({"message": "latest", "history": history})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let sent: Vec<String> = provider
        .request(0)
        .messages
        .iter()
        .skip(1)
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(sent, vec!["turn 3", "turn 4", "latest"]);
}

#[tokio::test]
async fn config_file_drives_the_controller() {
    let config: AppConfig = toml::from_str(
        r#"
        system_prompt = "You only write haiku emails."

        [provider]
        model = "haiku-1"
        temperature = 0.1

        [retry]
        max_attempts = 1
        "#,
    )
    .unwrap();
    config.validate().unwrap();

    let provider = ScriptedProvider::new(vec![Reply::Fail(ProviderError::Timeout(
        "slow".into(),
    ))]);
    let relay = RelayController::from_config(provider.clone(), &config);

    let err = relay
        .handle(
            RelayRequest::new(TaskMode::Chat, "hi"),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 503);
    assert_eq!(provider.calls(), 1);

    let request = provider.request(0);
    assert_eq!(request.model, "haiku-1");
    assert_eq!(request.messages[0].content, "You only write haiku emails.");
}

#[tokio::test]
async fn streamed_and_completed_replies_agree() {
    let parts = vec!["Subject: Update\n\n", "Hi all,", " the release is on track."];
    let provider = ScriptedProvider::new(vec![Reply::Text(parts.clone()), Reply::Text(parts)]);
    let relay = controller(provider.clone());

    let params = TaskParams::new().with("template_kind", "status update");
    let request = RelayRequest::new(TaskMode::Template, "").with_params(params);

    let streamed = match relay
        .handle(request.clone().streaming(true), CancellationToken::new())
        .await
        .unwrap()
    {
        RelayOutcome::Streaming(mut events) => {
            let mut text = String::new();
            while let Some(event) = events.recv().await {
                match event {
                    RelayEvent::Fragment { text: part } => text.push_str(&part),
                    RelayEvent::Done { full_text, .. } => assert_eq!(full_text, text),
                    RelayEvent::Error { message, .. } => panic!("stream failed: {message}"),
                }
            }
            text
        }
        RelayOutcome::Completed { .. } => panic!("expected a stream"),
    };

    let completed = match relay
        .handle(request, CancellationToken::new())
        .await
        .unwrap()
    {
        RelayOutcome::Completed { text, .. } => text,
        RelayOutcome::Streaming(_) => panic!("expected a completed reply"),
    };

    assert_eq!(streamed, completed);
    assert_eq!(provider.request(0).messages, provider.request(1).messages);
}
