//! `mailmate ask`: Run one request through the relay from the terminal.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Args;
use mailmate_config::AppConfig;
use mailmate_core::HistoryEntry;
use mailmate_relay::{RelayController, RelayEvent, RelayOutcome, RelayRequest, TaskMode, TaskParams};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug)]
pub struct AskArgs {
    /// Task mode: chat, analyze, rewrite, translate, template, summarize, follow_up
    #[arg(short, long, default_value = "chat")]
    pub mode: String,

    /// Mode parameter as key=value (repeatable). JSON objects are accepted
    /// as values, e.g. fields={"recipient":"Dana"}
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// JSON file holding prior turns: [{"role": "user", "content": "..."}]
    #[arg(long, value_name = "FILE")]
    pub history: Option<PathBuf>,

    /// Print the reply as it is generated
    #[arg(short, long)]
    pub stream: bool,

    /// The message or email to work on
    pub message: String,
}

pub async fn run(args: AskArgs) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    // Reject bad input before touching the provider.
    let mode: TaskMode = args.mode.parse()?;
    let params = parse_params(&args.params)?;
    let history = match &args.history {
        Some(path) => load_history(path)?,
        None => Vec::new(),
    };

    if !config.has_api_key() {
        super::print_missing_key_help();
        bail!("No API key found. See above for setup instructions.");
    }

    let provider = mailmate_providers::build_from_config(&config)?;
    let controller = RelayController::from_config(provider, &config);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let request = RelayRequest::new(mode, args.message)
        .with_history(history)
        .with_params(params)
        .streaming(args.stream);

    match controller.handle(request, cancel).await? {
        RelayOutcome::Completed { text, .. } => println!("{text}"),
        RelayOutcome::Streaming(mut events) => {
            let mut stdout = std::io::stdout();
            while let Some(event) = events.recv().await {
                match event {
                    RelayEvent::Fragment { text } => {
                        write!(stdout, "{text}")?;
                        stdout.flush()?;
                    }
                    RelayEvent::Done { .. } => writeln!(stdout)?,
                    RelayEvent::Error {
                        kind,
                        message,
                        partial,
                    } => {
                        if partial {
                            writeln!(stdout)?;
                        }
                        bail!("{message} ({kind})");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Parse `key=value` pairs. Values that are JSON objects stay objects,
/// everything else is a string.
fn parse_params(raw: &[String]) -> anyhow::Result<TaskParams> {
    let mut params = TaskParams::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid --param '{pair}': expected KEY=VALUE");
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid --param '{pair}': empty key");
        }
        let value = match serde_json::from_str::<Value>(value) {
            Ok(object @ Value::Object(_)) => object,
            _ => Value::String(value.to_string()),
        };
        params.insert(key, value);
    }
    Ok(params)
}

fn load_history(path: &Path) -> anyhow::Result<Vec<HistoryEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("History file {} is not a JSON array of turns", path.display()))
}
