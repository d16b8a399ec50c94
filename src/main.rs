//! caeli-stream CLI binary entry point.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use caeli_stream::chat::StreamingChat;
use caeli_stream::cli::{AuthCommands, ChatArgs, Cli, Commands};
use caeli_stream::config::{get_streaming_config, ClientConfig, EndpointMode, StreamingMode};
use caeli_stream::error::StreamError;
use caeli_stream::sse::{EventKind, SseEvent, SseStreamDriver, StreamHandler, StreamRequestConfig};
use caeli_stream::storage::{KeyValueStore, MemoryStore, AUTH_TOKEN_KEY};
use strum::IntoEnumIterator;

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse_args();

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Auth(auth_args) => match auth_args.command {
                AuthCommands::Set(args) => caeli_stream::cli::auth::handle_set(&config, &args.token),
                AuthCommands::Status => caeli_stream::cli::auth::handle_status(&config),
                AuthCommands::Clear => caeli_stream::cli::auth::handle_clear(&config),
            },
            Commands::Chat(chat_args) => handle_chat(&config, chat_args).await,
            Commands::Profiles => {
                print_profiles();
                Ok(())
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("caeli_stream=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

fn load_config(cli: &Cli) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    Ok(match &cli.config {
        Some(path) => ClientConfig::from_toml_file(path)?,
        None => ClientConfig::from_env(),
    })
}

fn print_profiles() {
    println!(
        "{:<12} {:>10} {:>8} {:>6} {:>9} {:>9}",
        "mode", "timeout_ms", "max_msgs", "retry", "attempts", "delay_ms"
    );
    for mode in StreamingMode::iter() {
        let config = get_streaming_config(mode);
        println!(
            "{:<12} {:>10} {:>8} {:>6} {:>9} {:>9}",
            mode.as_ref(),
            config.timeout_ms,
            config.max_messages,
            config.retry.enabled,
            config.retry.max_attempts,
            config.retry.base_delay_ms
        );
    }
}

/// Writes streamed text (or raw JSON events) to stdout, status to stderr.
struct TerminalHandler {
    json: bool,
}

#[async_trait]
impl StreamHandler for TerminalHandler {
    async fn on_event(&mut self, event: SseEvent) {
        if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("unprintable event: {e}"),
            }
            return;
        }
        match event.kind {
            EventKind::Chunk | EventKind::Token => {
                if let Some(text) = event.text() {
                    print!("{text}");
                    let _ = std::io::stdout().flush();
                }
            }
            EventKind::Status | EventKind::Intent => {
                if let Some(message) = event.message.as_deref().or(event.text()) {
                    eprintln!("… {message}");
                }
            }
            EventKind::Error => {
                eprintln!("\n❌ {}", event.message.as_deref().unwrap_or("stream error"));
            }
            _ => {}
        }
    }

    async fn on_error(&mut self, error: &StreamError) {
        eprintln!("\n❌ {error}");
    }
}

async fn handle_chat(config: &ClientConfig, args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = match args.prompt {
        Some(p) => p,
        None => {
            eprintln!("Usage: caeli-stream chat \"your prompt here\"");
            std::process::exit(1);
        }
    };

    let mode = StreamingMode::from_str(&args.mode)
        .map_err(|_| format!("Unknown mode '{}'. Use assistant, plan_mode or smart_query", args.mode))?;
    let endpoint = EndpointMode::try_from(mode)?;

    if let Some(url) = args.base_url {
        config.set_base_url(url);
    }

    let storage: Arc<dyn KeyValueStore> = match config.auth_token() {
        Some(token) => Arc::new(MemoryStore::with_entries([(AUTH_TOKEN_KEY, token)])),
        None => Arc::new(caeli_stream::cli::auth::token_store(config)),
    };
    let driver = SseStreamDriver::with_storage(storage);

    let mut request_config = StreamRequestConfig::for_mode(mode);
    request_config.include_auth = !args.no_auth;
    if let Some(ms) = args.timeout_ms {
        request_config.timeout = Duration::from_millis(ms);
    }

    let mut chat = StreamingChat::new(driver, endpoint, config).with_request_config(request_config);
    let mut handler = TerminalHandler { json: args.json };

    let result = tokio::select! {
        result = chat.send(&prompt, serde_json::Map::new(), &mut handler) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n⏹ cancelled");
            return Ok(());
        }
    };

    println!(); // newline after streaming

    if result.timed_out {
        let partial = if result.has_partial_content { " (partial results shown)" } else { "" };
        return Err(format!("stream timed out{partial}").into());
    }
    match result.error {
        Some(err) if !result.aborted => Err(err.into()),
        _ => Ok(()),
    }
}
