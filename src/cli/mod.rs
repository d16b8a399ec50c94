//! CLI entry point for caeli-stream.

pub mod auth;

use clap::{Parser, Subcommand};

/// CaeliCrawler streaming client
#[derive(Parser, Debug)]
#[command(name = "caeli-stream", version, about = "CaeliCrawler streaming client CLI")]
pub struct Cli {
    /// Path to a caeli.toml config file
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stored bearer token management
    Auth(AuthArgs),
    /// Stream a reply from a chat endpoint
    Chat(ChatArgs),
    /// Print the streaming profile table
    Profiles,
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands for storing, inspecting and clearing the token.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Store a bearer token
    Set(SetTokenArgs),
    /// Show whether a token is stored
    Status,
    /// Remove the stored token
    Clear,
}

/// Arguments for `caeli-stream auth set`.
#[derive(Parser, Debug)]
pub struct SetTokenArgs {
    pub token: String,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Streaming mode (assistant, plan_mode, smart_query)
    #[arg(short, long, default_value = "assistant")]
    pub mode: String,

    /// Backend base URL (overrides config and CAELI_API_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Override the profile timeout in milliseconds (0 = unbounded)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print every event as a JSON line instead of streamed text
    #[arg(long)]
    pub json: bool,

    /// Do not send the stored bearer token
    #[arg(long)]
    pub no_auth: bool,

    /// Prompt (positional)
    pub prompt: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_auth_set() {
        let cli = Cli::try_parse_from(["caeli-stream", "auth", "set", "tok"]).unwrap();
        match cli.command {
            Commands::Auth(auth) => match auth.command {
                AuthCommands::Set(args) => assert_eq!(args.token, "tok"),
                other => panic!("expected Set, got {other:?}"),
            },
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_auth_status() {
        let cli = Cli::try_parse_from(["caeli-stream", "auth", "status"]).unwrap();
        match cli.command {
            Commands::Auth(auth) => assert!(matches!(auth.command, AuthCommands::Status)),
            other => panic!("expected Auth, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_defaults() {
        let cli = Cli::try_parse_from(["caeli-stream", "chat"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.mode, "assistant");
                assert!(args.base_url.is_none());
                assert!(args.timeout_ms.is_none());
                assert!(!args.json);
                assert!(!args.no_auth);
                assert!(args.prompt.is_none());
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "caeli-stream",
            "--config",
            "caeli.toml",
            "chat",
            "-m",
            "smart_query",
            "--base-url",
            "http://localhost:9000",
            "--timeout-ms",
            "500",
            "--json",
            "--no-auth",
            "Which sources failed?",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("caeli.toml")));
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.mode, "smart_query");
                assert_eq!(args.base_url.as_deref(), Some("http://localhost:9000"));
                assert_eq!(args.timeout_ms, Some(500));
                assert!(args.json);
                assert!(args.no_auth);
                assert_eq!(args.prompt.as_deref(), Some("Which sources failed?"));
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["caeli-stream"]).is_err());
    }

    #[test]
    fn parse_auth_set_missing_token_is_error() {
        assert!(Cli::try_parse_from(["caeli-stream", "auth", "set"]).is_err());
    }
}
