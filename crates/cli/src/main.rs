//! RAGent CLI
//!
//! Main entry point for the ragent command-line tool.
//! Answers questions from a knowledge source with inline citations.

mod commands;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{AskCommand, BatchCommand, ChatCommand, ClassifyCommand};
use ragent_core::{
    config::AppConfig,
    logging::{self, LogFormat},
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// RAGent - question answering with inline citations
#[derive(Parser, Debug)]
#[command(name = "ragent")]
#[command(about = "Question answering with inline citations", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "RAGENT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "RAGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Completion provider (ollama, openai)
    #[arg(short, long, global = true, env = "RAGENT_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "RAGENT_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a single question
    Ask(AskCommand),

    /// Answer questions interactively, one per line
    Chat(ChatCommand),

    /// Answer many questions concurrently
    Batch(BatchCommand),

    /// Run the safety check only
    Classify(ClassifyCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Chat(_) => "chat",
            Commands::Batch(_) => "batch",
            Commands::Classify(_) => "classify",
        }
    }
}

/// Defaults, then the config file, then environment, then flags.
fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = AppConfig::load().context("Failed to load configuration")?;

    let explicit = cli.config.clone().or_else(|| {
        cli.workspace
            .as_ref()
            .map(|ws| ws.join(".ragent").join("config.yaml"))
            .filter(|path| path.exists())
    });
    if let Some(path) = explicit {
        config = config
            .merge_yaml(&path)
            .with_context(|| format!("Failed to apply config file {}", path.display()))?;
    }

    Ok(config.with_overrides(
        cli.workspace.clone(),
        cli.config.clone(),
        cli.provider.clone(),
        cli.model.clone(),
        cli.log_level.clone(),
        cli.verbose,
        cli.no_color,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init_logging(config.log_level.as_deref(), config.no_color, format)?;

    tracing::info!("RAGent CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    // Ctrl+C abandons in-flight requests at the next stage boundary
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; cancelling in-flight requests");
            on_signal.cancel();
        }
    });

    let _span = tracing::info_span!("command", name = cli.command.name()).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config, &cancel).await,
        Commands::Chat(cmd) => cmd.execute(&config, &cancel).await,
        Commands::Batch(cmd) => cmd.execute(&config, &cancel).await,
        Commands::Classify(cmd) => cmd.execute(&config),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ragent",
            "ask",
            "What is the capital of France?",
            "--model",
            "llama3.2",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.model.as_deref(), Some("llama3.2"));
        match cli.command {
            Commands::Ask(cmd) => {
                assert!(cmd.json);
                assert_eq!(cmd.question, vec!["What is the capital of France?"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_batch_concurrency_default() {
        let cli = Cli::try_parse_from(["ragent", "batch", "questions.txt"]).unwrap();
        match cli.command {
            Commands::Batch(cmd) => assert_eq!(cmd.concurrency, 4),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
