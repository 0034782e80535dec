//! Interactive question loop.
//!
//! Every line is an independent request; nothing carries over between them.

use super::build_orchestrator;
use crate::output;
use clap::Args;
use ragent_core::config::AppConfig;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Answer questions interactively, one per line
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Print each response as JSON
    #[arg(long)]
    pub json: bool,
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
        let orchestrator = build_orchestrator(config)?;

        println!("RAGent: question answering with inline citations");
        println!("Type 'exit', 'quit', or Ctrl+C to exit\n");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\nEnter your question: ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };

            let question = line.trim();
            if question.is_empty() {
                continue;
            }
            if is_exit(question) {
                break;
            }

            let response = orchestrator.answer_with_cancel(question, cancel).await;
            if self.json {
                println!("{}", output::to_json(&response)?);
            } else {
                println!("{}", output::format_response(&response));
            }
        }

        println!("\nExiting RAGent...");
        Ok(())
    }
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "exit" | "quit")
}
