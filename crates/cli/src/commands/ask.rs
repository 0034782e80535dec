//! Ask command handler.

use super::build_orchestrator;
use crate::output;
use anyhow::Context;
use clap::Args;
use ragent_core::config::AppConfig;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Answer a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question (words are joined with spaces)
    pub question: Vec<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Number of passages to retrieve
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Evidence budget in characters
    #[arg(long)]
    pub budget: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
        tracing::debug!("Ask command options: {:?}", self);

        let question = self.get_question()?;
        let config = self.apply(config);
        let orchestrator = build_orchestrator(&config)?;

        let response = orchestrator.answer_with_cancel(&question, cancel).await;

        if self.json {
            println!("{}", output::to_json(&response)?);
        } else {
            println!("{}", output::format_response(&response));
        }
        Ok(())
    }

    fn get_question(&self) -> anyhow::Result<String> {
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read question file {}", path.display()));
        }
        if self.question.is_empty() {
            anyhow::bail!("No question provided");
        }
        Ok(self.question.join(" "))
    }

    fn apply(&self, config: &AppConfig) -> AppConfig {
        let mut config = config.clone();
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Some(budget) = self.budget {
            config.pipeline.evidence_budget_chars = budget;
        }
        config
    }
}
