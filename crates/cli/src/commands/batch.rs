//! Batch command handler.
//!
//! Reads one question per line and answers them concurrently. Each question
//! is an independent request; results are printed as they complete.

use super::build_orchestrator;
use crate::output;
use anyhow::Context;
use clap::Args;
use futures::stream::{self, StreamExt};
use ragent_agent::Verdict;
use ragent_core::config::AppConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;

/// Answer many questions concurrently
#[derive(Args, Debug)]
pub struct BatchCommand {
    /// File with one question per line ("-" reads stdin)
    pub input: PathBuf,

    /// Maximum requests in flight
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Print responses as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl BatchCommand {
    pub async fn execute(&self, config: &AppConfig, cancel: &CancellationToken) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }

        let questions = parse_questions(&self.read_input().await?);
        tracing::info!(
            "Answering {} questions with concurrency {}",
            questions.len(),
            self.concurrency
        );

        let orchestrator = build_orchestrator(config)?;
        let orchestrator = &orchestrator;

        let mut responses = stream::iter(questions)
            .map(|question| async move { orchestrator.answer_with_cancel(&question, cancel).await })
            .buffer_unordered(self.concurrency);

        let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
        while let Some(response) = responses.next().await {
            *tally.entry(response.verdict.as_str()).or_default() += 1;
            if self.json {
                println!("{}", output::to_json_line(&response)?);
            } else {
                println!("{}", output::format_response(&response));
            }
        }

        tracing::info!("Batch finished: {}", summarize(&tally));
        if tally.get(Verdict::RefusedError.as_str()).copied().unwrap_or(0) > 0 {
            tracing::warn!("Some questions could not be answered because of errors");
        }
        Ok(())
    }

    async fn read_input(&self) -> anyhow::Result<String> {
        if self.input.as_os_str() == "-" {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Failed to read questions from stdin")?;
            return Ok(text);
        }
        tokio::fs::read_to_string(&self.input)
            .await
            .with_context(|| format!("Failed to read questions from {}", self.input.display()))
    }
}

/// Non-empty lines that are not `#` comments.
fn parse_questions(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn summarize(tally: &BTreeMap<&'static str, usize>) -> String {
    tally
        .iter()
        .map(|(verdict, count)| format!("{}={}", verdict, count))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_questions_skips_blanks_and_comments() {
        let text = "# geography\nWhat is the capital of France?\n\n  Where is the Louvre?  \n";
        assert_eq!(
            parse_questions(text),
            vec!["What is the capital of France?", "Where is the Louvre?"]
        );
    }

    #[test]
    fn test_summarize() {
        let mut tally = BTreeMap::new();
        tally.insert("PARTIAL", 1);
        tally.insert("ANSWERED", 2);
        assert_eq!(summarize(&tally), "ANSWERED=2 PARTIAL=1");
    }

    #[tokio::test]
    async fn test_read_input_from_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "one\ntwo\n").unwrap();

        let cmd = BatchCommand {
            input: file.path().to_path_buf(),
            concurrency: 2,
            json: true,
        };
        let text = cmd.read_input().await.unwrap();
        assert_eq!(parse_questions(&text).len(), 2);
    }
}
