//! Command handlers for the RAGent CLI.

pub mod ask;
pub mod batch;
pub mod chat;
pub mod classify;

pub use ask::AskCommand;
pub use batch::BatchCommand;
pub use chat::ChatCommand;
pub use classify::ClassifyCommand;

use ragent_agent::Orchestrator;
use ragent_core::config::AppConfig;

/// Build the pipeline once per command invocation.
fn build_orchestrator(config: &AppConfig) -> anyhow::Result<Orchestrator> {
    Ok(Orchestrator::from_config(config)?)
}
