//! Classify command handler.

use crate::output;
use clap::Args;
use ragent_agent::SafetyGate;
use ragent_core::config::AppConfig;

/// Run the safety check only
#[derive(Args, Debug)]
pub struct ClassifyCommand {
    /// Questions to classify
    #[arg(required = true)]
    pub questions: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ClassifyCommand {
    /// Classification needs neither the knowledge source nor the model.
    pub fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        let gate = SafetyGate::new(config.safety.clone())?;

        for question in &self.questions {
            let assessment = gate.classify(question);
            if self.json {
                let record = serde_json::json!({
                    "question": question,
                    "assessment": assessment,
                });
                println!("{}", output::to_json_line(&record)?);
            } else {
                print!("{}", output::format_assessment(question, &assessment));
            }
        }
        Ok(())
    }
}
