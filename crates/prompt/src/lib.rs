//! Prompt system for RAGent.
//!
//! - YAML prompt definitions with system and user templates
//! - Built-in definitions, overridable per workspace
//! - Handlebars rendering as a pure function of its inputs

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{
    builtin_prompt, list_prompts, load_prompt, load_prompt_or_builtin, GROUNDED_ANSWER_PROMPT,
    QUERY_REWRITE_PROMPT,
};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptOutputSpec};
