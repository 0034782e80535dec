//! Prompt loader for YAML prompt definitions.
//!
//! Workspace files under `.ragent/prompts/<id>.yml` override the built-in
//! definitions shipped with the crate.

use crate::types::PromptDefinition;
use ragent_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

/// Identifier of the citation-grounded answering prompt.
pub const GROUNDED_ANSWER_PROMPT: &str = "grounded.answer";

/// Identifier of the search-query rewriting prompt.
pub const QUERY_REWRITE_PROMPT: &str = "query.rewrite";

const BUILTIN_PROMPTS: [(&str, &str); 2] = [
    (
        GROUNDED_ANSWER_PROMPT,
        include_str!("../prompts/grounded.answer.yml"),
    ),
    (
        QUERY_REWRITE_PROMPT,
        include_str!("../prompts/query.rewrite.yml"),
    ),
];

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".ragent/prompts")
}

/// Load a prompt definition by ID from the workspace.
///
/// # Example
/// ```no_run
/// use ragent_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "grounded.answer")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    tracing::debug!("Loading prompt from: {:?}", prompt_file);

    if !prompt_file.exists() {
        return Err(AppError::Prompt(format!(
            "Prompt file not found: {:?}",
            prompt_file
        )));
    }

    let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
        AppError::Prompt(format!(
            "Failed to read prompt file {:?}: {}",
            prompt_file, e
        ))
    })?;

    let definition = parse_prompt(&contents)
        .map_err(|e| AppError::Prompt(format!("{:?}: {}", prompt_file, e)))?;

    tracing::info!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Load a built-in prompt definition.
pub fn builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("No built-in prompt named '{}'", prompt_id)))?;

    parse_prompt(contents)
}

/// Load a prompt from the workspace, falling back to the built-in copy.
pub fn load_prompt_or_builtin(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));
    if prompt_file.exists() {
        load_prompt(workspace_path, prompt_id)
    } else {
        tracing::debug!("Using built-in prompt: {}", prompt_id);
        builtin_prompt(prompt_id)
    }
}

/// List all prompt IDs defined in the workspace.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let prompts_dir = prompts_dir(workspace_path);

    if !prompts_dir.exists() {
        return Ok(Vec::new());
    }

    let mut prompt_ids = Vec::new();

    for entry in walkdir::WalkDir::new(&prompts_dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                prompt_ids.push(stem.to_string());
            }
        }
    }

    prompt_ids.sort();
    Ok(prompt_ids)
}

fn parse_prompt(contents: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents)
        .map_err(|e| AppError::Prompt(format!("Failed to parse prompt YAML: {}", e)))?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
