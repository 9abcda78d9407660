//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition, PromptVars};
use gamefi_core::{AppError, AppResult};
use handlebars::Handlebars;

/// Build a prompt from a definition and input variables.
///
/// Both the system instruction and the user template are rendered, so
/// workspace overrides may reference variables in either.
///
/// # Example
/// ```no_run
/// use gamefi_prompt::{build_prompt, PromptDefinition, PromptVars};
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = PromptVars::new();
/// vars.insert("question".to_string(), "What is GameFi?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(definition: &PromptDefinition, variables: PromptVars) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    let system = match definition.system {
        Some(ref system) => Some(render_template(system, &variables)?),
        None => None,
    };
    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &PromptVars) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text; model output and rows must pass through untouched
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}
