//! Workspace file parsing and structural validation.
//!
//! Parses a workspace YAML and checks what can be checked without composing:
//! - Version must be "1.0"
//! - Stack and resource names are lowercase identifiers
//! - Templates exist and inline resources do not shadow template resources

use super::composer::{builtin_names, builtin_template};
use super::error::{Result, SynthError};
use super::types::Workspace;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z0-9_-]*$").ok())
        .as_ref()
}

/// Whether a stack or resource name is well-formed.
pub fn is_valid_name(name: &str) -> bool {
    name_pattern().is_some_and(|re| re.is_match(name))
}

/// Parse a workspace file from disk.
pub fn parse_workspace_file(path: &Path) -> Result<Workspace> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SynthError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    parse_workspace(&content)
}

/// Parse a workspace from a string.
pub fn parse_workspace(yaml: &str) -> Result<Workspace> {
    serde_yaml_ng::from_str(yaml).map_err(|e| SynthError::Parse(format!("YAML parse error: {}", e)))
}

/// Validate a parsed workspace. Returns a list of errors (empty = valid).
pub fn validate_workspace(ws: &Workspace) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut error = |message: String| errors.push(ValidationError { message });

    if ws.version != "1.0" {
        error(format!("version must be \"1.0\", got \"{}\"", ws.version));
    }
    if ws.name.is_empty() {
        error("name must not be empty".to_string());
    }
    if ws.stacks.is_empty() {
        error("workspace declares no stacks".to_string());
    }

    for (stack_name, stack) in &ws.stacks {
        if !is_valid_name(stack_name) {
            error(format!(
                "stack name '{}' must match ^[a-z][a-z0-9_-]*$",
                stack_name
            ));
        }

        let template_resources: Vec<String> = match &stack.template {
            Some(t) if !builtin_names().contains(&t.as_str()) => {
                error(format!(
                    "stack '{}' uses unknown template '{}' (available: {})",
                    stack_name,
                    t,
                    builtin_names().join(", ")
                ));
                Vec::new()
            }
            Some(t) => match builtin_template(t) {
                Ok(template) => template.resources.keys().cloned().collect(),
                Err(e) => {
                    error(format!("stack '{}': {}", stack_name, e));
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        for (name, resource) in &stack.resources {
            if !is_valid_name(name) {
                error(format!(
                    "stack '{}': resource name '{}' must match ^[a-z][a-z0-9_-]*$",
                    stack_name, name
                ));
            }
            if template_resources.contains(name) {
                error(format!(
                    "stack '{}': resource '{}' is already declared by template '{}'",
                    stack_name,
                    name,
                    stack.template.as_deref().unwrap_or_default()
                ));
            }
            if resource.kind.is_empty() {
                error(format!("stack '{}': resource '{}' has no kind", stack_name, name));
            }
            if resource.depends_on.iter().any(|d| d == name) {
                error(format!(
                    "stack '{}': resource '{}' depends on itself",
                    stack_name, name
                ));
            }
        }
    }

    errors
}
