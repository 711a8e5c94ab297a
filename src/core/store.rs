//! Plan files: JSON serialization, atomic save, load, staleness check.

use super::error::{Result, SynthError};
use super::types::{Plan, WorkspacePlan};
use std::path::Path;

/// Wrap per-stack plans into a workspace plan.
pub fn new_workspace_plan(name: &str, plans: Vec<Plan>) -> WorkspacePlan {
    WorkspacePlan {
        name: name.to_string(),
        generator: format!("stackweld {}", env!("CARGO_PKG_VERSION")),
        plans,
    }
}

/// Render a workspace plan as pretty JSON for the executor.
pub fn plan_json(plan: &WorkspacePlan) -> Result<String> {
    serde_json::to_string_pretty(plan).map_err(|e| SynthError::Parse(format!("serialize error: {}", e)))
}

/// Load a plan file. Returns None if the file doesn't exist.
pub fn load_plan(path: &Path) -> Result<Option<WorkspacePlan>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| SynthError::Io(format!("cannot read {}: {}", path.display(), e)))?;
    let plan: WorkspacePlan = serde_json::from_str(&content)
        .map_err(|e| SynthError::Parse(format!("invalid plan file {}: {}", path.display(), e)))?;
    Ok(Some(plan))
}

/// Save a plan file atomically (write to temp, then rename).
pub fn save_plan(path: &Path, plan: &WorkspacePlan) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SynthError::Io(format!("cannot create dir {}: {}", parent.display(), e)))?;
    }

    let json = plan_json(plan)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)
        .map_err(|e| SynthError::Io(format!("cannot write {}: {}", tmp_path.display(), e)))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        SynthError::Io(format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %path.display(), stacks = plan.plans.len(), "saved plan");
    Ok(())
}

/// A stack whose saved fingerprint differs from the current synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleStack {
    pub stack: String,
    /// None when the stack is new since the plan was saved
    pub saved: Option<String>,
    /// None when the stack no longer exists
    pub current: Option<String>,
}

/// Stacks whose fingerprints changed between a saved and a fresh plan.
pub fn stale_stacks(saved: &WorkspacePlan, current: &WorkspacePlan) -> Vec<StaleStack> {
    let fingerprint = |plans: &WorkspacePlan, stack: &str| {
        plans
            .plans
            .iter()
            .find(|p| p.stack == stack)
            .map(|p| p.fingerprint.clone())
    };

    let mut stacks: Vec<&str> = current.plans.iter().map(|p| p.stack.as_str()).collect();
    for p in &saved.plans {
        if !stacks.contains(&p.stack.as_str()) {
            stacks.push(&p.stack);
        }
    }

    stacks
        .into_iter()
        .filter_map(|stack| {
            let before = fingerprint(saved, stack);
            let after = fingerprint(current, stack);
            (before != after).then(|| StaleStack {
                stack: stack.to_string(),
                saved: before,
                current: after,
            })
        })
        .collect()
}
