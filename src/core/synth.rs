//! Synthesis pipeline: compose, build, validate, and plan every stack.
//!
//! Stacks are synthesized in declaration order. The first error halts the
//! run; no partial workspace plan is ever returned.

use super::composer::{compose_stack, Overrides};
use super::error::Result;
use super::graph::build_graph;
use super::planner::synthesize_plan;
use super::reference::Scope;
use super::store::new_workspace_plan;
use super::types::{Plan, Stack, Workspace, WorkspacePlan};
use super::validator::validate;

/// Compose every stack of a workspace. Each stack sees only its own
/// environment bindings; see [`Overrides::for_stack`] for precedence.
pub fn compose_workspace(ws: &Workspace, overrides: &Overrides) -> Result<Vec<Stack>> {
    ws.stacks
        .iter()
        .map(|(name, decl)| compose_stack(name, decl, overrides))
        .collect()
}

/// Build, validate, and plan one composed stack. `siblings` are the other
/// stacks of the workspace, used only to recognise cross-stack references.
pub fn synthesize_stack(stack: &Stack, siblings: &[Stack]) -> Result<Plan> {
    let graph = build_graph(&Scope::with_siblings(stack, siblings))?;
    validate(stack, &graph)?;
    let plan = synthesize_plan(&graph)?;
    tracing::info!(
        stack = %stack.name,
        steps = plan.steps.len(),
        fingerprint = %plan.fingerprint,
        "planned stack"
    );
    Ok(plan)
}

/// Synthesize plans for every stack of a workspace.
pub fn synthesize(ws: &Workspace, overrides: &Overrides) -> Result<WorkspacePlan> {
    let stacks = compose_workspace(ws, overrides)?;
    let plans = stacks
        .iter()
        .map(|stack| synthesize_stack(stack, &stacks))
        .collect::<Result<Vec<_>>>()?;
    Ok(new_workspace_plan(&ws.name, plans))
}
