//! Plan synthesis: deterministic topological ordering of a stack's graph.
//!
//! Kahn's algorithm; among ready resources the earliest declared goes first,
//! so the same declarations always yield the same plan. Safe to call without
//! prior validation: cycles and edges leaving the stack are re-checked.

use super::error::{Result, SynthError};
use super::fingerprint;
use super::graph::DependencyGraph;
use super::types::{Plan, PlanAction, PlanStep, PlanValue};
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};

/// Synthesize the create-order plan for a graph.
pub fn synthesize_plan(graph: &DependencyGraph) -> Result<Plan> {
    if let Some(edge) = graph.dangling_edges().next() {
        return Err(SynthError::CrossStackReferenceUnsupported {
            resource: edge.from().to_string(),
            target: edge.to().to_string(),
        });
    }

    let n = graph.nodes.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut predecessors: Vec<BTreeSet<String>> = vec![BTreeSet::new(); n];

    for (i, id) in graph.nodes.keys().enumerate() {
        for dep in graph.dependencies_of(id) {
            if let Some(j) = graph.nodes.get_index_of(dep) {
                dependents[j].push(i);
                in_degree[i] += 1;
                predecessors[i].insert(dep.to_string());
            }
        }
    }

    // Ready set keyed by declaration index: lowest index released first.
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != n {
        let members = graph.find_cycles().into_iter().next().unwrap_or_else(|| {
            graph
                .nodes
                .keys()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, id)| id.clone())
                .collect()
        });
        return Err(SynthError::CyclicDependency { members });
    }

    let steps: Vec<PlanStep> = order
        .into_iter()
        .enumerate()
        .filter_map(|(index, i)| {
            let (_, node) = graph.nodes.get_index(i)?;
            Some(PlanStep {
                index,
                resource: node.id.clone(),
                kind: node.kind.clone(),
                provider: node.provider.clone(),
                action: PlanAction::Create,
                depends_on: std::mem::take(&mut predecessors[i]),
                attributes: node
                    .attributes
                    .iter()
                    .map(|(name, value)| (name.clone(), PlanValue::from(value)))
                    .collect(),
            })
        })
        .collect();

    tracing::debug!(stack = %graph.stack, steps = steps.len(), "synthesized plan");

    let mut plan = Plan {
        stack: graph.stack.clone(),
        fingerprint: String::new(),
        providers: graph.providers.clone(),
        secrets: graph.secrets.clone(),
        steps,
    };
    plan.fingerprint = fingerprint::plan_fingerprint(&plan);
    Ok(plan)
}

impl Plan {
    /// Step for a resource id.
    pub fn step(&self, resource: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.resource == resource)
    }

    /// Position of a resource in the plan.
    pub fn position(&self, resource: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.resource == resource)
    }

    /// Steps grouped by provider, providers in order of first appearance.
    /// Each group keeps the plan's global order.
    pub fn by_provider(&self) -> IndexMap<&str, Vec<&PlanStep>> {
        let mut groups: IndexMap<&str, Vec<&PlanStep>> = IndexMap::new();
        for step in &self.steps {
            groups.entry(step.provider.as_str()).or_default().push(step);
        }
        groups
    }

    /// Steps grouped into waves: every step's dependencies lie in earlier
    /// waves, so steps of one wave may be applied concurrently.
    pub fn waves(&self) -> Vec<Vec<&PlanStep>> {
        let mut level: HashMap<&str, usize> = HashMap::new();
        let mut waves: Vec<Vec<&PlanStep>> = Vec::new();
        for step in &self.steps {
            let wave = step
                .depends_on
                .iter()
                .filter_map(|d| level.get(d.as_str()))
                .map(|l| l + 1)
                .max()
                .unwrap_or(0);
            level.insert(&step.resource, wave);
            if waves.len() <= wave {
                waves.resize_with(wave + 1, Vec::new);
            }
            waves[wave].push(step);
        }
        waves
    }

    /// Step counts per action.
    pub fn summary(&self) -> String {
        format!("{} to create", self.steps.len())
    }
}
