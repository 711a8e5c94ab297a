//! Graph validation: four phases, run in order.
//!
//! 1. attributes: known kind, required present, types correct, nothing
//!    unknown or computed set
//! 2. providers: every provider used is configured with its required settings
//! 3. acyclicity: three-colour DFS, each back edge is a cycle
//! 4. stack isolation: no edge leaves the stack
//!
//! The first phase with violations stops validation; every violation of that
//! phase is reported. Validation has no side effects, so validating a valid
//! graph again is still valid.

use super::error::{Phase, SynthError, Violations};
use super::graph::DependencyGraph;
use super::registry::Registry;
use super::types::{AttrType, AttrValue, Edge, ResourceNode, Stack};

/// Validate a stack's graph. `Ok(())` means a plan may be synthesized.
pub fn validate(stack: &Stack, graph: &DependencyGraph) -> Result<(), Violations> {
    let phases: [(Phase, fn(&Stack, &DependencyGraph) -> Vec<SynthError>); 4] = [
        (Phase::Attributes, check_attributes),
        (Phase::Providers, check_providers),
        (Phase::Acyclicity, check_acyclic),
        (Phase::StackIsolation, check_isolation),
    ];

    for (phase, check) in phases {
        let errors = check(stack, graph);
        if !errors.is_empty() {
            tracing::debug!(stack = %stack.name, %phase, count = errors.len(), "validation failed");
            return Err(Violations { phase, errors });
        }
    }
    Ok(())
}

// ============================================================================
// Phase 1: attributes
// ============================================================================

fn check_attributes(_stack: &Stack, graph: &DependencyGraph) -> Vec<SynthError> {
    let mut errors = Vec::new();
    for node in graph.nodes.values() {
        check_node(node, graph, &mut errors);
    }
    errors
}

fn check_node(node: &ResourceNode, graph: &DependencyGraph, errors: &mut Vec<SynthError>) {
    let desc = match Registry::global().require(&node.id, &node.kind) {
        Ok(d) => d,
        Err(e) => {
            errors.push(e);
            return;
        }
    };

    for spec in desc.required() {
        let present = match node.attributes.get(spec.name) {
            None | Some(AttrValue::Literal(serde_yaml_ng::Value::Null)) => false,
            Some(_) => true,
        };
        if !present {
            errors.push(SynthError::MissingRequiredAttribute {
                resource: node.id.clone(),
                attribute: spec.name.to_string(),
            });
        }
    }

    for (name, value) in &node.attributes {
        let spec = match desc.attribute(name) {
            Some(s) if !s.computed => s,
            _ => {
                errors.push(SynthError::UnknownAttribute {
                    resource: node.id.clone(),
                    attribute: name.clone(),
                });
                continue;
            }
        };

        let found = match value {
            AttrValue::Literal(serde_yaml_ng::Value::Null) => continue,
            AttrValue::Literal(v) | AttrValue::Composite { value: v, .. } => {
                if literal_matches(v, spec.ty) {
                    continue;
                }
                describe(v)
            }
            AttrValue::Ref(r) => match output_type(graph, &r.target, &r.output) {
                Some(ty) if !ty.flows_into(spec.ty) => format!("{} ({}.{})", ty, r.target, r.output),
                // Outside the stack: reported by the isolation phase.
                _ => continue,
            },
        };

        errors.push(SynthError::TypeMismatch {
            resource: node.id.clone(),
            attribute: name.clone(),
            expected: spec.ty.to_string(),
            found,
        });
    }
}

/// Declared type of an output of a resource in the graph.
fn output_type(graph: &DependencyGraph, target: &str, output: &str) -> Option<AttrType> {
    let node = graph.node(target)?;
    let desc = Registry::global().lookup(&node.kind)?;
    desc.attribute(output).map(|a| a.ty)
}

/// Shape check of a literal (or composite) value against a declared type.
pub fn literal_matches(value: &serde_yaml_ng::Value, ty: AttrType) -> bool {
    use serde_yaml_ng::Value;
    match (ty, value) {
        (AttrType::String, Value::String(_)) => true,
        (AttrType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (AttrType::Bool, Value::Bool(_)) => true,
        (AttrType::StringList, Value::Sequence(items)) => {
            items.iter().all(|i| matches!(i, Value::String(_)))
        }
        (AttrType::List, Value::Sequence(_)) => true,
        (AttrType::Map, Value::Mapping(_)) => true,
        (_, Value::Tagged(t)) => literal_matches(&t.value, ty),
        _ => false,
    }
}

/// Human-readable shape of a value.
pub(crate) fn describe(value: &serde_yaml_ng::Value) -> String {
    use serde_yaml_ng::Value;
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(n) if n.is_f64() => "float".to_string(),
        Value::Number(_) => "integer".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Sequence(items) if items.iter().all(|i| matches!(i, Value::String(_))) => {
            "list(string)".to_string()
        }
        Value::Sequence(_) => "list".to_string(),
        Value::Mapping(_) => "map".to_string(),
        Value::Tagged(t) => describe(&t.value),
    }
}

// ============================================================================
// Phase 2: providers
// ============================================================================

fn check_providers(stack: &Stack, graph: &DependencyGraph) -> Vec<SynthError> {
    let registry = Registry::global();
    let mut errors = Vec::new();
    let mut used: Vec<&str> = Vec::new();

    for node in graph.nodes.values() {
        if !stack.providers.contains_key(&node.provider) {
            errors.push(SynthError::ProviderNotConfigured {
                resource: node.id.clone(),
                provider: node.provider.clone(),
                stack: stack.name.clone(),
            });
        } else if !used.contains(&node.provider.as_str()) {
            used.push(&node.provider);
        }
    }

    for name in used {
        let (Some(spec), Some(settings)) = (registry.provider(name), stack.providers.get(name))
        else {
            continue;
        };
        for key in &spec.required_settings {
            let missing = settings.get(*key).is_none_or(|v| v.trim().is_empty());
            if missing {
                errors.push(SynthError::MissingConfiguration {
                    stack: stack.name.clone(),
                    key: format!("{}.{}", name, key),
                });
            }
        }
    }

    errors
}

// ============================================================================
// Phase 3: acyclicity
// ============================================================================

fn check_acyclic(_stack: &Stack, graph: &DependencyGraph) -> Vec<SynthError> {
    graph
        .find_cycles()
        .into_iter()
        .map(|members| SynthError::CyclicDependency { members })
        .collect()
}

// ============================================================================
// Phase 4: stack isolation
// ============================================================================

fn check_isolation(_stack: &Stack, graph: &DependencyGraph) -> Vec<SynthError> {
    graph
        .dangling_edges()
        .map(|e| match e {
            Edge::Reference(r) => SynthError::CrossStackReferenceUnsupported {
                resource: r.from.clone(),
                target: r.to.clone(),
            },
            Edge::DependsOn { from, to } => SynthError::CrossStackReferenceUnsupported {
                resource: from.clone(),
                target: to.clone(),
            },
        })
        .collect()
}
