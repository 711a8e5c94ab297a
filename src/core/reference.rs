//! Reference resolution: `{{resources.<name>.<output>}}` expressions.
//!
//! Resolution is structural only: it establishes that a value *will be*
//! supplied by another resource's output at apply time, never what that
//! value is. `{{stacks.<stack>.<name>.<output>}}` names a resource in another
//! stack explicitly; such references resolve, and validation rejects them.
//! `{{secrets.<key>}}` names a secret of the stack and stays in the value
//! for the executor to fill in.

use super::error::SynthError;
use super::registry::Registry;
use super::types::{resource_id, AttrValue, OutputRef, ResourceDecl, Stack};

/// Names visible while resolving one stack: its own resources plus the other
/// stacks of the workspace.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    stack: &'a Stack,
    siblings: &'a [Stack],
}

impl<'a> Scope<'a> {
    /// Scope with no sibling stacks.
    pub fn new(stack: &'a Stack) -> Self {
        Self {
            stack,
            siblings: &[],
        }
    }

    pub fn with_siblings(stack: &'a Stack, siblings: &'a [Stack]) -> Self {
        Self { stack, siblings }
    }

    pub fn stack(&self) -> &'a Stack {
        self.stack
    }

    /// Find a declaration by name: local first, then sibling stacks in order.
    fn find(&self, name: &str) -> Option<(&'a str, &'a ResourceDecl)> {
        if let Some(decl) = self.stack.resources.get(name) {
            return Some((self.stack.name.as_str(), decl));
        }
        self.siblings
            .iter()
            .filter(|s| s.name != self.stack.name)
            .find_map(|s| s.resources.get(name).map(|d| (s.name.as_str(), d)))
    }

    fn find_in(&self, stack: &str, name: &str) -> Option<(&'a str, &'a ResourceDecl)> {
        if stack == self.stack.name {
            return self
                .stack
                .resources
                .get(name)
                .map(|d| (self.stack.name.as_str(), d));
        }
        self.siblings
            .iter()
            .find(|s| s.name == stack)
            .and_then(|s| s.resources.get(name).map(|d| (s.name.as_str(), d)))
    }

    /// Resolve a declared `depends_on` name to a resource id.
    pub fn resolve_dependency(&self, from: &str, name: &str) -> Result<String, SynthError> {
        self.find(name)
            .map(|(stack, _)| resource_id(stack, name))
            .ok_or_else(|| SynthError::UnresolvedReference {
                resource: from.to_string(),
                target: name.to_string(),
            })
    }
}

/// A parsed reference expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<'s> {
    /// `resources.<name>.<output>`
    Local { name: &'s str, output: &'s str },
    /// `stacks.<stack>.<name>.<output>`
    Qualified {
        stack: &'s str,
        name: &'s str,
        output: &'s str,
    },
    /// `secrets.<key>`
    Secret { key: &'s str },
}

/// Parse the body of a `{{...}}` expression.
pub fn parse_expression(body: &str) -> Result<Expr<'_>, String> {
    let parts: Vec<&str> = body.split('.').map(str::trim).collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err("empty path segment".to_string());
    }
    match parts.as_slice() {
        ["resources", name, output] => Ok(Expr::Local {
            name: *name,
            output: *output,
        }),
        ["stacks", stack, name, output] => Ok(Expr::Qualified {
            stack: *stack,
            name: *name,
            output: *output,
        }),
        ["secrets", key] => Ok(Expr::Secret { key: *key }),
        ["resources", ..] => Err("expected resources.<name>.<output>".to_string()),
        ["stacks", ..] => Err("expected stacks.<stack>.<name>.<output>".to_string()),
        ["secrets", ..] => Err("expected secrets.<key>".to_string()),
        [prefix, ..] => Err(format!("unknown expression prefix '{}'", prefix)),
        [] => Err("empty expression".to_string()),
    }
}

/// Locate every `{{...}}` in a string. Returns `(start, end, body)` spans.
pub fn scan_expressions(s: &str) -> Result<Vec<(usize, usize, &str)>, String> {
    let mut found = Vec::new();
    let mut start = 0;

    while let Some(open) = s[start..].find("{{") {
        let open = start + open;
        let close = s[open..]
            .find("}}")
            .ok_or_else(|| format!("unclosed expression at position {}", open))?;
        let close = open + close + 2;
        found.push((open, close, s[open + 2..close - 2].trim()));
        start = close;
    }

    Ok(found)
}

/// Resolve one raw attribute value of resource `from` (a resource id).
///
/// Embedded references are rewritten to their canonical placeholder
/// (`{{<target>.<output>}}`). Every problem in the value is reported, not
/// only the first.
pub fn resolve_value(
    from: &str,
    value: &serde_yaml_ng::Value,
    scope: &Scope<'_>,
) -> Result<AttrValue, Vec<SynthError>> {
    let mut refs = Vec::new();
    let mut errors = Vec::new();

    if let serde_yaml_ng::Value::String(s) = value {
        if let Some(whole) = whole_expression(s) {
            return match resolve_expression(from, whole, scope) {
                Ok(Resolved::Output(r)) => Ok(AttrValue::Ref(r)),
                Ok(Resolved::Secret) => Ok(AttrValue::Literal(value.clone())),
                Err(e) => Err(vec![e]),
            };
        }
    }

    let rewritten = collect(from, value, scope, &mut refs, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }
    if refs.is_empty() {
        return Ok(AttrValue::Literal(value.clone()));
    }
    refs.dedup();
    Ok(AttrValue::Composite {
        value: rewritten,
        refs,
    })
}

/// The expression body when the string is exactly one `{{...}}`.
fn whole_expression(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn collect(
    from: &str,
    value: &serde_yaml_ng::Value,
    scope: &Scope<'_>,
    refs: &mut Vec<OutputRef>,
    errors: &mut Vec<SynthError>,
) -> serde_yaml_ng::Value {
    use serde_yaml_ng::Value;
    match value {
        Value::String(s) => match scan_expressions(s) {
            Ok(spans) => {
                let mut out = String::with_capacity(s.len());
                let mut last = 0;
                for (open, close, body) in spans {
                    out.push_str(&s[last..open]);
                    match resolve_expression(from, body, scope) {
                        Ok(Resolved::Output(r)) => {
                            out.push_str(&r.placeholder());
                            refs.push(r);
                        }
                        Ok(Resolved::Secret) => out.push_str(&s[open..close]),
                        Err(e) => {
                            out.push_str(&s[open..close]);
                            errors.push(e);
                        }
                    }
                    last = close;
                }
                out.push_str(&s[last..]);
                Value::String(out)
            }
            Err(reason) => {
                errors.push(SynthError::InvalidExpression {
                    resource: from.to_string(),
                    expression: s.clone(),
                    reason,
                });
                value.clone()
            }
        },
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| collect(from, item, scope, refs, errors))
                .collect(),
        ),
        Value::Mapping(map) => {
            let mut out = serde_yaml_ng::Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), collect(from, v, scope, refs, errors));
            }
            Value::Mapping(out)
        }
        Value::Tagged(tagged) => {
            let mut tagged = tagged.clone();
            tagged.value = collect(from, &tagged.value, scope, refs, errors);
            Value::Tagged(tagged)
        }
        other => other.clone(),
    }
}

/// What an expression names.
enum Resolved {
    Output(OutputRef),
    /// A declared secret; the expression stays as written
    Secret,
}

/// Resolve one expression body to what it names.
fn resolve_expression(from: &str, body: &str, scope: &Scope<'_>) -> Result<Resolved, SynthError> {
    let invalid = |reason: String| SynthError::InvalidExpression {
        resource: from.to_string(),
        expression: format!("{{{{{}}}}}", body),
        reason,
    };
    let expr = parse_expression(body).map_err(&invalid)?;

    let (found, name, output) = match expr {
        Expr::Secret { key } => {
            if scope.stack.secrets.contains_key(key) {
                return Ok(Resolved::Secret);
            }
            return Err(invalid(format!("stack has no secret '{}'", key)));
        }
        Expr::Local { name, output } => (scope.find(name), name.to_string(), output),
        Expr::Qualified {
            stack,
            name,
            output,
        } => (scope.find_in(stack, name), resource_id(stack, name), output),
    };

    let Some((stack, decl)) = found else {
        return Err(SynthError::UnresolvedReference {
            resource: from.to_string(),
            target: name,
        });
    };
    let target = resource_id(stack, name_of(&name));

    // Unknown target kinds surface as UnknownKind on the target itself.
    if let Some(desc) = Registry::global().lookup(&decl.kind) {
        let is_output = desc.attribute(output).is_some_and(|a| a.output);
        if !is_output {
            return Err(SynthError::InvalidOutputAttribute {
                resource: from.to_string(),
                target: target.clone(),
                kind: decl.kind.clone(),
                output: output.to_string(),
            });
        }
    }

    Ok(Resolved::Output(OutputRef {
        target,
        output: output.to_string(),
    }))
}

/// Last segment of a possibly qualified name.
fn name_of(label: &str) -> &str {
    label.rsplit('/').next().unwrap_or(label)
}
