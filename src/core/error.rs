//! Synthesis error taxonomy.
//!
//! Every variant is raised before anything is applied; none is retried.

use std::fmt;
use thiserror::Error;

/// Errors raised while composing, resolving, validating, or planning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthError {
    #[error("unknown resource kind '{kind}' (resource '{resource}')")]
    UnknownKind { resource: String, kind: String },

    #[error("resource '{resource}' references unknown resource '{target}'")]
    UnresolvedReference { resource: String, target: String },

    #[error("resource '{resource}' references '{target}.{output}', which is not an output of {kind}")]
    InvalidOutputAttribute {
        resource: String,
        target: String,
        kind: String,
        output: String,
    },

    #[error("resource '{resource}': invalid expression '{expression}': {reason}")]
    InvalidExpression {
        resource: String,
        expression: String,
        reason: String,
    },

    #[error("resource '{resource}' is missing required attribute '{attribute}'")]
    MissingRequiredAttribute { resource: String, attribute: String },

    #[error("resource '{resource}' sets unknown or computed attribute '{attribute}'")]
    UnknownAttribute { resource: String, attribute: String },

    #[error("resource '{resource}': attribute '{attribute}' expects {expected}, got {found}")]
    TypeMismatch {
        resource: String,
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("resource '{resource}' needs provider '{provider}', which stack '{stack}' does not configure")]
    ProviderNotConfigured {
        resource: String,
        provider: String,
        stack: String,
    },

    #[error("dependency cycle detected involving: {}", .members.join(", "))]
    CyclicDependency { members: Vec<String> },

    #[error("resource '{resource}' references '{target}' outside its stack; cross-stack references are unsupported")]
    CrossStackReferenceUnsupported { resource: String, target: String },

    #[error("stack '{stack}' is missing configuration '{key}'")]
    MissingConfiguration { stack: String, key: String },

    #[error("stack '{stack}': option '{key}' {reason}")]
    InvalidOption {
        stack: String,
        key: String,
        reason: String,
    },

    #[error("invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("{0}")]
    Parse(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Invalid(Violations),
}

pub type Result<T> = std::result::Result<T, SynthError>;

/// A non-empty batch of violations from one validation phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations {
    pub phase: Phase,
    pub errors: Vec<SynthError>,
}

impl Violations {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SynthError> {
        self.errors.iter()
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} violation(s)", self.errors.len(), self.phase)?;
        for e in &self.errors {
            write!(f, "\n  - {}", e)?;
        }
        Ok(())
    }
}

impl From<Violations> for SynthError {
    fn from(v: Violations) -> Self {
        SynthError::Invalid(v)
    }
}

/// Validation phases, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Configuration,
    Resolution,
    Attributes,
    Providers,
    Acyclicity,
    StackIsolation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Resolution => write!(f, "reference"),
            Self::Attributes => write!(f, "attribute"),
            Self::Providers => write!(f, "provider"),
            Self::Acyclicity => write!(f, "cycle"),
            Self::StackIsolation => write!(f, "cross-stack"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_members() {
        let e = SynthError::CyclicDependency {
            members: vec!["dev/a".into(), "dev/b".into()],
        };
        assert_eq!(e.to_string(), "dependency cycle detected involving: dev/a, dev/b");
    }

    #[test]
    fn test_violations_display_lists_each() {
        let v = Violations {
            phase: Phase::Attributes,
            errors: vec![
                SynthError::MissingRequiredAttribute {
                    resource: "dev/db".into(),
                    attribute: "engine".into(),
                },
                SynthError::MissingRequiredAttribute {
                    resource: "dev/db".into(),
                    attribute: "password".into(),
                },
            ],
        };
        let text = v.to_string();
        assert!(text.starts_with("2 attribute violation(s)"));
        assert!(text.contains("'engine'"));
        assert!(text.contains("'password'"));
        let e: SynthError = v.into();
        assert!(matches!(e, SynthError::Invalid(_)));
    }
}
