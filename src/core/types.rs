//! Types shared by every synthesis stage.
//!
//! Workspace and stack declarations deserialize from YAML; descriptors are
//! static catalog entries; graph and plan types are produced by the engine.
//! Everything the executor sees derives Serialize so plans can be handed off
//! as JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Workspace file
// ============================================================================

/// Root configuration: every stack of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Project name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Stacks in declaration order
    #[serde(default)]
    pub stacks: IndexMap<String, StackDecl>,
}

/// A stack as written in the workspace file: an optional template plus
/// environment options, and inline providers/resources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackDecl {
    /// Template to compose from (built-in name)
    #[serde(default)]
    pub template: Option<String>,

    /// Environment options fed to the template
    #[serde(default)]
    pub options: IndexMap<String, serde_yaml_ng::Value>,

    /// Allow obviously fake values for missing sensitive options
    #[serde(default)]
    pub dev_mode: bool,

    /// Provider configurations, merged over the template's
    #[serde(default)]
    pub providers: IndexMap<String, ProviderSettings>,

    /// Resources appended after the template's resources
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,
}

/// Provider settings (region, project, host, ...).
pub type ProviderSettings = IndexMap<String, String>;

/// A single resource declaration. Keys other than `kind` and `depends_on`
/// are the resource's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource kind (registry key)
    pub kind: String,

    /// Explicit ordering dependencies (names in the same stack)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Attribute values, literal or containing reference expressions
    #[serde(flatten)]
    pub attributes: IndexMap<String, serde_yaml_ng::Value>,
}

impl ResourceDecl {
    /// Declaration with no attributes.
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            depends_on: Vec::new(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: impl Into<serde_yaml_ng::Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// A sensitive option passed to the executor by reference. Attributes
/// carry `{{secrets.<key>}}` in place of the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretBinding {
    /// Environment variable the executor reads the value from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

/// A concrete stack: composed, environment-resolved, ready for graph
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    pub providers: IndexMap<String, ProviderSettings>,
    pub resources: IndexMap<String, ResourceDecl>,
    /// Secrets the resources may name with `{{secrets.<key>}}`
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, SecretBinding>,
}

impl Stack {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            providers: IndexMap::new(),
            resources: IndexMap::new(),
            secrets: IndexMap::new(),
        }
    }

    /// Qualified id of a resource declared in this stack.
    pub fn resource_id(&self, name: &str) -> String {
        resource_id(&self.name, name)
    }
}

/// Build the qualified id `<stack>/<name>`.
pub fn resource_id(stack: &str, name: &str) -> String {
    format!("{}/{}", stack, name)
}

// ============================================================================
// Descriptors
// ============================================================================

/// Attribute value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    String,
    Integer,
    Bool,
    StringList,
    List,
    Map,
}

impl AttrType {
    /// Whether a value of type `self` may flow into an attribute of type
    /// `expected`. Scalars render into strings.
    pub fn flows_into(self, expected: AttrType) -> bool {
        self == expected
            || (expected == AttrType::String
                && matches!(self, AttrType::Integer | AttrType::Bool))
            || (expected == AttrType::List && self == AttrType::StringList)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Bool => write!(f, "bool"),
            Self::StringList => write!(f, "list(string)"),
            Self::List => write!(f, "list"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// One attribute of a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AttributeSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: AttrType,
    /// Must be set by the declaration
    pub required: bool,
    /// May be referenced by other resources
    pub output: bool,
    /// Known only after apply; cannot be set
    pub computed: bool,
}

/// Registry entry for a resource kind.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceDescriptor {
    pub kind: &'static str,
    pub provider: &'static str,
    pub description: &'static str,
    pub attributes: Vec<AttributeSpec>,
}

impl ResourceDescriptor {
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes other resources may reference.
    pub fn outputs(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.output)
    }

    pub fn required(&self) -> impl Iterator<Item = &AttributeSpec> {
        self.attributes.iter().filter(|a| a.required)
    }
}

/// Registry entry for a provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Settings every stack configuration of this provider must carry
    pub required_settings: Vec<&'static str>,
}

// ============================================================================
// Graph
// ============================================================================

/// One output of another resource, named by an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutputRef {
    /// Target resource id (`<stack>/<name>`)
    pub target: String,
    /// Output attribute on the target
    pub output: String,
}

impl OutputRef {
    /// Canonical placeholder for this output inside a string:
    /// `{{<target>.<output>}}`.
    pub fn placeholder(&self) -> String {
        format!("{{{{{}.{}}}}}", self.target, self.output)
    }
}

/// A resolved attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Fully known at synthesis time
    Literal(serde_yaml_ng::Value),
    /// The whole value is one output of another resource
    Ref(OutputRef),
    /// A literal shape with references embedded in its strings
    Composite {
        value: serde_yaml_ng::Value,
        refs: Vec<OutputRef>,
    },
}

impl AttrValue {
    /// Every reference carried by this value.
    pub fn references(&self) -> &[OutputRef] {
        match self {
            Self::Literal(_) => &[],
            Self::Ref(r) => std::slice::from_ref(r),
            Self::Composite { refs, .. } => refs,
        }
    }
}

/// A declared resource instance inside a dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    /// Qualified id (`<stack>/<name>`)
    pub id: String,
    /// Logical name, unique within the stack
    pub name: String,
    pub stack: String,
    pub kind: String,
    pub provider: String,
    /// Position in the stack's declaration order
    pub index: usize,
    pub attributes: IndexMap<String, AttrValue>,
    /// Explicit `depends_on` names, as declared
    pub depends_on: Vec<String>,
}

/// `(from, attribute) → (to, output)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub from: String,
    pub attribute: String,
    pub to: String,
    pub output: String,
}

/// A dependency edge: `from` must be created after `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum Edge {
    /// An attribute consumes another resource's output
    Reference(Reference),
    /// Declared ordering without data flow
    DependsOn { from: String, to: String },
}

impl Edge {
    pub fn from(&self) -> &str {
        match self {
            Self::Reference(r) => &r.from,
            Self::DependsOn { from, .. } => from,
        }
    }

    pub fn to(&self) -> &str {
        match self {
            Self::Reference(r) => &r.to,
            Self::DependsOn { to, .. } => to,
        }
    }
}

// ============================================================================
// Plan
// ============================================================================

/// Action to take on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanAction {
    Create,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
        }
    }
}

/// An attribute value as the executor receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanValue {
    /// Known at synthesis time
    Literal { value: serde_yaml_ng::Value },
    /// The whole value is one output of another resource
    Ref { target: String, output: String },
    /// Strings carry `{{<target>.<output>}}` placeholders for `refs`
    Template {
        value: serde_yaml_ng::Value,
        refs: Vec<OutputRef>,
    },
}

impl From<&AttrValue> for PlanValue {
    fn from(value: &AttrValue) -> Self {
        match value {
            AttrValue::Literal(v) => Self::Literal { value: v.clone() },
            AttrValue::Ref(r) => Self::Ref {
                target: r.target.clone(),
                output: r.output.clone(),
            },
            AttrValue::Composite { value, refs } => Self::Template {
                value: value.clone(),
                refs: refs.clone(),
            },
        }
    }
}

/// A single step of a deployment plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Position in the plan
    pub index: usize,
    /// Resource id
    pub resource: String,
    pub kind: String,
    pub provider: String,
    pub action: PlanAction,
    /// Direct predecessors (resource ids)
    pub depends_on: BTreeSet<String>,
    /// Declared attributes, in declaration order
    #[serde(default)]
    pub attributes: IndexMap<String, PlanValue>,
}

/// Ordered deployment plan for one stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub stack: String,
    /// `blake3:<hex>` over providers, secrets, and the canonical step list
    pub fingerprint: String,
    /// Settings of every provider the steps use
    #[serde(default)]
    pub providers: IndexMap<String, ProviderSettings>,
    /// Secrets the executor must supply
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub secrets: IndexMap<String, SecretBinding>,
    pub steps: Vec<PlanStep>,
}

/// Plans for every stack of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePlan {
    pub name: String,
    pub generator: String,
    pub plans: Vec<Plan>,
}

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template substitution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Tests
// ============================================================================
