//! Stack composition: templates plus environment options become stacks.
//!
//! A template declares typed options and the providers/resources of one
//! topology. Only `{{config.<key>}}` placeholders vary between environments;
//! `{{resources...}}` expressions pass through untouched, so every stack
//! composed from one template has the same graph shape. Sensitive options
//! are substituted as `{{secrets.<key>}}` and listed on the stack; their
//! values are checked here but never written into a declaration.

use super::error::{Phase, Result, SynthError, Violations};
use super::reference::scan_expressions;
use super::types::{
    yaml_value_to_string, ProviderSettings, ResourceDecl, SecretBinding, Stack, StackDecl,
};
use super::validator::describe;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::path::Path;

const CONFIG_PREFIX: &str = "config.";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("cloud-vm", include_str!("../../templates/cloud-vm.yaml")),
    (
        "container-network",
        include_str!("../../templates/container-network.yaml"),
    ),
    (
        "managed-serverless",
        include_str!("../../templates/managed-serverless.yaml"),
    ),
];

/// A template file: option declarations plus the topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub template: TemplateMetadata,
    #[serde(default)]
    pub providers: IndexMap<String, ProviderSettings>,
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,
}

/// Template metadata and option declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateMetadata {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: IndexMap<String, TemplateOption>,
}

/// A template option declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateOption {
    /// string | int | bool | list
    #[serde(rename = "type", default = "default_option_type")]
    pub option_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: Option<Value>,
    /// Secrets: never defaulted, faked only in dev mode
    #[serde(default)]
    pub sensitive: bool,
    /// Environment variable the CLI reads this option from
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub choices: Vec<String>,
}

fn default_option_type() -> String {
    "string".to_string()
}

/// Option values for one composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    pub values: IndexMap<String, Value>,
    /// Substitute fake values for missing sensitive options
    pub dev_mode: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }
}

/// Option values supplied from outside the workspace file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    /// Per stack name: values of the environment variables bound by that
    /// stack's template. The stack's declared options win over these.
    pub env: IndexMap<String, IndexMap<String, Value>>,
    /// Values for every stack, winning over everything else
    pub set: IndexMap<String, Value>,
}

impl Overrides {
    /// Option values for one stack, lowest precedence first: environment,
    /// declared options, explicit values.
    pub fn for_stack(
        &self,
        name: &str,
        declared: &IndexMap<String, Value>,
    ) -> IndexMap<String, Value> {
        let mut values = self.env.get(name).cloned().unwrap_or_default();
        values.extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));
        values.extend(self.set.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }
}

/// Options resolved for one composition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions {
    /// Values substituted for `{{config.<key>}}`
    pub values: IndexMap<String, Value>,
    /// Sensitive options passed by reference
    pub secrets: IndexMap<String, SecretBinding>,
}

/// Load a template from a YAML file.
pub fn load_template(path: &Path) -> Result<TemplateFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SynthError::Io(format!("cannot read template {}: {}", path.display(), e)))?;
    parse_template(&content)
}

/// Parse and check a template from a YAML string.
pub fn parse_template(yaml: &str) -> Result<TemplateFile> {
    let file: TemplateFile = serde_yaml_ng::from_str(yaml)
        .map_err(|e| SynthError::Parse(format!("template parse error: {}", e)))?;
    check_template(&file)?;
    Ok(file)
}

/// Names of the built-in templates.
pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN_TEMPLATES.iter().map(|(name, _)| *name).collect()
}

/// Load a built-in template by name.
pub fn builtin_template(name: &str) -> Result<TemplateFile> {
    let (_, yaml) = BUILTIN_TEMPLATES
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| SynthError::InvalidTemplate {
            template: name.to_string(),
            reason: format!("unknown template (available: {})", builtin_names().join(", ")),
        })?;
    parse_template(yaml)
}

/// Options the CLI may read from the process environment: `(option, variable)`.
pub fn env_bindings(template: &TemplateFile) -> impl Iterator<Item = (&str, &str)> {
    template
        .template
        .options
        .iter()
        .filter_map(|(key, opt)| opt.env.as_deref().map(|var| (key.as_str(), var)))
}

fn check_template(file: &TemplateFile) -> Result<()> {
    let meta = &file.template;
    let invalid = |reason: String| SynthError::InvalidTemplate {
        template: meta.name.clone(),
        reason,
    };

    for (key, opt) in &meta.options {
        if !matches!(opt.option_type.as_str(), "string" | "int" | "bool" | "list") {
            return Err(invalid(format!(
                "option '{}' has unknown type '{}'",
                key, opt.option_type
            )));
        }
        if opt.sensitive && opt.option_type != "string" {
            return Err(invalid(format!("sensitive option '{}' must be a string", key)));
        }
        match &opt.default {
            Some(_) if opt.sensitive => {
                return Err(invalid(format!(
                    "sensitive option '{}' cannot declare a default",
                    key
                )));
            }
            Some(default) => {
                coerce(opt, default)
                    .map_err(|reason| invalid(format!("default of '{}' {}", key, reason)))?;
            }
            None => {}
        }
    }

    let mut used = Vec::new();
    for settings in file.providers.values() {
        for value in settings.values() {
            placeholders(value, &mut used).map_err(&invalid)?;
        }
    }
    for decl in file.resources.values() {
        for value in decl.attributes.values() {
            collect_placeholders(value, &mut used).map_err(&invalid)?;
        }
    }
    if let Some(key) = used.iter().find(|k| !meta.options.contains_key(*k)) {
        return Err(invalid(format!(
            "placeholder refers to undeclared option '{}'",
            key
        )));
    }
    Ok(())
}

fn placeholders(s: &str, out: &mut Vec<String>) -> std::result::Result<(), String> {
    for (_, _, body) in scan_expressions(s)? {
        if let Some(key) = body.strip_prefix(CONFIG_PREFIX) {
            out.push(key.to_string());
        }
    }
    Ok(())
}

fn collect_placeholders(value: &Value, out: &mut Vec<String>) -> std::result::Result<(), String> {
    match value {
        Value::String(s) => placeholders(s, out),
        Value::Sequence(items) => items.iter().try_for_each(|v| collect_placeholders(v, out)),
        Value::Mapping(map) => map.values().try_for_each(|v| collect_placeholders(v, out)),
        Value::Tagged(t) => collect_placeholders(&t.value, out),
        _ => Ok(()),
    }
}

/// Coerce a raw option value to the option's declared type.
fn coerce(opt: &TemplateOption, value: &Value) -> std::result::Result<Value, String> {
    let coerced = match (opt.option_type.as_str(), value) {
        ("int", Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
        ("int", Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("must be an integer, got '{}'", s))?,
        ("int", other) => return Err(format!("must be an integer, got {}", describe(other))),
        ("bool", Value::Bool(_)) => value.clone(),
        ("bool", Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(format!("must be true or false, got '{}'", s)),
        },
        ("bool", other) => return Err(format!("must be a boolean, got {}", describe(other))),
        ("list", Value::Sequence(_)) => value.clone(),
        ("list", Value::String(s)) => Value::Sequence(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        ("list", other) => return Err(format!("must be a list, got {}", describe(other))),
        (_, Value::String(_)) => value.clone(),
        (_, Value::Number(_) | Value::Bool(_)) => Value::String(yaml_value_to_string(value)),
        (_, other) => return Err(format!("must be a string, got {}", describe(other))),
    };

    if !opt.choices.is_empty() && !opt.choices.contains(&interpolate(&coerced)) {
        return Err(format!("must be one of: {}", opt.choices.join(", ")));
    }
    Ok(coerced)
}

/// A secret given as an empty or blank string counts as not given.
fn is_blank(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

/// Resolve every declared option of a template for one stack.
///
/// Values come from the environment, then the option's default; missing
/// sensitive options are faked only in dev mode. Supplied sensitive values
/// are checked, then replaced by `{{secrets.<key>}}`. All problems are
/// reported together.
pub fn resolve_options(
    template: &TemplateFile,
    stack: &str,
    env: &Environment,
) -> Result<ResolvedOptions> {
    let meta = &template.template;
    for key in env.values.keys().filter(|k| !meta.options.contains_key(*k)) {
        tracing::debug!(stack, template = %meta.name, option = %key, "ignoring unrecognized option");
    }

    let mut resolved = ResolvedOptions::default();
    let mut errors = Vec::new();

    for (key, opt) in &meta.options {
        let given = env
            .values
            .get(key)
            .filter(|v| !v.is_null() && !(opt.sensitive && is_blank(v)));
        let (raw, by_reference) = match (given, &opt.default) {
            (Some(value), _) => (value.clone(), opt.sensitive),
            (None, Some(default)) => (default.clone(), false),
            (None, None) if opt.sensitive && env.dev_mode => {
                tracing::warn!(
                    stack,
                    option = %key,
                    "dev mode: using an insecure placeholder for a sensitive option"
                );
                (Value::String(format!("insecure-dev-{}", key)), false)
            }
            (None, None) => {
                errors.push(SynthError::MissingConfiguration {
                    stack: stack.to_string(),
                    key: key.clone(),
                });
                continue;
            }
        };

        match coerce(opt, &raw) {
            Ok(_) if by_reference => {
                resolved.values.insert(
                    key.clone(),
                    Value::String(format!("{{{{secrets.{}}}}}", key)),
                );
                resolved.secrets.insert(
                    key.clone(),
                    SecretBinding {
                        env: opt.env.clone(),
                    },
                );
            }
            Ok(value) => {
                resolved.values.insert(key.clone(), value);
            }
            Err(reason) => errors.push(SynthError::InvalidOption {
                stack: stack.to_string(),
                key: key.clone(),
                reason,
            }),
        }
    }

    if !errors.is_empty() {
        return Err(SynthError::Invalid(Violations {
            phase: Phase::Configuration,
            errors,
        }));
    }
    Ok(resolved)
}

/// Render a resolved option as text for interpolation.
fn interpolate(value: &Value) -> String {
    match value {
        Value::Sequence(items) => items
            .iter()
            .map(yaml_value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => yaml_value_to_string(other),
    }
}

fn option<'a>(options: &'a IndexMap<String, Value>, key: &str) -> std::result::Result<&'a Value, String> {
    options
        .get(key)
        .ok_or_else(|| format!("placeholder refers to undeclared option '{}'", key))
}

/// Substitute `{{config.X}}` in a string. A string that is exactly one
/// placeholder takes the option's typed value.
fn substitute_str(s: &str, options: &IndexMap<String, Value>) -> std::result::Result<Value, String> {
    let spans = scan_expressions(s)?;

    if let [(0, end, body)] = spans.as_slice() {
        if let (true, Some(key)) = (*end == s.len(), body.strip_prefix(CONFIG_PREFIX)) {
            return option(options, key).cloned();
        }
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for (open, close, body) in spans {
        if let Some(key) = body.strip_prefix(CONFIG_PREFIX) {
            out.push_str(&s[last..open]);
            out.push_str(&interpolate(option(options, key)?));
            last = close;
        }
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

fn substitute(value: &Value, options: &IndexMap<String, Value>) -> std::result::Result<Value, String> {
    match value {
        Value::String(s) => substitute_str(s, options),
        Value::Sequence(items) => items
            .iter()
            .map(|v| substitute(v, options))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Sequence),
        Value::Mapping(map) => {
            let mut out = serde_yaml_ng::Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, options)?);
            }
            Ok(Value::Mapping(out))
        }
        Value::Tagged(t) => {
            let mut t = t.clone();
            t.value = substitute(&t.value, options)?;
            Ok(Value::Tagged(t))
        }
        other => Ok(other.clone()),
    }
}

/// Compose a concrete stack from a template and an environment.
pub fn compose(template: &TemplateFile, stack_name: &str, env: &Environment) -> Result<Stack> {
    let ResolvedOptions {
        values: options,
        secrets,
    } = resolve_options(template, stack_name, env)?;
    let invalid = |reason: String| SynthError::InvalidTemplate {
        template: template.template.name.clone(),
        reason,
    };

    let mut stack = Stack::new(stack_name);
    stack.secrets = secrets;
    for (provider, settings) in &template.providers {
        let mut resolved = ProviderSettings::new();
        for (key, value) in settings {
            let value = substitute_str(value, &options).map_err(&invalid)?;
            resolved.insert(key.clone(), interpolate(&value));
        }
        stack.providers.insert(provider.clone(), resolved);
    }

    for (name, decl) in &template.resources {
        let mut attributes = IndexMap::new();
        for (attr, value) in &decl.attributes {
            attributes.insert(attr.clone(), substitute(value, &options).map_err(&invalid)?);
        }
        stack.resources.insert(
            name.clone(),
            ResourceDecl {
                kind: decl.kind.clone(),
                depends_on: decl.depends_on.clone(),
                attributes,
            },
        );
    }

    tracing::debug!(
        stack = stack_name,
        template = %template.template.name,
        resources = stack.resources.len(),
        "composed stack"
    );
    Ok(stack)
}

/// Compose a workspace stack declaration: its template (if any) with the
/// option values `overrides` yields for this stack, then the inline
/// providers and resources.
pub fn compose_stack(name: &str, decl: &StackDecl, overrides: &Overrides) -> Result<Stack> {
    let mut stack = match &decl.template {
        Some(template_name) => {
            let template = builtin_template(template_name)?;
            let env = Environment {
                values: overrides.for_stack(name, &decl.options),
                dev_mode: decl.dev_mode,
            };
            compose(&template, name, &env)?
        }
        None => {
            if !decl.options.is_empty() {
                tracing::debug!(stack = name, "options ignored: stack has no template");
            }
            Stack::new(name)
        }
    };

    for (provider, settings) in &decl.providers {
        stack
            .providers
            .entry(provider.clone())
            .or_default()
            .extend(settings.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    for (resource, rdecl) in &decl.resources {
        if stack.resources.contains_key(resource) {
            return Err(SynthError::Parse(format!(
                "stack '{}': resource '{}' is already declared by template '{}'",
                name,
                resource,
                decl.template.as_deref().unwrap_or_default()
            )));
        }
        stack.resources.insert(resource.clone(), rdecl.clone());
    }

    Ok(stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::build_graph;
    use crate::core::planner::synthesize_plan;
    use crate::core::reference::Scope;
    use crate::core::validator::validate;

    const TEMPLATE_YAML: &str = r#"
template:
  name: web
  options:
    image:
      type: string
      default: nginx
    port:
      type: int
      default: 8080
    replicas:
      type: int
      choices: ["1", "2", "3"]
      default: 1
    token:
      type: string
      sensitive: true
      env: WEB_TOKEN
providers:
  docker: {}
resources:
  net:
    kind: docker_network
    name: web-net
  app:
    kind: docker_container
    image: "{{config.image}}:latest"
    name: web
    ports:
      - { internal: 80, external: "{{config.port}}" }
    env:
      - "TOKEN={{config.token}}"
    networks_advanced:
      - { name: "{{resources.net.name}}" }
"#;

    fn web() -> TemplateFile {
        parse_template(TEMPLATE_YAML).unwrap()
    }

    fn violations(err: SynthError) -> Violations {
        match err {
            SynthError::Invalid(v) => v,
            other => panic!("expected violations, got {:?}", other),
        }
    }

    fn container_network_env() -> Environment {
        Environment::new()
            .set("postgres_password", "pw")
            .set("google_client_id", "client")
            .set("google_client_secret", "secret")
            .set("openai_api_key", "key")
    }

    #[test]
    fn test_parse_template() {
        let t = web();
        assert_eq!(t.template.name, "web");
        assert_eq!(t.template.options.len(), 4);
        assert_eq!(t.resources.len(), 2);
        assert_eq!(
            env_bindings(&t).collect::<Vec<_>>(),
            vec![("token", "WEB_TOKEN")]
        );
    }

    #[test]
    fn test_sensitive_option_with_default_rejected() {
        let yaml = r#"
template:
  name: leaky
  options:
    password:
      type: string
      sensitive: true
      default: hunter2
"#;
        let err = parse_template(yaml).unwrap_err();
        assert!(matches!(err, SynthError::InvalidTemplate { .. }));
        assert!(err.to_string().contains("cannot declare a default"));
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let yaml = r#"
template:
  name: broken
resources:
  net:
    kind: docker_network
    name: "{{config.missing}}"
"#;
        let err = parse_template(yaml).unwrap_err();
        assert!(err.to_string().contains("undeclared option 'missing'"));
    }

    #[test]
    fn test_unknown_option_type_rejected() {
        let yaml = r#"
template:
  name: broken
  options:
    size:
      type: float
"#;
        assert!(parse_template(yaml).is_err());
    }

    #[test]
    fn test_default_checked_against_type() {
        let yaml = r#"
template:
  name: broken
  options:
    port:
      type: int
      default: eighty
"#;
        let err = parse_template(yaml).unwrap_err();
        assert!(err.to_string().contains("must be an integer"));
    }

    #[test]
    fn test_compose_applies_defaults_and_types() {
        let env = Environment::new().set("token", "abc");
        let stack = compose(&web(), "dev", &env).unwrap();
        let app = &stack.resources["app"];
        assert_eq!(app.attributes["image"], Value::from("nginx:latest"));
        let ports = app.attributes["ports"].as_sequence().unwrap();
        assert_eq!(ports[0]["external"], Value::from(8080));
        assert_eq!(
            app.attributes["env"].as_sequence().unwrap()[0],
            Value::from("TOKEN={{secrets.token}}")
        );
        assert_eq!(
            stack.secrets["token"],
            SecretBinding {
                env: Some("WEB_TOKEN".into())
            }
        );
        assert!(stack.providers.contains_key("docker"));
    }

    #[test]
    fn test_secret_values_never_reach_declarations() {
        let env = Environment::new().set("token", "hunter2");
        let stack = compose(&web(), "dev", &env).unwrap();
        let yaml = serde_yaml_ng::to_string(&stack).unwrap();
        assert!(!yaml.contains("hunter2"));
        assert!(yaml.contains("{{secrets.token}}"));
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        for blank in ["", "   "] {
            let env = Environment::new().set("token", blank);
            let v = violations(compose(&web(), "prod", &env).unwrap_err());
            assert_eq!(
                v.errors,
                vec![SynthError::MissingConfiguration {
                    stack: "prod".into(),
                    key: "token".into(),
                }]
            );

            let dev = compose(&web(), "dev", &env.clone().dev_mode(true)).unwrap();
            assert_eq!(
                dev.resources["app"].attributes["env"].as_sequence().unwrap()[0],
                Value::from("TOKEN=insecure-dev-token")
            );
            assert!(dev.secrets.is_empty());
        }
    }

    #[test]
    fn test_blank_secrets_fail_builtin_template() {
        let t = builtin_template("container-network").unwrap();
        let env = Environment::new()
            .set("postgres_password", "")
            .set("google_client_id", "")
            .set("google_client_secret", " ")
            .set("openai_api_key", "");
        let v = violations(compose(&t, "prod", &env).unwrap_err());
        assert_eq!(v.len(), 4);
        assert!(v
            .iter()
            .all(|e| matches!(e, SynthError::MissingConfiguration { .. })));
    }

    #[test]
    fn test_blank_plain_option_is_kept() {
        let env = Environment::new().set("token", "t").set("image", "");
        let options = resolve_options(&web(), "dev", &env).unwrap();
        assert_eq!(options.values["image"], Value::from(""));
    }

    #[test]
    fn test_sensitive_option_must_be_string() {
        let yaml = r#"
template:
  name: broken
  options:
    pin:
      type: int
      sensitive: true
"#;
        let err = parse_template(yaml).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn test_resource_references_pass_through() {
        let stack = compose(&web(), "dev", &Environment::new().set("token", "t")).unwrap();
        let nets = stack.resources["app"].attributes["networks_advanced"]
            .as_sequence()
            .unwrap();
        assert_eq!(nets[0]["name"], Value::from("{{resources.net.name}}"));
    }

    #[test]
    fn test_string_values_coerced() {
        let env = Environment::new()
            .set("token", "t")
            .set("port", "9090")
            .set("replicas", 2);
        let options = resolve_options(&web(), "dev", &env).unwrap();
        assert_eq!(options.values["port"], Value::from(9090));
        assert_eq!(options.values["replicas"], Value::from(2));
    }

    #[test]
    fn test_invalid_options_batched() {
        let env = Environment::new().set("port", "http").set("replicas", 7);
        let v = violations(resolve_options(&web(), "dev", &env).unwrap_err());
        assert_eq!(v.phase, Phase::Configuration);
        assert_eq!(v.len(), 3);
        assert!(v.iter().any(|e| matches!(e, SynthError::MissingConfiguration { key, .. } if key == "token")));
        assert!(v.iter().any(|e| e.to_string().contains("one of: 1, 2, 3")));
    }

    #[test]
    fn test_missing_sensitive_option_fails() {
        let v = violations(compose(&web(), "prod", &Environment::new()).unwrap_err());
        assert_eq!(
            v.errors,
            vec![SynthError::MissingConfiguration {
                stack: "prod".into(),
                key: "token".into(),
            }]
        );
    }

    #[test]
    fn test_dev_mode_uses_insecure_placeholder() {
        let stack = compose(&web(), "dev", &Environment::new().dev_mode(true)).unwrap();
        assert_eq!(
            stack.resources["app"].attributes["env"].as_sequence().unwrap()[0],
            Value::from("TOKEN=insecure-dev-token")
        );
    }

    #[test]
    fn test_dev_mode_does_not_fake_required_plain_options() {
        let t = builtin_template("managed-serverless").unwrap();
        let v = violations(compose(&t, "dev", &Environment::new().dev_mode(true)).unwrap_err());
        let keys: Vec<String> = v
            .iter()
            .filter_map(|e| match e {
                SynthError::MissingConfiguration { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec!["project", "postgres_host", "dragonfly_host", "google_redirect_uri"]
        );
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let env = Environment::new().set("token", "t").set("colour", "blue");
        assert!(compose(&web(), "dev", &env).is_ok());
    }

    #[test]
    fn test_builtin_templates_parse() {
        assert_eq!(
            builtin_names(),
            vec!["cloud-vm", "container-network", "managed-serverless"]
        );
        for name in builtin_names() {
            let t = builtin_template(name).unwrap();
            assert_eq!(t.template.name, name);
            for opt in t.template.options.values() {
                assert!(!(opt.sensitive && opt.default.is_some()));
            }
        }
        assert!(matches!(
            builtin_template("nope").unwrap_err(),
            SynthError::InvalidTemplate { .. }
        ));
    }

    /// Strip the stack prefix so graphs of different stacks compare.
    fn shape(stack: &Stack) -> (Vec<(String, String)>, Vec<(String, String)>) {
        let g = build_graph(&Scope::new(stack)).unwrap();
        let local = |id: &str| id.split_once('/').map(|(_, n)| n.to_string()).unwrap_or_default();
        let nodes = g
            .nodes
            .values()
            .map(|n| (n.name.clone(), n.kind.clone()))
            .collect();
        let edges = g
            .edges
            .iter()
            .map(|e| (local(e.from()), local(e.to())))
            .collect();
        (nodes, edges)
    }

    #[test]
    fn test_topology_independent_of_environment() {
        let t = builtin_template("container-network").unwrap();
        let dev = compose(&t, "dev", &Environment::new().dev_mode(true)).unwrap();
        let prod = compose(
            &t,
            "prod",
            &container_network_env()
                .set("network_name", "prod-net")
                .set("api_port", "8080")
                .set("api_image_tag", "v2"),
        )
        .unwrap();
        assert_eq!(shape(&dev), shape(&prod));
        assert_ne!(dev.resources["api"], prod.resources["api"]);
    }

    #[test]
    fn test_container_network_plans() {
        let t = builtin_template("container-network").unwrap();
        let stack = compose(&t, "dev", &container_network_env()).unwrap();
        let graph = build_graph(&Scope::new(&stack)).unwrap();
        validate(&stack, &graph).unwrap();
        let plan = synthesize_plan(&graph).unwrap();
        let order: Vec<&str> = plan.steps.iter().map(|s| s.resource.as_str()).collect();
        assert_eq!(
            order,
            vec!["dev/network", "dev/postgres", "dev/redis", "dev/dragonfly", "dev/api"]
        );
        let api = plan.step("dev/api").unwrap();
        assert_eq!(api.depends_on.len(), 4);
    }

    #[test]
    fn test_cloud_vm_plans() {
        let t = builtin_template("cloud-vm").unwrap();
        let env = Environment::new()
            .set("db_password", "pw")
            .set("subnet_ids", "subnet-a, subnet-b");
        let stack = compose(&t, "prod", &env).unwrap();
        assert_eq!(stack.providers["aws"]["region"], "us-east-1");
        let subnets = stack.resources["db_subnet_group"].attributes["subnet_ids"].clone();
        assert_eq!(
            subnets,
            Value::Sequence(vec![Value::from("subnet-a"), Value::from("subnet-b")])
        );
        let graph = build_graph(&Scope::new(&stack)).unwrap();
        validate(&stack, &graph).unwrap();
        let plan = synthesize_plan(&graph).unwrap();
        assert_eq!(plan.steps[0].resource, "prod/security_group");
        assert!(plan.position("prod/db_subnet_group") < plan.position("prod/postgres"));
    }

    #[test]
    fn test_managed_serverless_plans() {
        let t = builtin_template("managed-serverless").unwrap();
        let env = Environment::new()
            .set("project", "acme")
            .set("postgres_host", "10.0.0.5")
            .set("dragonfly_host", "10.0.0.6")
            .set("google_redirect_uri", "https://acme.example/callback")
            .dev_mode(true);
        let stack = compose(&t, "prod", &env).unwrap();
        assert_eq!(
            stack.resources["service"].attributes["image"],
            Value::from("gcr.io/acme/chat-api:latest")
        );
        let graph = build_graph(&Scope::new(&stack)).unwrap();
        validate(&stack, &graph).unwrap();
        let plan = synthesize_plan(&graph).unwrap();
        let invoker = plan.step("prod/public_invoker").unwrap();
        assert!(invoker.depends_on.contains("prod/service"));
    }

    #[test]
    fn test_compose_stack_merges_inline_declarations() {
        let decl: StackDecl = serde_yaml_ng::from_str(
            r#"
template: container-network
dev_mode: true
options:
  api_port: 9000
providers:
  docker:
    host: unix:///var/run/docker.sock
resources:
  extra:
    kind: docker_network
    name: extra
"#,
        )
        .unwrap();
        let mut overrides = Overrides::default();
        overrides
            .set
            .insert("api_port".to_string(), Value::from("9100"));
        let stack = compose_stack("dev", &decl, &overrides).unwrap();
        assert_eq!(
            stack.providers["docker"]["host"],
            "unix:///var/run/docker.sock"
        );
        assert_eq!(stack.resources.last().unwrap().0, "extra");
        let ports = stack.resources["api"].attributes["ports"].as_sequence().unwrap();
        assert_eq!(ports[0]["external"], Value::from(9100));
    }

    #[test]
    fn test_override_precedence() {
        let mut overrides = Overrides::default();
        let mut env = IndexMap::new();
        env.insert("region".to_string(), Value::from("from-env"));
        env.insert("project".to_string(), Value::from("env-project"));
        overrides.env.insert("prod".to_string(), env);
        overrides.set.insert("project".to_string(), Value::from("flag-project"));

        let mut declared = IndexMap::new();
        declared.insert("region".to_string(), Value::from("eu-west-1"));
        let values = overrides.for_stack("prod", &declared);
        assert_eq!(values["region"], Value::from("eu-west-1"));
        assert_eq!(values["project"], Value::from("flag-project"));

        let other = overrides.for_stack("dev", &IndexMap::new());
        assert_eq!(other.get("region"), None);
        assert_eq!(other["project"], Value::from("flag-project"));
    }

    #[test]
    fn test_env_values_reach_only_their_stack() {
        let vm: StackDecl = serde_yaml_ng::from_str(
            r#"
template: cloud-vm
options:
  region: eu-west-1
  db_password: pw
  subnet_ids: [subnet-a]
"#,
        )
        .unwrap();
        let mut overrides = Overrides::default();
        let mut serverless_env = IndexMap::new();
        serverless_env.insert("region".to_string(), Value::from("us-central1"));
        overrides.env.insert("serverless".to_string(), serverless_env);

        let stack = compose_stack("vm", &vm, &overrides).unwrap();
        assert_eq!(stack.providers["aws"]["region"], "eu-west-1");
    }

    #[test]
    fn test_compose_stack_rejects_duplicate_resource() {
        let decl: StackDecl = serde_yaml_ng::from_str(
            r#"
template: container-network
dev_mode: true
resources:
  api:
    kind: docker_network
    name: clash
"#,
        )
        .unwrap();
        let err = compose_stack("dev", &decl, &Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("already declared"));
    }

    #[test]
    fn test_compose_stack_without_template() {
        let decl: StackDecl = serde_yaml_ng::from_str(
            r#"
providers:
  docker: {}
resources:
  net:
    kind: docker_network
    name: n
"#,
        )
        .unwrap();
        let stack = compose_stack("solo", &decl, &Overrides::default()).unwrap();
        assert_eq!(stack.resources.len(), 1);
        assert!(stack.providers.contains_key("docker"));
    }
}
