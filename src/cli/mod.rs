//! CLI subcommands: init, validate, plan, verify, kinds, templates, compose.
//!
//! The only place that reads the process environment: template options
//! bound to environment variables are collected here, per stack, and handed
//! to the core as ordinary option values.

use crate::core::composer::{self, Environment, Overrides, TemplateFile};
use crate::core::registry::Registry;
use crate::core::types::{yaml_value_to_string, Workspace, WorkspacePlan};
use crate::core::{parser, store, synth};
use clap::Subcommand;
use indexmap::IndexMap;
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stackweld workspace
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Compose and validate every stack without writing a plan
    Validate {
        /// Path to stackweld.yaml
        #[arg(short, long, default_value = "stackweld.yaml")]
        file: PathBuf,

        /// Override a template option (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Synthesize deployment plans
    Plan {
        /// Path to stackweld.yaml
        #[arg(short, long, default_value = "stackweld.yaml")]
        file: PathBuf,

        /// Only show this stack
        #[arg(short, long)]
        stack: Option<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// Also write the plan file here
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override a template option (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Check that a saved plan still matches the declarations
    Verify {
        /// Path to stackweld.yaml
        #[arg(short, long, default_value = "stackweld.yaml")]
        file: PathBuf,

        /// Saved plan file
        #[arg(short, long, default_value = "plan.json")]
        plan: PathBuf,

        /// Override a template option (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// List providers, resource kinds, and their attributes
    Kinds {
        /// Only this provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// List built-in templates and their options
    Templates,

    /// Compose one stack from a template and print it (secrets by reference)
    Compose {
        /// Built-in template name
        #[arg(required_unless_present = "template_file")]
        template: Option<String>,

        /// Read the template from a YAML file instead
        #[arg(long, value_name = "PATH", conflicts_with = "template")]
        template_file: Option<PathBuf>,

        /// Stack name
        #[arg(short, long, default_value = "dev")]
        stack: String,

        /// Override a template option (KEY=VALUE, repeatable)
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Use insecure placeholders for missing secrets
        #[arg(long)]
        dev_mode: bool,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file, set } => cmd_validate(&file, &set),
        Commands::Plan {
            file,
            stack,
            json,
            out,
            set,
        } => cmd_plan(&file, stack.as_deref(), json, out.as_deref(), &set),
        Commands::Verify { file, plan, set } => cmd_verify(&file, &plan, &set),
        Commands::Kinds { provider } => cmd_kinds(provider.as_deref()),
        Commands::Templates => cmd_templates(),
        Commands::Compose {
            template,
            template_file,
            stack,
            set,
            dev_mode,
        } => cmd_compose(
            template.as_deref(),
            template_file.as_deref(),
            &stack,
            &set,
            dev_mode,
        ),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("stackweld.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create {}: {}", path.display(), e))?;

    let template = r#"version: "1.0"
name: my-infrastructure
description: "Synthesized by stackweld"

stacks:
  dev:
    template: container-network
    dev_mode: true
    options:
      api_image_tag: latest
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized stackweld workspace at {}", path.display());
    println!("  Created: {}", config_path.display());
    Ok(())
}

/// Parse and structurally validate a workspace file.
fn load_workspace(file: &Path) -> Result<Workspace, String> {
    let ws = parser::parse_workspace_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_workspace(&ws);
    if errors.is_empty() {
        return Ok(ws);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

/// Non-empty value of an environment variable.
fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Parse `KEY=VALUE` pairs.
fn parse_set(pairs: &[String]) -> Result<IndexMap<String, Value>, String> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("--set expects KEY=VALUE, got '{}'", pair))?;
            Ok((key.trim().to_string(), Value::String(value.to_string())))
        })
        .collect()
}

/// Bind a template's environment-backed options through `lookup`.
fn env_options(
    template: &TemplateFile,
    lookup: &dyn Fn(&str) -> Option<String>,
    into: &mut IndexMap<String, Value>,
) {
    for (key, var) in composer::env_bindings(template) {
        if let Some(value) = lookup(var) {
            tracing::debug!(option = key, variable = var, "option from environment");
            into.insert(key.to_string(), Value::String(value));
        }
    }
}

/// Option overrides for a workspace: for each templated stack, the
/// environment variables its own template binds; `--set` pairs for all.
fn collect_overrides(
    ws: &Workspace,
    set: &[String],
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Overrides, String> {
    let mut overrides = Overrides::default();
    for (stack, decl) in &ws.stacks {
        let Some(name) = &decl.template else {
            continue;
        };
        let template = composer::builtin_template(name).map_err(|e| e.to_string())?;
        let mut bound = IndexMap::new();
        env_options(&template, lookup, &mut bound);
        if !bound.is_empty() {
            overrides.env.insert(stack.clone(), bound);
        }
    }
    overrides.set = parse_set(set)?;
    Ok(overrides)
}

fn synthesize_file(file: &Path, set: &[String]) -> Result<WorkspacePlan, String> {
    let ws = load_workspace(file)?;
    let overrides = collect_overrides(&ws, set, &process_env)?;
    synth::synthesize(&ws, &overrides).map_err(|e| e.to_string())
}

fn cmd_validate(file: &Path, set: &[String]) -> Result<(), String> {
    let plan = synthesize_file(file, set)?;
    let resources: usize = plan.plans.iter().map(|p| p.steps.len()).sum();
    println!(
        "OK: {} ({} stacks, {} resources)",
        plan.name,
        plan.plans.len(),
        resources
    );
    Ok(())
}

fn cmd_plan(
    file: &Path,
    stack_filter: Option<&str>,
    json: bool,
    out: Option<&Path>,
    set: &[String],
) -> Result<(), String> {
    let mut plan = synthesize_file(file, set)?;

    if let Some(filter) = stack_filter {
        if !plan.plans.iter().any(|p| p.stack == filter) {
            return Err(format!("unknown stack '{}'", filter));
        }
        plan.plans.retain(|p| p.stack == filter);
    }

    if let Some(path) = out {
        store::save_plan(path, &plan).map_err(|e| e.to_string())?;
    }

    if json {
        println!("{}", store::plan_json(&plan).map_err(|e| e.to_string())?);
    } else {
        print_plan(&plan);
        if let Some(path) = out {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Display a plan to stdout.
fn print_plan(plan: &WorkspacePlan) {
    println!("Planning: {} ({} stacks)", plan.name, plan.plans.len());

    let mut total = 0;
    for p in &plan.plans {
        println!();
        println!("{} ({}):", p.stack, p.fingerprint);
        for step in &p.steps {
            let after = if step.depends_on.is_empty() {
                String::new()
            } else {
                let deps: Vec<&str> = step.depends_on.iter().map(String::as_str).collect();
                format!("  after {}", deps.join(", "))
            };
            println!("  + {} [{}]{}", step.resource, step.kind, after);
        }
        let providers: Vec<String> = p
            .by_provider()
            .iter()
            .map(|(name, steps)| format!("{} {}", name, steps.len()))
            .collect();
        println!(
            "  {} in {} wave(s); {}",
            p.summary(),
            p.waves().len(),
            providers.join(", ")
        );
        if !p.secrets.is_empty() {
            let keys: Vec<&str> = p.secrets.keys().map(String::as_str).collect();
            println!("  secrets: {}", keys.join(", "));
        }
        total += p.steps.len();
    }

    println!();
    println!("Plan: {} to create.", total);
}

fn cmd_verify(file: &Path, plan_path: &Path, set: &[String]) -> Result<(), String> {
    let saved = store::load_plan(plan_path)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no plan at {}", plan_path.display()))?;
    let current = synthesize_file(file, set)?;

    let stale = store::stale_stacks(&saved, &current);
    if stale.is_empty() {
        println!(
            "OK: {} matches current declarations ({} stacks)",
            plan_path.display(),
            saved.plans.len()
        );
        return Ok(());
    }

    for s in &stale {
        println!(
            "  STALE: {} (saved {}, now {})",
            s.stack,
            s.saved.as_deref().unwrap_or("-"),
            s.current.as_deref().unwrap_or("-")
        );
    }
    Err(format!(
        "{} stack(s) changed since the plan was saved",
        stale.len()
    ))
}

fn cmd_kinds(provider_filter: Option<&str>) -> Result<(), String> {
    let registry = Registry::global();
    if let Some(p) = provider_filter {
        if registry.provider(p).is_none() {
            return Err(format!("unknown provider '{}'", p));
        }
    }

    for spec in registry
        .providers()
        .filter(|s| provider_filter.is_none_or(|p| p == s.name))
    {
        let settings = if spec.required_settings.is_empty() {
            "no required settings".to_string()
        } else {
            format!("requires {}", spec.required_settings.join(", "))
        };
        println!("{}: {} ({})", spec.name, spec.description, settings);

        for kind in registry.kinds_for(spec.name) {
            println!("  {}: {}", kind.kind, kind.description);
            for attr in &kind.attributes {
                let mut flags = Vec::new();
                if attr.required {
                    flags.push("required");
                }
                if attr.computed {
                    flags.push("computed");
                } else if attr.output {
                    flags.push("output");
                }
                println!(
                    "    {:<24} {:<13} {}",
                    attr.name,
                    attr.ty.to_string(),
                    flags.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn cmd_templates() -> Result<(), String> {
    for name in composer::builtin_names() {
        let t = composer::builtin_template(name).map_err(|e| e.to_string())?;
        println!(
            "{}: {}",
            name,
            t.template.description.as_deref().unwrap_or_default()
        );
        let resources: Vec<&str> = t.resources.keys().map(String::as_str).collect();
        println!("  resources: {}", resources.join(", "));
        println!("  options:");
        for (key, opt) in &t.template.options {
            let mut notes = vec![opt.option_type.clone()];
            match &opt.default {
                Some(d) => notes.push(format!("default {}", yaml_value_to_string(d))),
                None => notes.push("required".to_string()),
            }
            if opt.sensitive {
                notes.push("sensitive".to_string());
            }
            if let Some(var) = &opt.env {
                notes.push(format!("env {}", var));
            }
            println!("    {} ({})", key, notes.join(", "));
        }
    }
    Ok(())
}

/// A built-in template by name, or a template file.
fn select_template(name: Option<&str>, file: Option<&Path>) -> Result<TemplateFile, String> {
    let template = match (name, file) {
        (_, Some(path)) => composer::load_template(path),
        (Some(name), None) => composer::builtin_template(name),
        (None, None) => return Err("compose needs a template name or --template-file".into()),
    };
    template.map_err(|e| e.to_string())
}

/// Compose a stack and render it as YAML. Sensitive values appear only as
/// `{{secrets.<key>}}` references.
fn compose_yaml(
    template: &TemplateFile,
    stack: &str,
    set: &[String],
    dev_mode: bool,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String, String> {
    let mut env = Environment::new().dev_mode(dev_mode);
    env_options(template, lookup, &mut env.values);
    env.values.extend(parse_set(set)?);

    let composed = composer::compose(template, stack, &env).map_err(|e| e.to_string())?;
    serde_yaml_ng::to_string(&composed).map_err(|e| format!("serialize error: {}", e))
}

fn cmd_compose(
    template: Option<&str>,
    template_file: Option<&Path>,
    stack: &str,
    set: &[String],
    dev_mode: bool,
) -> Result<(), String> {
    let template = select_template(template, template_file)?;
    let yaml = compose_yaml(&template, stack, set, dev_mode, &process_env)?;
    print!("{}", yaml);
    Ok(())
}
