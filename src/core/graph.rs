//! Dependency graph construction: one DAG per stack.
//!
//! Nodes are the stack's resources in declaration order; edges come only
//! from explicit references and `depends_on` declarations. A resource nobody
//! references and that references nothing is an isolated node.

use super::error::{Phase, Result, SynthError, Violations};
use super::reference::{resolve_value, Scope};
use super::registry::Registry;
use super::types::{Edge, ProviderSettings, Reference, ResourceNode, SecretBinding};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Resources and dependency edges of one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGraph {
    pub stack: String,
    /// Nodes keyed by resource id, in declaration order
    pub nodes: IndexMap<String, ResourceNode>,
    pub edges: Vec<Edge>,
    /// Stack configuration of the providers the nodes use
    pub providers: IndexMap<String, ProviderSettings>,
    pub secrets: IndexMap<String, SecretBinding>,
}

impl DependencyGraph {
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Direct dependencies of `id` inside this graph, deduplicated, in edge
    /// order.
    pub fn dependencies_of<'a>(&'a self, id: &str) -> Vec<&'a str> {
        let mut deps: Vec<&str> = Vec::new();
        for e in self.edges.iter().filter(|e| e.from() == id) {
            if self.contains(e.to()) && !deps.contains(&e.to()) {
                deps.push(e.to());
            }
        }
        deps
    }

    /// Edges whose target lies outside the graph.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| !self.contains(e.to()))
    }

    /// Every cycle reachable by a three-colour depth-first traversal, one per
    /// back edge, each listed from the first revisited node onward.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let adjacency = self.adjacency();
        let mut colour: FxHashMap<&str, Colour> = FxHashMap::default();
        let mut path: Vec<&str> = Vec::new();
        let mut cycles = Vec::new();

        for id in self.nodes.keys() {
            if colour.get(id.as_str()).copied().unwrap_or(Colour::White) == Colour::White {
                visit(id, &adjacency, &mut colour, &mut path, &mut cycles);
            }
        }
        cycles
    }

    /// Forward adjacency (dependent → dependencies) restricted to the graph.
    fn adjacency(&self) -> FxHashMap<&str, Vec<&str>> {
        let mut adjacency: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for id in self.nodes.keys() {
            adjacency.insert(id, self.dependencies_of(id));
        }
        adjacency
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

fn visit<'a>(
    id: &'a str,
    adjacency: &FxHashMap<&'a str, Vec<&'a str>>,
    colour: &mut FxHashMap<&'a str, Colour>,
    path: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    colour.insert(id, Colour::Grey);
    path.push(id);

    for &next in adjacency.get(id).map(Vec::as_slice).unwrap_or_default() {
        match colour.get(next).copied().unwrap_or(Colour::White) {
            Colour::White => visit(next, adjacency, colour, path, cycles),
            Colour::Grey => {
                let start = path.iter().position(|p| *p == next).unwrap_or(0);
                cycles.push(path[start..].iter().map(|s| s.to_string()).collect());
            }
            Colour::Black => {}
        }
    }

    path.pop();
    colour.insert(id, Colour::Black);
}

/// Build the dependency graph of the scope's stack.
///
/// Resolution problems across every resource are collected and returned
/// together as one batch.
pub fn build_graph(scope: &Scope<'_>) -> Result<DependencyGraph> {
    let stack = scope.stack();
    let registry = Registry::global();
    let mut nodes = IndexMap::new();
    let mut edges = Vec::new();
    let mut errors = Vec::new();

    for (index, (name, decl)) in stack.resources.iter().enumerate() {
        let id = stack.resource_id(name);

        let provider = match registry.require(&id, &decl.kind) {
            Ok(desc) => desc.provider.to_string(),
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        let mut attributes = IndexMap::new();
        for (attr, raw) in &decl.attributes {
            match resolve_value(&id, raw, scope) {
                Ok(value) => {
                    for r in value.references() {
                        let edge = Edge::Reference(Reference {
                            from: id.clone(),
                            attribute: attr.clone(),
                            to: r.target.clone(),
                            output: r.output.clone(),
                        });
                        if !edges.contains(&edge) {
                            edges.push(edge);
                        }
                    }
                    attributes.insert(attr.clone(), value);
                }
                Err(errs) => errors.extend(errs),
            }
        }

        for dep in &decl.depends_on {
            match scope.resolve_dependency(&id, dep) {
                Ok(to) => edges.push(Edge::DependsOn {
                    from: id.clone(),
                    to,
                }),
                Err(e) => errors.push(e),
            }
        }

        nodes.insert(
            id.clone(),
            ResourceNode {
                id,
                name: name.clone(),
                stack: stack.name.clone(),
                kind: decl.kind.clone(),
                provider,
                index,
                attributes,
                depends_on: decl.depends_on.clone(),
            },
        );
    }

    if !errors.is_empty() {
        return Err(SynthError::Invalid(Violations {
            phase: Phase::Resolution,
            errors,
        }));
    }

    tracing::debug!(
        stack = %stack.name,
        nodes = nodes.len(),
        edges = edges.len(),
        "built dependency graph"
    );

    let providers = stack
        .providers
        .iter()
        .filter(|(name, _)| nodes.values().any(|n| &n.provider == *name))
        .map(|(name, settings)| (name.clone(), settings.clone()))
        .collect();

    Ok(DependencyGraph {
        stack: stack.name.clone(),
        nodes,
        edges,
        providers,
        secrets: stack.secrets.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResourceDecl, Stack};

    fn scenario() -> Stack {
        let mut s = Stack::new("dev");
        s.resources.insert(
            "net".into(),
            ResourceDecl::new("docker_network").with("name", "my-network"),
        );
        s.resources.insert(
            "db".into(),
            ResourceDecl::new("aws_db_instance").with("engine", "postgres"),
        );
        s.resources.insert(
            "api".into(),
            ResourceDecl::new("docker_container")
                .with("image", "chat-api")
                .with("name", "api")
                .with(
                    "env",
                    serde_yaml_ng::Value::Sequence(vec!["DB_HOST={{resources.db.host}}".into()]),
                ),
        );
        s
    }

    #[test]
    fn test_build_scenario_edges() {
        let stack = scenario();
        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert_eq!(g.edges.len(), 1);
        assert_eq!(g.edges[0].from(), "dev/api");
        assert_eq!(g.edges[0].to(), "dev/db");
        assert_eq!(g.dependencies_of("dev/api"), vec!["dev/db"]);
        assert!(g.dependencies_of("dev/net").is_empty());
        assert_eq!(g.node("dev/db").unwrap().provider, "aws");
        assert_eq!(g.node("dev/api").unwrap().index, 2);
    }

    #[test]
    fn test_graph_keeps_used_provider_settings() {
        let mut stack = scenario();
        stack.providers.insert("google".into(), Default::default());
        let mut docker = ProviderSettings::new();
        docker.insert("host".into(), "unix:///var/run/docker.sock".into());
        stack.providers.insert("docker".into(), docker);
        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert_eq!(g.providers.keys().collect::<Vec<_>>(), vec!["docker"]);
        assert_eq!(g.providers["docker"]["host"], "unix:///var/run/docker.sock");
    }

    #[test]
    fn test_isolated_nodes_have_no_edges() {
        let mut stack = Stack::new("dev");
        stack.resources.insert(
            "a".into(),
            ResourceDecl::new("docker_network").with("name", "a"),
        );
        stack.resources.insert(
            "b".into(),
            ResourceDecl::new("docker_network").with("name", "b"),
        );
        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert!(g.edges.is_empty());
        assert!(g.find_cycles().is_empty());
    }

    #[test]
    fn test_depends_on_edge() {
        let mut stack = scenario();
        stack.resources["db"].depends_on.push("net".into());
        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert!(g.edges.contains(&Edge::DependsOn {
            from: "dev/db".into(),
            to: "dev/net".into()
        }));
    }

    #[test]
    fn test_resolution_errors_are_batched() {
        let mut stack = scenario();
        stack.resources["api"]
            .attributes
            .insert("restart".into(), "{{resources.ghost.id}}".into());
        stack.resources.insert("bad".into(), ResourceDecl::new("aws_lambda"));
        stack.resources["net"].depends_on.push("nowhere".into());

        match build_graph(&Scope::new(&stack)).unwrap_err() {
            SynthError::Invalid(v) => {
                assert_eq!(v.phase, Phase::Resolution);
                assert_eq!(v.len(), 3);
                assert!(v.iter().any(|e| matches!(e, SynthError::UnknownKind { .. })));
            }
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_find_cycle_two_nodes() {
        let mut stack = Stack::new("dev");
        stack.resources.insert(
            "a".into(),
            ResourceDecl::new("docker_network").with("name", "{{resources.b.name}}"),
        );
        stack.resources.insert(
            "b".into(),
            ResourceDecl::new("docker_network").with("name", "{{resources.a.name}}"),
        );
        let g = build_graph(&Scope::new(&stack)).unwrap();
        let cycles = g.find_cycles();
        assert_eq!(cycles, vec![vec!["dev/a".to_string(), "dev/b".to_string()]]);
    }

    #[test]
    fn test_find_cycle_self_loop() {
        let mut stack = Stack::new("dev");
        let mut decl = ResourceDecl::new("docker_network").with("name", "n");
        decl.depends_on.push("n".into());
        stack.resources.insert("n".into(), decl);
        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert_eq!(g.find_cycles(), vec![vec!["dev/n".to_string()]]);
    }

    #[test]
    fn test_cycle_excludes_upstream_nodes() {
        // root → a → b → a: only a and b are cycle members
        let mut stack = Stack::new("dev");
        let mut root = ResourceDecl::new("docker_network").with("name", "root");
        root.depends_on.push("a".into());
        stack.resources.insert("root".into(), root);
        let mut a = ResourceDecl::new("docker_network").with("name", "a");
        a.depends_on.push("b".into());
        stack.resources.insert("a".into(), a);
        let mut b = ResourceDecl::new("docker_network").with("name", "b");
        b.depends_on.push("a".into());
        stack.resources.insert("b".into(), b);

        let g = build_graph(&Scope::new(&stack)).unwrap();
        assert_eq!(
            g.find_cycles(),
            vec![vec!["dev/a".to_string(), "dev/b".to_string()]]
        );
    }

    #[test]
    fn test_duplicate_references_collapse() {
        let mut stack = scenario();
        stack.resources["api"].attributes.insert(
            "command".into(),
            serde_yaml_ng::Value::Sequence(vec![
                "{{resources.db.host}}".into(),
                "{{resources.db.host}}".into(),
            ]),
        );
        let g = build_graph(&Scope::new(&stack)).unwrap();
        let to_db = g.edges.iter().filter(|e| e.to() == "dev/db").count();
        // env and command each reference db.host once
        assert_eq!(to_db, 2);
        assert_eq!(g.dependencies_of("dev/api"), vec!["dev/db"]);
    }
}
