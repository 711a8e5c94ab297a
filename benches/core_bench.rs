//! Benchmarks for stackweld core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stackweld::core::composer::Overrides;
use stackweld::core::graph::build_graph;
use stackweld::core::parser::parse_workspace;
use stackweld::core::planner::synthesize_plan;
use stackweld::core::reference::Scope;
use stackweld::core::synth::synthesize;
use stackweld::core::types::{ResourceDecl, Stack};

const WORKSPACE_YAML: &str = r#"
version: "1.0"
name: bench-workspace
stacks:
  dev:
    template: container-network
    dev_mode: true
  staging:
    template: container-network
    dev_mode: true
    options:
      api_port: 3104
  serverless:
    template: managed-serverless
    dev_mode: true
    options:
      project: bench
      postgres_host: 10.0.0.5
      dragonfly_host: 10.0.0.6
      google_redirect_uri: https://bench.example/callback
"#;

/// A stack of `n` networks where each references up to three predecessors.
fn layered_stack(n: usize) -> Stack {
    let mut stack = Stack::new("bench");
    for i in 0..n {
        let mut decl = ResourceDecl::new("docker_network").with("name", format!("net-{}", i));
        if i > 0 {
            decl = decl.with("driver", format!("{{{{resources.r{}.name}}}}", i - 1));
        }
        for back in [2, 3] {
            if i >= back {
                decl.depends_on.push(format!("r{}", i - back));
            }
        }
        stack.resources.insert(format!("r{}", i), decl);
    }
    stack
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("blake3_string");
    for size in [64, 256, 1024, 4096] {
        let input: String = "x".repeat(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| {
                black_box(stackweld::core::fingerprint::hash_string(black_box(input)));
            });
        });
    }
    group.finish();
}

fn bench_yaml_parse(c: &mut Criterion) {
    c.bench_function("yaml_parse_workspace", |b| {
        b.iter(|| {
            let ws = parse_workspace(black_box(WORKSPACE_YAML)).unwrap();
            black_box(ws);
        });
    });
}

fn bench_graph_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_build");
    for n in [10, 100, 1000] {
        let stack = layered_stack(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &stack, |b, stack| {
            b.iter(|| {
                let graph = build_graph(&Scope::new(black_box(stack))).unwrap();
                black_box(graph);
            });
        });
    }
    group.finish();
}

fn bench_plan_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_synthesis");
    for n in [10, 100, 1000] {
        let stack = layered_stack(n);
        let graph = build_graph(&Scope::new(&stack)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(n), &graph, |b, graph| {
            b.iter(|| {
                let plan = synthesize_plan(black_box(graph)).unwrap();
                black_box(plan);
            });
        });
    }
    group.finish();
}

fn bench_workspace_synthesis(c: &mut Criterion) {
    let ws = parse_workspace(WORKSPACE_YAML).unwrap();
    let overrides = Overrides::default();
    c.bench_function("synthesize_workspace", |b| {
        b.iter(|| {
            let plan = synthesize(black_box(&ws), &overrides).unwrap();
            black_box(plan);
        });
    });
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_yaml_parse,
    bench_graph_build,
    bench_plan_synthesis,
    bench_workspace_synthesis
);
criterion_main!(benches);
