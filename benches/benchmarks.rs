//! Performance benchmarks for Vibeflow.
//!
//! This module contains benchmarks for:
//! - Workflow document parsing and validation
//! - Transition resolution on large graphs
//! - Graph cache lookups
//!
//! Run with: `cargo bench`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vibeflow::workflow::{bundled_key, find_bundled, GraphSource, BUNDLED_FINGERPRINT};
use vibeflow::{GraphCache, TransitionEngine, TransitionRequest, WorkflowLoader};

// ============================================================================
// Mock Data Fixtures
// ============================================================================

mod fixtures {
    use std::fmt::Write;

    /// Generate a linear workflow with `num_states` phases.
    ///
    /// Each phase has a few decoy transitions before the one that advances,
    /// so resolution has to scan past them.
    pub fn generate_workflow(num_states: usize) -> String {
        let mut doc = String::from("name: generated\ninitialState: s0\nstates:\n");
        for i in 0..num_states {
            let _ = writeln!(doc, "  s{i}:");
            let _ = writeln!(doc, "    description: Phase {i}");
            let _ = writeln!(doc, "    defaultInstructions: Work on phase {i}.");
            let _ = writeln!(doc, "    transitions:");
            for decoy in 0..3 {
                let _ = writeln!(doc, "      - trigger: decoy_{decoy}");
                let _ = writeln!(doc, "        target: s0");
            }
            let next = (i + 1) % num_states;
            let _ = writeln!(doc, "      - trigger: advance");
            let _ = writeln!(doc, "        target: s{next}");
            let _ = writeln!(doc, "        transitionReason: Phase {i} finished");
        }
        doc
    }
}

// ============================================================================
// Parsing Benchmarks
// ============================================================================

fn bench_parse_bundled(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/bundled");
    let loader = WorkflowLoader::new();

    for name in ["waterfall", "epcc", "greenfield"] {
        let source = find_bundled(name).expect("bundled workflow").source;
        group.bench_with_input(BenchmarkId::from_parameter(name), source, |b, source| {
            b.iter(|| loader.parse_str(black_box(source), GraphSource::Bundled).unwrap());
        });
    }

    group.finish();
}

fn bench_parse_generated(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse/generated");
    let loader = WorkflowLoader::new();

    for num_states in [10, 50, 200, 1000].iter() {
        let doc = fixtures::generate_workflow(*num_states);
        group.throughput(Throughput::Elements(*num_states as u64));
        group.bench_with_input(BenchmarkId::from_parameter(num_states), &doc, |b, doc| {
            b.iter(|| loader.parse_str(black_box(doc), GraphSource::Inline).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Resolution Benchmarks
// ============================================================================

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let loader = WorkflowLoader::new();

    for num_states in [10, 200, 1000].iter() {
        let graph = loader
            .parse_str(&fixtures::generate_workflow(*num_states), GraphSource::Inline)
            .unwrap();
        let engine = TransitionEngine::new(&graph);
        let last = format!("s{}", num_states - 1);

        let signal = TransitionRequest::signal("advance");
        group.bench_with_input(BenchmarkId::new("signal", num_states), &last, |b, phase| {
            b.iter(|| engine.resolve(black_box(phase), &signal).unwrap());
        });

        let jump = TransitionRequest::jump(last.clone());
        group.bench_with_input(BenchmarkId::new("jump", num_states), &last, |b, _| {
            b.iter(|| engine.resolve(black_box("s0"), &jump).unwrap());
        });
    }

    group.finish();
}

// ============================================================================
// Cache Benchmarks
// ============================================================================

fn bench_cache_hit(c: &mut Criterion) {
    let cache = GraphCache::new();
    let loader = WorkflowLoader::new();
    let key = bundled_key("waterfall");
    cache.get_or_load(&key, BUNDLED_FINGERPRINT, || loader.load_bundled("waterfall")).unwrap();

    c.bench_function("cache/hit", |b| {
        b.iter(|| {
            let graph =
                cache.get_or_load(black_box(&key), BUNDLED_FINGERPRINT, || loader.load_bundled("waterfall"));
            Arc::strong_count(&graph.unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_parse_bundled,
    bench_parse_generated,
    bench_resolve,
    bench_cache_hit
);
criterion_main!(benches);
