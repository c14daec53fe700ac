//! Benchmarks for write-to-flush propagation and spring stepping.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use filament_core::{Computation, Graph, Node, SpringConfig, Value};

fn fanout_graph(width: usize) -> (Graph, Node, Vec<Node>) {
    let graph = Graph::new();
    let root = graph.state(0.0);
    let dependents = (0..width)
        .map(|i| {
            let source = root.clone();
            graph
                .computed(&Computation::new(move || {
                    let v = source.get()?.as_float().unwrap_or(0.0);
                    Ok(Value::Float(v * i as f64))
                }))
                .unwrap()
        })
        .collect();
    (graph, root, dependents)
}

fn bench_write_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_flush");
    for width in [10, 100] {
        group.bench_function(format!("fanout_{width}"), |b| {
            let (graph, root, _dependents) = fanout_graph(width);
            let mut next = 0.0;
            b.iter(|| {
                next += 1.0;
                root.set(next).unwrap();
                graph.flush();
            });
        });
    }
    group.finish();
}

fn bench_spring_step(c: &mut Criterion) {
    c.bench_function("spring_step_60hz", |b| {
        let graph = Graph::new();
        let node = graph.state(0.0);
        node.attach_spring(SpringConfig::new(0.0).speed(4.0).damping(0.2)).unwrap();
        graph.flush();
        node.set(100.0).unwrap();

        let tick = Duration::from_millis(16);
        b.iter(|| {
            // Bounce the goal so the spring never rests mid-measurement.
            let position = node.get_untracked().unwrap().as_float().unwrap();
            let goal = if position > 50.0 { 0.0 } else { 100.0 };
            node.set(goal).unwrap();
            graph.step(tick);
        });
    });
}

criterion_group!(benches, bench_write_flush, bench_spring_step);
criterion_main!(benches);
