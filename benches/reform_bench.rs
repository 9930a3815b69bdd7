//! Benchmark for the reform engine
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use graph_reform::graph::{make_constant, make_node, AttrValue, Graph, Node, Tensor};
use graph_reform::prelude::*;

fn reduce_mean(input: &str, output: &str, name: &str) -> Node {
    let mut node = make_node("ReduceMean", &[input], &[output], name);
    node.attribute
        .insert("axes".to_string(), AttrValue::Ints(vec![-1]));
    node
}

/// A graph with `n` decomposed layer-norm chains back to back
fn layernorm_chains(n: usize) -> Graph {
    let mut nodes = vec![
        make_constant("two", Tensor::scalar_f32("value", 2.0)),
        make_constant("eps", Tensor::scalar_f32("value", 1e-5)),
    ];
    let mut outputs = Vec::new();
    for i in 0..n {
        let x = if i == 0 { "X".to_string() } else { format!("n{}", i - 1) };
        nodes.push(reduce_mean(&x, &format!("m{i}"), &format!("rm_a_{i}")));
        nodes.push(make_node(
            "Sub",
            &[&x, &format!("m{i}")],
            &[&format!("d{i}")],
            &format!("sub_{i}"),
        ));
        nodes.push(make_node(
            "Pow",
            &[&format!("d{i}"), "two"],
            &[&format!("p{i}")],
            &format!("pow_{i}"),
        ));
        nodes.push(reduce_mean(&format!("p{i}"), &format!("v{i}"), &format!("rm_b_{i}")));
        nodes.push(make_node(
            "Add",
            &[&format!("v{i}"), "eps"],
            &[&format!("e{i}")],
            &format!("add_{i}"),
        ));
        nodes.push(make_node(
            "Sqrt",
            &[&format!("e{i}")],
            &[&format!("s{i}")],
            &format!("sqrt_{i}"),
        ));
        nodes.push(make_node(
            "Div",
            &[&format!("d{i}"), &format!("s{i}")],
            &[&format!("n{i}")],
            &format!("div_{i}"),
        ));
    }
    outputs.push(format!("n{}", n - 1));
    Graph::new(nodes, vec![], outputs)
}

fn reform_benchmark(c: &mut Criterion) {
    c.bench_function("fuse_16_layernorm_chains", |b| {
        let engine = ReformEngine::new(default_rules());
        b.iter(|| {
            let mut graph = layernorm_chains(16);
            let renames = engine.run(&mut graph).unwrap();
            black_box((graph.node_count(), renames.len()))
        })
    });

    c.bench_function("match_only_no_rewrite", |b| {
        let graph = layernorm_chains(16);
        let rules = default_rules();
        b.iter(|| {
            for rule in &rules {
                black_box(find_matches(&graph, rule).unwrap());
            }
        })
    });
}

criterion_group!(benches, reform_benchmark);
criterion_main!(benches);
