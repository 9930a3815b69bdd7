//! Peephole cleanup passes
//!
//! Three auxiliary passes that keep the graph canonical around the pattern
//! engine: identity-cast elision, common-subexpression elimination for
//! attribute-free nodes, and dead-code elimination of orphaned constants
//! and weights.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::graph::Graph;

/// Remove identity-storage `Cast` nodes.
///
/// Single forward scan: each cast seen is remembered, and the next
/// non-constant node consuming that cast's output has its input spliced to
/// the cast's own input instead. Only the most recently seen cast is spliced
/// into the very next consumer; casts are expected to be immediately
/// followed by their sole consumer. All cast nodes are then deleted.
pub fn remove_cast(graph: &mut Graph) {
    let mut casts: Vec<(String, String)> = Vec::new(); // (output, input)
    let mut flush_input = false;

    for idx in 0..graph.nodes.len() {
        let node = &graph.nodes[idx];
        if node.op_type == "Cast" {
            if let (Some(output), Some(input)) = (node.output.first(), node.input.first()) {
                casts.push((output.clone(), input.clone()));
                flush_input = true;
            }
            continue;
        }
        if node.is_constant() {
            continue;
        }
        if flush_input {
            flush_input = false;
            if let Some((cast_out, cast_in)) = casts.last().cloned() {
                for input in &mut graph.nodes[idx].input {
                    if *input == cast_out {
                        *input = cast_in.clone();
                    }
                }
            }
        }
    }

    if !casts.is_empty() {
        debug!(count = casts.len(), "cast nodes removed");
        graph.nodes.retain(|n| n.op_type != "Cast");
        graph.refresh();
    }
}

/// Common-subexpression elimination, restricted to attribute-free nodes.
///
/// Nodes are grouped by (operator type, ordered input names); the first
/// occurrence of each group survives and every later duplicate's outputs are
/// mapped position-wise onto the survivor's. All remaining node inputs and
/// the declared graph outputs are rewritten through that map.
pub fn remove_duplicate(graph: &mut Graph) {
    let mut kept: FxHashMap<(String, String), Vec<String>> = FxHashMap::default();
    let mut rename: FxHashMap<String, String> = FxHashMap::default();
    let mut remove: Vec<usize> = Vec::new();

    for (idx, node) in graph.nodes.iter().enumerate() {
        // Constant producers carry a value attribute, so they never group
        if !node.attribute.is_empty() {
            continue;
        }
        let key = (node.op_type.clone(), node.input.join(" "));
        match kept.get(&key) {
            None => {
                kept.insert(key, node.output.clone());
            }
            Some(survivor_outputs) => {
                for (removed, survivor) in node.output.iter().zip(survivor_outputs) {
                    rename.insert(removed.clone(), survivor.clone());
                }
                remove.push(idx);
            }
        }
    }

    if remove.is_empty() {
        return;
    }
    debug!(count = remove.len(), "duplicate nodes removed");

    for idx in remove.into_iter().rev() {
        graph.nodes.remove(idx);
    }
    for node in &mut graph.nodes {
        for input in &mut node.input {
            if let Some(survivor) = rename.get(input) {
                *input = survivor.clone();
            }
        }
    }
    for output in &mut graph.outputs {
        if let Some(survivor) = rename.get(output) {
            *output = survivor.clone();
        }
    }
    graph.refresh();
}

/// Dead-code elimination: purge weights and constant producers that no
/// remaining node references as an input.
pub fn remove_unused_tensor(graph: &mut Graph) {
    let used: FxHashSet<String> = graph
        .nodes
        .iter()
        .flat_map(|n| n.input.iter().cloned())
        .collect();

    graph.weights.retain(|w| used.contains(&w.name));
    graph.nodes.retain(|n| {
        !n.is_constant()
            || n.primary_output()
                .map(|out| used.contains(out))
                .unwrap_or(false)
    });
    graph.refresh();
}
