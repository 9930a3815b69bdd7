//! Subgraph substitution
//!
//! Applies the matches produced by the matcher: instantiates the destination
//! chain at the position of the matched chain's terminal node, materializes
//! any new constant producers, removes the matched source nodes, and records
//! a rename-map entry for downstream metadata.
//!
//! Positions are looked up by name against the *current* node list for every
//! match, because earlier matches in the same batch shift positions as they
//! insert and remove nodes.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::info;

use crate::cleanup::remove_unused_tensor;
use crate::error::{ReformError, ReformResult};
use crate::graph::{make_constant, AttrValue, Graph, Node, Tensor};
use crate::pattern::{DstInput, Match};

/// Rename map from old qualified output identifiers to new ones, keyed
/// `{output}_{src_op}` → `{output}_{dst_op}`. Insertion-ordered so reports
/// follow application order.
pub type RenameMap = IndexMap<String, String>;

/// Apply a batch of matches for one rule, in order
pub fn apply_matches(
    graph: &mut Graph,
    matches: &[Match],
    rename_map: &mut RenameMap,
) -> ReformResult<()> {
    for m in matches {
        apply_match(graph, m, rename_map)?;
    }
    Ok(())
}

/// Substitute one matched occurrence.
///
/// The terminal destination node takes over the terminal source node's
/// output names exactly, so consumers outside the pattern keep referencing
/// the same tensors. Intermediate destination outputs get fresh names
/// derived from the terminal source node's name and a sequence index.
fn apply_match(graph: &mut Graph, m: &Match, rename_map: &mut RenameMap) -> ReformResult<()> {
    let terminal_out = m
        .sources
        .last()
        .ok_or_else(|| ReformError::Internal("match with no source nodes".to_string()))?;
    let dst_terminal_op = m
        .dst
        .last()
        .map(|d| d.op_type.clone())
        .ok_or_else(|| ReformError::Internal("match with no destination nodes".to_string()))?;

    // validate the rename entry before touching the graph
    let src_key = format!("{}_{}", terminal_out, m.src_terminal_op);
    let dst_key = format!("{}_{}", terminal_out, dst_terminal_op);
    if rename_map.contains_key(&src_key) {
        return Err(ReformError::RenameCollision(src_key));
    }

    let terminal_pos = graph.position_by_output(terminal_out).ok_or_else(|| {
        ReformError::Internal(format!("matched terminal '{terminal_out}' disappeared"))
    })?;
    let terminal_outputs = graph.nodes[terminal_pos].output.clone();

    // detach the matched source nodes first, so the terminal destination
    // node can take over the terminal output name without ambiguity; every
    // source sits at or before the terminal position
    let mut source_positions = Vec::with_capacity(m.sources.len());
    for source in &m.sources {
        source_positions.push(graph.position_by_output(source).ok_or_else(|| {
            ReformError::Internal(format!("matched source '{source}' disappeared"))
        })?);
    }
    source_positions.sort_unstable();
    for &pos in source_positions.iter().rev() {
        graph.nodes.remove(pos);
    }
    graph.refresh();
    let mut insert_idx = terminal_pos + 1 - source_positions.len();

    // constants materialized so far in this match, by boundary index
    let mut materialized: FxHashMap<usize, String> = FxHashMap::default();
    let mut dst_outputs: Vec<String> = Vec::with_capacity(m.dst.len());

    for (i, dst) in m.dst.iter().enumerate() {
        let outputs = if i == m.dst.len() - 1 {
            terminal_outputs.clone()
        } else {
            vec![format!("{}_{}", m.terminal_name, i)]
        };

        let mut inputs = Vec::with_capacity(dst.inputs.len());
        for (j, input) in dst.inputs.iter().enumerate() {
            let name = match input {
                DstInput::Bound(name) => name.clone(),
                DstInput::FromDst(pos) => dst_outputs
                    .get(*pos)
                    .cloned()
                    .ok_or_else(|| {
                        ReformError::Internal("destination chain reference out of order".to_string())
                    })?,
                DstInput::Materialize { boundary, value } => {
                    if let Some(existing) = materialized.get(boundary) {
                        existing.clone()
                    } else {
                        let tensor_name = format!("{}_in_{}", outputs[0], j);
                        let tensor = Tensor::from_f32("value", value);
                        graph.insert_node(insert_idx, make_constant(&tensor_name, tensor));
                        insert_idx += 1;
                        materialized.insert(*boundary, tensor_name.clone());
                        tensor_name
                    }
                }
                DstInput::Missing => {
                    return Err(ReformError::MissingTensorValue(m.rule_name.clone()))
                }
            };
            inputs.push(name);
        }

        let node = Node {
            op_type: dst.op_type.clone(),
            input: inputs,
            output: outputs.clone(),
            attribute: dst
                .attrs
                .iter()
                .cloned()
                .collect::<IndexMap<String, AttrValue>>(),
            name: outputs[0].clone(),
        };
        graph.insert_node(insert_idx, node);
        insert_idx += 1;
        dst_outputs.push(outputs[0].clone());
    }

    // qualified by operator type so multiple rules touching the same tensor
    // name stay distinguishable across the whole run
    rename_map.insert(src_key, dst_key);
    remove_unused_tensor(graph);

    info!(rule = %m.rule_name, "rule applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{make_constant, make_node};
    use crate::pattern::{find_matches, PatternNode, RuleBuilder};
    use ndarray::arr0;

    fn hardswish_rule() -> crate::pattern::ReformRule {
        let mut b = RuleBuilder::new();
        let x = b.operand();
        let sig = b.node(PatternNode::new("HardSigmoid", [x.into()]));
        let mul = b.node(PatternNode::new("Mul", [x.into(), sig.into()]));
        let fused = b.node(PatternNode::new("HardSwish", [x.into()]));
        b.build("hardswish", vec![sig, mul], vec![fused])
    }

    #[test]
    fn test_substitution() {
        let mut graph = Graph::new(
            vec![
                make_node("Relu", &["X0"], &["X"], "relu_0"),
                make_node("HardSigmoid", &["X"], &["h"], "sig_0"),
                make_node("Mul", &["X", "h"], &["Y"], "mul_0"),
            ],
            vec![],
            vec!["Y".to_string()],
        );
        let rule = hardswish_rule();
        let matches = find_matches(&graph, &rule).unwrap();
        let mut renames = RenameMap::new();
        apply_matches(&mut graph, &matches, &mut renames).unwrap();

        assert_eq!(graph.node_count(), 2);
        let fused = graph.node_by_output("Y").unwrap();
        assert_eq!(fused.op_type, "HardSwish");
        assert_eq!(fused.input, vec!["X"]);
        // output-name stability: external consumers keep their tensor
        assert_eq!(fused.output, vec!["Y"]);
        assert_eq!(
            renames.get("Y_Mul").map(|s| s.as_str()),
            Some("Y_HardSwish")
        );
    }

    #[test]
    fn test_materializes_new_constant() {
        // replace Neg(x) with Mul(x, -1), synthesizing the -1 constant
        let mut b = RuleBuilder::new();
        let x = b.operand();
        let minus_one = b.new_constant(arr0(-1.0f32).into_dyn());
        let neg = b.node(PatternNode::new("Neg", [x.into()]));
        let mul = b.node(PatternNode::new("Mul", [x.into(), minus_one.into()]));
        let rule = b.build("neg_to_mul", vec![neg], vec![mul]);

        let mut graph = Graph::new(
            vec![make_node("Neg", &["X"], &["Y"], "neg_0")],
            vec![],
            vec!["Y".to_string()],
        );
        let matches = find_matches(&graph, &rule).unwrap();
        assert_eq!(matches.len(), 1);
        let mut renames = RenameMap::new();
        apply_matches(&mut graph, &matches, &mut renames).unwrap();

        assert_eq!(graph.node_count(), 2);
        let constant = &graph.nodes[0];
        assert!(constant.is_constant());
        assert_eq!(constant.primary_output(), Some("Y_in_1"));
        assert_eq!(graph.tensor_value("Y_in_1").unwrap()[[]], -1.0);

        let mul = graph.node_by_output("Y").unwrap();
        assert_eq!(mul.op_type, "Mul");
        assert_eq!(mul.input, vec!["X", "Y_in_1"]);
        assert_eq!(renames.get("Y_Neg").map(|s| s.as_str()), Some("Y_Mul"));
    }

    #[test]
    fn test_rename_collision_is_fatal() {
        let mut graph = Graph::new(
            vec![
                make_node("HardSigmoid", &["X"], &["h"], "sig_0"),
                make_node("Mul", &["X", "h"], &["Y"], "mul_0"),
            ],
            vec![],
            vec!["Y".to_string()],
        );
        let rule = hardswish_rule();
        let matches = find_matches(&graph, &rule).unwrap();
        let mut renames = RenameMap::new();
        renames.insert("Y_Mul".to_string(), "Y_Something".to_string());
        let err = apply_matches(&mut graph, &matches, &mut renames).unwrap_err();
        assert!(matches!(err, ReformError::RenameCollision(_)));
    }

    #[test]
    fn test_orphaned_constants_are_purged() {
        // the Pow exponent constant loses its only consumer
        let mut b = RuleBuilder::new();
        let x = b.operand();
        let two = b.constant_eq(arr0(2.0f32).into_dyn());
        let pow = b.node(PatternNode::new("Pow", [x.into(), two.into()]));
        let square = b.node(PatternNode::new("Square", [x.into()]));
        let rule = b.build("square", vec![pow], vec![square]);

        let mut graph = Graph::new(
            vec![
                make_constant("two", Tensor::scalar_f32("value", 2.0)),
                make_node("Pow", &["X", "two"], &["Y"], "pow_0"),
            ],
            vec![],
            vec!["Y".to_string()],
        );
        let matches = find_matches(&graph, &rule).unwrap();
        let mut renames = RenameMap::new();
        apply_matches(&mut graph, &matches, &mut renames).unwrap();

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.nodes[0].op_type, "Square");
        assert!(!graph.find_tensor("two"));
    }
}
