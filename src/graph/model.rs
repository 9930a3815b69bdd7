//! The graph: an ordered node arena with name-based lookup tables
//!
//! Mirrors the shape of the external interchange form: ordered nodes, owned
//! weights, declared output names, and a static shape map. Lookup tables are
//! keyed by tensor name because node positions shift as rewriting inserts
//! and removes elements; the side tables are rebuilt after every structural
//! mutation.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::node::{Node, TensorData, Weight};

/// A computation graph: ordered operator nodes, owned weights, declared
/// outputs, and a name → static-shape lookup.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Ordered node list; order is significant for matching and insertion
    pub nodes: Vec<Node>,
    /// Graph-owned constant tensors, referenced by name from node inputs
    pub weights: Vec<Weight>,
    /// Declared graph output tensor names
    pub outputs: Vec<String>,
    /// Tensor name → static shape, populated from shape metadata.
    /// Only fully-static dims are recorded.
    pub value_shapes: FxHashMap<String, Vec<i64>>,

    // Side tables, rebuilt by `refresh`.
    output_index: FxHashMap<String, usize>,
    weight_names: FxHashSet<String>,
    constant_outputs: FxHashSet<String>,
}

impl Graph {
    /// Create a graph and build its lookup tables
    pub fn new(nodes: Vec<Node>, weights: Vec<Weight>, outputs: Vec<String>) -> Self {
        let mut graph = Self {
            nodes,
            weights,
            outputs,
            ..Default::default()
        };
        graph.refresh();
        graph
    }

    /// Record a static shape for a tensor
    pub fn set_shape(&mut self, name: &str, dims: &[i64]) {
        self.value_shapes.insert(name.to_string(), dims.to_vec());
    }

    /// Rebuild the side tables from the current node and weight lists.
    ///
    /// Must be called after any structural mutation done directly through
    /// the public fields; the mutator methods below call it themselves.
    pub fn refresh(&mut self) {
        self.output_index.clear();
        for (idx, node) in self.nodes.iter().enumerate() {
            for output in &node.output {
                if !output.is_empty() {
                    self.output_index.insert(output.clone(), idx);
                }
            }
        }
        self.weight_names = self.weights.iter().map(|w| w.name.clone()).collect();
        self.constant_outputs = self
            .nodes
            .iter()
            .filter(|n| n.is_constant())
            .filter_map(|n| n.primary_output())
            .map(|s| s.to_string())
            .collect();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether `name` refers to an existing constant: either a weight or the
    /// output of a `Constant` node
    pub fn find_tensor(&self, name: &str) -> bool {
        self.constant_outputs.contains(name) || self.weight_names.contains(name)
    }

    /// Decoded value of a constant tensor, from either a `Constant` node's
    /// `value` attribute or a weight payload
    pub fn tensor_value(&self, name: &str) -> Option<TensorData> {
        if let Some(node) = self.node_by_output(name) {
            if node.is_constant() {
                return node
                    .get_attribute("value")
                    .and_then(|a| a.as_tensor())
                    .and_then(|t| t.to_f32_array());
            }
            return None;
        }
        self.weights
            .iter()
            .find(|w| w.name == name)
            .and_then(|w| w.to_f32_array())
    }

    /// Static shape of a tensor: from the shape map for node outputs, from
    /// the declared dims for weights
    pub fn input_shape(&self, name: &str) -> Option<Vec<i64>> {
        if self.output_index.contains_key(name) {
            return self.value_shapes.get(name).cloned();
        }
        self.weights
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.dims.clone())
    }

    /// Position of the node producing `name`
    pub fn position_by_output(&self, name: &str) -> Option<usize> {
        self.output_index.get(name).copied()
    }

    /// The node producing `name`
    pub fn node_by_output(&self, name: &str) -> Option<&Node> {
        self.position_by_output(name).map(|idx| &self.nodes[idx])
    }

    /// Positions of all nodes consuming `name`
    pub fn consumers_of(&self, name: &str) -> SmallVec<[usize; 4]> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.input.iter().any(|i| i == name))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Whether `name` is a declared graph output
    pub fn is_graph_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o == name)
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    /// Insert a node at the given position
    pub fn insert_node(&mut self, idx: usize, node: Node) {
        self.nodes.insert(idx, node);
        self.refresh();
    }

    /// Remove the node whose primary output is `name`
    pub fn remove_node_by_output(&mut self, name: &str) -> Option<Node> {
        let idx = self
            .nodes
            .iter()
            .position(|n| n.primary_output() == Some(name))?;
        let node = self.nodes.remove(idx);
        self.refresh();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{make_constant, make_node, Tensor};

    fn make_test_graph() -> Graph {
        Graph::new(
            vec![
                make_constant("two", Tensor::scalar_f32("value", 2.0)),
                make_node("Mul", &["X", "W"], &["m"], "mul_0"),
                make_node("Pow", &["m", "two"], &["Y"], "pow_0"),
            ],
            vec![Tensor::from_f32(
                "W",
                &ndarray::arr1(&[1.0f32, 2.0]).into_dyn(),
            )],
            vec!["Y".to_string()],
        )
    }

    #[test]
    fn test_position_by_output() {
        let graph = make_test_graph();
        assert_eq!(graph.position_by_output("m"), Some(1));
        assert_eq!(graph.position_by_output("Y"), Some(2));
        assert_eq!(graph.position_by_output("X"), None);
    }

    #[test]
    fn test_find_tensor() {
        let graph = make_test_graph();
        assert!(graph.find_tensor("two")); // Constant output
        assert!(graph.find_tensor("W")); // weight
        assert!(!graph.find_tensor("m")); // plain node output
        assert!(!graph.find_tensor("X")); // graph input
    }

    #[test]
    fn test_tensor_value() {
        let graph = make_test_graph();
        let two = graph.tensor_value("two").unwrap();
        assert_eq!(two[[]], 2.0);
        let w = graph.tensor_value("W").unwrap();
        assert_eq!(w.shape(), &[2]);
        assert!(graph.tensor_value("m").is_none());
    }

    #[test]
    fn test_input_shape() {
        let mut graph = make_test_graph();
        graph.set_shape("m", &[1, 4]);
        assert_eq!(graph.input_shape("m"), Some(vec![1, 4]));
        assert_eq!(graph.input_shape("W"), Some(vec![2]));
        assert_eq!(graph.input_shape("Y"), None); // no recorded shape
    }

    #[test]
    fn test_consumers_of() {
        let graph = make_test_graph();
        let consumers = graph.consumers_of("m");
        assert_eq!(consumers.as_slice(), &[2]);
        assert!(graph.consumers_of("Y").is_empty());
    }

    #[test]
    fn test_insert_and_remove() {
        let mut graph = make_test_graph();
        graph.insert_node(2, make_node("Relu", &["m"], &["r"], "relu_0"));
        assert_eq!(graph.position_by_output("r"), Some(2));
        assert_eq!(graph.position_by_output("Y"), Some(3));

        let removed = graph.remove_node_by_output("r").unwrap();
        assert_eq!(removed.op_type, "Relu");
        assert_eq!(graph.position_by_output("Y"), Some(2));
        assert!(graph.remove_node_by_output("r").is_none());
    }

    #[test]
    fn test_is_graph_output() {
        let graph = make_test_graph();
        assert!(graph.is_graph_output("Y"));
        assert!(!graph.is_graph_output("m"));
    }
}
