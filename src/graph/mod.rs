//! Graph model for computation graphs
//!
//! This module provides the in-memory representation the reform engine
//! operates on:
//!
//! - [`Node`]: a typed operator with ordered inputs/outputs and attributes
//! - [`Tensor`] / [`Weight`]: named constant tensors owned by the graph
//! - [`Graph`]: the ordered node arena with name-based lookup tables
//!
//! # Overview
//!
//! Node order is significant: pattern matching walks nodes in definition
//! order, and rewriting inserts replacement nodes at the position of the
//! matched chain. The [`Graph`] therefore keeps its nodes in a `Vec` and
//! maintains a primary-output → position side table that is rebuilt after
//! every structural mutation.
//!
//! # Example
//!
//! ```ignore
//! use graph_reform::graph::{Graph, make_node};
//!
//! let graph = Graph::new(
//!     vec![
//!         make_node("Mul", &["X", "scale"], &["m"], "mul_0"),
//!         make_node("Add", &["m", "bias"], &["Y"], "add_0"),
//!     ],
//!     vec![],
//!     vec!["Y".to_string()],
//! );
//! assert_eq!(graph.position_by_output("Y"), Some(1));
//! ```

pub mod model;
pub mod node;

pub use model::Graph;
pub use node::{make_constant, make_node, AttrValue, DataType, Node, Tensor, TensorData, Weight};
