//! # Graph Reform
//!
//! Pattern-based canonicalizer for computation graphs.
//!
//! This crate finds occurrences of declaratively-specified operator chains
//! in a graph (nodes = typed operators, edges = named tensors) and replaces
//! them with semantically equivalent, more compact subgraphs, e.g. collapsing
//! a decomposed normalization computation into a single fused `LayerNorm` op.
//!
//! ## Features
//!
//! - **Pattern Vocabulary**: declarative chains of [`pattern::PatternNode`]s
//!   anchored by [`pattern::BoundaryNode`] placeholders
//! - **Matching**: forward scan over the node list with value/shape checks
//! - **Rewriting**: in-place substitution with constant materialization and
//!   a rename map for downstream metadata
//! - **Cleanup**: identity-cast elision, CSE, dead-code elimination
//!
//! ## Example
//!
//! ```ignore
//! use graph_reform::prelude::*;
//!
//! let engine = ReformEngine::new(default_rules());
//! let rename_map = engine.run(&mut graph)?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod cleanup;
pub mod driver;
pub mod error;
pub mod graph;
pub mod pattern;
pub mod rewrite;
pub mod rules;

/// Prelude module - import commonly used types with `use graph_reform::prelude::*`
pub mod prelude {
    pub use crate::cleanup::{remove_cast, remove_duplicate, remove_unused_tensor};
    pub use crate::driver::{ReformConfig, ReformEngine, RenameMap};
    pub use crate::error::{ReformError, ReformResult};
    pub use crate::graph::{AttrValue, DataType, Graph, Node, Tensor, Weight};
    pub use crate::pattern::{
        find_matches, AttrFunctor, AttrTransform, BoundaryKind, BoundaryNode, Match, PatternNode,
        PatternRef, ReformRule, RuleBuilder,
    };
    pub use crate::rules::default_rules;
}

pub use error::{ReformError, ReformResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
