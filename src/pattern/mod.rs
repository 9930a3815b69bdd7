//! Pattern vocabulary and chain matcher
//!
//! Rules are plain data: a [`ReformRule`] owns an arena of boundary
//! placeholders and pattern nodes, with a source chain to find and a
//! destination chain to instantiate. Nothing executes at definition time;
//! all binding happens during matching.
//!
//! # Example
//!
//! ```ignore
//! use graph_reform::pattern::{PatternNode, RuleBuilder};
//!
//! let mut b = RuleBuilder::new();
//! let x = b.operand();
//! let sig = b.node(PatternNode::new("HardSigmoid", [x.into()]));
//! let mul = b.node(PatternNode::new("Mul", [x.into(), sig.into()]));
//! let fused = b.node(PatternNode::new("HardSwish", [x.into()]));
//! let rule = b.build("hardswish", vec![sig, mul], vec![fused]);
//! ```

pub mod matcher;
pub mod vocab;

pub use matcher::{find_matches, DstInput, DstNode, Match};
pub use vocab::{
    AttrFunctor, AttrTransform, BoundaryId, BoundaryKind, BoundaryNode, PatternId, PatternNode,
    PatternRef, ReformRule, RuleBuilder,
};
