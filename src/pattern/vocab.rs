//! Declarative building blocks for rewrite rules
//!
//! A rule describes a linear operator chain to find and a replacement chain
//! to instantiate. Chain endpoints that are produced outside the pattern are
//! represented by [`BoundaryNode`] placeholders; inner steps by
//! [`PatternNode`]s referencing prior elements through [`PatternRef`].
//! Attributes of the replacement are synthesized from values captured during
//! matching via [`AttrFunctor`]s, which are data rather than closures so
//! rules can be inspected and validated before running.

use crate::error::{ReformError, ReformResult};
use crate::graph::{AttrValue, TensorData};

/// Handle to a boundary placeholder inside a rule's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryId(pub(crate) usize);

/// Handle to a pattern node inside a rule's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternId(pub(crate) usize);

/// Reference to a pattern element, used in input lists and functor arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRef {
    /// A boundary placeholder
    Boundary(BoundaryId),
    /// An inner pattern node
    Node(PatternId),
}

impl From<BoundaryId> for PatternRef {
    fn from(id: BoundaryId) -> Self {
        PatternRef::Boundary(id)
    }
}

impl From<PatternId> for PatternRef {
    fn from(id: PatternId) -> Self {
        PatternRef::Node(id)
    }
}

/// The two roles a boundary placeholder can play
#[derive(Debug, Clone)]
pub enum BoundaryKind {
    /// Matches an operand that already exists in the graph.
    Existing {
        /// Require the operand to be a constant (weight or `Constant` node)
        require_constant: bool,
        /// Require the constant's value to equal this literal; 0-d values
        /// are broadcast to 1-d before comparison
        expect_value: Option<TensorData>,
    },
    /// Supplies a literal to materialize as a brand-new `Constant` producer
    /// during rewriting. When used on the source side it matches an existing
    /// constant with the same value.
    NewConstant(TensorData),
}

/// External-input placeholder: a pattern endpoint not produced inside the
/// pattern being matched
#[derive(Debug, Clone)]
pub struct BoundaryNode {
    /// Existing-operand or new-constant role
    pub kind: BoundaryKind,
    /// Capture the bound operand's concrete value under this attribute name,
    /// for later use by an [`AttrFunctor`]
    pub capture: Option<String>,
}

/// Pure transform applied to the captured arguments of an [`AttrFunctor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrTransform {
    /// Pass the single argument through unchanged
    Identity,
    /// Take the first element of a list-valued argument
    First,
}

impl AttrTransform {
    /// Evaluate the transform over already-resolved argument values
    pub fn apply(&self, args: &[AttrValue]) -> ReformResult<AttrValue> {
        match self {
            AttrTransform::Identity => match args {
                [value] => Ok(value.clone()),
                _ => Err(ReformError::AttrFunctor(format!(
                    "identity expects 1 argument, got {}",
                    args.len()
                ))),
            },
            AttrTransform::First => match args {
                [AttrValue::Ints(v)] if !v.is_empty() => Ok(AttrValue::Int(v[0])),
                [AttrValue::Floats(v)] if !v.is_empty() => Ok(AttrValue::Float(v[0])),
                _ => Err(ReformError::AttrFunctor(
                    "first expects one non-empty list argument".to_string(),
                )),
            },
        }
    }
}

/// Derives one new attribute value from values bound during matching.
///
/// Each argument names a pattern element and an attribute bound on it: an
/// extracted attribute for pattern nodes, a captured value for boundaries.
/// Evaluation requires all referenced elements to already be bound.
#[derive(Debug, Clone)]
pub struct AttrFunctor {
    /// Ordered argument references: (element, bound attribute name)
    pub args: Vec<(PatternRef, String)>,
    /// Transform producing the new value
    pub transform: AttrTransform,
}

impl AttrFunctor {
    /// Create a functor over the given argument references
    pub fn new<I, S>(args: I, transform: AttrTransform) -> Self
    where
        I: IntoIterator<Item = (PatternRef, S)>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(|(r, s)| (r, s.into())).collect(),
            transform,
        }
    }
}

/// One step of a chain: the expected operator tag, ordered input references,
/// and the attribute plumbing for matching and instantiation
#[derive(Debug, Clone)]
pub struct PatternNode {
    /// Expected operator type tag
    pub op_type: String,
    /// Ordered input references; arity must equal the concrete node's
    pub inputs: Vec<PatternRef>,
    /// Attributes to extract from the matched concrete node:
    /// (name on the node, name to bind as)
    pub extract: Vec<(String, String)>,
    /// Literal attributes attached on instantiation
    pub literal_attrs: Vec<(String, AttrValue)>,
    /// Attributes derived by functor on instantiation
    pub derived: Vec<(String, AttrFunctor)>,
    /// Optional named structural constraint (currently only `"broadcast"`)
    pub constraint: Option<String>,
}

impl PatternNode {
    /// Create a pattern node with the given operator tag and inputs
    pub fn new<I>(op_type: &str, inputs: I) -> Self
    where
        I: IntoIterator<Item = PatternRef>,
    {
        Self {
            op_type: op_type.to_string(),
            inputs: inputs.into_iter().collect(),
            extract: Vec::new(),
            literal_attrs: Vec::new(),
            derived: Vec::new(),
            constraint: None,
        }
    }

    /// Extract an attribute from the matched node under its own name
    pub fn extract(mut self, name: &str) -> Self {
        self.extract.push((name.to_string(), name.to_string()));
        self
    }

    /// Extract an attribute from the matched node under a new name
    pub fn extract_as(mut self, name: &str, bound_as: &str) -> Self {
        self.extract.push((name.to_string(), bound_as.to_string()));
        self
    }

    /// Attach a literal attribute on instantiation
    pub fn attr(mut self, name: &str, value: AttrValue) -> Self {
        self.literal_attrs.push((name.to_string(), value));
        self
    }

    /// Attach a functor-derived attribute on instantiation
    pub fn derive(mut self, name: &str, functor: AttrFunctor) -> Self {
        self.derived.push((name.to_string(), functor));
        self
    }

    /// Declare a named structural constraint on the matched node
    pub fn constrain(mut self, name: &str) -> Self {
        self.constraint = Some(name.to_string());
        self
    }
}

/// A named rewrite rule: the source chain to find and the destination chain
/// to instantiate, over a shared arena of pattern elements.
///
/// Chains are simple paths: each element references only earlier elements.
/// Destination templates are instantiated per match and never mutated in
/// place across matches.
#[derive(Debug, Clone)]
pub struct ReformRule {
    /// Rule name, used in logs and errors
    pub name: String,
    pub(crate) boundaries: Vec<BoundaryNode>,
    pub(crate) nodes: Vec<PatternNode>,
    /// Source chain, in match order
    pub src: Vec<PatternId>,
    /// Destination chain, in instantiation order
    pub dst: Vec<PatternId>,
}

impl ReformRule {
    /// Look up a boundary by handle
    pub fn boundary(&self, id: BoundaryId) -> &BoundaryNode {
        &self.boundaries[id.0]
    }

    /// Look up a pattern node by handle
    pub fn node(&self, id: PatternId) -> &PatternNode {
        &self.nodes[id.0]
    }

    /// Number of boundary placeholders
    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Number of pattern nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Assembles the shared arena of a [`ReformRule`]
#[derive(Debug, Default)]
pub struct RuleBuilder {
    boundaries: Vec<BoundaryNode>,
    nodes: Vec<PatternNode>,
}

impl RuleBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    fn push_boundary(&mut self, boundary: BoundaryNode) -> BoundaryId {
        self.boundaries.push(boundary);
        BoundaryId(self.boundaries.len() - 1)
    }

    /// An unconstrained operand: binds to whatever tensor name appears
    pub fn operand(&mut self) -> BoundaryId {
        self.push_boundary(BoundaryNode {
            kind: BoundaryKind::Existing {
                require_constant: false,
                expect_value: None,
            },
            capture: None,
        })
    }

    /// An operand that must be an existing constant or weight
    pub fn existing_constant(&mut self) -> BoundaryId {
        self.push_boundary(BoundaryNode {
            kind: BoundaryKind::Existing {
                require_constant: true,
                expect_value: None,
            },
            capture: None,
        })
    }

    /// An existing constant whose value must equal `value`
    pub fn constant_eq(&mut self, value: TensorData) -> BoundaryId {
        self.push_boundary(BoundaryNode {
            kind: BoundaryKind::Existing {
                require_constant: true,
                expect_value: Some(value),
            },
            capture: None,
        })
    }

    /// An existing constant whose value is captured under `attr` for
    /// later attribute synthesis
    pub fn capture_constant(&mut self, attr: &str) -> BoundaryId {
        self.push_boundary(BoundaryNode {
            kind: BoundaryKind::Existing {
                require_constant: true,
                expect_value: None,
            },
            capture: Some(attr.to_string()),
        })
    }

    /// A literal to materialize as a new `Constant` producer when the
    /// destination chain is instantiated
    pub fn new_constant(&mut self, value: TensorData) -> BoundaryId {
        self.push_boundary(BoundaryNode {
            kind: BoundaryKind::NewConstant(value),
            capture: None,
        })
    }

    /// Add a pattern node to the arena
    pub fn node(&mut self, node: PatternNode) -> PatternId {
        self.nodes.push(node);
        PatternId(self.nodes.len() - 1)
    }

    /// Finish the rule with the given source and destination chains
    pub fn build(self, name: &str, src: Vec<PatternId>, dst: Vec<PatternId>) -> ReformRule {
        ReformRule {
            name: name.to_string(),
            boundaries: self.boundaries,
            nodes: self.nodes,
            src,
            dst,
        }
    }
}
