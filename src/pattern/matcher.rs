//! Chain matcher
//!
//! Scans the graph's nodes in definition order for occurrences of a rule's
//! source chain. The scan keeps a cursor into the chain: a candidate node is
//! tested against the pattern node at the cursor, and on mismatch the cursor
//! resets and the same node is retried against the chain head; a chain
//! cannot resume mid-pattern. Constant producers are never chain members and
//! are skipped entirely.
//!
//! Matching is positional: a boundary placeholder binds to whatever input
//! name appears (after its existence/value checks), while a pattern-node
//! reference requires the input name to equal the output bound for that
//! inner node, so the chain must actually be connected. For the operators
//! known to be commutative here (`Add`, `Mul`) a failed forward match is
//! retried with the candidate's inputs reversed; this is a narrow special
//! case, not a general commutativity solver.

use ndarray::IxDyn;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::{ReformError, ReformResult};
use crate::graph::{AttrValue, Graph, Node, Tensor, TensorData};

use super::vocab::{BoundaryKind, PatternId, PatternRef, ReformRule};

/// A resolved input of a destination node
#[derive(Debug, Clone)]
pub enum DstInput {
    /// A tensor name bound during matching
    Bound(String),
    /// The primary output of an earlier node in the same destination chain,
    /// by chain position; resolved when the chain is instantiated
    FromDst(usize),
    /// A literal to materialize as a new `Constant` producer; the boundary
    /// index deduplicates materialization within one match
    Materialize {
        /// Arena index of the originating boundary
        boundary: usize,
        /// Literal value
        value: TensorData,
    },
    /// Unresolvable: the boundary was never bound and carries no literal
    Missing,
}

/// One node of the instantiation-ready destination chain
#[derive(Debug, Clone)]
pub struct DstNode {
    /// Operator type tag
    pub op_type: String,
    /// Resolved inputs, in order
    pub inputs: Vec<DstInput>,
    /// Final attributes: literals plus extracted plus functor-derived values
    pub attrs: Vec<(String, AttrValue)>,
}

/// One occurrence of a rule's source chain, ready for substitution
#[derive(Debug, Clone)]
pub struct Match {
    /// Name of the rule that produced this match
    pub rule_name: String,
    /// Primary output name of each matched concrete node, in chain order.
    /// Names, not positions: positions shift as earlier matches are applied.
    pub sources: Vec<String>,
    /// Node name of the terminal matched node, used to synthesize fresh
    /// intermediate output names
    pub terminal_name: String,
    /// Operator tag of the terminal source node, for the rename-map key
    pub src_terminal_op: String,
    /// Attribute-bound destination chain
    pub dst: Vec<DstNode>,
}

/// Transient per-attempt binding state
struct Bindings {
    boundary_out: Vec<Option<String>>,
    captured: Vec<Option<TensorData>>,
    node_out: Vec<Vec<String>>,
    node_attr: Vec<FxHashMap<String, AttrValue>>,
}

impl Bindings {
    fn new(rule: &ReformRule) -> Self {
        Self {
            boundary_out: vec![None; rule.boundary_count()],
            captured: vec![None; rule.boundary_count()],
            node_out: vec![Vec::new(); rule.node_count()],
            node_attr: vec![FxHashMap::default(); rule.node_count()],
        }
    }

    fn reset(&mut self) {
        self.boundary_out.iter_mut().for_each(|b| *b = None);
        self.captured.iter_mut().for_each(|c| *c = None);
        self.node_out.iter_mut().for_each(|o| o.clear());
        self.node_attr.iter_mut().for_each(|a| a.clear());
    }

    fn node_primary_output(&self, id: PatternId) -> Option<&str> {
        self.node_out[id.0].first().map(|s| s.as_str())
    }

    fn output_of(&self, r: PatternRef) -> Option<&str> {
        match r {
            PatternRef::Boundary(b) => self.boundary_out[b.0].as_deref(),
            PatternRef::Node(p) => self.node_primary_output(p),
        }
    }

    /// Resolve a functor argument: an extracted attribute for pattern nodes,
    /// a captured constant for boundaries
    fn attr_of(&self, rule: &ReformRule, r: PatternRef, name: &str) -> ReformResult<AttrValue> {
        match r {
            PatternRef::Boundary(b) => {
                let boundary = rule.boundary(b);
                if boundary.capture.as_deref() != Some(name) {
                    return Err(ReformError::AttrFunctor(format!(
                        "boundary does not capture '{name}'"
                    )));
                }
                let value = self.captured[b.0].as_ref().ok_or_else(|| {
                    ReformError::AttrFunctor(format!("capture '{name}' is unbound"))
                })?;
                Ok(captured_to_attr(value))
            }
            PatternRef::Node(p) => self.node_attr[p.0].get(name).cloned().ok_or_else(|| {
                ReformError::AttrFunctor(format!("attribute '{name}' is unbound"))
            }),
        }
    }
}

/// Convert a captured constant to an attribute value.
///
/// 0-d captures collapse to scalar floats; 1-d captures become float lists.
fn captured_to_attr(value: &TensorData) -> AttrValue {
    match value.ndim() {
        0 => AttrValue::Float(value[[]]),
        1 => AttrValue::Floats(value.iter().copied().collect()),
        _ => AttrValue::Tensor(Tensor::from_f32("", value)),
    }
}

/// Exact value equality after broadcasting 0-d operands to 1-d
fn values_equal(a: &TensorData, b: &TensorData) -> bool {
    let a = if a.ndim() == 0 {
        a.clone().into_shape(IxDyn(&[1])).ok()
    } else {
        Some(a.clone())
    };
    let b = if b.ndim() == 0 {
        b.clone().into_shape(IxDyn(&[1])).ok()
    } else {
        Some(b.clone())
    };
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

/// Shape-compatibility predicate behind the `"broadcast"` constraint.
///
/// Succeeds when either operand's trailing dimension is 1 or both trailing
/// dimensions agree; for operands with two or more dimensions, when one
/// second-to-last dimension is 1 and all leading dimensions are equal.
/// Shapes the predicate cannot classify fall through to `false`, a match
/// failure rather than an error.
fn broadcast_ok(graph: &Graph, node: &Node) -> bool {
    if node.input.len() != 2 {
        return false;
    }
    let (Some(s0), Some(s1)) = (
        graph.input_shape(&node.input[0]),
        graph.input_shape(&node.input[1]),
    ) else {
        return false;
    };
    if s0.is_empty() || s1.is_empty() {
        return false;
    }
    if s0.len() == 1 || s1.len() == 1 {
        let (t0, t1) = (s0[s0.len() - 1], s1[s1.len() - 1]);
        return t0 == t1 || t0 == 1 || t1 == 1;
    }
    // grouped fully-connected case
    (s0[s0.len() - 2] == 1 || s1[s1.len() - 2] == 1) && s0[..s0.len() - 2] == s1[..s1.len() - 2]
}

fn check_constraint(graph: &Graph, node: &Node, constraint: &str) -> ReformResult<bool> {
    match constraint {
        "broadcast" => Ok(broadcast_ok(graph, node)),
        other => Err(ReformError::UnknownConstraint(other.to_string())),
    }
}

/// Positional input match: binds boundaries, checks chain connectivity
fn match_input(
    graph: &Graph,
    rule: &ReformRule,
    bind: &mut Bindings,
    inputs: &[&str],
    pattern_inputs: &[PatternRef],
) -> bool {
    if inputs.len() != pattern_inputs.len() {
        return false;
    }
    for (&name, &r) in inputs.iter().zip(pattern_inputs) {
        match r {
            PatternRef::Boundary(b) => {
                let boundary = rule.boundary(b);
                match &boundary.kind {
                    BoundaryKind::Existing {
                        require_constant,
                        expect_value,
                    } => {
                        if (*require_constant || expect_value.is_some()) && !graph.find_tensor(name)
                        {
                            return false;
                        }
                        if let Some(want) = expect_value {
                            let Some(got) = graph.tensor_value(name) else {
                                return false;
                            };
                            if !values_equal(want, &got) {
                                return false;
                            }
                        }
                    }
                    BoundaryKind::NewConstant(want) => {
                        if !graph.find_tensor(name) {
                            return false;
                        }
                        let Some(got) = graph.tensor_value(name) else {
                            return false;
                        };
                        if !values_equal(want, &got) {
                            return false;
                        }
                    }
                }
                if boundary.capture.is_some() {
                    let Some(value) = graph.tensor_value(name) else {
                        return false;
                    };
                    bind.captured[b.0] = Some(value);
                }
                // boundaries re-bind to whatever operand appears
                bind.boundary_out[b.0] = Some(name.to_string());
            }
            PatternRef::Node(p) => {
                if bind.node_primary_output(p) != Some(name) {
                    return false;
                }
            }
        }
    }
    true
}

/// Test one concrete node against one pattern node, binding on success
fn match_node(
    graph: &Graph,
    rule: &ReformRule,
    bind: &mut Bindings,
    node: &Node,
    id: PatternId,
) -> ReformResult<bool> {
    let pnode = rule.node(id);
    let inputs: Vec<&str> = node.input.iter().map(|s| s.as_str()).collect();
    let mut matched = match_input(graph, rule, bind, &inputs, &pnode.inputs);
    if !matched && (node.op_type == "Mul" || node.op_type == "Add") {
        let reversed: Vec<&str> = inputs.iter().rev().copied().collect();
        matched = match_input(graph, rule, bind, &reversed, &pnode.inputs);
    }
    if matched {
        if let Some(constraint) = &pnode.constraint {
            matched = check_constraint(graph, node, constraint)?;
        }
    }
    if matched {
        for (attr_name, bound_as) in &pnode.extract {
            let value = node.get_attribute(attr_name).cloned().ok_or_else(|| {
                ReformError::MissingAttribute {
                    op_type: node.op_type.clone(),
                    attr: attr_name.clone(),
                }
            })?;
            bind.node_attr[id.0].insert(bound_as.clone(), value);
        }
        bind.node_out[id.0] = node.output.clone();
    }
    Ok(matched)
}

/// A completed occurrence is replaceable only if its single external output
/// is the terminal node's: every non-terminal output must stay inside the
/// matched set and must not be a declared graph output.
fn chain_is_replaceable(graph: &Graph, matched: &[usize]) -> bool {
    let members: FxHashSet<usize> = matched.iter().copied().collect();
    let Some((_, interior)) = matched.split_last() else {
        return false;
    };
    for &idx in interior {
        for output in &graph.nodes[idx].output {
            if graph.is_graph_output(output) {
                return false;
            }
            if graph
                .consumers_of(output)
                .iter()
                .any(|c| !members.contains(c))
            {
                return false;
            }
        }
    }
    true
}

/// Snapshot the destination chain for a completed occurrence: resolve every
/// input reference against the current bindings and evaluate attr functors.
fn build_match(
    graph: &Graph,
    rule: &ReformRule,
    bind: &Bindings,
    matched: &[usize],
) -> ReformResult<Match> {
    let dst_positions: FxHashMap<usize, usize> = rule
        .dst
        .iter()
        .enumerate()
        .map(|(pos, id)| (id.0, pos))
        .collect();

    let mut dst = Vec::with_capacity(rule.dst.len());
    for &id in &rule.dst {
        let pnode = rule.node(id);
        let mut inputs = Vec::with_capacity(pnode.inputs.len());
        for &r in &pnode.inputs {
            let input = match r {
                PatternRef::Node(p) if dst_positions.contains_key(&p.0) => {
                    DstInput::FromDst(dst_positions[&p.0])
                }
                _ => match bind.output_of(r) {
                    Some(name) => DstInput::Bound(name.to_string()),
                    None => match r {
                        PatternRef::Boundary(b) => match &rule.boundary(b).kind {
                            BoundaryKind::NewConstant(value) => DstInput::Materialize {
                                boundary: b.0,
                                value: value.clone(),
                            },
                            BoundaryKind::Existing { .. } => DstInput::Missing,
                        },
                        PatternRef::Node(_) => DstInput::Missing,
                    },
                },
            };
            inputs.push(input);
        }

        let mut attrs: Vec<(String, AttrValue)> = pnode.literal_attrs.clone();
        for (bound_as, _) in &pnode.extract {
            if let Some(value) = bind.node_attr[id.0].get(bound_as) {
                attrs.push((bound_as.clone(), value.clone()));
            }
        }
        for (name, functor) in &pnode.derived {
            let mut args = Vec::with_capacity(functor.args.len());
            for (r, attr_name) in &functor.args {
                args.push(bind.attr_of(rule, *r, attr_name)?);
            }
            attrs.push((name.clone(), functor.transform.apply(&args)?));
        }
        dst.push(DstNode {
            op_type: pnode.op_type.clone(),
            inputs,
            attrs,
        });
    }

    let terminal = &graph.nodes[*matched.last().ok_or_else(|| {
        ReformError::Internal("empty match accumulator".to_string())
    })?];
    let sources = matched
        .iter()
        .map(|&idx| {
            graph.nodes[idx]
                .primary_output()
                .map(|s| s.to_string())
                .ok_or_else(|| ReformError::InvalidGraph("matched node without output".to_string()))
        })
        .collect::<ReformResult<Vec<_>>>()?;

    Ok(Match {
        rule_name: rule.name.clone(),
        sources,
        terminal_name: terminal.name.clone(),
        src_terminal_op: terminal.op_type.clone(),
        dst,
    })
}

/// Scan the graph for all non-overlapping occurrences of `rule`'s source
/// chain, in definition order.
pub fn find_matches(graph: &Graph, rule: &ReformRule) -> ReformResult<Vec<Match>> {
    if rule.src.is_empty() {
        return Ok(Vec::new());
    }

    let mut bind = Bindings::new(rule);
    let mut cursor = 0usize;
    let mut acc: Vec<usize> = Vec::new();
    let mut matches = Vec::new();

    for (idx, node) in graph.nodes.iter().enumerate() {
        if node.is_constant() {
            continue;
        }

        let mut matched = false;
        if node.op_type == rule.node(rule.src[cursor]).op_type {
            matched = match_node(graph, rule, &mut bind, node, rule.src[cursor])?;
        }
        if !matched && cursor > 0 {
            // a chain cannot resume mid-pattern; retry this node as a fresh start
            cursor = 0;
            acc.clear();
            bind.reset();
            if node.op_type == rule.node(rule.src[0]).op_type {
                matched = match_node(graph, rule, &mut bind, node, rule.src[0])?;
            }
        }

        if matched {
            acc.push(idx);
            cursor += 1;
            if cursor == rule.src.len() {
                if chain_is_replaceable(graph, &acc) {
                    matches.push(build_match(graph, rule, &bind, &acc)?);
                } else {
                    trace!(rule = %rule.name, "occurrence rejected: non-terminal output escapes the chain");
                }
                cursor = 0;
                acc.clear();
                bind.reset();
            }
        } else if cursor == 0 {
            acc.clear();
            bind.reset();
        }
    }

    Ok(matches)
}
