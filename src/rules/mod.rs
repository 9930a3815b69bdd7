//! Built-in rewrite rules
//!
//! The rule set distilled from decomposed framework exports: the two
//! LayerNorm fusion rules (with and without the trailing affine Mul/Add)
//! and the HardSwish fusion rule.
//!
//! Rule order matters: the affine LayerNorm rule precedes the affine-free
//! one so a full decomposition fuses maximally instead of leaving the scale
//! and bias nodes behind.

use ndarray::arr0;

use crate::pattern::{AttrFunctor, AttrTransform, PatternNode, ReformRule, RuleBuilder};

/// LayerNorm fusion rules.
///
/// Both variants match the decomposed normalization
///
/// ```text
/// ReduceMean(x) -> m
/// Sub(x, m) -> d
/// Pow(d, 2) -> p
/// ReduceMean(p) -> v
/// Add(v, eps) -> e
/// Sqrt(e) -> s
/// Div(d, s) -> n
/// ```
///
/// and synthesize `epsilon` from the captured eps constant and `axis` from
/// the first ReduceMean's `axes` attribute. The affine variant additionally
/// consumes the trailing `Mul(n, scale)` / `Add(_, bias)` pair and passes
/// the scale and bias tensors into the fused operator.
pub fn layer_norm_rules() -> Vec<ReformRule> {
    fn chain(affine: bool) -> ReformRule {
        let mut b = RuleBuilder::new();
        let x = b.operand();
        let two = b.constant_eq(arr0(2.0f32).into_dyn());
        let eps = b.capture_constant("eps");

        let rm0 = b.node(PatternNode::new("ReduceMean", [x.into()]).extract("axes"));
        let sub = b.node(PatternNode::new("Sub", [x.into(), rm0.into()]));
        let pow = b.node(PatternNode::new("Pow", [sub.into(), two.into()]));
        let rm1 = b.node(PatternNode::new("ReduceMean", [pow.into()]));
        let add0 = b.node(PatternNode::new("Add", [rm1.into(), eps.into()]));
        let sqrt = b.node(PatternNode::new("Sqrt", [add0.into()]));
        let div = b.node(PatternNode::new("Div", [sub.into(), sqrt.into()]));

        let epsilon = AttrFunctor::new([(eps.into(), "eps")], AttrTransform::Identity);
        let axis = AttrFunctor::new([(rm0.into(), "axes")], AttrTransform::First);

        if affine {
            let scale = b.existing_constant();
            let bias = b.existing_constant();
            let mul = b.node(PatternNode::new("Mul", [div.into(), scale.into()]));
            let add1 = b.node(PatternNode::new("Add", [mul.into(), bias.into()]));
            let fused = b.node(
                PatternNode::new("LayerNorm", [x.into(), scale.into(), bias.into()])
                    .derive("epsilon", epsilon)
                    .derive("axis", axis),
            );
            b.build(
                "layernorm_aff",
                vec![rm0, sub, pow, rm1, add0, sqrt, div, mul, add1],
                vec![fused],
            )
        } else {
            let fused = b.node(
                PatternNode::new("LayerNorm", [x.into()])
                    .derive("epsilon", epsilon)
                    .derive("axis", axis),
            );
            b.build(
                "layernorm",
                vec![rm0, sub, pow, rm1, add0, sqrt, div],
                vec![fused],
            )
        }
    }
    vec![chain(true), chain(false)]
}

/// HardSwish fusion: `Mul(x, HardSigmoid(x))` collapses to `HardSwish(x)`
pub fn hardswish_rule() -> ReformRule {
    let mut b = RuleBuilder::new();
    let x = b.operand();
    let sig = b.node(PatternNode::new("HardSigmoid", [x.into()]));
    let mul = b.node(PatternNode::new("Mul", [x.into(), sig.into()]));
    let fused = b.node(PatternNode::new("HardSwish", [x.into()]));
    b.build("hardswish", vec![sig, mul], vec![fused])
}

/// The default rule list, in application order
pub fn default_rules() -> Vec<ReformRule> {
    let mut rules = layer_norm_rules();
    rules.push(hardswish_rule());
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ReformEngine;
    use crate::graph::{make_constant, make_node, AttrValue, Graph, Tensor};

    fn reduce_mean(input: &str, output: &str, name: &str) -> crate::graph::Node {
        let mut node = make_node("ReduceMean", &[input], &[output], name);
        node.attribute
            .insert("axes".to_string(), AttrValue::Ints(vec![-1]));
        node
    }

    /// The decomposed affine-free normalization chain ending at graph output N
    fn plain_layernorm_graph() -> Graph {
        Graph::new(
            vec![
                make_constant("two", Tensor::scalar_f32("value", 2.0)),
                make_constant("eps", Tensor::scalar_f32("value", 1e-5)),
                reduce_mean("X", "M", "rm_0"),
                make_node("Sub", &["X", "M"], &["D"], "sub_0"),
                make_node("Pow", &["D", "two"], &["P"], "pow_0"),
                reduce_mean("P", "V", "rm_1"),
                make_node("Add", &["V", "eps"], &["E"], "add_0"),
                make_node("Sqrt", &["E"], &["S"], "sqrt_0"),
                make_node("Div", &["D", "S"], &["N"], "div_0"),
            ],
            vec![],
            vec!["N".to_string()],
        )
    }

    #[test]
    fn test_affine_free_fusion() {
        let mut graph = plain_layernorm_graph();
        let engine = ReformEngine::new(default_rules());
        let renames = engine.run(&mut graph).unwrap();

        // all seven chain nodes and both constants collapse to one operator
        assert_eq!(graph.node_count(), 1);
        let fused = graph.node_by_output("N").unwrap();
        assert_eq!(fused.op_type, "LayerNorm");
        assert_eq!(fused.input, vec!["X"]);
        assert_eq!(fused.output, vec!["N"]);
        assert_eq!(
            fused.get_attribute("epsilon"),
            Some(&AttrValue::Float(1e-5))
        );
        assert_eq!(fused.get_attribute("axis"), Some(&AttrValue::Int(-1)));

        assert_eq!(renames.len(), 1);
        assert_eq!(
            renames.get("N_Div").map(|s| s.as_str()),
            Some("N_LayerNorm")
        );
    }

    #[test]
    fn test_affine_fusion() {
        let mut nodes = plain_layernorm_graph().nodes;
        nodes.push(make_node("Mul", &["N", "gamma"], &["G"], "mul_0"));
        nodes.push(make_node("Add", &["G", "beta"], &["Y"], "add_1"));
        let weights = vec![
            Tensor::from_f32("gamma", &ndarray::arr1(&[1.0f32, 1.0]).into_dyn()),
            Tensor::from_f32("beta", &ndarray::arr1(&[0.0f32, 0.0]).into_dyn()),
        ];
        let mut graph = Graph::new(nodes, weights, vec!["Y".to_string()]);

        let engine = ReformEngine::new(default_rules());
        let renames = engine.run(&mut graph).unwrap();

        assert_eq!(graph.node_count(), 1);
        let fused = graph.node_by_output("Y").unwrap();
        assert_eq!(fused.op_type, "LayerNorm");
        assert_eq!(fused.input, vec!["X", "gamma", "beta"]);
        assert_eq!(fused.get_attribute("axis"), Some(&AttrValue::Int(-1)));
        assert_eq!(
            renames.get("Y_Add").map(|s| s.as_str()),
            Some("Y_LayerNorm")
        );
        // the scale and bias weights stay live as fused-operator inputs
        assert!(graph.find_tensor("gamma"));
        assert!(graph.find_tensor("beta"));
    }

    #[test]
    fn test_wrong_exponent_does_not_fuse() {
        let mut graph = plain_layernorm_graph();
        graph.nodes[0] = make_constant("two", Tensor::scalar_f32("value", 3.0));
        graph.refresh();

        let engine = ReformEngine::new(default_rules());
        engine.run(&mut graph).unwrap();
        // Pow exponent is not 2: nothing may fuse
        assert_eq!(graph.node_count(), 9);
    }

    #[test]
    fn test_fusion_is_idempotent() {
        let mut graph = plain_layernorm_graph();
        let engine = ReformEngine::new(default_rules());
        engine.run(&mut graph).unwrap();

        let snapshot = graph.nodes.clone();
        let second = engine.run(&mut graph).unwrap();
        assert!(second.is_empty());
        assert_eq!(graph.nodes, snapshot);
    }

    #[test]
    fn test_missing_axes_attribute_is_fatal() {
        let mut graph = plain_layernorm_graph();
        // strip the axes attribute the rule extracts
        graph.nodes[2].attribute.clear();
        let engine = ReformEngine::new(default_rules());
        let err = engine.run(&mut graph).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ReformError::MissingAttribute { .. }
        ));
    }
}
