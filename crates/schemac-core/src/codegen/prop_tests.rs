//! Property-based tests for the IR optimizer
//!
//! Random statement trees built from the node kinds the compiler emits:
//! the optimizer must reach a fixed point, never grow the tree and keep
//! every error push outside constant branches.

#[cfg(test)]
mod tests {
    use crate::codegen::code::{Builtin, Expr, Name};
    use crate::codegen::node::{count_nodes, Node, VarKind};
    use crate::codegen::optimizer::Optimizer;
    use proptest::prelude::*;

    const PASSES: usize = 32;

    fn var_strategy() -> impl Strategy<Value = Expr> {
        prop_oneof![
            Just(Expr::var(&Name::new("data"))),
            Just(Expr::var(&Name::new("valid0"))),
            Just(Expr::var(&Name::new("tmp0"))),
            Just(Expr::var(&Name::new("tmp1"))),
        ]
    }

    /// Boolean conditions mixing literals, variables and stateful calls
    fn cond_strategy() -> impl Strategy<Value = Expr> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Expr::bool),
            var_strategy(),
            (var_strategy(), 0u64..4).prop_map(|(v, n)| Expr::eq(v, Expr::num(n))),
            Just(Expr::eq(Expr::call(Builtin::ErrorCount, vec![]), Expr::num(0))),
        ];
        leaf.prop_recursive(3, 16, 3, |inner| {
            prop_oneof![
                inner.clone().prop_map(Expr::not),
                proptest::collection::vec(inner.clone(), 1..4).prop_map(Expr::and),
                proptest::collection::vec(inner, 1..4).prop_map(Expr::or),
            ]
        })
    }

    fn concat_strategy() -> impl Strategy<Value = Expr> {
        proptest::collection::vec(
            prop_oneof!["[a-z ]{0,6}".prop_map(Expr::str), var_strategy()],
            1..5,
        )
        .prop_map(Expr::concat)
    }

    fn node_strategy() -> impl Strategy<Value = Node> {
        let leaf = prop_oneof![
            cond_strategy().prop_map(Node::Return),
            (prop_oneof![Just("tmp0"), Just("tmp1")], var_strategy()).prop_map(|(name, rhs)| Node::Def {
                kind: VarKind::Const,
                name: Name::new(name),
                rhs: Some(rhs.prop("x")),
                constant: true,
            }),
            concat_strategy().prop_map(|message| Node::Expr(Expr::call(Builtin::PushError, vec![message]))),
            Just(Node::Break(None)),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                (
                    cond_strategy(),
                    proptest::collection::vec(inner.clone(), 0..3),
                    proptest::option::of(proptest::collection::vec(inner.clone(), 0..3)),
                )
                    .prop_map(|(cond, then, els)| Node::If { cond, then, els }),
                proptest::collection::vec(inner, 0..3).prop_map(Node::Block),
            ]
        })
    }

    fn body_strategy() -> impl Strategy<Value = Vec<Node>> {
        proptest::collection::vec(node_strategy(), 0..6)
    }

    fn is_push(e: &Expr) -> bool {
        matches!(e, Expr::Call(Builtin::PushError, _))
    }

    fn count_pushes(nodes: &[Node]) -> usize {
        let mut calls = 0;
        for node in nodes {
            node.for_each_expr(&mut |e: &Expr| {
                if is_push(e) {
                    calls += 1;
                }
            });
        }
        calls
    }

    /// Constant value of `cond` once folded, if any
    fn folded_truth(cond: &Expr) -> Option<bool> {
        let mut body = vec![Node::Return(cond.clone())];
        Optimizer::with_passes(PASSES).optimize(&mut body);
        match body.as_slice() {
            [Node::Return(folded)] => folded.const_truthy(),
            _ => None,
        }
    }

    /// Error pushes outside branches whose condition folds to a constant
    fn reachable_pushes(nodes: &[Node]) -> usize {
        nodes
            .iter()
            .map(|node| match node {
                Node::If { cond, then, els } => {
                    let els = els.as_deref().map_or(0, reachable_pushes);
                    match folded_truth(cond) {
                        Some(true) => reachable_pushes(then),
                        Some(false) => els,
                        None => reachable_pushes(then) + els,
                    }
                }
                Node::Block(body) => reachable_pushes(body),
                other => count_pushes(std::slice::from_ref(other)),
            })
            .sum()
    }

    proptest! {
        #[test]
        fn prop_optimizer_reaches_fixed_point(body in body_strategy()) {
            let optimizer = Optimizer::with_passes(PASSES);
            let mut once = body;
            let report = optimizer.optimize(&mut once);
            prop_assume!(report.passes < PASSES);

            let mut twice = once.clone();
            let second = optimizer.optimize(&mut twice);
            prop_assert_eq!(&twice, &once);
            prop_assert_eq!(second.passes, 1);
        }

        #[test]
        fn prop_optimizer_never_grows_tree(body in body_strategy()) {
            let before = count_nodes(&body);
            let mut optimized = body;
            let report = Optimizer::with_passes(PASSES).optimize(&mut optimized);
            prop_assert_eq!(report.nodes_before, before);
            prop_assert!(report.nodes_after <= report.nodes_before);
            prop_assert_eq!(report.nodes_after, count_nodes(&optimized));
        }

        #[test]
        fn prop_optimizer_keeps_error_pushes(body in body_strategy()) {
            let expected = reachable_pushes(&body);
            let mut optimized = body;
            let report = Optimizer::with_passes(PASSES).optimize(&mut optimized);
            prop_assume!(report.passes < PASSES);
            prop_assert_eq!(count_pushes(&optimized), expected);
        }
    }
}
