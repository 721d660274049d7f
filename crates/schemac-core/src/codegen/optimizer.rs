//! Validator IR optimizer
//!
//! This module provides optimization passes that shrink the generated
//! validator body before it is executed: constant-condition folding,
//! single-use constant inlining and literal string merging.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::code::{BinOp, Expr, Name};
use super::node::{count_nodes, ForKind, Node, Place};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// IR optimizer with configurable passes
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    /// Configuration for optimization passes
    config: OptimizerConfig,
}

/// Configuration for optimizer behavior
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Fold `if` statements and logical expressions with constant conditions
    pub constant_folding: bool,
    /// Inline single-use constants without side effects
    pub inline_constants: bool,
    /// Merge adjacent string literals in concatenations
    pub merge_strings: bool,
    /// Maximum number of rounds; optimization stops earlier at a fixed point
    pub max_passes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            constant_folding: true,
            inline_constants: true,
            merge_strings: true,
            max_passes: 1,
        }
    }
}

/// Summary of an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizationReport {
    pub passes: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
}

impl Optimizer {
    /// Create a new optimizer with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new optimizer with custom configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Optimizer running the given number of rounds
    pub fn with_passes(max_passes: usize) -> Self {
        Self::with_config(OptimizerConfig {
            max_passes,
            ..OptimizerConfig::default()
        })
    }

    /// Optimize a function body in place
    pub fn optimize(&self, nodes: &mut Vec<Node>) -> OptimizationReport {
        let nodes_before = count_nodes(nodes);
        let mut passes = 0;
        while passes < self.config.max_passes {
            passes += 1;
            let mut changed = false;
            if self.config.constant_folding {
                changed |= fold_nodes(nodes);
            }
            if self.config.inline_constants {
                changed |= inline_constants(nodes);
            }
            if self.config.merge_strings {
                changed |= merge_strings(nodes);
            }
            if !changed {
                break;
            }
        }
        OptimizationReport {
            passes,
            nodes_before,
            nodes_after: count_nodes(nodes),
        }
    }
}

// Constant folding

fn fold_nodes(nodes: &mut Vec<Node>) -> bool {
    let mut changed = false;
    let old = std::mem::take(nodes);
    for node in old {
        changed |= fold_node(node, nodes);
    }
    changed
}

/// Fold one node, pushing its replacement(s) into `out`
fn fold_node(node: Node, out: &mut Vec<Node>) -> bool {
    match node {
        Node::If { cond, mut then, els } => {
            let (cond, mut changed) = fold_expr(cond);
            changed |= fold_nodes(&mut then);
            let els = match els {
                Some(mut els) => {
                    changed |= fold_nodes(&mut els);
                    if els.is_empty() {
                        changed = true;
                        None
                    } else {
                        Some(els)
                    }
                }
                None => None,
            };
            match cond.const_truthy() {
                Some(true) => {
                    out.extend(then);
                    true
                }
                Some(false) => {
                    out.extend(els.unwrap_or_default());
                    true
                }
                None if then.is_empty() && els.is_none() && cond.is_pure() => true,
                None if then.is_empty() => match els {
                    Some(els) => {
                        out.push(Node::If { cond: Expr::not(cond), then: els, els: None });
                        true
                    }
                    None => {
                        out.push(Node::Expr(cond));
                        true
                    }
                },
                None => {
                    out.push(Node::If { cond, then, els });
                    changed
                }
            }
        }
        Node::Block(mut body) => {
            fold_nodes(&mut body);
            out.extend(body);
            true
        }
        Node::For { kind, mut body } => {
            let changed = fold_nodes(&mut body);
            out.push(Node::For { kind, body });
            changed
        }
        Node::Func { name, params, is_async, mut body } => {
            let changed = fold_nodes(&mut body);
            out.push(Node::Func { name, params, is_async, body });
            changed
        }
        Node::Label { label, mut body } => {
            let changed = fold_nodes(&mut body);
            out.push(Node::Label { label, body });
            changed
        }
        Node::Try { mut body, catch, finally } => {
            let mut changed = fold_nodes(&mut body);
            let catch = catch.map(|(e, mut nodes)| {
                changed |= fold_nodes(&mut nodes);
                (e, nodes)
            });
            let finally = finally.map(|mut nodes| {
                changed |= fold_nodes(&mut nodes);
                nodes
            });
            out.push(Node::Try { body, catch, finally });
            changed
        }
        Node::Def { kind, name, rhs, constant } => {
            let (rhs, changed) = match rhs {
                Some(rhs) => {
                    let (rhs, changed) = fold_expr(rhs);
                    (Some(rhs), changed)
                }
                None => (None, false),
            };
            out.push(Node::Def { kind, name, rhs, constant });
            changed
        }
        Node::Assign { lhs, rhs } => {
            let (rhs, changed) = fold_expr(rhs);
            out.push(Node::Assign { lhs, rhs });
            changed
        }
        Node::Return(e) => {
            let (e, changed) = fold_expr(e);
            out.push(Node::Return(e));
            changed
        }
        Node::Expr(e) => {
            let (e, changed) = fold_expr(e);
            if e.is_pure() {
                return true;
            }
            out.push(Node::Expr(e));
            changed
        }
        other => {
            out.push(other);
            false
        }
    }
}

/// Fold constant logical sub-expressions
fn fold_expr(expr: Expr) -> (Expr, bool) {
    let mut changed = false;
    let folded = expr.map(&mut |e| match e {
        Expr::Not(inner) => match inner.const_truthy() {
            Some(b) => {
                changed = true;
                Expr::bool(!b)
            }
            None => Expr::Not(inner),
        },
        Expr::And(items) => {
            let (e, c) = fold_logical(items, true);
            changed |= c;
            e
        }
        Expr::Or(items) => {
            let (e, c) = fold_logical(items, false);
            changed |= c;
            e
        }
        Expr::Bin(op @ (BinOp::Eq | BinOp::Ne), a, b) => match (a.as_lit(), b.as_lit()) {
            (Some(x), Some(y)) => {
                changed = true;
                Expr::bool((crate::runtime::equal::equal(x, y)) == (op == BinOp::Eq))
            }
            _ => Expr::Bin(op, a, b),
        },
        e => e,
    });
    (folded, changed)
}

/// Fold `&&` (`is_and`) or `||` chains with literal operands
fn fold_logical(items: Vec<Expr>, is_and: bool) -> (Expr, bool) {
    let original = items.len();
    let mut kept = Vec::with_capacity(items.len());
    let mut short_circuit = false;
    for item in items {
        match item.const_truthy() {
            // Neutral element
            Some(b) if b == is_and => continue,
            // Absorbing element: later operands are never evaluated
            Some(_) => {
                kept.push(item);
                short_circuit = true;
                break;
            }
            None => kept.push(item),
        }
    }
    let changed = kept.len() != original;
    if short_circuit && kept.len() == 1 {
        return (Expr::bool(!is_and), true);
    }
    if short_circuit && kept[..kept.len() - 1].iter().all(Expr::is_pure) {
        return (Expr::bool(!is_and), true);
    }
    let e = match kept.len() {
        0 => Expr::bool(is_and),
        1 => match kept.pop() {
            Some(e) => {
                // `a && b` yields operand values; a lone operand keeps its value
                return (e, true);
            }
            None => Expr::bool(is_and),
        },
        _ if is_and => Expr::And(kept),
        _ => Expr::Or(kept),
    };
    (e, changed)
}

// Single-use constant inlining

fn inline_constants(nodes: &mut Vec<Node>) -> bool {
    let mut uses: HashMap<Name, usize> = HashMap::new();
    let mut assigned: HashSet<Name> = HashSet::new();
    for node in nodes.iter() {
        count_uses(node, &mut uses);
        collect_assigned(node, &mut assigned);
    }

    let mut substitutions: HashMap<Name, Expr> = HashMap::new();
    let mut dead: HashSet<Name> = HashSet::new();
    collect_candidates(nodes, &uses, &assigned, &mut substitutions, &mut dead);
    if substitutions.is_empty() && dead.is_empty() {
        return false;
    }
    rewrite(nodes, &substitutions, &dead);
    true
}

fn count_uses(node: &Node, uses: &mut HashMap<Name, usize>) {
    node.for_each_expr(&mut |e| {
        e.for_each_name(&mut |n| *uses.entry(n.clone()).or_insert(0) += 1)
    });
    node.for_each_assigned(&mut |n| *uses.entry(n.clone()).or_insert(0) += 1);
}

/// Names written by assignment statements (loop headers excluded)
fn collect_assigned(node: &Node, assigned: &mut HashSet<Name>) {
    match node {
        Node::Assign { lhs: Place::Var(n) | Place::Member(n, _), .. } => {
            assigned.insert(n.clone());
        }
        Node::For { kind: ForKind::Counted { init, step, .. }, body } => {
            if let Some(init) = init {
                collect_assigned(init, assigned);
            }
            if let Some(step) = step {
                collect_assigned(step, assigned);
            }
            body.iter().for_each(|n| collect_assigned(n, assigned));
        }
        _ => node.for_each_child_block(&mut |nodes| {
            nodes.iter().for_each(|n| collect_assigned(n, assigned))
        }),
    }
}

fn collect_candidates(
    nodes: &[Node],
    uses: &HashMap<Name, usize>,
    assigned: &HashSet<Name>,
    substitutions: &mut HashMap<Name, Expr>,
    dead: &mut HashSet<Name>,
) {
    for node in nodes {
        if let Node::Def { name, rhs: Some(rhs), constant, .. } = node {
            let count = uses.get(name).copied().unwrap_or(0);
            let stable = rhs.is_pure()
                && !assigned.contains(name)
                && rhs.names().iter().all(|n| !assigned.contains(n));
            if count == 0 && rhs.is_pure() {
                dead.insert(name.clone());
            } else if *constant && count == 1 && stable {
                let resolved = substitute(rhs.clone(), substitutions);
                substitutions.insert(name.clone(), resolved);
            }
        }
        if let Node::For { kind: ForKind::Counted { init: Some(init), .. }, .. } = node {
            collect_candidates(std::slice::from_ref(init.as_ref()), uses, assigned, substitutions, dead);
        }
        node.for_each_child_block(&mut |children| {
            collect_candidates(children, uses, assigned, substitutions, dead)
        });
    }
}

fn substitute(expr: Expr, substitutions: &HashMap<Name, Expr>) -> Expr {
    if substitutions.is_empty() {
        return expr;
    }
    expr.map(&mut |e| match e {
        Expr::Var(ref n) => substitutions.get(n).cloned().unwrap_or(e),
        e => e,
    })
}

fn rewrite(nodes: &mut Vec<Node>, substitutions: &HashMap<Name, Expr>, dead: &HashSet<Name>) {
    nodes.retain(|node| match node {
        Node::Def { name, .. } => !substitutions.contains_key(name) && !dead.contains(name),
        _ => true,
    });
    for node in nodes.iter_mut() {
        rewrite_node(node, substitutions, dead);
    }
}

fn rewrite_node(node: &mut Node, subs: &HashMap<Name, Expr>, dead: &HashSet<Name>) {
    let sub = |e: &mut Expr| {
        let taken = std::mem::replace(e, Expr::Undefined);
        *e = substitute(taken, subs);
    };
    match node {
        Node::Def { rhs: Some(rhs), .. } => sub(rhs),
        Node::Def { rhs: None, .. } | Node::Break(_) => {}
        Node::Assign { lhs, rhs } => {
            match lhs {
                Place::Var(_) => {}
                Place::Data(e) | Place::Member(_, e) => sub(e),
            }
            sub(rhs)
        }
        Node::If { cond, then, els } => {
            sub(cond);
            rewrite(then, subs, dead);
            if let Some(els) = els {
                rewrite(els, subs, dead);
            }
        }
        Node::For { kind, body } => {
            match kind {
                ForKind::Counted { init, cond, step } => {
                    if let Some(init) = init {
                        rewrite_node(init, subs, dead);
                    }
                    sub(cond);
                    if let Some(step) = step {
                        rewrite_node(step, subs, dead);
                    }
                }
                ForKind::Range { from, to, .. } => {
                    sub(from);
                    sub(to);
                }
                ForKind::Of { iterable, .. } => sub(iterable),
                ForKind::In { object, .. } => sub(object),
            }
            rewrite(body, subs, dead);
        }
        Node::Try { body, catch, finally } => {
            rewrite(body, subs, dead);
            if let Some((_, nodes)) = catch {
                rewrite(nodes, subs, dead);
            }
            if let Some(nodes) = finally {
                rewrite(nodes, subs, dead);
            }
        }
        Node::Func { body, .. } | Node::Block(body) | Node::Label { body, .. } => {
            rewrite(body, subs, dead)
        }
        Node::Return(e) | Node::Throw(e) | Node::Expr(e) => sub(e),
    }
}

// String concatenation merging

fn merge_strings(nodes: &mut [Node]) -> bool {
    let mut changed = false;
    for node in nodes.iter_mut() {
        changed |= merge_node(node);
    }
    changed
}

fn merge_node(node: &mut Node) -> bool {
    match node {
        Node::Def { rhs: Some(rhs), .. } => merge_in_place(rhs),
        Node::Assign { rhs, .. } => merge_in_place(rhs),
        Node::If { cond, then, els } => {
            let mut changed = merge_in_place(cond);
            changed |= merge_strings(then);
            if let Some(els) = els {
                changed |= merge_strings(els);
            }
            changed
        }
        Node::For { body, .. } | Node::Func { body, .. } | Node::Block(body) | Node::Label { body, .. } => {
            merge_strings(body)
        }
        Node::Try { body, catch, finally } => {
            let mut changed = merge_strings(body);
            if let Some((_, nodes)) = catch {
                changed |= merge_strings(nodes);
            }
            if let Some(nodes) = finally {
                changed |= merge_strings(nodes);
            }
            changed
        }
        Node::Return(e) | Node::Throw(e) | Node::Expr(e) => merge_in_place(e),
        Node::Def { rhs: None, .. } | Node::Break(_) => false,
    }
}

fn merge_in_place(e: &mut Expr) -> bool {
    let taken = std::mem::replace(e, Expr::Undefined);
    let (merged, changed) = merge_expr(taken);
    *e = merged;
    changed
}

fn merge_expr(expr: Expr) -> (Expr, bool) {
    let mut changed = false;
    let merged = expr.map(&mut |e| match e {
        Expr::Concat(parts) => {
            let original = parts.len();
            let mut out: Vec<Expr> = Vec::with_capacity(parts.len());
            let mut flattened = false;
            for part in parts {
                let pieces = match part {
                    Expr::Concat(inner) => {
                        flattened = true;
                        inner
                    }
                    part => vec![part],
                };
                for piece in pieces {
                    if let Expr::Lit(Value::String(s)) = &piece {
                        if s.is_empty() {
                            continue;
                        }
                        if let Some(Expr::Lit(Value::String(prev))) = out.last_mut() {
                            prev.push_str(s);
                            continue;
                        }
                    }
                    out.push(piece);
                }
            }
            if flattened || out.len() != original {
                changed = true;
            }
            let single_literal = out.len() == 1 && matches!(out[0], Expr::Lit(Value::String(_)));
            if out.is_empty() {
                changed = true;
                Expr::str("")
            } else if single_literal {
                changed = true;
                out.pop().unwrap_or_else(|| Expr::str(""))
            } else {
                Expr::Concat(out)
            }
        }
        e => e,
    });
    (merged, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::code::Builtin;
    use crate::codegen::node::VarKind;

    fn name(s: &str) -> Name {
        Name::new(s)
    }

    fn def_const(n: &str, rhs: Expr) -> Node {
        Node::Def { kind: VarKind::Const, name: name(n), rhs: Some(rhs), constant: true }
    }

    #[test]
    fn test_optimizer_folds_constant_if() {
        let mut nodes = vec![Node::If {
            cond: Expr::not(Expr::bool(false)),
            then: vec![Node::Return(Expr::num(1))],
            els: Some(vec![Node::Return(Expr::num(2))]),
        }];
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(nodes, vec![Node::Return(Expr::num(1))]);
    }

    #[test]
    fn test_optimizer_takes_else_branch() {
        let mut nodes = vec![Node::If {
            cond: Expr::and(vec![Expr::var(&name("x")), Expr::bool(false)]),
            then: vec![Node::Return(Expr::num(1))],
            els: Some(vec![Node::Return(Expr::num(2))]),
        }];
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(nodes, vec![Node::Return(Expr::num(2))]);
    }

    #[test]
    fn test_optimizer_keeps_side_effects_before_false() {
        let call = Expr::call(Builtin::CallValidate, vec![Expr::var(&name("v"))]);
        let (folded, _) = fold_expr(Expr::And(vec![call.clone(), Expr::bool(false)]));
        assert_eq!(folded, Expr::And(vec![call, Expr::bool(false)]));
    }

    #[test]
    fn test_optimizer_inlines_single_use_constant() {
        let data = Expr::var(&name("data"));
        let mut nodes = vec![
            def_const("data0", data.prop("age")),
            Node::Return(Expr::call(Builtin::TypeOf, vec![Expr::var(&name("data0"))])),
        ];
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(nodes.len(), 1);
        assert_eq!(
            nodes[0],
            Node::Return(Expr::call(Builtin::TypeOf, vec![Expr::var(&name("data")).prop("age")]))
        );
    }

    #[test]
    fn test_optimizer_keeps_stateful_temporaries() {
        let mut nodes = vec![
            def_const("_errs0", Expr::call(Builtin::ErrorCount, vec![])),
            Node::Expr(Expr::call(Builtin::PushError, vec![Expr::Undefined])),
            Node::Return(Expr::eq(Expr::var(&name("_errs0")), Expr::call(Builtin::ErrorCount, vec![]))),
        ];
        let before = nodes.clone();
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(nodes, before);
    }

    #[test]
    fn test_optimizer_resolves_inline_chains() {
        let mut nodes = vec![
            def_const("a", Expr::var(&name("data")).prop("x")),
            def_const("b", Expr::var(&name("a")).prop("y")),
            Node::Return(Expr::var(&name("b"))),
        ];
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(
            nodes,
            vec![Node::Return(Expr::var(&name("data")).prop("x").prop("y"))]
        );
    }

    #[test]
    fn test_optimizer_does_not_inline_reassigned() {
        let mut nodes = vec![
            def_const("a", Expr::var(&name("v"))),
            Node::Assign { lhs: Place::Var(name("v")), rhs: Expr::num(2) },
            Node::Return(Expr::var(&name("a"))),
        ];
        let before = nodes.clone();
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(nodes, before);
    }

    #[test]
    fn test_optimizer_merges_strings() {
        let path = Expr::var(&name("instancePath"));
        let mut nodes = vec![Node::Expr(Expr::call(
            Builtin::PushError,
            vec![Expr::concat(vec![
                path.clone(),
                Expr::concat(vec![Expr::str("/a"), Expr::str("/b")]),
                Expr::str(""),
            ])],
        ))];
        Optimizer::new().optimize(&mut nodes);
        assert_eq!(
            nodes,
            vec![Node::Expr(Expr::call(
                Builtin::PushError,
                vec![Expr::concat(vec![path, Expr::str("/a/b")])]
            ))]
        );
    }

    #[test]
    fn test_optimizer_drops_empty_if_with_pure_condition() {
        let mut nodes = vec![Node::If { cond: Expr::var(&name("x")), then: vec![], els: None }];
        let report = Optimizer::new().optimize(&mut nodes);
        assert!(nodes.is_empty());
        assert_eq!(report.nodes_before, 1);
        assert_eq!(report.nodes_after, 0);
    }

    #[test]
    fn test_optimizer_fixed_point() {
        let mut nodes = vec![
            def_const("a", Expr::bool(true)),
            Node::If {
                cond: Expr::var(&name("a")),
                then: vec![Node::Return(Expr::concat(vec![Expr::str("x"), Expr::str("y")]))],
                els: None,
            },
        ];
        let optimizer = Optimizer::with_passes(16);
        optimizer.optimize(&mut nodes);
        let once = nodes.clone();
        let report = optimizer.optimize(&mut nodes);
        assert_eq!(nodes, once);
        assert_eq!(report.passes, 1);
        assert_eq!(nodes, vec![Node::Return(Expr::str("xy"))]);
    }
}
