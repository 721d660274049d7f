//! Validator IR builder
//!
//! `CodeGen` assembles the statement tree of one generated function. Block
//! kinds (`if`, loops, `try`, labels, plain blocks, functions) are opened and
//! closed explicitly; closing a frame attaches the finished node to its
//! parent. Misuse (closing the wrong kind, unclosed blocks) is an internal
//! error.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

pub mod code;
pub mod node;
pub mod optimizer;
pub mod scope;

mod prop_tests;

pub use code::{BinOp, Builtin, ExtRef, Expr, Name};
pub use node::{count_nodes, render, ForKind, Node, Place, VarKind};
pub use optimizer::{OptimizationReport, Optimizer, OptimizerConfig};
pub use scope::{Scope, ScopeValue, ValueScope, ValueScopeName, ValueSpec, ValueTable};

use crate::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug)]
enum OpenKind {
    Root,
    Block,
    If {
        cond: Expr,
        /// Set once `else` is reached
        then: Option<Vec<Node>>,
        /// Opened by `else_if`; closes into the enclosing `If`
        chained: bool,
    },
    For(ForKind),
    Func {
        name: Name,
        params: Vec<Name>,
        is_async: bool,
    },
    Try {
        body: Option<Vec<Node>>,
        catch: Option<(Name, Vec<Node>)>,
        /// Name bound by the catch clause currently open
        catch_name: Option<Name>,
        in_finally: bool,
    },
    Label(Name),
}

#[derive(Debug)]
struct Open {
    kind: OpenKind,
    nodes: Vec<Node>,
}

/// Statement tree builder for one generated function
#[derive(Debug)]
pub struct CodeGen {
    scope: Scope,
    stack: Vec<Open>,
    block_starts: Vec<usize>,
    used_values: BTreeMap<Name, ExtRef>,
}

impl CodeGen {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            stack: vec![Open { kind: OpenKind::Root, nodes: Vec::new() }],
            block_starts: Vec::new(),
            used_values: BTreeMap::new(),
        }
    }

    /// Fresh local name
    pub fn name(&mut self, prefix: &str) -> Result<Name> {
        self.scope.name(prefix)
    }

    /// Record use of a captured value and return its local name
    pub fn scope_value(&mut self, value: &ValueScopeName) -> Name {
        self.used_values
            .insert(value.name.clone(), value.ext.clone());
        value.name.clone()
    }

    /// Captured values referenced by this function
    pub fn used_values(&self) -> &BTreeMap<Name, ExtRef> {
        &self.used_values
    }

    fn push(&mut self, node: Node) {
        if let Some(top) = self.stack.last_mut() {
            top.nodes.push(node);
        }
    }

    fn open(&mut self, kind: OpenKind) {
        self.stack.push(Open { kind, nodes: Vec::new() });
    }

    fn def(&mut self, kind: VarKind, prefix: &str, rhs: Option<Expr>, constant: bool) -> Result<Name> {
        let name = self.name(prefix)?;
        self.push(Node::Def { kind, name: name.clone(), rhs, constant });
        Ok(name)
    }

    /// `const <prefix>N = rhs`
    pub fn const_(&mut self, prefix: &str, rhs: Expr) -> Result<Name> {
        self.def(VarKind::Const, prefix, Some(rhs), false)
    }

    /// `const` that the optimizer may inline at its single use
    pub fn const_inline(&mut self, prefix: &str, rhs: Expr) -> Result<Name> {
        self.def(VarKind::Const, prefix, Some(rhs), true)
    }

    /// `let <prefix>N = rhs`
    pub fn let_(&mut self, prefix: &str, rhs: Option<Expr>) -> Result<Name> {
        self.def(VarKind::Let, prefix, rhs, false)
    }

    /// `var <prefix>N = rhs`
    pub fn var(&mut self, prefix: &str, rhs: Option<Expr>) -> Result<Name> {
        self.def(VarKind::Var, prefix, rhs, false)
    }

    /// Declare an already allocated name
    pub fn def_name(&mut self, kind: VarKind, name: &Name, rhs: Option<Expr>) {
        self.push(Node::Def { kind, name: name.clone(), rhs, constant: false });
    }

    pub fn assign(&mut self, lhs: Place, rhs: Expr) {
        self.push(Node::Assign { lhs, rhs });
    }

    /// `name = rhs`
    pub fn assign_var(&mut self, name: &Name, rhs: Expr) {
        self.assign(Place::Var(name.clone()), rhs);
    }

    /// Expression statement
    pub fn code(&mut self, expr: Expr) {
        self.push(Node::Expr(expr));
    }

    pub fn if_(&mut self, cond: Expr) {
        self.open(OpenKind::If { cond, then: None, chained: false });
    }

    pub fn else_(&mut self) -> Result<()> {
        let top = self.stack.last_mut().ok_or_else(|| Error::internal("CodeGen: empty stack"))?;
        match &mut top.kind {
            OpenKind::If { then: then @ None, .. } => {
                *then = Some(std::mem::take(&mut top.nodes));
                Ok(())
            }
            _ => Err(Error::internal("CodeGen: \"else\" without \"if\"")),
        }
    }

    pub fn else_if(&mut self, cond: Expr) -> Result<()> {
        self.else_()?;
        self.open(OpenKind::If { cond, then: None, chained: true });
        Ok(())
    }

    /// Close the innermost `if`, including any `else if` chain
    pub fn end_if(&mut self) -> Result<()> {
        loop {
            match self.stack.last() {
                Some(Open { kind: OpenKind::If { chained, .. }, .. }) => {
                    let chained = *chained;
                    self.close_top()?;
                    if !chained {
                        return Ok(());
                    }
                }
                _ => return Err(Error::internal("CodeGen: \"endIf\" without \"if\"")),
            }
        }
    }

    /// `if (cond) { then } else { else }` with simple statement lists
    pub fn if_nodes(&mut self, cond: Expr, then: Vec<Node>, els: Option<Vec<Node>>) {
        self.push(Node::If { cond, then, els });
    }

    pub fn for_range(&mut self, prefix: &str, from: Expr, to: Expr) -> Result<Name> {
        let var = self.name(prefix)?;
        self.open(OpenKind::For(ForKind::Range { var: var.clone(), from, to }));
        Ok(var)
    }

    pub fn for_of(&mut self, prefix: &str, iterable: Expr) -> Result<Name> {
        let var = self.name(prefix)?;
        self.open(OpenKind::For(ForKind::Of { var: var.clone(), iterable }));
        Ok(var)
    }

    pub fn for_in(&mut self, prefix: &str, object: Expr) -> Result<Name> {
        let var = self.name(prefix)?;
        self.open(OpenKind::For(ForKind::In { var: var.clone(), object }));
        Ok(var)
    }

    /// `for (init; cond; step)`
    pub fn for_counted(&mut self, init: Option<Node>, cond: Expr, step: Option<Node>) {
        self.open(OpenKind::For(ForKind::Counted {
            init: init.map(Box::new),
            cond,
            step: step.map(Box::new),
        }));
    }

    pub fn end_for(&mut self) -> Result<()> {
        self.end(|k| matches!(k, OpenKind::For(_)), "endFor")
    }

    pub fn label(&mut self, label: &Name) {
        self.open(OpenKind::Label(label.clone()));
    }

    pub fn end_label(&mut self) -> Result<()> {
        self.end(|k| matches!(k, OpenKind::Label(_)), "endLabel")
    }

    pub fn break_(&mut self, label: Option<&Name>) {
        self.push(Node::Break(label.cloned()));
    }

    pub fn return_(&mut self, expr: Expr) {
        self.push(Node::Return(expr));
    }

    pub fn throw_(&mut self, expr: Expr) {
        self.push(Node::Throw(expr));
    }

    pub fn try_(&mut self) {
        self.open(OpenKind::Try { body: None, catch: None, catch_name: None, in_finally: false });
    }

    /// Start the catch clause, binding the thrown value to a fresh name
    pub fn catch_(&mut self, prefix: &str) -> Result<Name> {
        let name = self.name(prefix)?;
        let top = self.stack.last_mut().ok_or_else(|| Error::internal("CodeGen: empty stack"))?;
        match &mut top.kind {
            OpenKind::Try { body: body @ None, catch_name, .. } => {
                *body = Some(std::mem::take(&mut top.nodes));
                *catch_name = Some(name.clone());
                Ok(name)
            }
            _ => Err(Error::internal("CodeGen: \"catch\" without \"try\"")),
        }
    }

    pub fn finally_(&mut self) -> Result<()> {
        let top = self.stack.last_mut().ok_or_else(|| Error::internal("CodeGen: empty stack"))?;
        match &mut top.kind {
            OpenKind::Try { body, catch, catch_name, in_finally: in_finally @ false } => {
                let nodes = std::mem::take(&mut top.nodes);
                match catch_name.take() {
                    Some(e) => *catch = Some((e, nodes)),
                    None => *body = Some(nodes),
                }
                *in_finally = true;
                Ok(())
            }
            _ => Err(Error::internal("CodeGen: \"finally\" without \"try\"")),
        }
    }

    pub fn end_try(&mut self) -> Result<()> {
        self.end(|k| matches!(k, OpenKind::Try { .. }), "endTry")
    }

    /// Open a block; `end_block` closes everything opened after it
    pub fn block(&mut self) {
        self.block_starts.push(self.stack.len());
        self.open(OpenKind::Block);
    }

    pub fn end_block(&mut self) -> Result<()> {
        let start = self
            .block_starts
            .pop()
            .ok_or_else(|| Error::internal("CodeGen: not in block"))?;
        while self.stack.len() > start + 1 {
            self.close_top()?;
        }
        match self.stack.last() {
            Some(Open { kind: OpenKind::Block, .. }) => self.close_top(),
            _ => Err(Error::internal("CodeGen: not in block")),
        }
    }

    pub fn func(&mut self, name: &Name, params: Vec<Name>, is_async: bool) {
        self.open(OpenKind::Func { name: name.clone(), params, is_async });
    }

    pub fn end_func(&mut self) -> Result<()> {
        self.end(|k| matches!(k, OpenKind::Func { .. }), "endFunc")
    }

    fn end(&mut self, is_kind: impl Fn(&OpenKind) -> bool, what: &str) -> Result<()> {
        match self.stack.last() {
            Some(open) if is_kind(&open.kind) => self.close_top(),
            _ => Err(Error::internal(format!("CodeGen: \"{}\" without matching open node", what))),
        }
    }

    /// Finish the top frame and attach it to its parent
    fn close_top(&mut self) -> Result<()> {
        if self.stack.len() <= 1 {
            return Err(Error::internal("CodeGen: cannot close root"));
        }
        let Some(Open { kind, nodes }) = self.stack.pop() else {
            return Err(Error::internal("CodeGen: empty stack"));
        };
        let node = match kind {
            OpenKind::Root => return Err(Error::internal("CodeGen: cannot close root")),
            OpenKind::Block => Node::Block(nodes),
            OpenKind::If { cond, then, chained } => {
                let node = match then {
                    Some(then) => Node::If { cond, then, els: Some(nodes) },
                    None => Node::If { cond, then: nodes, els: None },
                };
                if chained {
                    // The enclosing `If` is in its else branch; this node is that branch
                    self.push(node);
                    return Ok(());
                }
                node
            }
            OpenKind::For(kind) => Node::For { kind, body: nodes },
            OpenKind::Func { name, params, is_async } => Node::Func { name, params, is_async, body: nodes },
            OpenKind::Try { body, catch, catch_name, in_finally } => {
                let (body, catch, finally) = match (body, in_finally, catch_name) {
                    (Some(body), true, _) => (body, catch, Some(nodes)),
                    (Some(body), false, Some(e)) => (body, Some((e, nodes)), None),
                    (None, false, None) => (nodes, None, None),
                    _ => return Err(Error::internal("CodeGen: malformed try")),
                };
                if catch.is_none() && finally.is_none() {
                    return Err(Error::internal("CodeGen: \"try\" without \"catch\" and \"finally\""));
                }
                Node::Try { body, catch, finally }
            }
            OpenKind::Label(label) => Node::Label { label, body: nodes },
        };
        self.push(node);
        Ok(())
    }

    /// Number of open frames above the root
    pub fn depth(&self) -> usize {
        self.stack.len() - 1
    }

    /// Finished statement list; every opened frame must be closed
    pub fn finish(mut self) -> Result<Vec<Node>> {
        if self.stack.len() != 1 || !self.block_starts.is_empty() {
            return Err(Error::internal(format!(
                "CodeGen: {} unclosed node(s)",
                self.stack.len() - 1
            )));
        }
        Ok(self.stack.pop().map(|open| open.nodes).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen() -> CodeGen {
        CodeGen::new(Scope::new())
    }

    #[test]
    fn test_if_else_if_chain() {
        let mut g = gen();
        let x = g.let_("x", Some(Expr::num(0))).unwrap();
        g.if_(Expr::var(&x));
        g.return_(Expr::num(1));
        g.else_if(Expr::not(Expr::var(&x))).unwrap();
        g.return_(Expr::num(2));
        g.else_().unwrap();
        g.return_(Expr::num(3));
        g.end_if().unwrap();
        let nodes = g.finish().unwrap();
        assert_eq!(
            render(&nodes, false),
            "let x0 = 0;if (x0) {return 1;} else if (!x0) {return 2;} else {return 3;}"
        );
    }

    #[test]
    fn test_end_block_closes_open_ifs() {
        let mut g = gen();
        g.block();
        g.if_(Expr::bool(true));
        g.code(Expr::Undefined);
        g.if_(Expr::bool(false));
        g.end_block().unwrap();
        let nodes = g.finish().unwrap();
        assert_eq!(count_nodes(&nodes), 4);
    }

    #[test]
    fn test_try_catch_finally() {
        let mut g = gen();
        g.try_();
        g.throw_(Expr::num(1));
        let e = g.catch_("e").unwrap();
        g.code(Expr::var(&e));
        g.finally_().unwrap();
        g.code(Expr::Undefined);
        g.end_try().unwrap();
        let nodes = g.finish().unwrap();
        assert_eq!(
            render(&nodes, false),
            "try {throw 1;} catch (e0) {e0;} finally {undefined;}"
        );
    }

    #[test]
    fn test_mismatched_close_is_error() {
        let mut g = gen();
        g.if_(Expr::bool(true));
        assert!(g.end_for().is_err());
        assert!(g.end_block().is_err());
    }

    #[test]
    fn test_unclosed_is_error() {
        let mut g = gen();
        g.for_range("i", Expr::num(0), Expr::num(3)).unwrap();
        assert!(g.finish().is_err());
    }
}
