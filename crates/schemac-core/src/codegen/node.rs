//! Statement nodes of the validator IR
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use super::code::{Expr, Name};
use std::fmt::{self, Write as _};

/// Variable declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

impl VarKind {
    fn keyword(self) -> &'static str {
        match self {
            VarKind::Const => "const",
            VarKind::Let => "let",
            VarKind::Var => "var",
        }
    }
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    /// Local variable
    Var(Name),
    /// Location inside the validated instance; the expression must evaluate to a data reference
    Data(Expr),
    /// Property of a local object variable: `name[key]`
    Member(Name, Expr),
}

/// Loop header
#[derive(Debug, Clone, PartialEq)]
pub enum ForKind {
    /// `for (init; cond; step)`
    Counted {
        init: Option<Box<Node>>,
        cond: Expr,
        step: Option<Box<Node>>,
    },
    /// `for (let var = from; var < to; var++)`, `to` evaluated once
    Range { var: Name, from: Expr, to: Expr },
    /// `for (const var of iterable)`
    Of { var: Name, iterable: Expr },
    /// `for (const var in object)`
    In { var: Name, object: Expr },
}

/// Statement node; block kinds own their children
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Def {
        kind: VarKind,
        name: Name,
        rhs: Option<Expr>,
        /// Candidate for single-use inlining
        constant: bool,
    },
    Assign {
        lhs: Place,
        rhs: Expr,
    },
    If {
        cond: Expr,
        then: Vec<Node>,
        /// An `else if` is an else branch holding a single `If`
        els: Option<Vec<Node>>,
    },
    For {
        kind: ForKind,
        body: Vec<Node>,
    },
    Func {
        name: Name,
        params: Vec<Name>,
        is_async: bool,
        body: Vec<Node>,
    },
    Try {
        body: Vec<Node>,
        catch: Option<(Name, Vec<Node>)>,
        finally: Option<Vec<Node>>,
    },
    Block(Vec<Node>),
    Label {
        label: Name,
        body: Vec<Node>,
    },
    Break(Option<Name>),
    Return(Expr),
    Throw(Expr),
    Expr(Expr),
}

impl Node {
    /// Visit all expressions owned directly or transitively by this node
    pub fn for_each_expr(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Node::Def { rhs, .. } => {
                if let Some(rhs) = rhs {
                    f(rhs)
                }
            }
            Node::Assign { lhs, rhs } => {
                match lhs {
                    Place::Var(_) => {}
                    Place::Data(e) | Place::Member(_, e) => f(e),
                }
                f(rhs)
            }
            Node::If { cond, then, els } => {
                f(cond);
                then.iter().for_each(|n| n.for_each_expr(f));
                if let Some(els) = els {
                    els.iter().for_each(|n| n.for_each_expr(f));
                }
            }
            Node::For { kind, body } => {
                match kind {
                    ForKind::Counted { init, cond, step } => {
                        if let Some(init) = init {
                            init.for_each_expr(f);
                        }
                        f(cond);
                        if let Some(step) = step {
                            step.for_each_expr(f);
                        }
                    }
                    ForKind::Range { from, to, .. } => {
                        f(from);
                        f(to);
                    }
                    ForKind::Of { iterable, .. } => f(iterable),
                    ForKind::In { object, .. } => f(object),
                }
                body.iter().for_each(|n| n.for_each_expr(f));
            }
            Node::Try { body, catch, finally } => {
                body.iter().for_each(|n| n.for_each_expr(f));
                if let Some((_, nodes)) = catch {
                    nodes.iter().for_each(|n| n.for_each_expr(f));
                }
                if let Some(nodes) = finally {
                    nodes.iter().for_each(|n| n.for_each_expr(f));
                }
            }
            Node::Func { body, .. } | Node::Block(body) | Node::Label { body, .. } => {
                body.iter().for_each(|n| n.for_each_expr(f))
            }
            Node::Break(_) => {}
            Node::Return(e) | Node::Throw(e) | Node::Expr(e) => f(e),
        }
    }

    /// Visit names written by assignments (not declarations)
    pub fn for_each_assigned(&self, f: &mut impl FnMut(&Name)) {
        match self {
            Node::Assign { lhs: Place::Var(n), .. } | Node::Assign { lhs: Place::Member(n, _), .. } => f(n),
            Node::For { kind, body } => {
                match kind {
                    ForKind::Counted { init, step, .. } => {
                        if let Some(init) = init {
                            init.for_each_assigned(f);
                        }
                        if let Some(step) = step {
                            step.for_each_assigned(f);
                        }
                    }
                    ForKind::Range { var, .. } | ForKind::Of { var, .. } | ForKind::In { var, .. } => f(var),
                }
                body.iter().for_each(|n| n.for_each_assigned(f));
            }
            _ => self.for_each_child_block(&mut |nodes| {
                nodes.iter().for_each(|n| n.for_each_assigned(f))
            }),
        }
    }

    /// Visit the child statement lists of a block-kind node
    pub fn for_each_child_block(&self, f: &mut impl FnMut(&[Node])) {
        match self {
            Node::If { then, els, .. } => {
                f(then);
                if let Some(els) = els {
                    f(els);
                }
            }
            Node::For { body, .. }
            | Node::Func { body, .. }
            | Node::Block(body)
            | Node::Label { body, .. } => f(body),
            Node::Try { body, catch, finally } => {
                f(body);
                if let Some((_, nodes)) = catch {
                    f(nodes);
                }
                if let Some(nodes) = finally {
                    f(nodes);
                }
            }
            _ => {}
        }
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        let mut total = 1;
        if let Node::For { kind: ForKind::Counted { init, step, .. }, .. } = self {
            total += init.as_ref().map_or(0, |n| n.count()) + step.as_ref().map_or(0, |n| n.count());
        }
        self.for_each_child_block(&mut |nodes| total += count_nodes(nodes));
        total
    }
}

/// Number of nodes in a statement list
pub fn count_nodes(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::count).sum()
}

/// Render a statement list as source text
pub fn render(nodes: &[Node], pretty: bool) -> String {
    let mut out = String::new();
    let mut r = Renderer { out: &mut out, pretty, indent: 0 };
    // Writing into a String cannot fail
    let _ = r.nodes(nodes);
    out
}

struct Renderer<'a> {
    out: &'a mut String,
    pretty: bool,
    indent: usize,
}

impl Renderer<'_> {
    fn line(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        if self.pretty {
            for _ in 0..self.indent {
                self.out.push_str("  ");
            }
        }
        self.out.write_fmt(args)?;
        if self.pretty {
            self.out.push('\n');
        }
        Ok(())
    }

    fn nodes(&mut self, nodes: &[Node]) -> fmt::Result {
        for node in nodes {
            self.node(node)?;
        }
        Ok(())
    }

    fn body(&mut self, nodes: &[Node]) -> fmt::Result {
        self.indent += 1;
        self.nodes(nodes)?;
        self.indent -= 1;
        Ok(())
    }

    fn node(&mut self, node: &Node) -> fmt::Result {
        match node {
            Node::Def { kind, name, rhs, .. } => match rhs {
                Some(rhs) => self.line(format_args!("{} {} = {};", kind.keyword(), name, rhs)),
                None => self.line(format_args!("{} {};", kind.keyword(), name)),
            },
            Node::Assign { lhs, rhs } => match lhs {
                Place::Var(n) => self.line(format_args!("{} = {};", n, rhs)),
                Place::Data(e) => self.line(format_args!("{} = {};", e, rhs)),
                Place::Member(n, k) => self.line(format_args!("{}[{}] = {};", n, k, rhs)),
            },
            Node::If { cond, then, els } => {
                self.line(format_args!("if ({}) {{", cond))?;
                self.body(then)?;
                let mut els = els.as_deref();
                while let Some(nodes) = els {
                    match nodes {
                        [Node::If { cond, then, els: next }] => {
                            self.line(format_args!("}} else if ({}) {{", cond))?;
                            self.body(then)?;
                            els = next.as_deref();
                        }
                        _ => {
                            self.line(format_args!("}} else {{"))?;
                            self.body(nodes)?;
                            els = None;
                        }
                    }
                }
                self.line(format_args!("}}"))
            }
            Node::For { kind, body } => {
                match kind {
                    ForKind::Counted { init, cond, step } => {
                        let init = init.as_ref().map(|n| render_inline(n)).unwrap_or_default();
                        let step = step.as_ref().map(|n| render_inline(n)).unwrap_or_default();
                        self.line(format_args!("for ({}; {}; {}) {{", init, cond, step))?
                    }
                    ForKind::Range { var, from, to } => self.line(format_args!(
                        "for (let {v} = {}; {v} < {}; {v}++) {{",
                        from,
                        to,
                        v = var
                    ))?,
                    ForKind::Of { var, iterable } => {
                        self.line(format_args!("for (const {} of {}) {{", var, iterable))?
                    }
                    ForKind::In { var, object } => {
                        self.line(format_args!("for (const {} in {}) {{", var, object))?
                    }
                }
                self.body(body)?;
                self.line(format_args!("}}"))
            }
            Node::Func { name, params, is_async, body } => {
                let params: Vec<&str> = params.iter().map(Name::as_str).collect();
                let prefix = if *is_async { "async " } else { "" };
                self.line(format_args!("{}function {}({}) {{", prefix, name, params.join(", ")))?;
                self.body(body)?;
                self.line(format_args!("}}"))
            }
            Node::Try { body, catch, finally } => {
                self.line(format_args!("try {{"))?;
                self.body(body)?;
                if let Some((e, nodes)) = catch {
                    self.line(format_args!("}} catch ({}) {{", e))?;
                    self.body(nodes)?;
                }
                if let Some(nodes) = finally {
                    self.line(format_args!("}} finally {{"))?;
                    self.body(nodes)?;
                }
                self.line(format_args!("}}"))
            }
            Node::Block(body) => {
                self.line(format_args!("{{"))?;
                self.body(body)?;
                self.line(format_args!("}}"))
            }
            Node::Label { label, body } => {
                self.line(format_args!("{}: {{", label))?;
                self.body(body)?;
                self.line(format_args!("}}"))
            }
            Node::Break(Some(label)) => self.line(format_args!("break {};", label)),
            Node::Break(None) => self.line(format_args!("break;")),
            Node::Return(e) => self.line(format_args!("return {};", e)),
            Node::Throw(e) => self.line(format_args!("throw {};", e)),
            Node::Expr(e) => self.line(format_args!("{};", e)),
        }
    }
}

fn render_inline(node: &Node) -> String {
    render(std::slice::from_ref(node), false)
        .trim_end_matches(';')
        .to_string()
}
