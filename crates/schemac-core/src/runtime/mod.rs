//! Validator IR interpreter
//!
//! Compiled schema functions are executed by walking their optimized
//! statement trees. The instance is borrowed mutably for the whole call and
//! data variables are paths into it. Each call frame owns its own error
//! buffer; a failed call's errors are merged into the caller by generated
//! code.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

pub mod builtins;
pub mod data;
pub mod equal;

use crate::codegen::{BinOp, Expr, ExtRef, ForKind, Name, Node, Place, ScopeValue, ValueTable};
use crate::compile::evaluated::EvaluatedInfo;
use crate::validator::ErrorObject;
use crate::{Error, Result};
use data::{DataPath, PathSeg};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a compiled schema function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FnId(pub usize);

/// Standard parameter names of a compiled schema function
#[derive(Debug, Clone)]
pub struct FnParams {
    pub data: Name,
    pub instance_path: Name,
    pub root_data: Name,
}

/// A compiled schema function
#[derive(Debug)]
pub struct FnDef {
    pub id: FnId,
    pub name: Name,
    pub params: FnParams,
    /// Function body, prologue included
    pub body: Vec<Node>,
    pub is_async: bool,
    /// Statically known evaluated properties/items
    pub evaluated: EvaluatedInfo,
}

/// Everything a validator needs at runtime
#[derive(Debug, Default)]
pub struct Program {
    pub fns: Vec<Option<Arc<FnDef>>>,
    pub values: ValueTable,
}

impl Program {
    pub fn function(&self, id: FnId) -> Result<&Arc<FnDef>> {
        self.fns
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::internal(format!("function {} is not compiled", id.0)))
    }
}

/// Native stack that must remain before entering a schema function
const STACK_RED_ZONE: usize = 256 * 1024;

/// Size of each stack segment allocated once the red zone is reached
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Limits for one validation run
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Maximum nesting of schema function calls
    pub max_depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum RtValue {
    Undefined,
    Json(Value),
    /// Location inside the instance
    Data(DataPath),
    /// Captured scope value
    Ext(ExtRef),
    /// Compiled function reference (from the dynamic anchor scope)
    Fn(FnId),
    /// Thrown validation error aggregate
    Errors(Vec<ErrorObject>),
}

impl RtValue {
    pub fn bool(b: bool) -> Self {
        RtValue::Json(Value::Bool(b))
    }
}

/// Result of a completed call
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: RtValue,
    pub errors: Vec<ErrorObject>,
    pub props: RtValue,
    pub items: RtValue,
}

/// How a call ended
#[derive(Debug, Clone)]
pub enum Completion {
    Returned(CallOutcome),
    Thrown(RtValue),
}

pub(crate) enum Unwind {
    Throw(RtValue),
    Fault(Error),
}

impl From<Error> for Unwind {
    fn from(err: Error) -> Self {
        Unwind::Fault(err)
    }
}

pub(crate) type Exec<T> = std::result::Result<T, Unwind>;

enum Flow {
    Normal,
    Break(Option<Name>),
    Return(RtValue),
}

pub(crate) struct Frame {
    vars: HashMap<Name, RtValue>,
    pub(crate) errors: Vec<ErrorObject>,
    pub(crate) last_call: Option<CallOutcome>,
    /// Evaluated properties/items reported by the function epilogue
    pub(crate) evaluated: Option<(RtValue, RtValue)>,
}

/// Interpreter for one validation run
pub struct Interpreter<'a> {
    pub(crate) program: &'a Program,
    pub(crate) root: &'a mut Value,
    context: ExecutionContext,
    depth: usize,
    pub(crate) dynamic_anchors: Vec<(String, FnId)>,
    pub(crate) patterns: HashMap<String, Regex>,
}

impl<'a> Interpreter<'a> {
    pub fn new(program: &'a Program, root: &'a mut Value) -> Self {
        Self::with_context(program, root, ExecutionContext::default())
    }

    pub fn with_context(program: &'a Program, root: &'a mut Value, context: ExecutionContext) -> Self {
        Self {
            program,
            root,
            context,
            depth: 0,
            dynamic_anchors: Vec::new(),
            patterns: HashMap::new(),
        }
    }

    /// Run a compiled function against the whole instance
    pub fn run(&mut self, id: FnId) -> Result<Completion> {
        self.call(id, RtValue::Data(DataPath::root()), String::new())
    }

    /// Call a compiled function on a data location
    pub fn call(&mut self, id: FnId, data: RtValue, instance_path: String) -> Result<Completion> {
        let program = self.program;
        let def = program.function(id)?;
        if self.depth >= self.context.max_depth {
            return Err(Error::internal(format!(
                "maximum validation depth {} exceeded",
                self.context.max_depth
            )));
        }
        self.depth += 1;
        let mut frame = Frame {
            vars: HashMap::new(),
            errors: Vec::new(),
            last_call: None,
            evaluated: None,
        };
        frame.vars.insert(def.params.data.clone(), data);
        frame
            .vars
            .insert(def.params.instance_path.clone(), RtValue::Json(Value::String(instance_path)));
        frame
            .vars
            .insert(def.params.root_data.clone(), RtValue::Data(DataPath::root()));

        let flow = stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, || {
            self.exec_block(&mut frame, &def.body)
        });
        self.depth -= 1;
        let result = match flow {
            Ok(Flow::Return(v)) => v,
            Ok(Flow::Normal) => RtValue::Undefined,
            Ok(Flow::Break(label)) => {
                return Err(Error::internal(format!("break outside loop: {:?}", label)))
            }
            Err(Unwind::Throw(v)) => return Ok(Completion::Thrown(v)),
            Err(Unwind::Fault(e)) => return Err(e),
        };
        let (props, items) = frame
            .evaluated
            .take()
            .unwrap_or_else(|| (def.evaluated.props_value(), def.evaluated.items_value()));
        Ok(Completion::Returned(CallOutcome {
            result,
            errors: frame.errors,
            props,
            items,
        }))
    }

    fn exec_block(&mut self, frame: &mut Frame, nodes: &[Node]) -> Exec<Flow> {
        for node in nodes {
            match self.exec(frame, node)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Run a loop body; `Some(flow)` ends the loop with that flow
    fn loop_body(&mut self, frame: &mut Frame, body: &[Node]) -> Exec<Option<Flow>> {
        match self.exec_block(frame, body)? {
            Flow::Normal => Ok(None),
            Flow::Break(None) => Ok(Some(Flow::Normal)),
            flow => Ok(Some(flow)),
        }
    }

    fn exec(&mut self, frame: &mut Frame, node: &Node) -> Exec<Flow> {
        match node {
            Node::Def { name, rhs, .. } => {
                let value = match rhs {
                    Some(rhs) => self.eval(frame, rhs)?,
                    None => RtValue::Undefined,
                };
                frame.vars.insert(name.clone(), value);
            }
            Node::Assign { lhs, rhs } => {
                let value = self.eval(frame, rhs)?;
                self.assign(frame, lhs, value)?;
            }
            Node::If { cond, then, els } => {
                let c = self.eval(frame, cond)?;
                if self.truthy(&c) {
                    return self.exec_block(frame, then);
                } else if let Some(els) = els {
                    return self.exec_block(frame, els);
                }
            }
            Node::For { kind, body } => return self.exec_for(frame, kind, body),
            Node::Func { name, .. } => {
                return Err(Error::internal(format!("nested function {} is not supported", name)).into())
            }
            Node::Try { body, catch, finally } => {
                let outcome = match self.exec_block(frame, body) {
                    Err(Unwind::Throw(thrown)) => match catch {
                        Some((name, handler)) => {
                            frame.vars.insert(name.clone(), thrown);
                            self.exec_block(frame, handler)
                        }
                        None => Err(Unwind::Throw(thrown)),
                    },
                    other => other,
                };
                if let Some(finally) = finally {
                    if matches!(outcome, Err(Unwind::Fault(_))) {
                        return outcome;
                    }
                    match self.exec_block(frame, finally)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                return outcome;
            }
            Node::Block(body) => return self.exec_block(frame, body),
            Node::Label { label, body } => {
                return match self.exec_block(frame, body)? {
                    Flow::Break(Some(l)) if &l == label => Ok(Flow::Normal),
                    flow => Ok(flow),
                }
            }
            Node::Break(label) => return Ok(Flow::Break(label.clone())),
            Node::Return(e) => return Ok(Flow::Return(self.eval(frame, e)?)),
            Node::Throw(e) => return Err(Unwind::Throw(self.eval(frame, e)?)),
            Node::Expr(e) => {
                self.eval(frame, e)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&mut self, frame: &mut Frame, kind: &ForKind, body: &[Node]) -> Exec<Flow> {
        match kind {
            ForKind::Counted { init, cond, step } => {
                if let Some(init) = init {
                    self.exec(frame, init)?;
                }
                loop {
                    let c = self.eval(frame, cond)?;
                    if !self.truthy(&c) {
                        break;
                    }
                    if let Some(flow) = self.loop_body(frame, body)? {
                        return Ok(flow);
                    }
                    if let Some(step) = step {
                        self.exec(frame, step)?;
                    }
                }
            }
            ForKind::Range { var, from, to } => {
                let from = self.eval(frame, from)?;
                let to = self.eval(frame, to)?;
                let from = self.number(&from).unwrap_or(0.0) as i64;
                let to = self.number(&to).unwrap_or(0.0) as i64;
                for i in from..to {
                    frame.vars.insert(var.clone(), RtValue::Json(Value::from(i)));
                    if let Some(flow) = self.loop_body(frame, body)? {
                        return Ok(flow);
                    }
                }
            }
            ForKind::Of { var, iterable } => {
                let iterable = self.eval(frame, iterable)?;
                let items: Vec<RtValue> = match (&iterable, self.view(&iterable)) {
                    (RtValue::Data(path), Some(Value::Array(items))) => (0..items.len())
                        .map(|i| RtValue::Data(path.child(PathSeg::Index(i))))
                        .collect(),
                    (_, Some(Value::Array(items))) => items.iter().cloned().map(RtValue::Json).collect(),
                    _ => Vec::new(),
                };
                for item in items {
                    frame.vars.insert(var.clone(), item);
                    if let Some(flow) = self.loop_body(frame, body)? {
                        return Ok(flow);
                    }
                }
            }
            ForKind::In { var, object } => {
                let object = self.eval(frame, object)?;
                let keys: Vec<String> = match self.view(&object) {
                    Some(Value::Object(map)) => map.keys().cloned().collect(),
                    _ => Vec::new(),
                };
                for key in keys {
                    frame.vars.insert(var.clone(), RtValue::Json(Value::String(key)));
                    if let Some(flow) = self.loop_body(frame, body)? {
                        return Ok(flow);
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(&mut self, frame: &mut Frame, lhs: &Place, value: RtValue) -> Exec<()> {
        match lhs {
            Place::Var(name) => {
                frame.vars.insert(name.clone(), value);
            }
            Place::Data(target_expr) => {
                let target = self.eval(frame, target_expr)?;
                let RtValue::Data(path) = target else {
                    // Data held by value (property names) is rebound locally
                    if let Expr::Var(name) = target_expr {
                        frame.vars.insert(name.clone(), value);
                        return Ok(());
                    }
                    return Err(Error::internal("assignment target is not instance data").into());
                };
                match self.materialize(&value) {
                    Some(v) => {
                        data::set(&mut *self.root, &path, v);
                    }
                    None => {
                        data::delete(&mut *self.root, &path);
                    }
                }
            }
            Place::Member(name, key) => {
                let key = self.eval(frame, key)?;
                let key = self.key_string(&key);
                let value = self.materialize(&value).unwrap_or(Value::Null);
                match frame.vars.get_mut(name) {
                    Some(RtValue::Json(Value::Object(map))) => {
                        map.insert(key, value);
                    }
                    // `true` already covers every member
                    Some(RtValue::Json(Value::Bool(true))) => {}
                    None | Some(RtValue::Undefined) => {
                        let mut map = Map::new();
                        map.insert(key, value);
                        frame.vars.insert(name.clone(), RtValue::Json(Value::Object(map)));
                    }
                    _ => {
                        return Err(Error::internal(format!("{} is not an object", name)).into())
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Exec<RtValue> {
        Ok(match expr {
            Expr::Undefined => RtValue::Undefined,
            Expr::Lit(v) => RtValue::Json(v.clone()),
            // Declarations skipped by control flow read as undefined
            Expr::Var(name) => frame.vars.get(name).cloned().unwrap_or(RtValue::Undefined),
            Expr::Ext(ext) => RtValue::Ext(ext.clone()),
            Expr::Member(obj, key) => {
                let obj = self.eval(frame, obj)?;
                let key = self.eval(frame, key)?;
                self.member(obj, &key)
            }
            Expr::Not(e) => {
                let v = self.eval(frame, e)?;
                RtValue::bool(!self.truthy(&v))
            }
            Expr::And(items) => {
                let mut last = RtValue::bool(true);
                for item in items {
                    last = self.eval(frame, item)?;
                    if !self.truthy(&last) {
                        break;
                    }
                }
                last
            }
            Expr::Or(items) => {
                let mut last = RtValue::bool(false);
                for item in items {
                    last = self.eval(frame, item)?;
                    if self.truthy(&last) {
                        break;
                    }
                }
                last
            }
            Expr::Bin(op, a, b) => {
                let a = self.eval(frame, a)?;
                let b = self.eval(frame, b)?;
                self.binary(*op, &a, &b)
            }
            Expr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    let v = self.eval(frame, part)?;
                    out.push_str(&self.js_string(&v));
                }
                RtValue::Json(Value::String(out))
            }
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (k, e) in fields {
                    let v = self.eval(frame, e)?;
                    if let Some(v) = self.materialize(&v) {
                        map.insert(k.clone(), v);
                    }
                }
                RtValue::Json(Value::Object(map))
            }
            Expr::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for e in items {
                    let v = self.eval(frame, e)?;
                    out.push(self.materialize(&v).unwrap_or(Value::Null));
                }
                RtValue::Json(Value::Array(out))
            }
            Expr::Call(builtin, args) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(frame, arg)?);
                }
                return self.builtin(frame, *builtin, values);
            }
        })
    }

    fn member(&self, obj: RtValue, key: &RtValue) -> RtValue {
        let seg = match self.view(key) {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(i) => PathSeg::Index(i as usize),
                None => PathSeg::Key(n.to_string()),
            },
            Some(v) => PathSeg::Key(self.key_string_of(v)),
            None => PathSeg::Key("undefined".to_string()),
        };
        match obj {
            RtValue::Data(path) => RtValue::Data(path.child(seg)),
            other => {
                let child = self.view(&other).and_then(|v| match (v, &seg) {
                    (Value::Object(map), PathSeg::Key(k)) => map.get(k),
                    (Value::Object(map), PathSeg::Index(i)) => map.get(&i.to_string()),
                    (Value::Array(items), PathSeg::Index(i)) => items.get(*i),
                    (Value::Array(items), PathSeg::Key(k)) => {
                        k.parse::<usize>().ok().and_then(|i| items.get(i))
                    }
                    _ => None,
                });
                child.cloned().map_or(RtValue::Undefined, RtValue::Json)
            }
        }
    }

    fn binary(&self, op: BinOp, a: &RtValue, b: &RtValue) -> RtValue {
        let (x, y) = (self.view(a), self.view(b));
        match op {
            BinOp::Eq => RtValue::bool(strict_equal(a, b, x, y)),
            BinOp::Ne => RtValue::bool(!strict_equal(a, b, x, y)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = match (x, y) {
                    (Some(Value::Number(p)), Some(Value::Number(q))) => {
                        p.as_f64().zip(q.as_f64()).and_then(|(p, q)| p.partial_cmp(&q))
                    }
                    (Some(Value::String(p)), Some(Value::String(q))) => Some(p.cmp(q)),
                    _ => None,
                };
                let result = match ord {
                    Some(ord) => match op {
                        BinOp::Lt => ord.is_lt(),
                        BinOp::Le => ord.is_le(),
                        BinOp::Gt => ord.is_gt(),
                        _ => ord.is_ge(),
                    },
                    None => false,
                };
                RtValue::bool(result)
            }
            BinOp::Add if matches!(x, Some(Value::String(_))) || matches!(y, Some(Value::String(_))) => {
                RtValue::Json(Value::String(format!("{}{}", self.js_string(a), self.js_string(b))))
            }
            _ => {
                let (Some(p), Some(q)) = (self.number(a), self.number(b)) else {
                    return RtValue::Undefined;
                };
                let r = match op {
                    BinOp::Add => p + q,
                    BinOp::Sub => p - q,
                    BinOp::Mul => p * q,
                    BinOp::Div => p / q,
                    _ => p % q,
                };
                number_value(r).map_or(RtValue::Undefined, RtValue::Json)
            }
        }
    }

    /// Borrow the JSON value behind a runtime value
    pub(crate) fn view<'v>(&'v self, v: &'v RtValue) -> Option<&'v Value> {
        match v {
            RtValue::Json(v) => Some(v),
            RtValue::Data(path) => data::get(&*self.root, path),
            RtValue::Ext(ext) => match self.program.values.get(ext) {
                Some(ScopeValue::Json(v)) => Some(v.as_ref()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Owned JSON value, `None` for undefined
    pub(crate) fn materialize(&self, v: &RtValue) -> Option<Value> {
        match v {
            RtValue::Errors(errors) => serde_json::to_value(errors).ok(),
            RtValue::Fn(_) => Some(Value::Bool(true)),
            other => self.view(other).cloned(),
        }
    }

    pub(crate) fn truthy(&self, v: &RtValue) -> bool {
        match v {
            RtValue::Undefined => false,
            RtValue::Ext(_) | RtValue::Fn(_) | RtValue::Errors(_) => true,
            other => self.view(other).is_some_and(truthy_json),
        }
    }

    pub(crate) fn number(&self, v: &RtValue) -> Option<f64> {
        match self.view(v) {
            Some(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    fn key_string_of(&self, v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => js_string_json(other),
        }
    }

    pub(crate) fn key_string(&self, v: &RtValue) -> String {
        match self.view(v) {
            Some(v) => self.key_string_of(v),
            None => "undefined".to_string(),
        }
    }

    pub(crate) fn js_string(&self, v: &RtValue) -> String {
        match self.view(v) {
            Some(v) => js_string_json(v),
            None => "undefined".to_string(),
        }
    }
}

fn strict_equal(a: &RtValue, b: &RtValue, x: Option<&Value>, y: Option<&Value>) -> bool {
    match (x, y) {
        (Some(x), Some(y)) => equal::equal(x, y),
        (None, None) => match (a, b) {
            (RtValue::Fn(p), RtValue::Fn(q)) => p == q,
            (RtValue::Ext(p), RtValue::Ext(q)) => p == q,
            _ => !matches!(a, RtValue::Fn(_) | RtValue::Ext(_)) && !matches!(b, RtValue::Fn(_) | RtValue::Ext(_)),
        },
        _ => false,
    }
}

/// JavaScript truthiness of a JSON value
pub fn truthy_json(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// JSON number for a float, integral values as integers; `None` for NaN/infinite
pub fn number_value(f: f64) -> Option<Value> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Some(Value::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number)
}

fn js_string_json(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Null => String::new(),
                v => js_string_json(v),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{Builtin, VarKind};
    use serde_json::json;

    fn name(s: &str) -> Name {
        Name::new(s)
    }

    fn program(body: Vec<Node>) -> Program {
        Program {
            fns: vec![Some(Arc::new(FnDef {
                id: FnId(0),
                name: name("validate0"),
                params: FnParams {
                    data: name("data"),
                    instance_path: name("instancePath"),
                    root_data: name("rootData"),
                },
                body,
                is_async: false,
                evaluated: EvaluatedInfo::default(),
            }))],
            values: ValueTable::default(),
        }
    }

    fn returned(c: Completion) -> CallOutcome {
        match c {
            Completion::Returned(o) => o,
            Completion::Thrown(v) => panic!("unexpected throw {:?}", v),
        }
    }

    #[test]
    fn test_writes_through_data_path() {
        let body = vec![
            Node::Assign {
                lhs: Place::Data(Expr::var(&name("data")).prop("n")),
                rhs: Expr::num(3),
            },
            Node::Return(Expr::bool(true)),
        ];
        let prog = program(body);
        let mut instance = json!({"n": "3"});
        let outcome = returned(Interpreter::new(&prog, &mut instance).run(FnId(0)).unwrap());
        assert_eq!(outcome.result, RtValue::bool(true));
        assert_eq!(instance, json!({"n": 3}));
    }

    #[test]
    fn test_for_in_with_labeled_break() {
        let count = name("count");
        let key = name("key0");
        let outer = name("outer");
        let body = vec![
            Node::Def { kind: VarKind::Let, name: count.clone(), rhs: Some(Expr::num(0)), constant: false },
            Node::Label {
                label: outer.clone(),
                body: vec![Node::For {
                    kind: ForKind::In { var: key.clone(), object: Expr::var(&name("data")) },
                    body: vec![
                        Node::Assign {
                            lhs: Place::Var(count.clone()),
                            rhs: Expr::bin(BinOp::Add, Expr::var(&count), Expr::num(1)),
                        },
                        Node::If {
                            cond: Expr::eq(Expr::var(&key), Expr::str("b")),
                            then: vec![Node::Break(Some(outer.clone()))],
                            els: None,
                        },
                    ],
                }],
            },
            Node::Return(Expr::var(&count)),
        ];
        let prog = program(body);
        let mut instance = json!({"a": 1, "b": 2, "c": 3});
        let outcome = returned(Interpreter::new(&prog, &mut instance).run(FnId(0)).unwrap());
        assert_eq!(outcome.result, RtValue::Json(json!(2)));
    }

    #[test]
    fn test_try_catch_finally_runs_finally() {
        let e = name("e0");
        let seen = name("seen");
        let body = vec![
            Node::Def { kind: VarKind::Let, name: seen.clone(), rhs: Some(Expr::num(0)), constant: false },
            Node::Try {
                body: vec![Node::Throw(Expr::str("boom"))],
                catch: Some((e.clone(), vec![Node::Assign { lhs: Place::Var(seen.clone()), rhs: Expr::var(&e) }])),
                finally: Some(vec![Node::Assign {
                    lhs: Place::Var(seen.clone()),
                    rhs: Expr::concat(vec![Expr::var(&seen), Expr::str("!")]),
                }]),
            },
            Node::Return(Expr::var(&seen)),
        ];
        let prog = program(body);
        let mut instance = json!(null);
        let outcome = returned(Interpreter::new(&prog, &mut instance).run(FnId(0)).unwrap());
        assert_eq!(outcome.result, RtValue::Json(json!("boom!")));
    }

    #[test]
    fn test_uncaught_throw_is_thrown_completion() {
        let prog = program(vec![Node::Throw(Expr::call(Builtin::NewValidationError, vec![]))]);
        let mut instance = json!(1);
        match Interpreter::new(&prog, &mut instance).run(FnId(0)).unwrap() {
            Completion::Thrown(RtValue::Errors(errors)) => assert!(errors.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_depth_limit() {
        let prog = program(vec![Node::Return(Expr::bool(true))]);
        let mut instance = json!(1);
        let mut interp = Interpreter::with_context(&prog, &mut instance, ExecutionContext { max_depth: 0 });
        assert!(interp.run(FnId(0)).is_err());
    }

    #[test]
    fn test_number_value_normalizes_integers() {
        assert_eq!(number_value(3.0), Some(json!(3)));
        assert_eq!(number_value(3.14), Some(json!(3.14)));
        assert_eq!(number_value(f64::NAN), None);
    }
}
