//! Expression layer of the validator IR
//!
//! Expressions are a closed tagged union. They render to a compact
//! JavaScript-like text (used for `code_source` output and debugging) and
//! are evaluated directly by the runtime interpreter.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Identifier in generated code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: impl AsRef<str>) -> Self {
        Name(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix part of a generated name (`valid12` -> `valid`)
    pub fn prefix(&self) -> &str {
        self.0.trim_end_matches(|c: char| c.is_ascii_digit())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a value captured in the compiler's value scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtRef {
    pub prefix: Arc<str>,
    pub index: usize,
}

impl fmt::Display for ExtRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope.{}[{}]", self.prefix, self.index)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "===",
            BinOp::Ne => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }

    /// Operator with swapped operands (`a < b` == `b > a`)
    pub fn flip(self) -> BinOp {
        match self {
            BinOp::Lt => BinOp::Gt,
            BinOp::Le => BinOp::Ge,
            BinOp::Gt => BinOp::Lt,
            BinOp::Ge => BinOp::Le,
            op => op,
        }
    }

    /// Negated comparison (`a < b` == `!(a >= b)`)
    pub fn negate(self) -> Option<BinOp> {
        match self {
            BinOp::Eq => Some(BinOp::Ne),
            BinOp::Ne => Some(BinOp::Eq),
            BinOp::Lt => Some(BinOp::Ge),
            BinOp::Le => Some(BinOp::Gt),
            BinOp::Gt => Some(BinOp::Le),
            BinOp::Ge => Some(BinOp::Lt),
            _ => None,
        }
    }
}

/// Runtime helpers callable from generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// JavaScript-style `typeof`
    TypeOf,
    /// JSON type test: `(value, "integer")`
    IsType,
    /// Array length or object key count
    Len,
    /// String length in characters
    Ucs2Length,
    /// Deep JSON equality
    Equal,
    /// Own property test: `(object, key)`
    HasOwn,
    /// Object keys as an array
    Keys,
    /// `(regex, string)`; the regex is a scope value or a pattern string
    RegexTest,
    /// `(format, string) -> bool`
    FormatValidate,
    /// `(format, a, b) -> number | undefined`
    FormatCompare,
    /// JSON pointer escaping of a property name
    EscapePointer,
    /// `Math.abs`-free integer test used by `multipleOf`
    IsIntegral,
    /// Push an error object onto the current error buffer
    PushError,
    /// Number of errors in the current buffer
    ErrorCount,
    /// Truncate the current error buffer to a length
    TruncateErrors,
    /// Call a compiled schema function: `(validate, data, instancePath)`
    CallValidate,
    /// Append the errors of the last failed call
    AppendCalleeErrors,
    /// Evaluated properties reported by the last call
    CalleeProps,
    /// Evaluated items reported by the last call
    CalleeItems,
    /// Union of two evaluated-properties values
    MergeProps,
    /// Union of two evaluated-items values
    MergeItems,
    /// Publish dynamically tracked evaluated properties/items: `(props, items)`
    ReportEvaluated,
    /// Build a `ValidationError` aggregate from the current buffer
    NewValidationError,
    /// Test whether a caught value is a `ValidationError`
    IsValidationError,
    /// Append the errors carried by a caught `ValidationError`
    AppendErrors,
    /// Delete a property: `(object, key)`
    DeleteProp,
    /// Invoke a user keyword validation function: `(keyword, schema, data, parentSchema)`
    CallKeyword,
    /// Push a dynamic anchor scope entry: `(anchor, validate)`
    PushDynamicAnchor,
    /// Pop the last dynamic anchor scope entry
    PopDynamicAnchor,
    /// Outermost validate function registered for a dynamic anchor
    DynamicAnchor,
    /// Numeric parse used by coercion (`+value` semantics on strings)
    ToNumber,
    /// String conversion used by coercion
    ToString,
}

impl Builtin {
    /// Whether evaluating this builtin has an observable effect
    pub fn has_side_effects(self) -> bool {
        matches!(
            self,
            Builtin::PushError
                | Builtin::TruncateErrors
                | Builtin::CallValidate
                | Builtin::AppendCalleeErrors
                | Builtin::AppendErrors
                | Builtin::DeleteProp
                | Builtin::CallKeyword
                | Builtin::PushDynamicAnchor
                | Builtin::PopDynamicAnchor
                | Builtin::ReportEvaluated
        )
    }

    /// Whether the result depends on state that changes between statements
    pub fn reads_mutable_state(self) -> bool {
        matches!(
            self,
            Builtin::ErrorCount
                | Builtin::CalleeProps
                | Builtin::CalleeItems
                | Builtin::NewValidationError
                | Builtin::DynamicAnchor
        )
    }

    fn js_name(self) -> &'static str {
        match self {
            Builtin::TypeOf => "typeof",
            Builtin::IsType => "isType",
            Builtin::Len => "len",
            Builtin::Ucs2Length => "ucs2length",
            Builtin::Equal => "equal",
            Builtin::HasOwn => "hasOwn",
            Builtin::Keys => "Object.keys",
            Builtin::RegexTest => "test",
            Builtin::FormatValidate => "formatValidate",
            Builtin::FormatCompare => "formatCompare",
            Builtin::EscapePointer => "escapePointer",
            Builtin::IsIntegral => "isIntegral",
            Builtin::PushError => "pushError",
            Builtin::ErrorCount => "errorCount",
            Builtin::TruncateErrors => "truncateErrors",
            Builtin::CallValidate => "callValidate",
            Builtin::AppendCalleeErrors => "appendCalleeErrors",
            Builtin::CalleeProps => "calleeProps",
            Builtin::CalleeItems => "calleeItems",
            Builtin::MergeProps => "mergeProps",
            Builtin::MergeItems => "mergeItems",
            Builtin::ReportEvaluated => "reportEvaluated",
            Builtin::NewValidationError => "new ValidationError",
            Builtin::IsValidationError => "isValidationError",
            Builtin::AppendErrors => "appendErrors",
            Builtin::DeleteProp => "deleteProp",
            Builtin::CallKeyword => "callKeyword",
            Builtin::PushDynamicAnchor => "pushDynamicAnchor",
            Builtin::PopDynamicAnchor => "popDynamicAnchor",
            Builtin::DynamicAnchor => "dynamicAnchor",
            Builtin::ToNumber => "+",
            Builtin::ToString => "String",
        }
    }
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The absent value
    Undefined,
    /// JSON literal
    Lit(Value),
    /// Local variable or parameter
    Var(Name),
    /// Captured scope value
    Ext(ExtRef),
    /// Property or index access: `object[key]`
    Member(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    /// String concatenation
    Concat(Vec<Expr>),
    /// Object literal
    Object(Vec<(String, Expr)>),
    /// Array literal
    Array(Vec<Expr>),
    Call(Builtin, Vec<Expr>),
}

impl Expr {
    pub fn bool(b: bool) -> Self {
        Expr::Lit(Value::Bool(b))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Expr::Lit(Value::String(s.into()))
    }

    pub fn num(n: impl Into<serde_json::Number>) -> Self {
        Expr::Lit(Value::Number(n.into()))
    }

    pub fn var(name: &Name) -> Self {
        Expr::Var(name.clone())
    }

    pub fn call(builtin: Builtin, args: Vec<Expr>) -> Self {
        Expr::Call(builtin, args)
    }

    /// `self[key]`
    pub fn member(self, key: Expr) -> Self {
        Expr::Member(Box::new(self), Box::new(key))
    }

    /// `self["prop"]`
    pub fn prop(self, prop: impl Into<String>) -> Self {
        self.member(Expr::str(prop))
    }

    pub fn bin(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Bin(op, Box::new(left), Box::new(right))
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::bin(BinOp::Eq, left, right)
    }

    pub fn ne(left: Expr, right: Expr) -> Self {
        Expr::bin(BinOp::Ne, left, right)
    }

    /// Logical negation, folding double negation and comparisons
    pub fn not(e: Expr) -> Self {
        match e {
            Expr::Lit(Value::Bool(b)) => Expr::bool(!b),
            Expr::Not(inner) => *inner,
            Expr::Bin(op, l, r) => match op.negate() {
                Some(neg) if !matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) => {
                    Expr::Bin(neg, l, r)
                }
                _ => Expr::Not(Box::new(Expr::Bin(op, l, r))),
            },
            e => Expr::Not(Box::new(e)),
        }
    }

    /// Conjunction dropping literal `true` operands
    pub fn and(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Expr::Lit(Value::Bool(true)) => {}
                Expr::And(inner) => out.extend(inner),
                item => out.push(item),
            }
        }
        match out.len() {
            0 => Expr::bool(true),
            1 => out.pop().unwrap_or(Expr::bool(true)),
            _ => Expr::And(out),
        }
    }

    /// Disjunction dropping literal `false` operands
    pub fn or(items: impl IntoIterator<Item = Expr>) -> Self {
        let mut out = Vec::new();
        for item in items {
            match item {
                Expr::Lit(Value::Bool(false)) => {}
                Expr::Or(inner) => out.extend(inner),
                item => out.push(item),
            }
        }
        match out.len() {
            0 => Expr::bool(false),
            1 => out.pop().unwrap_or(Expr::bool(false)),
            _ => Expr::Or(out),
        }
    }

    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Concat(parts.into_iter().collect())
    }

    /// Literal value, if this expression is one
    pub fn as_lit(&self) -> Option<&Value> {
        match self {
            Expr::Lit(v) => Some(v),
            _ => None,
        }
    }

    /// Statically known truthiness
    pub fn const_truthy(&self) -> Option<bool> {
        match self {
            Expr::Undefined => Some(false),
            Expr::Lit(v) => Some(crate::runtime::truthy_json(v)),
            Expr::Object(_) | Expr::Array(_) => Some(true),
            _ => None,
        }
    }

    /// An expression without side effects whose value does not depend on
    /// mutable interpreter state
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Undefined | Expr::Lit(_) | Expr::Var(_) | Expr::Ext(_) => true,
            Expr::Member(a, b) | Expr::Bin(_, a, b) => a.is_pure() && b.is_pure(),
            Expr::Not(e) => e.is_pure(),
            Expr::And(items) | Expr::Or(items) | Expr::Concat(items) | Expr::Array(items) => {
                items.iter().all(Expr::is_pure)
            }
            Expr::Object(fields) => fields.iter().all(|(_, e)| e.is_pure()),
            Expr::Call(b, args) => {
                !b.has_side_effects() && !b.reads_mutable_state() && args.iter().all(Expr::is_pure)
            }
        }
    }

    /// Visit every name read by this expression
    pub fn for_each_name(&self, f: &mut impl FnMut(&Name)) {
        match self {
            Expr::Var(n) => f(n),
            Expr::Undefined | Expr::Lit(_) | Expr::Ext(_) => {}
            Expr::Member(a, b) | Expr::Bin(_, a, b) => {
                a.for_each_name(f);
                b.for_each_name(f);
            }
            Expr::Not(e) => e.for_each_name(f),
            Expr::And(items) | Expr::Or(items) | Expr::Concat(items) | Expr::Array(items) => {
                items.iter().for_each(|e| e.for_each_name(f))
            }
            Expr::Object(fields) => fields.iter().for_each(|(_, e)| e.for_each_name(f)),
            Expr::Call(_, args) => args.iter().for_each(|e| e.for_each_name(f)),
        }
    }

    /// Names read by this expression
    pub fn names(&self) -> HashSet<Name> {
        let mut out = HashSet::new();
        self.for_each_name(&mut |n| {
            out.insert(n.clone());
        });
        out
    }

    /// Rewrite every sub-expression bottom-up
    pub fn map(self, f: &mut impl FnMut(Expr) -> Expr) -> Expr {
        let e = match self {
            Expr::Member(a, b) => Expr::Member(Box::new(a.map(f)), Box::new(b.map(f))),
            Expr::Bin(op, a, b) => Expr::Bin(op, Box::new(a.map(f)), Box::new(b.map(f))),
            Expr::Not(e) => Expr::Not(Box::new(e.map(f))),
            Expr::And(items) => Expr::And(items.into_iter().map(|e| e.map(f)).collect()),
            Expr::Or(items) => Expr::Or(items.into_iter().map(|e| e.map(f)).collect()),
            Expr::Concat(items) => Expr::Concat(items.into_iter().map(|e| e.map(f)).collect()),
            Expr::Array(items) => Expr::Array(items.into_iter().map(|e| e.map(f)).collect()),
            Expr::Object(fields) => {
                Expr::Object(fields.into_iter().map(|(k, e)| (k, e.map(f))).collect())
            }
            Expr::Call(b, args) => Expr::Call(b, args.into_iter().map(|e| e.map(f)).collect()),
            leaf => leaf,
        };
        f(e)
    }

    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::And(_) | Expr::Or(_) | Expr::Bin(..) | Expr::Concat(_) | Expr::Not(_)
        )
    }
}

impl From<Name> for Expr {
    fn from(name: Name) -> Self {
        Expr::Var(name)
    }
}

impl From<&Name> for Expr {
    fn from(name: &Name) -> Self {
        Expr::Var(name.clone())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct Paren<'a>(&'a Expr);

impl fmt::Display for Paren<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_compound() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", Paren(item))?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Undefined => f.write_str("undefined"),
            Expr::Lit(v) => write!(f, "{}", v),
            Expr::Var(n) => write!(f, "{}", n),
            Expr::Ext(r) => write!(f, "{}", r),
            Expr::Member(obj, key) => match key.as_lit() {
                Some(Value::String(s)) if is_identifier(s) => write!(f, "{}.{}", Paren(obj), s),
                _ => write!(f, "{}[{}]", Paren(obj), key),
            },
            Expr::Not(e) => write!(f, "!{}", Paren(e)),
            Expr::And(items) => join(f, items, " && "),
            Expr::Or(items) => join(f, items, " || "),
            Expr::Bin(op, a, b) => write!(f, "{} {} {}", Paren(a), op.symbol(), Paren(b)),
            Expr::Concat(items) => {
                if items.is_empty() {
                    return f.write_str("\"\"");
                }
                join(f, items, " + ")
            }
            Expr::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_identifier(k) {
                        write!(f, "{}: {}", k, v)?;
                    } else {
                        write!(f, "{}: {}", Value::String(k.clone()), v)?;
                    }
                }
                f.write_str("}")
            }
            Expr::Array(items) => {
                f.write_str("[")?;
                join(f, items, ", ")?;
                f.write_str("]")
            }
            Expr::Call(Builtin::TypeOf, args) if args.len() == 1 => {
                write!(f, "typeof {}", Paren(&args[0]))
            }
            Expr::Call(Builtin::RegexTest, args) if args.len() == 2 => {
                write!(f, "{}.test({})", Paren(&args[0]), args[1])
            }
            Expr::Call(b, args) => {
                write!(f, "{}(", b.js_name())?;
                join(f, args, ", ")?;
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_member_rendering() {
        let data = Expr::Var(Name::new("data"));
        assert_eq!(data.clone().prop("age").to_string(), "data.age");
        assert_eq!(data.prop("foo-bar").to_string(), "data[\"foo-bar\"]");
    }

    #[test]
    fn test_not_folds_equality() {
        let e = Expr::not(Expr::eq(Expr::var(&Name::new("a")), Expr::num(1)));
        assert_eq!(e.to_string(), "a !== 1");
        assert_eq!(Expr::not(Expr::not(Expr::var(&Name::new("x")))).to_string(), "x");
    }

    #[test]
    fn test_and_or_simplify_literals() {
        let x = Expr::var(&Name::new("x"));
        assert_eq!(Expr::and(vec![Expr::bool(true), x.clone()]), x);
        assert_eq!(Expr::or(vec![Expr::bool(false), Expr::bool(false)]), Expr::bool(false));
    }

    #[test]
    fn test_purity() {
        let x = Expr::var(&Name::new("x"));
        assert!(Expr::call(Builtin::Ucs2Length, vec![x.clone()]).is_pure());
        assert!(!Expr::call(Builtin::ErrorCount, vec![]).is_pure());
        assert!(!Expr::call(Builtin::PushError, vec![x]).is_pure());
    }

    #[test]
    fn test_name_prefix() {
        assert_eq!(Name::new("valid12").prefix(), "valid");
        assert_eq!(Name::new("data").prefix(), "data");
    }

    #[test]
    fn test_object_rendering() {
        let e = Expr::Object(vec![
            ("missingProperty".to_string(), Expr::str("age")),
            ("a-b".to_string(), Expr::Lit(json!(1))),
        ]);
        assert_eq!(e.to_string(), "{missingProperty: \"age\", \"a-b\": 1}");
    }
}
