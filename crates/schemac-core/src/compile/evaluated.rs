//! Evaluated properties and items tracking
//!
//! Applicator keywords record which properties and array items they have
//! validated so `unevaluatedProperties` and `unevaluatedItems` can check the
//! complement. What is known at compile time is kept statically; anything
//! depending on which branch passed, or on a recursive reference, falls back
//! to a runtime variable merged by generated code.

use crate::codegen::{Builtin, CodeGen, Expr, Name};
use crate::runtime::RtValue;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Evaluated properties of an object instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatedProps {
    /// Every property was evaluated
    All,
    /// These properties were evaluated
    Names(BTreeSet<String>),
    /// Known only at run time, held in this variable
    Dynamic(Name),
}

impl Default for EvaluatedProps {
    fn default() -> Self {
        EvaluatedProps::Names(BTreeSet::new())
    }
}

/// Evaluated items of an array instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluatedItems {
    All,
    /// Items below this index were evaluated
    Count(usize),
    Dynamic(Name),
}

impl Default for EvaluatedItems {
    fn default() -> Self {
        EvaluatedItems::Count(0)
    }
}

impl EvaluatedProps {
    pub fn is_all(&self) -> bool {
        matches!(self, EvaluatedProps::All)
    }

    /// Runtime representation: `true`, an object of `name: true`, or undefined
    pub fn to_expr(&self) -> Expr {
        match self {
            EvaluatedProps::All => Expr::bool(true),
            EvaluatedProps::Names(names) if names.is_empty() => Expr::Undefined,
            EvaluatedProps::Names(names) => Expr::Lit(props_object(names)),
            EvaluatedProps::Dynamic(name) => Expr::var(name),
        }
    }

    /// Union with a statically known set
    pub fn merge_static(&mut self, gen: &mut CodeGen, other: &EvaluatedProps) -> Result<()> {
        match (&mut *self, other) {
            (EvaluatedProps::All, _) => {}
            (_, EvaluatedProps::All) => match self {
                EvaluatedProps::Dynamic(name) => gen.assign_var(name, Expr::bool(true)),
                _ => *self = EvaluatedProps::All,
            },
            (EvaluatedProps::Names(a), EvaluatedProps::Names(b)) => a.extend(b.iter().cloned()),
            (EvaluatedProps::Dynamic(name), EvaluatedProps::Names(b)) => {
                if !b.is_empty() {
                    let merged = Expr::call(Builtin::MergeProps, vec![Expr::var(name), Expr::Lit(props_object(b))]);
                    gen.assign_var(name, merged);
                }
            }
            (_, EvaluatedProps::Dynamic(from)) => {
                let from = from.clone();
                self.merge_expr(gen, Expr::var(&from))?;
            }
        }
        Ok(())
    }

    /// Union with a runtime value, switching to dynamic tracking
    pub fn merge_expr(&mut self, gen: &mut CodeGen, from: Expr) -> Result<()> {
        if self.is_all() {
            return Ok(());
        }
        let name = self.dynamic_name(gen)?;
        let merged = Expr::call(Builtin::MergeProps, vec![Expr::var(&name), from]);
        gen.assign_var(&name, merged);
        Ok(())
    }

    /// Variable holding the runtime value, declared on first use
    pub fn dynamic_name(&mut self, gen: &mut CodeGen) -> Result<Name> {
        if let EvaluatedProps::Dynamic(name) = self {
            return Ok(name.clone());
        }
        let init = self.to_expr();
        let name = gen.name("props")?;
        gen.def_name(crate::codegen::VarKind::Var, &name, Some(init));
        *self = EvaluatedProps::Dynamic(name.clone());
        Ok(name)
    }
}

impl EvaluatedItems {
    pub fn is_all(&self) -> bool {
        matches!(self, EvaluatedItems::All)
    }

    pub fn to_expr(&self) -> Expr {
        match self {
            EvaluatedItems::All => Expr::bool(true),
            EvaluatedItems::Count(0) => Expr::Undefined,
            EvaluatedItems::Count(n) => Expr::num(*n as u64),
            EvaluatedItems::Dynamic(name) => Expr::var(name),
        }
    }

    pub fn merge_static(&mut self, gen: &mut CodeGen, other: &EvaluatedItems) -> Result<()> {
        match (&mut *self, other) {
            (EvaluatedItems::All, _) => {}
            (_, EvaluatedItems::All) => match self {
                EvaluatedItems::Dynamic(name) => gen.assign_var(name, Expr::bool(true)),
                _ => *self = EvaluatedItems::All,
            },
            (EvaluatedItems::Count(a), EvaluatedItems::Count(b)) => *a = (*a).max(*b),
            (EvaluatedItems::Dynamic(name), EvaluatedItems::Count(b)) => {
                if *b > 0 {
                    let merged = Expr::call(Builtin::MergeItems, vec![Expr::var(name), Expr::num(*b as u64)]);
                    gen.assign_var(name, merged);
                }
            }
            (_, EvaluatedItems::Dynamic(from)) => {
                let from = from.clone();
                self.merge_expr(gen, Expr::var(&from))?;
            }
        }
        Ok(())
    }

    pub fn merge_expr(&mut self, gen: &mut CodeGen, from: Expr) -> Result<()> {
        if self.is_all() {
            return Ok(());
        }
        let name = self.dynamic_name(gen)?;
        let merged = Expr::call(Builtin::MergeItems, vec![Expr::var(&name), from]);
        gen.assign_var(&name, merged);
        Ok(())
    }

    pub fn dynamic_name(&mut self, gen: &mut CodeGen) -> Result<Name> {
        if let EvaluatedItems::Dynamic(name) = self {
            return Ok(name.clone());
        }
        let init = self.to_expr();
        let name = gen.name("items")?;
        gen.def_name(crate::codegen::VarKind::Var, &name, Some(init));
        *self = EvaluatedItems::Dynamic(name.clone());
        Ok(name)
    }
}

fn props_object(names: &BTreeSet<String>) -> Value {
    let map: Map<String, Value> = names.iter().map(|n| (n.clone(), Value::Bool(true))).collect();
    Value::Object(map)
}

/// Static evaluated descriptor of a compiled schema function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluatedInfo {
    /// `None` when properties are tracked dynamically
    pub props: Option<EvaluatedProps>,
    pub items: Option<EvaluatedItems>,
    pub dynamic_props: bool,
    pub dynamic_items: bool,
}

impl EvaluatedInfo {
    /// Descriptor for a function whose body ended with the given tracking state
    pub fn from_tracking(props: &EvaluatedProps, items: &EvaluatedItems) -> Self {
        let (props, dynamic_props) = match props {
            EvaluatedProps::Dynamic(_) => (None, true),
            p => (Some(p.clone()), false),
        };
        let (items, dynamic_items) = match items {
            EvaluatedItems::Dynamic(_) => (None, true),
            i => (Some(i.clone()), false),
        };
        Self { props, items, dynamic_props, dynamic_items }
    }

    /// Runtime value of the static evaluated properties
    pub fn props_value(&self) -> RtValue {
        match &self.props {
            Some(EvaluatedProps::All) => RtValue::bool(true),
            Some(EvaluatedProps::Names(names)) if !names.is_empty() => RtValue::Json(props_object(names)),
            _ => RtValue::Undefined,
        }
    }

    pub fn items_value(&self) -> RtValue {
        match &self.items {
            Some(EvaluatedItems::All) => RtValue::bool(true),
            Some(EvaluatedItems::Count(n)) if *n > 0 => RtValue::Json(Value::from(*n)),
            _ => RtValue::Undefined,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{render, Scope};

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_static_props_union() {
        let mut gen = CodeGen::new(Scope::new());
        let mut props = EvaluatedProps::Names(names(&["a"]));
        props.merge_static(&mut gen, &EvaluatedProps::Names(names(&["b"]))).unwrap();
        assert_eq!(props, EvaluatedProps::Names(names(&["a", "b"])));
        props.merge_static(&mut gen, &EvaluatedProps::All).unwrap();
        assert!(props.is_all());
        assert!(gen.finish().unwrap().is_empty());
    }

    #[test]
    fn test_dynamic_props_emit_runtime_merge() {
        let mut gen = CodeGen::new(Scope::new());
        let mut props = EvaluatedProps::Names(names(&["a"]));
        props.merge_expr(&mut gen, Expr::var(&Name::new("p"))).unwrap();
        assert!(matches!(props, EvaluatedProps::Dynamic(_)));
        let code = render(&gen.finish().unwrap(), false);
        assert_eq!(code, "var props0 = {\"a\":true};props0 = mergeProps(props0, p);");
    }

    #[test]
    fn test_items_count_takes_max() {
        let mut gen = CodeGen::new(Scope::new());
        let mut items = EvaluatedItems::Count(2);
        items.merge_static(&mut gen, &EvaluatedItems::Count(1)).unwrap();
        assert_eq!(items, EvaluatedItems::Count(2));
        items.merge_static(&mut gen, &EvaluatedItems::Count(5)).unwrap();
        assert_eq!(items, EvaluatedItems::Count(5));
    }

    #[test]
    fn test_info_runtime_values() {
        let info = EvaluatedInfo::from_tracking(&EvaluatedProps::Names(names(&["x"])), &EvaluatedItems::Count(0));
        assert_eq!(info.props_value(), RtValue::Json(serde_json::json!({"x": true})));
        assert_eq!(info.items_value(), RtValue::Undefined);
        assert!(!info.dynamic_props);
    }
}
