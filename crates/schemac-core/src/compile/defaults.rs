//! `default` assignment for missing properties and tuple items

use super::context::SchemaCxt;
use super::data_type::JsonType;
use super::util::check_strict_mode;
use super::Builder;
use crate::codegen::{Expr, Place};
use crate::error::StrictCategory;
use crate::options::UseDefaults;
use crate::Result;
use serde_json::Value;

/// Emit default assignments for the keyword group of `ty`
pub fn assign_defaults(it: &SchemaCxt<'_>, b: &mut Builder<'_>, ty: Option<JsonType>) -> Result<()> {
    match ty {
        Some(JsonType::Object) => {
            if let Some(Value::Object(properties)) = it.schema.get("properties") {
                for (key, schema) in properties {
                    assign_default(it, b, Expr::str(key.clone()), schema.get("default"))?;
                }
            }
        }
        Some(JsonType::Array) => {
            let tuple = match (it.schema.get("prefixItems"), it.schema.get("items")) {
                (Some(Value::Array(items)), _) | (None, Some(Value::Array(items))) => Some(items),
                _ => None,
            };
            for (i, schema) in tuple.into_iter().flatten().enumerate() {
                assign_default(it, b, Expr::num(i as u64), schema.get("default"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn assign_default(it: &SchemaCxt<'_>, b: &mut Builder<'_>, prop: Expr, default: Option<&Value>) -> Result<()> {
    let Some(default) = default else {
        return Ok(());
    };
    let child = Expr::var(&it.data).member(prop.clone());
    if it.composite_rule {
        let at = match prop.as_lit() {
            Some(Value::String(s)) => format!("{}/{}", it.err_schema_path, s),
            Some(other) => format!("{}/{}", it.err_schema_path, other),
            None => it.err_schema_path.clone(),
        };
        return check_strict_mode(b, StrictCategory::Schema, format!("default is ignored for: {}", at));
    }
    let mut missing = vec![Expr::eq(child.clone(), Expr::Undefined)];
    if b.cfg.opts.use_defaults == UseDefaults::Empty {
        missing.push(Expr::eq(child.clone(), Expr::Lit(Value::Null)));
        missing.push(Expr::eq(child.clone(), Expr::str("")));
    }
    b.gen.if_(Expr::or(missing));
    b.gen.assign(Place::Data(child), Expr::Lit(default.clone()));
    b.gen.end_if()
}
