//! Runtime helpers invoked by `Expr::Call`

use super::data;
use super::equal::equal;
use super::{Completion, Exec, FnId, Frame, Interpreter, RtValue, Unwind};
use crate::codegen::{Builtin, ScopeValue};
use crate::validator::ErrorObject;
use crate::Error;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

fn arg(args: &[RtValue], i: usize) -> &RtValue {
    args.get(i).unwrap_or(&RtValue::Undefined)
}

impl Interpreter<'_> {
    pub(crate) fn builtin(&mut self, frame: &mut Frame, builtin: Builtin, args: Vec<RtValue>) -> Exec<RtValue> {
        let value = match builtin {
            Builtin::TypeOf => {
                let t = match (arg(&args, 0), self.view(arg(&args, 0))) {
                    (RtValue::Ext(_) | RtValue::Fn(_), None) => "function",
                    (RtValue::Errors(_), _) => "object",
                    (_, None) => "undefined",
                    (_, Some(Value::Null | Value::Array(_) | Value::Object(_))) => "object",
                    (_, Some(Value::Bool(_))) => "boolean",
                    (_, Some(Value::Number(_))) => "number",
                    (_, Some(Value::String(_))) => "string",
                };
                RtValue::Json(Value::String(t.to_string()))
            }
            Builtin::IsType => {
                let ty = self.view(arg(&args, 1)).and_then(Value::as_str).unwrap_or("");
                RtValue::bool(self.view(arg(&args, 0)).is_some_and(|v| json_type_is(v, ty)))
            }
            Builtin::Len => match self.view(arg(&args, 0)) {
                Some(Value::Array(items)) => RtValue::Json(Value::from(items.len())),
                Some(Value::Object(map)) => RtValue::Json(Value::from(map.len())),
                Some(Value::String(s)) => RtValue::Json(Value::from(s.encode_utf16().count())),
                _ => RtValue::Undefined,
            },
            Builtin::Ucs2Length => match self.view(arg(&args, 0)) {
                Some(Value::String(s)) => RtValue::Json(Value::from(s.chars().count())),
                _ => RtValue::Undefined,
            },
            Builtin::Equal => {
                let eq = match (self.view(arg(&args, 0)), self.view(arg(&args, 1))) {
                    (Some(a), Some(b)) => equal(a, b),
                    (None, None) => true,
                    _ => false,
                };
                RtValue::bool(eq)
            }
            Builtin::HasOwn => {
                let key = self.key_string(arg(&args, 1));
                let has = match self.view(arg(&args, 0)) {
                    Some(Value::Object(map)) => map.contains_key(&key),
                    _ => false,
                };
                RtValue::bool(has)
            }
            Builtin::Keys => match self.view(arg(&args, 0)) {
                Some(Value::Object(map)) => RtValue::Json(Value::Array(
                    map.keys().cloned().map(Value::String).collect(),
                )),
                _ => RtValue::Json(Value::Array(Vec::new())),
            },
            Builtin::RegexTest => {
                let text = self.view(arg(&args, 1)).and_then(Value::as_str).map(str::to_owned);
                let matched = match text {
                    Some(s) => self.regex_test(arg(&args, 0), &s)?,
                    None => false,
                };
                RtValue::bool(matched)
            }
            Builtin::FormatValidate => {
                let format = self.format(arg(&args, 0))?;
                let valid = match self.view(arg(&args, 1)) {
                    Some(v) => format.validate(v),
                    None => true,
                };
                RtValue::bool(valid)
            }
            Builtin::FormatCompare => {
                let format = self.format(arg(&args, 0))?;
                let ord = match (self.view(arg(&args, 1)), self.view(arg(&args, 2))) {
                    (Some(a), Some(b)) => format.compare(a, b),
                    _ => None,
                };
                match ord {
                    Some(Ordering::Less) => RtValue::Json(Value::from(-1)),
                    Some(Ordering::Equal) => RtValue::Json(Value::from(0)),
                    Some(Ordering::Greater) => RtValue::Json(Value::from(1)),
                    None => RtValue::Undefined,
                }
            }
            Builtin::EscapePointer => {
                let s = self.key_string(arg(&args, 0));
                RtValue::Json(Value::String(s.replace('~', "~0").replace('/', "~1")))
            }
            Builtin::IsIntegral => {
                let integral = match self.number(arg(&args, 0)) {
                    Some(d) => match self.number(arg(&args, 1)) {
                        Some(precision) => (d.round() - d).abs() <= 10f64.powi(-(precision as i32)),
                        None => d.is_finite() && d.fract() == 0.0,
                    },
                    None => false,
                };
                RtValue::bool(integral)
            }
            Builtin::PushError => {
                let error = self.error_object(arg(&args, 0))?;
                frame.errors.push(error);
                RtValue::Undefined
            }
            Builtin::ErrorCount => RtValue::Json(Value::from(frame.errors.len())),
            Builtin::TruncateErrors => {
                let n = self.number(arg(&args, 0)).unwrap_or(0.0) as usize;
                frame.errors.truncate(n);
                RtValue::Undefined
            }
            Builtin::CallValidate => {
                let id = self.function_id(arg(&args, 0))?;
                let data = arg(&args, 1).clone();
                let path = self.js_string(arg(&args, 2));
                match self.call(id, data, path)? {
                    Completion::Returned(outcome) => {
                        let result = outcome.result.clone();
                        frame.last_call = Some(outcome);
                        result
                    }
                    Completion::Thrown(thrown) => {
                        frame.last_call = None;
                        return Err(Unwind::Throw(thrown));
                    }
                }
            }
            Builtin::AppendCalleeErrors => {
                if let Some(call) = frame.last_call.as_mut() {
                    frame.errors.append(&mut call.errors);
                }
                RtValue::Undefined
            }
            Builtin::CalleeProps => frame
                .last_call
                .as_ref()
                .map_or(RtValue::Undefined, |c| c.props.clone()),
            Builtin::CalleeItems => frame
                .last_call
                .as_ref()
                .map_or(RtValue::Undefined, |c| c.items.clone()),
            Builtin::MergeProps => self.merge_props(arg(&args, 0), arg(&args, 1)),
            Builtin::MergeItems => self.merge_items(arg(&args, 0), arg(&args, 1)),
            Builtin::ReportEvaluated => {
                frame.evaluated = Some((arg(&args, 0).clone(), arg(&args, 1).clone()));
                RtValue::Undefined
            }
            Builtin::NewValidationError => RtValue::Errors(frame.errors.clone()),
            Builtin::IsValidationError => RtValue::bool(matches!(arg(&args, 0), RtValue::Errors(_))),
            Builtin::AppendErrors => {
                if let RtValue::Errors(errors) = arg(&args, 0) {
                    frame.errors.extend(errors.iter().cloned());
                }
                RtValue::Undefined
            }
            Builtin::DeleteProp => {
                let key = self.key_string(arg(&args, 1));
                match arg(&args, 0) {
                    RtValue::Data(path) => {
                        let target = path.child(data::PathSeg::Key(key));
                        data::delete(&mut *self.root, &target);
                    }
                    _ => return Err(Error::internal("deleteProp target is not instance data").into()),
                }
                RtValue::Undefined
            }
            Builtin::CallKeyword => {
                let validate = match arg(&args, 0) {
                    RtValue::Ext(ext) => match self.program.values.get(ext) {
                        Some(ScopeValue::Keyword(f)) => f.clone(),
                        _ => return Err(Error::internal("callKeyword target is not a keyword function").into()),
                    },
                    _ => return Err(Error::internal("callKeyword target is not a keyword function").into()),
                };
                let schema = self.view(arg(&args, 1)).cloned().unwrap_or(Value::Null);
                let parent = self.view(arg(&args, 3)).cloned().unwrap_or(Value::Null);
                let data = self.view(arg(&args, 2)).cloned().unwrap_or(Value::Null);
                RtValue::bool(validate(&schema, &data, &parent))
            }
            Builtin::PushDynamicAnchor => {
                let anchor = self.key_string(arg(&args, 0));
                let id = self.function_id(arg(&args, 1))?;
                self.dynamic_anchors.push((anchor, id));
                RtValue::Undefined
            }
            Builtin::PopDynamicAnchor => {
                self.dynamic_anchors.pop();
                RtValue::Undefined
            }
            Builtin::DynamicAnchor => {
                let anchor = self.key_string(arg(&args, 0));
                self.dynamic_anchors
                    .iter()
                    .find(|(a, _)| *a == anchor)
                    .map_or(RtValue::Undefined, |(_, id)| RtValue::Fn(*id))
            }
            Builtin::ToNumber => match self.view(arg(&args, 0)) {
                Some(Value::String(s)) => parse_js_number(s).map_or(RtValue::Undefined, RtValue::Json),
                Some(Value::Bool(b)) => RtValue::Json(Value::from(u8::from(*b))),
                Some(Value::Null) => RtValue::Json(Value::from(0)),
                Some(Value::Number(n)) => RtValue::Json(Value::Number(n.clone())),
                _ => RtValue::Undefined,
            },
            Builtin::ToString => match self.view(arg(&args, 0)) {
                Some(v @ (Value::Number(_) | Value::Bool(_))) => RtValue::Json(Value::String(v.to_string())),
                Some(Value::String(s)) => RtValue::Json(Value::String(s.clone())),
                _ => RtValue::Undefined,
            },
        };
        Ok(value)
    }

    fn function_id(&self, v: &RtValue) -> Exec<FnId> {
        match v {
            RtValue::Fn(id) => Ok(*id),
            RtValue::Ext(ext) => match self.program.values.get(ext) {
                Some(ScopeValue::Validate(id)) => Ok(*id),
                _ => Err(Error::internal(format!("{} is not a schema function", ext)).into()),
            },
            other => Err(Error::internal(format!("{:?} is not a schema function", other)).into()),
        }
    }

    fn format(&self, v: &RtValue) -> Exec<std::sync::Arc<crate::formats::Format>> {
        match v {
            RtValue::Ext(ext) => match self.program.values.get(ext) {
                Some(ScopeValue::Format(f)) => Ok(f.clone()),
                _ => Err(Error::internal(format!("{} is not a format", ext)).into()),
            },
            other => Err(Error::internal(format!("{:?} is not a format", other)).into()),
        }
    }

    fn regex_test(&mut self, re: &RtValue, s: &str) -> Exec<bool> {
        if let RtValue::Ext(ext) = re {
            return match self.program.values.get(ext) {
                Some(ScopeValue::Regex(re)) => Ok(re.is_match(s)),
                _ => Err(Error::internal(format!("{} is not a regular expression", ext)).into()),
            };
        }
        // Pattern supplied at runtime through `$data`
        let pattern = match self.view(re) {
            Some(Value::String(p)) => p.clone(),
            _ => return Ok(false),
        };
        if !self.patterns.contains_key(&pattern) {
            let compiled = Regex::new(&pattern).map_err(Error::from)?;
            self.patterns.insert(pattern.clone(), compiled);
        }
        Ok(self.patterns.get(&pattern).is_some_and(|re| re.is_match(s)))
    }

    fn error_object(&self, v: &RtValue) -> Exec<ErrorObject> {
        let value = self
            .materialize(v)
            .ok_or_else(|| Error::internal("error object is undefined"))?;
        serde_json::from_value(value).map_err(|e| Error::internal(format!("malformed error object: {}", e)).into())
    }

    fn merge_props(&self, to: &RtValue, from: &RtValue) -> RtValue {
        match (self.view(to), self.view(from)) {
            (Some(Value::Bool(true)), _) | (_, Some(Value::Bool(true))) => RtValue::bool(true),
            (to_v, None) => to_v.cloned().map_or(RtValue::Undefined, RtValue::Json),
            (None, Some(from_v)) => RtValue::Json(from_v.clone()),
            (Some(Value::Object(a)), Some(Value::Object(b))) => {
                let mut merged: Map<String, Value> = a.clone();
                for (k, v) in b {
                    merged.insert(k.clone(), v.clone());
                }
                RtValue::Json(Value::Object(merged))
            }
            (Some(a), Some(_)) => RtValue::Json(a.clone()),
        }
    }

    fn merge_items(&self, to: &RtValue, from: &RtValue) -> RtValue {
        match (self.view(to), self.view(from)) {
            (Some(Value::Bool(true)), _) | (_, Some(Value::Bool(true))) => RtValue::bool(true),
            (to_v, None) => to_v.cloned().map_or(RtValue::Undefined, RtValue::Json),
            (None, Some(from_v)) => RtValue::Json(from_v.clone()),
            (Some(a), Some(b)) => {
                let x = a.as_f64().unwrap_or(0.0);
                let y = b.as_f64().unwrap_or(0.0);
                RtValue::Json(if y > x { b.clone() } else { a.clone() })
            }
        }
    }
}

/// JSON type test used by `type` and the type guards of keyword groups
pub fn json_type_is(v: &Value, ty: &str) -> bool {
    match ty {
        "null" => v.is_null(),
        "boolean" => v.is_boolean(),
        "object" => v.is_object(),
        "array" => v.is_array(),
        "string" => v.is_string(),
        "number" => v.is_number(),
        "integer" => match v {
            Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
            _ => false,
        },
        _ => false,
    }
}

/// `+s` for coercion: whitespace-trimmed decimal, finite values only
pub fn parse_js_number(s: &str) -> Option<Value> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    let valid = t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !valid {
        return None;
    }
    t.parse::<f64>().ok().and_then(super::number_value)
}
