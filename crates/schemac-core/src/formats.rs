//! String and number formats
//!
//! A format is either a regular expression, a predicate, or a documentation
//! only marker. Formats that support ordering also carry a `compare`
//! function used by `formatMinimum`/`formatMaximum`.
//!
//! Copyright (c) 2025 Schemac Team
//! Licensed under the Apache-2.0 license

use chrono::{DateTime, NaiveDate, NaiveTime};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, OnceLock};

pub type StringCheckFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type NumberCheckFn = Arc<dyn Fn(f64) -> bool + Send + Sync>;
pub type CompareFn = Arc<dyn Fn(&str, &str) -> Option<Ordering> + Send + Sync>;

/// How a format value is checked
#[derive(Clone)]
pub enum FormatCheck {
    /// Accept everything; the format only documents intent
    Ignore,
    Regex(Regex),
    String(StringCheckFn),
    Number(NumberCheckFn),
}

/// A named format
#[derive(Clone)]
pub struct Format {
    pub check: FormatCheck,
    pub compare: Option<CompareFn>,
}

impl fmt::Debug for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = match &self.check {
            FormatCheck::Ignore => "ignore".to_string(),
            FormatCheck::Regex(re) => format!("regex({})", re.as_str()),
            FormatCheck::String(_) => "string fn".to_string(),
            FormatCheck::Number(_) => "number fn".to_string(),
        };
        f.debug_struct("Format")
            .field("check", &check)
            .field("compare", &self.compare.is_some())
            .finish()
    }
}

impl Format {
    pub fn ignore() -> Self {
        Self { check: FormatCheck::Ignore, compare: None }
    }

    pub fn regex(re: Regex) -> Self {
        Self { check: FormatCheck::Regex(re), compare: None }
    }

    pub fn string(check: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self { check: FormatCheck::String(Arc::new(check)), compare: None }
    }

    pub fn number(check: impl Fn(f64) -> bool + Send + Sync + 'static) -> Self {
        Self { check: FormatCheck::Number(Arc::new(check)), compare: None }
    }

    pub fn with_compare(mut self, compare: impl Fn(&str, &str) -> Option<Ordering> + Send + Sync + 'static) -> Self {
        self.compare = Some(Arc::new(compare));
        self
    }

    /// Whether the format never rejects anything
    pub fn is_ignored(&self) -> bool {
        matches!(self.check, FormatCheck::Ignore)
    }

    /// JSON type the format applies to
    pub fn data_type(&self) -> &'static str {
        match self.check {
            FormatCheck::Number(_) => "number",
            _ => "string",
        }
    }

    /// Check a value; values of other types pass
    pub fn validate(&self, value: &Value) -> bool {
        match (&self.check, value) {
            (FormatCheck::Ignore, _) => true,
            (FormatCheck::Regex(re), Value::String(s)) => re.is_match(s),
            (FormatCheck::String(f), Value::String(s)) => f(s),
            (FormatCheck::Number(f), Value::Number(n)) => n.as_f64().is_some_and(|n| f(n)),
            _ => true,
        }
    }

    /// Order two values when the format supports it and both are valid
    pub fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        let compare = self.compare.as_ref()?;
        match (a, b) {
            (Value::String(a), Value::String(b)) => compare(a, b),
            _ => None,
        }
    }
}

/// Formats known to a compiler
#[derive(Debug, Clone, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Arc<Format>>,
}

impl FormatRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add("date", Format::string(is_date).with_compare(compare_date));
        registry.add("time", Format::string(is_time).with_compare(compare_time));
        registry.add("date-time", Format::string(is_date_time).with_compare(compare_date_time));
        registry.add("duration", Format::string(is_duration));
        registry.add("email", Format::string(is_email));
        registry.add("hostname", Format::string(is_hostname));
        registry.add("ipv4", Format::string(|s| s.parse::<Ipv4Addr>().is_ok()));
        registry.add("ipv6", Format::string(|s| s.parse::<Ipv6Addr>().is_ok()));
        registry.add("uri", Format::string(is_uri));
        registry.add("uri-reference", Format::string(is_uri_reference));
        registry.add("uuid", Format::string(is_uuid));
        registry.add("regex", Format::string(|s| Regex::new(s).is_ok()));
        registry.add("json-pointer", Format::string(is_json_pointer));
        registry.add("relative-json-pointer", Format::string(is_relative_json_pointer));
        registry.add("byte", Format::string(is_byte));
        registry.add("int32", Format::number(|n| n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64));
        registry.add("int64", Format::number(|n| n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0));
        registry.add("float", Format::number(|n| n.is_finite()));
        registry.add("double", Format::number(|n| n.is_finite()));
        registry.add("password", Format::ignore());
        registry.add("binary", Format::ignore());
        registry
    }

    pub fn add(&mut self, name: impl Into<String>, format: Format) {
        self.formats.insert(name.into(), Arc::new(format));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Format>> {
        self.formats.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.formats.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }
}

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, s: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

fn captures<'s>(cell: &'static OnceLock<Option<Regex>>, pattern: &str, s: &'s str) -> Option<regex::Captures<'s>> {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .and_then(|re| re.captures(s))
}

static DATE: OnceLock<Option<Regex>> = OnceLock::new();
static TIME: OnceLock<Option<Regex>> = OnceLock::new();
static DURATION: OnceLock<Option<Regex>> = OnceLock::new();
static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static HOSTNAME: OnceLock<Option<Regex>> = OnceLock::new();
static UUID: OnceLock<Option<Regex>> = OnceLock::new();
static JSON_POINTER: OnceLock<Option<Regex>> = OnceLock::new();
static RELATIVE_JSON_POINTER: OnceLock<Option<Regex>> = OnceLock::new();
static BYTE: OnceLock<Option<Regex>> = OnceLock::new();

fn is_date(s: &str) -> bool {
    let Some(c) = captures(&DATE, r"^(\d\d\d\d)-(\d\d)-(\d\d)$", s) else {
        return false;
    };
    let (Ok(y), Ok(m), Ok(d)) = (c[1].parse::<i32>(), c[2].parse::<u32>(), c[3].parse::<u32>()) else {
        return false;
    };
    NaiveDate::from_ymd_opt(y, m, d).is_some()
}

fn compare_date(a: &str, b: &str) -> Option<Ordering> {
    if !(is_date(a) && is_date(b)) {
        return None;
    }
    Some(a.cmp(b))
}

/// Seconds since midnight in UTC for a time string with optional zone
fn time_seconds(s: &str) -> Option<f64> {
    let c = captures(
        &TIME,
        r"(?i)^(\d\d):(\d\d):(\d\d(?:\.\d+)?)(z|([+-])(\d\d)(?::?(\d\d))?)?$",
        s,
    )?;
    let hr: u32 = c[1].parse().ok()?;
    let min: u32 = c[2].parse().ok()?;
    let sec: f64 = c[3].parse().ok()?;
    if hr > 23 || min > 59 || sec >= 61.0 {
        return None;
    }
    let (sign, tz_h, tz_m) = match (c.get(5), c.get(6)) {
        (Some(sign), Some(h)) => {
            let tz_h: i64 = h.as_str().parse().ok()?;
            let tz_m: i64 = c.get(7).map_or(Some(0), |m| m.as_str().parse().ok())?;
            (if sign.as_str() == "-" { -1 } else { 1 }, tz_h, tz_m)
        }
        _ => (1, 0, 0),
    };
    if tz_h > 23 || tz_m > 59 {
        return None;
    }
    if sec >= 60.0 {
        // Leap second: only valid at 23:59 UTC
        let utc_min = (hr as i64 * 60 + min as i64 - sign * (tz_h * 60 + tz_m)).rem_euclid(1440);
        if utc_min != 23 * 60 + 59 {
            return None;
        }
    } else if NaiveTime::from_hms_opt(hr, min, sec as u32).is_none() {
        return None;
    }
    let local = (hr * 3600 + min * 60) as f64 + sec;
    Some(local - (sign * (tz_h * 3600 + tz_m * 60)) as f64)
}

fn is_time(s: &str) -> bool {
    time_seconds(s).is_some()
}

fn compare_time(a: &str, b: &str) -> Option<Ordering> {
    time_seconds(a)?.partial_cmp(&time_seconds(b)?)
}

fn split_date_time(s: &str) -> Option<(&str, &str)> {
    let i = s.find(['T', 't', ' '])?;
    Some((&s[..i], &s[i + 1..]))
}

fn is_date_time(s: &str) -> bool {
    match split_date_time(s) {
        Some((date, time)) => is_date(date) && is_time(time),
        None => false,
    }
}

fn compare_date_time(a: &str, b: &str) -> Option<Ordering> {
    if !(is_date_time(a) && is_date_time(b)) {
        return None;
    }
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(x), Ok(y)) => Some(x.cmp(&y)),
        _ => Some(a.cmp(b)),
    }
}

fn is_duration(s: &str) -> bool {
    matches(
        &DURATION,
        r"^P(?:\d+W|(?:\d+Y(?:\d+M)?(?:\d+D)?|\d+M(?:\d+D)?|\d+D)(?:T(?:\d+H(?:\d+M)?(?:\d+S)?|\d+M(?:\d+S)?|\d+S))?|T(?:\d+H(?:\d+M)?(?:\d+S)?|\d+M(?:\d+S)?|\d+S))$",
        s,
    )
}

fn is_email(s: &str) -> bool {
    matches(
        &EMAIL,
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$",
        s,
    )
}

fn is_hostname(s: &str) -> bool {
    s.len() <= 253
        && matches(
            &HOSTNAME,
            r"(?i)^(?:[a-z0-9](?:[-0-9a-z]{0,61}[0-9a-z])?)(?:\.[a-z0-9](?:[-0-9a-z]{0,61}[0-9a-z])?)*\.?$",
            s,
        )
}

fn is_uri(s: &str) -> bool {
    url::Url::parse(s).is_ok()
}

fn is_uri_reference(s: &str) -> bool {
    if s.chars().any(|c| c.is_whitespace() || c == '\\') {
        return false;
    }
    if url::Url::parse(s).is_ok() {
        return true;
    }
    url::Url::parse("http://reference.invalid/")
        .and_then(|base| base.join(s))
        .is_ok()
}

fn is_uuid(s: &str) -> bool {
    matches(
        &UUID,
        r"(?i)^(?:urn:uuid:)?[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
        s,
    )
}

fn is_json_pointer(s: &str) -> bool {
    matches(&JSON_POINTER, r"^(?:/(?:[^~/]|~0|~1)*)*$", s)
}

fn is_relative_json_pointer(s: &str) -> bool {
    matches(
        &RELATIVE_JSON_POINTER,
        r"^(?:0|[1-9][0-9]*)(?:#|(?:/(?:[^~/]|~0|~1)*)*)$",
        s,
    )
}

fn is_byte(s: &str) -> bool {
    s.len() % 4 == 0 && matches(&BYTE, r"^(?:[A-Za-z0-9+/]{4})*(?:[A-Za-z0-9+/]{2}==|[A-Za-z0-9+/]{3}=)?$", s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(name: &str, value: Value) -> bool {
        let registry = FormatRegistry::with_defaults();
        registry.get(name).unwrap().validate(&value)
    }

    #[test]
    fn test_date_checks_calendar() {
        assert!(check("date", json!("2024-02-29")));
        assert!(!check("date", json!("2023-02-29")));
        assert!(!check("date", json!("2023-2-1")));
    }

    #[test]
    fn test_time_and_date_time() {
        assert!(check("time", json!("12:34:56Z")));
        assert!(check("time", json!("12:34:56.789+05:30")));
        assert!(!check("time", json!("25:00:00Z")));
        assert!(check("date-time", json!("2024-01-01T00:00:00Z")));
        assert!(!check("date-time", json!("2024-01-01")));
    }

    #[test]
    fn test_non_strings_pass_string_formats() {
        assert!(check("email", json!(42)));
        assert!(!check("email", json!("not an email")));
        assert!(check("email", json!("a.b@example.com")));
    }

    #[test]
    fn test_network_formats() {
        assert!(check("ipv4", json!("192.168.0.1")));
        assert!(!check("ipv4", json!("256.0.0.1")));
        assert!(check("ipv6", json!("::1")));
        assert!(check("hostname", json!("example.com")));
        assert!(!check("hostname", json!("-bad.com")));
        assert!(check("uri", json!("https://example.com/a?b#c")));
        assert!(!check("uri", json!("relative/path")));
        assert!(check("uri-reference", json!("relative/path")));
    }

    #[test]
    fn test_pointer_formats() {
        assert!(check("json-pointer", json!("/a/b~1c")));
        assert!(!check("json-pointer", json!("a")));
        assert!(check("relative-json-pointer", json!("1/a")));
        assert!(check("relative-json-pointer", json!("0#")));
    }

    #[test]
    fn test_number_formats() {
        assert!(check("int32", json!(7)));
        assert!(!check("int32", json!(3_000_000_000u64)));
        assert!(check("int32", json!("not a number")));
    }

    #[test]
    fn test_compare() {
        let registry = FormatRegistry::with_defaults();
        let date = registry.get("date").unwrap();
        assert_eq!(date.compare(&json!("2020-01-01"), &json!("2021-01-01")), Some(Ordering::Less));
        let time = registry.get("time").unwrap();
        assert_eq!(time.compare(&json!("10:00:00+01:00"), &json!("09:00:00Z")), Some(Ordering::Equal));
        assert_eq!(date.compare(&json!("bad"), &json!("2021-01-01")), None);
    }

    #[test]
    fn test_ignored_format() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.get("password").unwrap().is_ignored());
    }
}
