// Workflow Conditions - field/operator/value tests against event data
//
// All conditions of a rule are AND-ed. Evaluation never fails: unresolvable
// paths and incomparable values simply make the condition false.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A single condition to evaluate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Field to evaluate, dot notation for nested fields (e.g. "profiles.role")
    pub field: String,
    pub operator: ConditionOperator,
    /// `None` when the stored condition has no value at all (undefined).
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

// Keeps an explicit `null` apart from a missing value.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    /// Operator written by a newer rule editor; never matches.
    #[serde(other)]
    Unknown,
}

impl Condition {
    pub fn new(field: &str, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.to_string(),
            operator,
            value: Some(value),
        }
    }

    pub fn equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::Equals, value)
    }

    pub fn not_equals(field: &str, value: Value) -> Self {
        Self::new(field, ConditionOperator::NotEquals, value)
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, ConditionOperator::Contains, Value::String(value.to_string()))
    }

    pub fn greater_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::GreaterThan, serde_json::json!(value))
    }

    pub fn less_than(field: &str, value: f64) -> Self {
        Self::new(field, ConditionOperator::LessThan, serde_json::json!(value))
    }

    pub fn evaluate(&self, record: &Value) -> bool {
        let actual = resolve_path(record, &self.field);
        let expected = self.value.as_ref();

        match self.operator {
            ConditionOperator::Equals => actual == expected,
            ConditionOperator::NotEquals => actual != expected,
            ConditionOperator::Contains => to_js_string(actual).contains(&to_js_string(expected)),
            // NaN on either side compares false
            ConditionOperator::GreaterThan => to_js_number(actual) > to_js_number(expected),
            ConditionOperator::LessThan => to_js_number(actual) < to_js_number(expected),
            ConditionOperator::Unknown => false,
        }
    }
}

/// True when every condition holds. An empty list always matches.
pub fn matches(conditions: &[Condition], record: &Value) -> bool {
    conditions.iter().all(|c| c.evaluate(record))
}

/// Walk a dot-separated path. `None` stands for an undefined value.
pub fn resolve_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;

    for part in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// String coercion with script-engine semantics (`undefined`, `null`, `a,b`).
pub fn to_js_string(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                format_number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => to_js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
    }
}

/// Numeric coercion with script-engine semantics; unconvertible values become NaN.
pub fn to_js_number(value: Option<&Value>) -> f64 {
    match value {
        None => f64::NAN,
        Some(Value::Null) => 0.0,
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_numeric_string(s),
        Some(Value::Array(items)) => match items.as_slice() {
            [] => 0.0,
            [single] => parse_numeric_string(&to_js_string(Some(single))),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    }
}

fn parse_numeric_string(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust accepts "inf"/"nan" spellings that scripts do not
    if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }

    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// Common condition presets for task workflows
pub mod presets {
    use super::*;

    pub fn high_priority() -> Condition {
        Condition::equals("priority", serde_json::json!("high"))
    }

    pub fn status(status: &str) -> Condition {
        Condition::equals("status", serde_json::json!(status))
    }

    pub fn not_done() -> Condition {
        Condition::not_equals("status", serde_json::json!("done"))
    }

    pub fn tagged(tag: &str) -> Condition {
        Condition::contains("tags", tag)
    }

    pub fn progress_below(percent: f64) -> Condition {
        Condition::less_than("progress", percent)
    }

    pub fn new_status(status: &str) -> Condition {
        Condition::equals("new_status", serde_json::json!(status))
    }
}
