//! Positional parameter coercion
//!
//! Model-supplied parameters arrive as strings. Each one is coerced to the
//! tool's declared type; a value that does not fit is kept as the raw string
//! and left for the tool to reject.

use crate::models::ParamType;
use serde_json::{Number, Value};

/// Outcome of coercing one parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Ok(Value),
    Raw(String),
}

impl Coerced {
    pub fn is_raw(&self) -> bool {
        matches!(self, Coerced::Raw(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            Coerced::Ok(value) => value,
            Coerced::Raw(raw) => Value::String(raw),
        }
    }
}

pub fn coerce(raw: &str, kind: ParamType) -> Coerced {
    let raw = raw.trim();

    match kind {
        ParamType::Integer => match raw.parse::<i64>() {
            Ok(i) => Coerced::Ok(Value::from(i)),
            Err(_) => Coerced::Raw(raw.to_string()),
        },
        ParamType::Number => match raw.parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => Coerced::Ok(Value::Number(n)),
            None => Coerced::Raw(raw.to_string()),
        },
        ParamType::Boolean => Coerced::Ok(Value::Bool(matches!(
            raw.to_lowercase().as_str(),
            "true" | "1" | "yes"
        ))),
        ParamType::Array => Coerced::Ok(Value::Array(parse_array(raw))),
        ParamType::String | ParamType::Other => Coerced::Ok(Value::String(raw.to_string())),
    }
}

/// Accepts `[1, 2, 3]`, `1,2,3` and keyed forms like `{'x': [1,2,3]}`
pub fn parse_array(raw: &str) -> Vec<Value> {
    let mut body = raw.trim();

    // Keyed form: keep only the bracketed list
    if body.contains('{') && body.contains(':') {
        if let (Some(start), Some(end)) = (body.find('['), body.rfind(']')) {
            if start < end {
                body = &body[start + 1..end];
            }
        }
    }

    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '{' | '}' | '\'' | '"'))
        .collect();

    cleaned
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| !token.contains('=') && !token.contains(':'))
        .map(scalar_token)
        .collect()
}

fn scalar_token(token: &str) -> Value {
    if let Ok(i) = token.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = token.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(token.to_string())
}
