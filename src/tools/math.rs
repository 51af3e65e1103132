//! Arithmetic tools

use super::{arg_array, arg_i64, arg_str, Tool};
use crate::error::AgentError;
use crate::models::{ContentItem, ParamSpec, ParamType, ToolContent};
use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Number, Value};
use std::sync::Arc;

type Operation = fn(&Map<String, Value>) -> Result<ToolContent>;

/// Stateless tool backed by a plain function
pub struct MathTool {
    name: &'static str,
    description: &'static str,
    params: &'static [(&'static str, ParamType)],
    op: Operation,
}

#[async_trait]
impl Tool for MathTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.params
            .iter()
            .map(|(name, kind)| ParamSpec::new(*name, *kind))
            .collect()
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<ToolContent> {
        (self.op)(arguments)
    }
}

const TWO_INTS: &[(&str, ParamType)] = &[("a", ParamType::Integer), ("b", ParamType::Integer)];
const ONE_INT: &[(&str, ParamType)] = &[("a", ParamType::Integer)];

pub fn math_tools() -> Vec<Arc<dyn Tool>> {
    let table: [MathTool; 10] = [
        MathTool {
            name: "add",
            description: "Add two integers",
            params: TWO_INTS,
            op: add,
        },
        MathTool {
            name: "subtract",
            description: "Subtract b from a",
            params: TWO_INTS,
            op: subtract,
        },
        MathTool {
            name: "multiply",
            description: "Multiply two integers",
            params: TWO_INTS,
            op: multiply,
        },
        MathTool {
            name: "divide",
            description: "Divide a by b",
            params: TWO_INTS,
            op: divide,
        },
        MathTool {
            name: "power",
            description: "Raise a to the power b",
            params: TWO_INTS,
            op: power,
        },
        MathTool {
            name: "sqrt",
            description: "Square root of a",
            params: ONE_INT,
            op: sqrt,
        },
        MathTool {
            name: "factorial",
            description: "Factorial of a",
            params: ONE_INT,
            op: factorial,
        },
        MathTool {
            name: "add_list",
            description: "Sum all numbers in a list",
            params: &[("l", ParamType::Array)],
            op: add_list,
        },
        MathTool {
            name: "strings_to_chars_to_int",
            description: "ASCII codes of the characters in a string",
            params: &[("string", ParamType::String)],
            op: strings_to_chars_to_int,
        },
        MathTool {
            name: "int_list_to_exponential_sum",
            description: "Sum of e raised to each integer in a list",
            params: &[("int_list", ParamType::Array)],
            op: int_list_to_exponential_sum,
        },
    ];

    table
        .into_iter()
        .map(|tool| Arc::new(tool) as Arc<dyn Tool>)
        .collect()
}

fn overflow(op: &str) -> AgentError {
    AgentError::ToolInvocation(format!("{} overflowed", op))
}

fn float(value: f64) -> Result<ToolContent> {
    Number::from_f64(value)
        .map(|n| ToolContent::Scalar(Value::Number(n)))
        .ok_or_else(|| AgentError::ToolInvocation(format!("non-finite result {}", value)))
}

fn add(args: &Map<String, Value>) -> Result<ToolContent> {
    let (a, b) = (arg_i64(args, "a")?, arg_i64(args, "b")?);
    a.checked_add(b)
        .map(|v| ToolContent::Scalar(json!(v)))
        .ok_or_else(|| overflow("add"))
}

fn subtract(args: &Map<String, Value>) -> Result<ToolContent> {
    let (a, b) = (arg_i64(args, "a")?, arg_i64(args, "b")?);
    a.checked_sub(b)
        .map(|v| ToolContent::Scalar(json!(v)))
        .ok_or_else(|| overflow("subtract"))
}

fn multiply(args: &Map<String, Value>) -> Result<ToolContent> {
    let (a, b) = (arg_i64(args, "a")?, arg_i64(args, "b")?);
    a.checked_mul(b)
        .map(|v| ToolContent::Scalar(json!(v)))
        .ok_or_else(|| overflow("multiply"))
}

fn divide(args: &Map<String, Value>) -> Result<ToolContent> {
    let (a, b) = (arg_i64(args, "a")?, arg_i64(args, "b")?);
    if b == 0 {
        return Err(AgentError::ToolInvocation("Division by zero".to_string()));
    }
    float(a as f64 / b as f64)
}

fn power(args: &Map<String, Value>) -> Result<ToolContent> {
    let (a, b) = (arg_i64(args, "a")?, arg_i64(args, "b")?);
    match u32::try_from(b) {
        Ok(exp) => a
            .checked_pow(exp)
            .map(|v| ToolContent::Scalar(json!(v)))
            .ok_or_else(|| overflow("power")),
        Err(_) => float((a as f64).powf(b as f64)),
    }
}

fn sqrt(args: &Map<String, Value>) -> Result<ToolContent> {
    let a = arg_i64(args, "a")?;
    if a < 0 {
        return Err(AgentError::ToolInvocation(
            "Cannot take square root of a negative number".to_string(),
        ));
    }
    float((a as f64).sqrt())
}

fn factorial(args: &Map<String, Value>) -> Result<ToolContent> {
    let a = arg_i64(args, "a")?;
    if a < 0 {
        return Err(AgentError::ToolInvocation(
            "Factorial is undefined for negative numbers".to_string(),
        ));
    }
    (1..=a)
        .try_fold(1i64, |acc, n| acc.checked_mul(n))
        .map(|v| ToolContent::Scalar(json!(v)))
        .ok_or_else(|| overflow("factorial"))
}

fn add_list(args: &Map<String, Value>) -> Result<ToolContent> {
    let items = arg_array(args, "l")?;

    if let Some(ints) = items.iter().map(Value::as_i64).collect::<Option<Vec<i64>>>() {
        return ints
            .into_iter()
            .try_fold(0i64, |acc, n| acc.checked_add(n))
            .map(|v| ToolContent::Scalar(json!(v)))
            .ok_or_else(|| overflow("add_list"));
    }

    let floats = items
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                AgentError::InvalidToolInput(format!("add_list expects numbers, got {}", v))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    float(floats.iter().sum())
}

fn strings_to_chars_to_int(args: &Map<String, Value>) -> Result<ToolContent> {
    let text = arg_str(args, "string")?;
    let items = text
        .chars()
        .map(|c| ContentItem {
            text: Some((c as u32).to_string()),
            raw: json!(c as u32),
        })
        .collect();
    Ok(ToolContent::Items(items))
}

fn int_list_to_exponential_sum(args: &Map<String, Value>) -> Result<ToolContent> {
    let items = arg_array(args, "int_list")?;
    let ints = items
        .iter()
        .map(|v| {
            v.as_i64().ok_or_else(|| {
                AgentError::InvalidToolInput(format!(
                    "int_list_to_exponential_sum expects integers, got {}",
                    v
                ))
            })
        })
        .collect::<Result<Vec<i64>>>()?;
    float(ints.iter().map(|&i| (i as f64).exp()).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn scalar(result: Result<ToolContent>) -> Value {
        match result.unwrap() {
            ToolContent::Scalar(v) => v,
            other => panic!("expected scalar, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_ops() {
        assert_eq!(scalar(add(&args(json!({"a": 5, "b": 3})))), json!(8));
        assert_eq!(scalar(subtract(&args(json!({"a": 5, "b": 3})))), json!(2));
        assert_eq!(scalar(multiply(&args(json!({"a": 5, "b": 3})))), json!(15));
        assert_eq!(scalar(power(&args(json!({"a": 2, "b": 10})))), json!(1024));
        assert_eq!(scalar(factorial(&args(json!({"a": 5})))), json!(120));
    }

    #[test]
    fn test_float_ops() {
        assert_eq!(scalar(divide(&args(json!({"a": 7, "b": 2})))), json!(3.5));
        assert_eq!(scalar(sqrt(&args(json!({"a": 16})))), json!(4.0));
        assert_eq!(scalar(power(&args(json!({"a": 2, "b": -1})))), json!(0.5));
    }

    #[test]
    fn test_domain_errors() {
        assert!(divide(&args(json!({"a": 1, "b": 0}))).is_err());
        assert!(sqrt(&args(json!({"a": -4}))).is_err());
        assert!(factorial(&args(json!({"a": -1}))).is_err());
        assert!(factorial(&args(json!({"a": 50}))).is_err());
    }

    #[test]
    fn test_add_list() {
        assert_eq!(scalar(add_list(&args(json!({"l": [1, 2, 3]})))), json!(6));
        assert_eq!(scalar(add_list(&args(json!({"l": [1, 2.5]})))), json!(3.5));
        assert!(add_list(&args(json!({"l": [1, "x"]}))).is_err());
        assert!(add_list(&args(json!({"l": "1,2,3"}))).is_err());
    }

    #[test]
    fn test_chars_to_int_items() {
        let content = strings_to_chars_to_int(&args(json!({"string": "AB"}))).unwrap();
        assert_eq!(
            content,
            ToolContent::Items(vec![
                ContentItem { text: Some("65".into()), raw: json!(65) },
                ContentItem { text: Some("66".into()), raw: json!(66) },
            ])
        );
    }

    #[test]
    fn test_exponential_sum() {
        let value = scalar(int_list_to_exponential_sum(&args(json!({"int_list": [0, 0]}))));
        assert_eq!(value, json!(2.0));
    }
}
