use serde_json::Value;

/// How a single key appeared in a PATCH body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NullableValue {
    Omitted,
    Null,
    String(String),
}

pub fn classify_nullable(optional_value: Option<&Value>) -> Result<NullableValue, String> {
    match optional_value {
        None => Ok(NullableValue::Omitted),
        Some(Value::Null) => Ok(NullableValue::Null),
        Some(Value::String(s)) => Ok(NullableValue::String(s.to_owned())),
        Some(other) => Err(format!("expected string or null, got {other}")),
    }
}

/// Classifies `body[key]`, naming the key in the error.
pub fn classify_field(body: &Value, key: &str) -> Result<NullableValue, String> {
    classify_nullable(body.get(key)).map_err(|err| format!("{key}: {err}"))
}
