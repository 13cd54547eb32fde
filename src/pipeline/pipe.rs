use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::http::{FieldError, HttpError};

/// Where a handler argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    /// Path parameter(s)
    Param,
    /// Query parameter(s)
    Query,
    /// Request body or a body field
    Body,
    /// Request header
    Header,
    /// Snapshot of the whole request
    Request,
    /// Custom extractor
    Custom,
}

/// Describes the argument a pipe is transforming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentMetadata {
    /// Position in the handler's argument list
    pub index: usize,
    /// Argument source
    pub arg_type: ArgType,
    /// Parameter, query, header or field name, if the binding names one
    pub data: Option<String>,
}

/// Transforms or validates one handler argument.
///
/// Pipes attached globally, to the controller or to the handler apply to
/// every argument, in that order; pipes attached to a parameter run last.
#[async_trait]
pub trait PipeTransform: Send + Sync + 'static {
    /// Returns the transformed value, or rejects it.
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> Result<Value, HttpError>;
}

/// Parses a numeric string into an integer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseIntPipe {
    optional: bool,
}

impl ParseIntPipe {
    /// Lets `null` (an absent value) through unchanged.
    pub fn optional() -> Self {
        Self { optional: true }
    }
}

#[async_trait]
impl PipeTransform for ParseIntPipe {
    async fn transform(&self, value: Value, _: &ArgumentMetadata) -> Result<Value, HttpError> {
        match value {
            Value::Null if self.optional => Ok(Value::Null),
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| HttpError::bad_request("Validation failed (numeric string is expected)")),
            _ => Err(HttpError::bad_request("Validation failed (numeric string is expected)")),
        }
    }
}

/// Parses `"true"` / `"false"` into a boolean.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseBoolPipe {
    optional: bool,
}

impl ParseBoolPipe {
    /// Lets `null` (an absent value) through unchanged.
    pub fn optional() -> Self {
        Self { optional: true }
    }
}

#[async_trait]
impl PipeTransform for ParseBoolPipe {
    async fn transform(&self, value: Value, _: &ArgumentMetadata) -> Result<Value, HttpError> {
        match value {
            Value::Null if self.optional => Ok(Value::Null),
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(HttpError::bad_request("Validation failed (boolean string is expected)")),
        }
    }
}

/// Replaces an absent value with a default.
#[derive(Debug, Clone)]
pub struct DefaultValuePipe(pub Value);

#[async_trait]
impl PipeTransform for DefaultValuePipe {
    async fn transform(&self, value: Value, _: &ArgumentMetadata) -> Result<Value, HttpError> {
        if value.is_null() {
            Ok(self.0.clone())
        } else {
            Ok(value)
        }
    }
}

/// A check applied by [`ValidationPipe`] to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Present and not `null`
    Required,
    /// A string
    String,
    /// A number
    Number,
    /// An integer
    Integer,
    /// A boolean
    Boolean,
    /// Number not below the bound
    Min(f64),
    /// Number not above the bound
    Max(f64),
    /// String or array length not below the bound
    MinLength(usize),
    /// String or array length not above the bound
    MaxLength(usize),
    /// One of the listed values
    OneOf(Vec<Value>),
}

impl Rule {
    // None when the value passes
    fn check(&self, value: &Value) -> Option<String> {
        let ok = match self {
            Rule::Required => !value.is_null(),
            Rule::String => value.is_string(),
            Rule::Number => value.is_number(),
            Rule::Integer => value.is_i64() || value.is_u64(),
            Rule::Boolean => value.is_boolean(),
            Rule::Min(min) => value.as_f64().map_or(false, |v| v >= *min),
            Rule::Max(max) => value.as_f64().map_or(false, |v| v <= *max),
            Rule::MinLength(min) => length(value).map_or(false, |len| len >= *min),
            Rule::MaxLength(max) => length(value).map_or(false, |len| len <= *max),
            Rule::OneOf(allowed) => allowed.contains(value),
        };
        if ok {
            return None;
        }
        Some(match self {
            Rule::Required => "should not be empty".to_string(),
            Rule::String => "must be a string".to_string(),
            Rule::Number => "must be a number".to_string(),
            Rule::Integer => "must be an integer number".to_string(),
            Rule::Boolean => "must be a boolean value".to_string(),
            Rule::Min(min) => format!("must not be less than {}", min),
            Rule::Max(max) => format!("must not be greater than {}", max),
            Rule::MinLength(min) => format!("must be longer than or equal to {} characters", min),
            Rule::MaxLength(max) => format!("must be shorter than or equal to {} characters", max),
            Rule::OneOf(allowed) => format!(
                "must be one of the following values: {}",
                allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
            ),
        })
    }
}

fn length(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn lookup<'a>(object: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(object, |current, segment| current.get(segment))
}

/// Rule-based validation of the request body.
///
/// Only whole-body arguments are validated; path, query, header and body
/// field arguments pass through unchanged, so the pipe can be registered
/// globally. Fields that are absent or `null` are only checked by
/// [`Rule::Required`]; every failure is reported, one [`FieldError`] per
/// failed rule.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::pipeline::{ArgType, ArgumentMetadata, PipeTransform, Rule, ValidationPipe};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pipe = ValidationPipe::new()
///     .field("name", [Rule::Required, Rule::String, Rule::MinLength(2)])
///     .field("age", [Rule::Integer, Rule::Min(0.0)]);
/// let meta = ArgumentMetadata { index: 0, arg_type: ArgType::Body, data: None };
///
/// let err = pipe.transform(json!({ "name": "A", "age": -1 }), &meta).await.unwrap_err();
/// assert_eq!(err.status(), 400);
/// assert_eq!(err.details().len(), 2);
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationPipe {
    fields: Vec<(String, Vec<Rule>)>,
    whitelist: bool,
    forbid_unknown: bool,
}

impl ValidationPipe {
    /// Pipe without rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds rules for a field; nested fields use dotted paths.
    pub fn field(mut self, path: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.fields.push((path.into(), rules.into_iter().collect()));
        self
    }

    /// Strips top-level properties without rules.
    pub fn whitelist(mut self) -> Self {
        self.whitelist = true;
        self
    }

    /// Rejects top-level properties without rules.
    pub fn forbid_unknown(mut self) -> Self {
        self.forbid_unknown = true;
        self
    }

    fn known(&self, key: &str) -> bool {
        self.fields
            .iter()
            .any(|(path, _)| path.split('.').next() == Some(key))
    }
}

#[async_trait]
impl PipeTransform for ValidationPipe {
    async fn transform(&self, value: Value, metadata: &ArgumentMetadata) -> Result<Value, HttpError> {
        if metadata.arg_type != ArgType::Body || metadata.data.is_some() {
            return Ok(value);
        }
        let Value::Object(object) = value else {
            return Err(HttpError::validation(
                "Validation failed",
                vec![FieldError::new("", "must be an object")],
            ));
        };

        let mut details = Vec::new();
        if self.forbid_unknown {
            for key in object.keys().filter(|key| !self.known(key)) {
                details.push(FieldError::new(key.clone(), "property should not exist"));
            }
        }
        let object = if self.whitelist {
            object
                .into_iter()
                .filter(|(key, _)| self.known(key))
                .collect::<Map<String, Value>>()
        } else {
            object
        };

        let value = Value::Object(object);
        for (path, rules) in &self.fields {
            let field = lookup(&value, path).unwrap_or(&Value::Null);
            for rule in rules {
                if field.is_null() && *rule != Rule::Required {
                    continue;
                }
                if let Some(message) = rule.check(field) {
                    details.push(FieldError::new(path.clone(), message));
                }
            }
        }

        if details.is_empty() {
            Ok(value)
        } else {
            Err(HttpError::validation("Validation failed", details))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> ArgumentMetadata {
        ArgumentMetadata {
            index: 0,
            arg_type: ArgType::Param,
            data: Some("id".into()),
        }
    }

    fn body() -> ArgumentMetadata {
        ArgumentMetadata {
            index: 0,
            arg_type: ArgType::Body,
            data: None,
        }
    }

    #[tokio::test]
    async fn parse_int_accepts_numeric_strings_only() {
        let pipe = ParseIntPipe::default();
        assert_eq!(pipe.transform(json!("42"), &meta()).await.unwrap(), json!(42));
        assert_eq!(pipe.transform(json!(7), &meta()).await.unwrap(), json!(7));

        let err = pipe.transform(json!("4x2"), &meta()).await.unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(pipe.transform(Value::Null, &meta()).await.is_err());
        assert!(ParseIntPipe::optional()
            .transform(Value::Null, &meta())
            .await
            .unwrap()
            .is_null());
    }

    #[tokio::test]
    async fn parse_bool_and_default_value() {
        let flag = ParseBoolPipe::default();
        assert_eq!(flag.transform(json!("true"), &meta()).await.unwrap(), json!(true));
        assert!(flag.transform(json!("yes"), &meta()).await.is_err());

        let default = DefaultValuePipe(json!(10));
        assert_eq!(default.transform(Value::Null, &meta()).await.unwrap(), json!(10));
        assert_eq!(default.transform(json!(3), &meta()).await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn validation_reports_every_failed_rule() {
        let pipe = ValidationPipe::new()
            .field("name", [Rule::Required, Rule::String])
            .field("address.city", [Rule::Required])
            .field("role", [Rule::OneOf(vec![json!("admin"), json!("user")])]);

        let err = pipe
            .transform(json!({ "name": 5, "address": {}, "role": "root" }), &body())
            .await
            .unwrap_err();
        let fields: Vec<&str> = err.details().iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, ["name", "address.city", "role"]);
    }

    #[tokio::test]
    async fn whitelist_strips_and_forbid_rejects_unknown_fields() {
        let value = json!({ "name": "Tom", "admin": true });

        let stripped = ValidationPipe::new()
            .field("name", [Rule::String])
            .whitelist()
            .transform(value.clone(), &body())
            .await
            .unwrap();
        assert_eq!(stripped, json!({ "name": "Tom" }));

        let err = ValidationPipe::new()
            .field("name", [Rule::String])
            .forbid_unknown()
            .transform(value, &body())
            .await
            .unwrap_err();
        assert_eq!(err.details()[0].field, "admin");
    }

    #[tokio::test]
    async fn validation_only_inspects_the_whole_body() {
        let pipe = ValidationPipe::new().field("name", [Rule::Required, Rule::String]);
        assert_eq!(pipe.transform(json!("42"), &meta()).await.unwrap(), json!("42"));

        let field = ArgumentMetadata {
            index: 0,
            arg_type: ArgType::Body,
            data: Some("name".into()),
        };
        assert_eq!(pipe.transform(json!(7), &field).await.unwrap(), json!(7));

        let err = pipe.transform(json!("Tom"), &body()).await.unwrap_err();
        assert_eq!(err.details()[0].message, "must be an object");
    }
}
