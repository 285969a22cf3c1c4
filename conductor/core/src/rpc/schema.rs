//! Tool argument schemas
//!
//! A small subset of JSON Schema: an object with typed properties, a list of
//! required names, string/integer enumerations and integer bounds. Enough to
//! describe and check the RDP tools' arguments.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

/// Primitive type of a property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// JSON string
    String,
    /// JSON integer
    Integer,
    /// JSON boolean
    Boolean,
}

/// One property of a tool schema
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SchemaProperty {
    /// Property type
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Human-readable description
    pub description: String,
    /// Allowed values, compared as strings
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// Inclusive lower bound for integers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    /// Inclusive upper bound for integers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

impl SchemaProperty {
    fn of(kind: PropertyType, description: &str) -> Self {
        Self {
            kind,
            description: description.to_string(),
            allowed: None,
            minimum: None,
            maximum: None,
        }
    }

    /// String property
    pub fn string(description: &str) -> Self {
        Self::of(PropertyType::String, description)
    }

    /// Integer property
    pub fn integer(description: &str) -> Self {
        Self::of(PropertyType::Integer, description)
    }

    /// Boolean property
    pub fn boolean(description: &str) -> Self {
        Self::of(PropertyType::Boolean, description)
    }

    /// Restrict to the listed values
    #[must_use]
    pub fn one_of<S: ToString>(mut self, values: &[S]) -> Self {
        self.allowed = Some(values.iter().map(ToString::to_string).collect());
        self
    }

    /// Restrict an integer to `min..=max`
    #[must_use]
    pub fn between(mut self, min: i64, max: i64) -> Self {
        self.minimum = Some(min);
        self.maximum = Some(max);
        self
    }

    fn check(&self, name: &str, value: &Value) -> Option<Violation> {
        let rendered = match (self.kind, value) {
            (PropertyType::String, Value::String(s)) => s.clone(),
            (PropertyType::Boolean, Value::Bool(_)) => return None,
            (PropertyType::Integer, Value::Number(n)) => match n.as_i64() {
                Some(i) => {
                    if self.minimum.is_some_and(|min| i < min)
                        || self.maximum.is_some_and(|max| i > max)
                    {
                        return Some(Violation::out_of_range(name, self.minimum, self.maximum));
                    }
                    i.to_string()
                }
                None => return Some(Violation::wrong_type(name, self.kind)),
            },
            _ => return Some(Violation::wrong_type(name, self.kind)),
        };

        match &self.allowed {
            Some(allowed) if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&rendered)) => {
                Some(Violation::not_allowed(name, allowed))
            }
            _ => None,
        }
    }
}

/// A single argument problem
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Offending field
    pub field: String,
    /// What is wrong with it
    pub problem: String,
}

impl Violation {
    fn missing(field: &str) -> Self {
        Self {
            field: field.to_string(),
            problem: "is required".to_string(),
        }
    }

    fn wrong_type(field: &str, kind: PropertyType) -> Self {
        let expected = match kind {
            PropertyType::String => "a string",
            PropertyType::Integer => "an integer",
            PropertyType::Boolean => "a boolean",
        };
        Self {
            field: field.to_string(),
            problem: format!("must be {expected}"),
        }
    }

    fn out_of_range(field: &str, min: Option<i64>, max: Option<i64>) -> Self {
        let problem = match (min, max) {
            (Some(min), Some(max)) => format!("must be between {min} and {max}"),
            (Some(min), None) => format!("must be at least {min}"),
            (None, Some(max)) => format!("must be at most {max}"),
            (None, None) => "is out of range".to_string(),
        };
        Self {
            field: field.to_string(),
            problem,
        }
    }

    fn not_allowed(field: &str, allowed: &[String]) -> Self {
        Self {
            field: field.to_string(),
            problem: format!("must be one of: {}", allowed.join(", ")),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.problem)
    }
}

/// Argument schema of a tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: BTreeMap<String, SchemaProperty>,
    required: Vec<String>,
}

impl ToolSchema {
    /// Empty object schema
    #[must_use]
    pub fn object() -> Self {
        Self {
            kind: "object",
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// Add an optional property
    #[must_use]
    pub fn property(mut self, name: &str, property: SchemaProperty) -> Self {
        self.properties.insert(name.to_string(), property);
        self
    }

    /// Add a required property
    #[must_use]
    pub fn required(mut self, name: &str, property: SchemaProperty) -> Self {
        self.required.push(name.to_string());
        self.property(name, property)
    }

    /// Names of required properties
    #[must_use]
    pub fn required_fields(&self) -> &[String] {
        &self.required
    }

    /// Check `args` against the schema
    ///
    /// Null values count as absent and blank strings do not satisfy a
    /// required field. Unknown properties are ignored.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), Vec<Violation>> {
        let mut violations: Vec<Violation> = self
            .required
            .iter()
            .filter(|name| match args.get(name.as_str()) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .map(|name| Violation::missing(name))
            .collect();

        for (name, property) in &self.properties {
            match args.get(name) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    if violations.iter().any(|v| &v.field == name) {
                        continue;
                    }
                    if let Some(v) = property.check(name, value) {
                        violations.push(v);
                    }
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn schema() -> ToolSchema {
        ToolSchema::object()
            .required("host", SchemaProperty::string("Host"))
            .property("port", SchemaProperty::integer("Port").between(1, 65535))
            .property("colorDepth", SchemaProperty::integer("Depth").one_of(&[8, 16, 32]))
            .property("mode", SchemaProperty::string("Mode").one_of(&["session", "fullscreen"]))
            .property("fullScreen", SchemaProperty::boolean("Full"))
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_arguments() {
        let ok = schema().validate(&args(json!({
            "host": "a.example.com",
            "port": 3389,
            "colorDepth": 16,
            "mode": "Fullscreen",
            "fullScreen": true,
            "extra": "ignored"
        })));
        assert_eq!(ok, Ok(()));
    }

    #[test]
    fn test_missing_and_blank_required() {
        let err = schema().validate(&args(json!({}))).unwrap_err();
        assert_eq!(err[0].to_string(), "host is required");

        let err = schema().validate(&args(json!({"host": "  "}))).unwrap_err();
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_type_bounds_and_enum_violations() {
        let err = schema()
            .validate(&args(json!({
                "host": 5,
                "port": 70000,
                "colorDepth": 12,
                "fullScreen": "yes"
            })))
            .unwrap_err();

        let fields: Vec<&str> = err.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["colorDepth", "fullScreen", "host", "port"]);
        assert!(err.iter().any(|v| v.to_string() == "port must be between 1 and 65535"));
    }

    #[test]
    fn test_serializes_like_json_schema() {
        let value = serde_json::to_value(schema()).unwrap();
        assert_eq!(value["type"], "object");
        assert_eq!(value["required"], json!(["host"]));
        assert_eq!(value["properties"]["port"]["minimum"], 1);
        assert_eq!(value["properties"]["colorDepth"]["enum"], json!(["8", "16", "32"]));
        assert!(value["properties"]["host"].get("enum").is_none());
    }
}
