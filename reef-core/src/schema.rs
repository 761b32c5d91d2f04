//! Schema - Declarative attribute schemas for resources and data sources
//!
//! Providers describe every resource kind with a [`ResourceSchema`]: a map of
//! attribute name to [`AttributeSchema`]. The schema drives plan-time
//! validation, default and canonicalisation hooks, diff suppression and the
//! force-new / sensitive semantics the differ and the host rely on.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use crate::resource::{Attributes, Value};

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Floating point number (integers are accepted)
    Float,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection; compared as a multiset
    Set(Box<AttributeType>),
    /// Map with string keys
    Map(Box<AttributeType>),
    /// Nested block element with its own attribute schemas
    Object(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Float, Value::Float(_) | Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate(v).map_err(|e| TypeError::MapValueError {
                        key: k.clone(),
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Object(fields), Value::Map(map)) => {
                match validate_fields(fields.iter(), map).into_iter().next() {
                    Some(e) => Err(e),
                    None => Ok(()),
                }
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Float => "Float".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Object(_) => "Block".to_string(),
        }
    }

    /// Scalar types are the ones data lists can sort on
    pub fn is_scalar(&self) -> bool {
        match self {
            AttributeType::String
            | AttributeType::Int
            | AttributeType::Float
            | AttributeType::Bool
            | AttributeType::Enum(_) => true,
            AttributeType::Custom { base, .. } => base.is_scalar(),
            _ => false,
        }
    }

    /// Compare two values under this type's equality (sets ignore order)
    pub fn values_equal(&self, a: &Value, b: &Value) -> bool {
        match (self, a, b) {
            (AttributeType::Set(inner), Value::List(xs), Value::List(ys)) => {
                if xs.len() != ys.len() {
                    return false;
                }
                let mut used = vec![false; ys.len()];
                xs.iter().all(|x| {
                    ys.iter().enumerate().any(|(i, y)| {
                        if !used[i] && inner.values_equal(x, y) {
                            used[i] = true;
                            true
                        } else {
                            false
                        }
                    })
                })
            }
            (AttributeType::List(inner), Value::List(xs), Value::List(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| inner.values_equal(x, y))
            }
            (AttributeType::Object(fields), Value::Map(xm), Value::Map(ym)) => {
                fields.iter().all(|f| match (xm.get(&f.name), ym.get(&f.name)) {
                    (Some(x), Some(y)) => f.attr_type.values_equal(x, y),
                    (None, None) => true,
                    // An unset computed field takes whatever the remote reports
                    (Some(v), None) | (None, Some(v)) => v.is_zero() || f.mode.is_computed(),
                })
            }
            (AttributeType::Float, x, y) => x.as_float() == y.as_float(),
            _ => a == b,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ComputedOnly { name: String },

    #[error("Attribute '{name}' conflicts with '{other}'")]
    Conflict { name: String, other: String },

    #[error("Attribute '{name}' must have at most {max} items, got {got}")]
    TooManyItems { name: String, max: usize, got: usize },

    #[error("Attribute '{name}' must have at least {min} items, got {got}")]
    TooFewItems { name: String, min: usize, got: usize },

    #[error("{name}: {inner}")]
    Attribute { name: String, inner: Box<TypeError> },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Map value for key '{key}': {inner}")]
    MapValueError { key: String, inner: Box<TypeError> },
}

impl TypeError {
    /// Dotted attribute path this error refers to, if any
    pub fn path(&self) -> Option<String> {
        match self {
            TypeError::MissingRequired { name }
            | TypeError::UnknownAttribute { name }
            | TypeError::ComputedOnly { name }
            | TypeError::Conflict { name, .. }
            | TypeError::TooManyItems { name, .. }
            | TypeError::TooFewItems { name, .. } => Some(name.clone()),
            TypeError::Attribute { name, inner } => Some(match inner.path() {
                Some(rest) => format!("{name}.{rest}"),
                None => name.clone(),
            }),
            TypeError::ListItemError { index, inner } => Some(match inner.path() {
                Some(rest) => format!("{index}.{rest}"),
                None => index.to_string(),
            }),
            TypeError::MapValueError { key, inner } => Some(match inner.path() {
                Some(rest) => format!("{key}.{rest}"),
                None => key.clone(),
            }),
            _ => None,
        }
    }
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Whether an attribute is supplied by configuration, the server, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeMode {
    Required,
    Optional,
    Computed,
    OptionalComputed,
}

impl AttributeMode {
    pub fn is_computed(self) -> bool {
        matches!(self, AttributeMode::Computed | AttributeMode::OptionalComputed)
    }

    pub fn is_configurable(self) -> bool {
        !matches!(self, AttributeMode::Computed)
    }

    fn as_str(self) -> &'static str {
        match self {
            AttributeMode::Required => "required",
            AttributeMode::Optional => "optional",
            AttributeMode::Computed => "computed",
            AttributeMode::OptionalComputed => "optional_computed",
        }
    }
}

/// Pure value predicate applied at plan time
#[derive(Debug, Clone)]
pub enum Validator {
    OneOf(Vec<String>),
    IntBetween(i64, i64),
    IntAtLeast(i64),
    IntOneOf(Vec<i64>),
    Regex { pattern: String, message: String },
    NonZero,
    NotEmpty,
    Cidr,
    IpAddress,
    Ipv4Address,
    Ipv6Address,
    Rfc3339,
    Date,
    Json,
}

impl Validator {
    pub fn one_of(values: &[&str]) -> Self {
        Validator::OneOf(values.iter().map(|s| s.to_string()).collect())
    }

    pub fn regex(pattern: &str, message: &str) -> Self {
        Validator::Regex {
            pattern: pattern.to_string(),
            message: message.to_string(),
        }
    }

    /// Check a single (non-list) value
    pub fn check(&self, name: &str, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Validator::OneOf(allowed), Value::String(s)) => {
                if allowed.iter().any(|a| a == s) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {name} to be one of [{}], got {s}",
                        allowed.join(", ")
                    ))
                }
            }
            (Validator::IntBetween(min, max), Value::Int(n)) => {
                if (*min..=*max).contains(n) {
                    Ok(())
                } else {
                    Err(format!(
                        "expected {name} to be in the range ({min} - {max}), got {n}"
                    ))
                }
            }
            (Validator::IntAtLeast(min), Value::Int(n)) => {
                if n >= min {
                    Ok(())
                } else {
                    Err(format!("expected {name} to be at least ({min}), got {n}"))
                }
            }
            (Validator::IntOneOf(allowed), Value::Int(n)) => {
                if allowed.contains(n) {
                    Ok(())
                } else {
                    let allowed: Vec<String> = allowed.iter().map(|a| a.to_string()).collect();
                    Err(format!(
                        "expected {name} to be one of [{}], got {n}",
                        allowed.join(", ")
                    ))
                }
            }
            (Validator::Regex { pattern, message }, Value::String(s)) => {
                let re = regex::Regex::new(pattern)
                    .map_err(|e| format!("invalid pattern for {name}: {e}"))?;
                if re.is_match(s) {
                    Ok(())
                } else {
                    Err(format!("{name}: {message}"))
                }
            }
            (Validator::NonZero, v) => {
                if v.is_zero() {
                    Err(format!("{name} must not be zero"))
                } else {
                    Ok(())
                }
            }
            (Validator::NotEmpty, Value::String(s)) => {
                if s.trim().is_empty() {
                    Err(format!("{name} must not be empty"))
                } else {
                    Ok(())
                }
            }
            (Validator::Cidr, Value::String(s)) => validate_cidr(s),
            (Validator::IpAddress, Value::String(s)) => s
                .parse::<IpAddr>()
                .map(|_| ())
                .map_err(|_| format!("expected {name} to contain a valid IP, got: {s}")),
            (Validator::Ipv4Address, Value::String(s)) => match s.parse::<IpAddr>() {
                Ok(IpAddr::V4(_)) => Ok(()),
                _ => Err(format!("expected {name} to contain a valid IPv4 address, got: {s}")),
            },
            (Validator::Ipv6Address, Value::String(s)) => match s.parse::<IpAddr>() {
                Ok(IpAddr::V6(_)) => Ok(()),
                _ => Err(format!("expected {name} to contain a valid IPv6 address, got: {s}")),
            },
            (Validator::Rfc3339, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| ())
                .map_err(|_| format!("{name} must be a valid RFC3339 date, got: {s}")),
            (Validator::Date, Value::String(s)) => {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map(|_| ())
                    .map_err(|_| format!("{name} must be a date in the format YYYY-MM-DD, got: {s}"))
            }
            (Validator::Json, Value::String(s)) => serde_json::from_str::<serde_json::Value>(s)
                .map(|_| ())
                .map_err(|e| format!("{name} contains an invalid JSON: {e}")),
            // Type mismatches are reported by the type check
            _ => Ok(()),
        }
    }
}

/// `(key, old, new, state) -> true` when the two values are equivalent
pub type DiffSuppressFn = fn(&str, &Value, &Value, &Attributes) -> bool;

/// Canonicalise a raw value before it is stored or compared
pub type StateFn = fn(&Value) -> Value;

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub mode: AttributeMode,
    pub force_new: bool,
    pub sensitive: bool,
    pub default: Option<Value>,
    pub validators: Vec<Validator>,
    pub suppress_diff: Option<DiffSuppressFn>,
    pub state_func: Option<StateFn>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub conflicts_with: Vec<String>,
    pub description: Option<String>,
    pub deprecated: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            mode: AttributeMode::Optional,
            force_new: false,
            sensitive: false,
            default: None,
            validators: Vec::new(),
            suppress_diff: None,
            state_func: None,
            min_items: None,
            max_items: None,
            conflicts_with: Vec::new(),
            description: None,
            deprecated: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.mode = AttributeMode::Required;
        self
    }

    pub fn optional(mut self) -> Self {
        self.mode = AttributeMode::Optional;
        self
    }

    pub fn computed(mut self) -> Self {
        self.mode = AttributeMode::Computed;
        self
    }

    pub fn optional_computed(mut self) -> Self {
        self.mode = AttributeMode::OptionalComputed;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn suppress_diff(mut self, f: DiffSuppressFn) -> Self {
        self.suppress_diff = Some(f);
        self
    }

    pub fn state_func(mut self, f: StateFn) -> Self {
        self.state_func = Some(f);
        self
    }

    pub fn min_items(mut self, n: usize) -> Self {
        self.min_items = Some(n);
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn conflicts_with(mut self, other: &str) -> Self {
        self.conflicts_with.push(other.to_string());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn deprecated(mut self, message: impl Into<String>) -> Self {
        self.deprecated = Some(message.into());
        self
    }

    pub fn is_required(&self) -> bool {
        self.mode == AttributeMode::Required
    }

    /// Apply `state_func` (recursively through nested blocks)
    pub fn canonicalize(&self, value: &Value) -> Value {
        let value = match (&self.attr_type, value) {
            (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => {
                match inner.as_ref() {
                    AttributeType::Object(fields) => Value::List(
                        items
                            .iter()
                            .map(|item| match item {
                                Value::Map(map) => Value::Map(normalize_fields(fields.iter(), map)),
                                other => other.clone(),
                            })
                            .collect(),
                    ),
                    _ => value.clone(),
                }
            }
            _ => value.clone(),
        };
        match self.state_func {
            Some(f) => f(&value),
            None => value,
        }
    }

    fn check_value(&self, value: &Value) -> Vec<TypeError> {
        let mut errors = Vec::new();
        let wrap = |inner: TypeError| TypeError::Attribute {
            name: self.name.clone(),
            inner: Box::new(inner),
        };

        if let Err(e) = self.attr_type.validate(value) {
            errors.push(wrap(e));
            return errors;
        }

        if let Value::List(items) = value {
            if let Some(max) = self.max_items
                && items.len() > max
            {
                errors.push(TypeError::TooManyItems {
                    name: self.name.clone(),
                    max,
                    got: items.len(),
                });
            }
            if let Some(min) = self.min_items
                && items.len() < min
            {
                errors.push(TypeError::TooFewItems {
                    name: self.name.clone(),
                    min,
                    got: items.len(),
                });
            }
        }

        let scalars: Vec<&Value> = match value {
            Value::List(items) => items.iter().collect(),
            other => vec![other],
        };
        for validator in &self.validators {
            for v in &scalars {
                if let Err(message) = validator.check(&self.name, v) {
                    errors.push(wrap(TypeError::ValidationFailed { message }));
                }
            }
        }
        errors
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "type": self.attr_type.type_name(),
            "mode": self.mode.as_str(),
        });
        if self.force_new {
            obj["force_new"] = true.into();
        }
        if self.sensitive {
            obj["sensitive"] = true.into();
        }
        if let Some(default) = &self.default {
            obj["default"] = default.to_json();
        }
        if let Some(desc) = &self.description {
            obj["description"] = desc.clone().into();
        }
        if let Some(msg) = &self.deprecated {
            obj["deprecated"] = msg.clone().into();
        }
        if let AttributeType::List(inner) | AttributeType::Set(inner) = &self.attr_type
            && let AttributeType::Object(fields) = inner.as_ref()
        {
            obj["block"] = fields_to_json(fields.iter());
            if let Some(max) = self.max_items {
                obj["max_items"] = max.into();
            }
            if let Some(min) = self.min_items {
                obj["min_items"] = min.into();
            }
        }
        obj
    }
}

fn fields_to_json<'a>(fields: impl Iterator<Item = &'a AttributeSchema>) -> serde_json::Value {
    let mut sorted: Vec<&AttributeSchema> = fields.collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    serde_json::Value::Object(
        sorted
            .into_iter()
            .map(|f| (f.name.clone(), f.to_json()))
            .collect(),
    )
}

/// Validate a set of values against field schemas
fn validate_fields<'a>(
    fields: impl Iterator<Item = &'a AttributeSchema> + Clone,
    values: &HashMap<String, Value>,
) -> Vec<TypeError> {
    let mut errors = Vec::new();

    for schema in fields.clone() {
        match values.get(&schema.name) {
            None => {
                if schema.is_required() && schema.default.is_none() {
                    errors.push(TypeError::MissingRequired {
                        name: schema.name.clone(),
                    });
                }
            }
            Some(value) => {
                if !schema.mode.is_configurable() {
                    errors.push(TypeError::ComputedOnly {
                        name: schema.name.clone(),
                    });
                    continue;
                }
                errors.extend(schema.check_value(value));
                for other in &schema.conflicts_with {
                    if values.contains_key(other) {
                        errors.push(TypeError::Conflict {
                            name: schema.name.clone(),
                            other: other.clone(),
                        });
                    }
                }
            }
        }
    }

    let mut unknown: Vec<&String> = values
        .keys()
        .filter(|k| !fields.clone().any(|f| &f.name == *k))
        .collect();
    unknown.sort();
    for name in unknown {
        errors.push(TypeError::UnknownAttribute { name: name.clone() });
    }

    errors
}

/// Apply defaults and state functions to a set of values
fn normalize_fields<'a>(
    fields: impl Iterator<Item = &'a AttributeSchema>,
    values: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut out = values.clone();
    for schema in fields {
        match values.get(&schema.name) {
            Some(value) => {
                out.insert(schema.name.clone(), schema.canonicalize(value));
            }
            None => {
                if let Some(default) = &schema.default {
                    out.insert(schema.name.clone(), default.clone());
                }
            }
        }
    }
    out
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn attributes(mut self, schemas: impl IntoIterator<Item = AttributeSchema>) -> Self {
        for schema in schemas {
            self.attributes.insert(schema.name.clone(), schema);
        }
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let errors = validate_fields(self.attributes.values(), attributes);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill defaults and canonicalise values through `state_func`
    pub fn normalize(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        normalize_fields(self.attributes.values(), attributes)
    }

    /// Copy of the attributes with sensitive values masked, for logging
    pub fn redact(&self, attributes: &HashMap<String, Value>) -> HashMap<String, Value> {
        attributes
            .iter()
            .map(|(k, v)| {
                let sensitive = self.get(k).is_some_and(|s| s.sensitive);
                let v = if sensitive {
                    Value::String("(sensitive)".to_string())
                } else {
                    v.clone()
                };
                (k.clone(), v)
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "attributes": fields_to_json(self.attributes.values()),
        });
        if let Some(desc) = &self.description {
            obj["description"] = desc.clone().into();
        }
        obj
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Positive integer type
    pub fn positive_int() -> AttributeType {
        AttributeType::Custom {
            name: "PositiveInt".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if *n > 0 {
                        Ok(())
                    } else {
                        Err("Value must be positive".to_string())
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// CIDR block type (e.g., "10.0.0.0/16" or "2001:db8::/32")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| match value {
                Value::String(s) => validate_cidr(s),
                _ => Err("Expected string".to_string()),
            },
        }
    }

    pub fn list_of(inner: AttributeType) -> AttributeType {
        AttributeType::List(Box::new(inner))
    }

    pub fn set_of(inner: AttributeType) -> AttributeType {
        AttributeType::Set(Box::new(inner))
    }

    pub fn string_list() -> AttributeType {
        list_of(AttributeType::String)
    }

    pub fn string_set() -> AttributeType {
        set_of(AttributeType::String)
    }

    pub fn string_map() -> AttributeType {
        AttributeType::Map(Box::new(AttributeType::String))
    }

    /// Nested block represented as a list of objects
    pub fn block(fields: Vec<AttributeSchema>) -> AttributeType {
        list_of(AttributeType::Object(fields))
    }

    /// Nested block represented as a set of objects
    pub fn block_set(fields: Vec<AttributeSchema>) -> AttributeType {
        set_of(AttributeType::Object(fields))
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!("Invalid CIDR format '{}': expected IP/prefix", cidr));
    };

    let max = match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => 32,
        Ok(IpAddr::V6(_)) => 128,
        Err(_) => return Err(format!("Invalid IP address '{}' in CIDR '{}'", ip, cidr)),
    };

    match prefix.parse::<u8>() {
        Ok(p) if p <= max => Ok(()),
        Ok(p) => Err(format!("Invalid prefix length '{}': must be 0-{}", p, max)),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn validate_enum_type() {
        let t = AttributeType::Enum(vec!["a".to_string(), "b".to_string()]);
        assert!(t.validate(&Value::String("a".to_string())).is_ok());
        assert!(t.validate(&Value::String("c".to_string())).is_err());
    }

    #[test]
    fn validate_positive_int() {
        let t = types::positive_int();
        assert!(t.validate(&Value::Int(1)).is_ok());
        assert!(t.validate(&Value::Int(0)).is_err());
        assert!(t.validate(&Value::Int(-1)).is_err());
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("record")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("port", AttributeType::Int)
                    .validate(Validator::IntBetween(0, 65535)),
            )
            .attribute(AttributeSchema::new("fqdn", AttributeType::String).computed());

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("www"));
        attrs.insert("port".to_string(), Value::Int(443));
        assert!(schema.validate(&attrs).is_ok());

        attrs.insert("port".to_string(), Value::Int(70000));
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path().as_deref(), Some("port"));
        assert!(errors[0].to_string().contains("range (0 - 65535)"));
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("domain")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert!(matches!(errors[0], TypeError::MissingRequired { .. }));
    }

    #[test]
    fn computed_attribute_cannot_be_set() {
        let schema = ResourceSchema::new("domain")
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed());
        let attrs: Attributes = [("urn".to_string(), Value::from("do:domain:x"))]
            .into_iter()
            .collect();
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::ComputedOnly { .. }));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = ResourceSchema::new("domain");
        let attrs: Attributes = [("bogus".to_string(), Value::from("x"))]
            .into_iter()
            .collect();
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::UnknownAttribute { .. }));
    }

    #[test]
    fn nested_block_validation_reports_path() {
        let schema = ResourceSchema::new("partner_attachment").attribute(
            AttributeSchema::new(
                "bgp",
                types::block(vec![
                    AttributeSchema::new("peer_router_asn", AttributeType::Int).required(),
                ]),
            )
            .max_items(1),
        );
        let bgp = Value::List(vec![Value::Map(HashMap::new())]);
        let attrs: Attributes = [("bgp".to_string(), bgp)].into_iter().collect();
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors[0].path().as_deref(), Some("bgp.0.peer_router_asn"));
    }

    #[test]
    fn max_items_enforced() {
        let schema = ResourceSchema::new("vpc_peering").attribute(
            AttributeSchema::new("vpc_ids", types::string_set())
                .min_items(2)
                .max_items(2),
        );
        let attrs: Attributes = [(
            "vpc_ids".to_string(),
            Value::from(vec!["a".to_string(), "b".to_string(), "c".to_string()]),
        )]
        .into_iter()
        .collect();
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::TooManyItems { max: 2, got: 3, .. }));
    }

    #[test]
    fn validators() {
        let ok = |v: Validator, value: Value| v.check("f", &value).is_ok();
        assert!(ok(Validator::one_of(&["A", "MX"]), Value::from("MX")));
        assert!(!ok(Validator::one_of(&["A", "MX"]), Value::from("mx")));
        assert!(ok(Validator::IntAtLeast(1), Value::Int(1)));
        assert!(!ok(Validator::IntAtLeast(1), Value::Int(0)));
        assert!(ok(Validator::Ipv4Address, Value::from("192.0.2.1")));
        assert!(!ok(Validator::Ipv4Address, Value::from("2001:db8::1")));
        assert!(ok(Validator::Ipv6Address, Value::from("2001:db8::1")));
        assert!(ok(Validator::Rfc3339, Value::from("2026-01-01T00:00:00Z")));
        assert!(ok(Validator::Date, Value::from("2026-01-01")));
        assert!(!ok(Validator::Date, Value::from("01/01/2026")));
        assert!(!ok(Validator::Json, Value::from("{")));
        assert!(!ok(Validator::NonZero, Value::Int(0)));
        let err = Validator::NotEmpty.check("policy", &Value::from("  ")).unwrap_err();
        assert_eq!(err, "policy must not be empty");
    }

    #[test]
    fn normalize_applies_defaults_and_state_func() {
        let schema = ResourceSchema::new("spaces_bucket")
            .attribute(
                AttributeSchema::new("region", AttributeType::String).state_func(|v| match v {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other.clone(),
                }),
            )
            .attribute(AttributeSchema::new("acl", AttributeType::String).with_default("private"));
        let attrs: Attributes = [("region".to_string(), Value::from("NYC3"))]
            .into_iter()
            .collect();
        let normalized = schema.normalize(&attrs);
        assert_eq!(normalized["region"], Value::from("nyc3"));
        assert_eq!(normalized["acl"], Value::from("private"));
    }

    #[test]
    fn set_equality_ignores_order() {
        let t = types::string_set();
        let a = Value::from(vec!["x".to_string(), "y".to_string()]);
        let b = Value::from(vec!["y".to_string(), "x".to_string()]);
        assert!(t.values_equal(&a, &b));
        assert!(!types::string_list().values_equal(&a, &b));
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&Value::from("10.0.0.0/16")).is_ok());
        assert!(t.validate(&Value::from("192.168.1.0/24")).is_ok());
        assert!(t.validate(&Value::from("2001:db8::/32")).is_ok());

        assert!(t.validate(&Value::from("10.0.0.0")).is_err());
        assert!(t.validate(&Value::from("10.0.0.0/33")).is_err());
        assert!(t.validate(&Value::from("10.0.0.256/16")).is_err());
        assert!(t.validate(&Value::from("invalid")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }
}
