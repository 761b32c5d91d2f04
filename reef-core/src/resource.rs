//! Resource - Representing resource instances and their attribute bags

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Attribute bag of one resource instance. A missing key is null.
pub type Attributes = HashMap<String, Value>;

/// Unique identifier for a remote object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource kind (e.g., "record", "spaces_bucket")
    pub kind: String,
    /// Kind-specific opaque identifier assigned by the remote API
    pub id: String,
}

impl ResourceId {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Scalar rendering used for filtering and display
    pub fn to_plain_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Empty strings, empty collections and zero-like scalars
    pub fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::Float(n) => *n == 0.0,
            Value::Bool(b) => !*b,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    /// Convert from JSON. `null` has no representation and yields `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Array(items) => {
                Some(Value::List(items.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Some(Value::Map(
                map.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Int(n as i64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::String).collect())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// Convert an attribute bag to a JSON object
pub fn attributes_to_json(attributes: &Attributes) -> serde_json::Value {
    serde_json::Value::Object(
        attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Convert a JSON object to an attribute bag; non-objects yield an empty bag
pub fn attributes_from_json(json: &serde_json::Value) -> Attributes {
    match Value::from_json(json) {
        Some(Value::Map(map)) => map,
        _ => Attributes::new(),
    }
}

/// Lifecycle operation, used to select a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

/// Per-instance operation timeouts supplied by the host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeouts {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl Timeouts {
    pub fn get(&self, op: Operation) -> Option<Duration> {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Parse a `timeouts` block such as `{"create": "10m", "delete": "90s"}`
    pub fn from_attributes(attrs: &Attributes) -> Result<Self, String> {
        let mut timeouts = Timeouts::default();
        for (key, slot) in [
            ("create", &mut timeouts.create),
            ("read", &mut timeouts.read),
            ("update", &mut timeouts.update),
            ("delete", &mut timeouts.delete),
        ] {
            if let Some(value) = attrs.get(key) {
                let raw = value
                    .as_str()
                    .ok_or_else(|| format!("timeouts.{key} must be a duration string"))?;
                *slot = Some(parse_duration(raw)?);
            }
        }
        Ok(timeouts)
    }
}

/// Parse durations of the form `90s`, `5m`, `1h`, `1h30m`
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let mut total = 0u64;
    let mut digits = String::new();
    for c in raw.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{raw}'"))?;
        digits.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            _ => return Err(format!("invalid duration unit '{c}' in '{raw}'")),
        };
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration '{raw}' is too large"))?;
    }
    if !digits.is_empty() {
        return Err(format!("invalid duration '{raw}': missing unit"));
    }
    if total == 0 {
        return Err(format!("invalid duration '{raw}'"));
    }
    Ok(Duration::from_secs(total))
}

/// Desired state declared by the host configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub kind: String,
    pub attributes: Attributes,
    pub timeouts: Timeouts,
}

impl Resource {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: HashMap::new(),
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Last-known state of a resource instance, as stored by the host
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub kind: String,
    pub id: String,
    pub attributes: Attributes,
    pub timeouts: Timeouts,
}

impl State {
    pub fn new(kind: impl Into<String>, id: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes,
            timeouts: Timeouts::default(),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.kind.clone(), self.id.clone())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "id": self.id,
            "attributes": attributes_to_json(&self.attributes),
        })
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self, String> {
        let kind = json
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or("state is missing 'kind'")?;
        let id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or("state is missing 'id'")?;
        let attributes = json
            .get("attributes")
            .map(attributes_from_json)
            .unwrap_or_default();
        Ok(State::new(kind, id, attributes))
    }
}

/// Working state bag handed to lifecycle handlers.
///
/// `attributes` is the bag being produced (planned values on create/update,
/// remote values after a read); `prior` is the state the operation started
/// from, which is what `has_change` and `old` compare against.
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    kind: String,
    id: Option<String>,
    attributes: Attributes,
    prior: Attributes,
    timeouts: Timeouts,
}

impl ResourceData {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Bag for a create: planned attributes, no prior state
    pub fn from_config(resource: &Resource) -> Self {
        Self {
            kind: resource.kind.clone(),
            id: None,
            attributes: resource.attributes.clone(),
            prior: Attributes::new(),
            timeouts: resource.timeouts.clone(),
        }
    }

    /// Bag for read/delete: the stored state is both current and prior
    pub fn from_state(state: &State) -> Self {
        Self {
            kind: state.kind.clone(),
            id: Some(state.id.clone()),
            attributes: state.attributes.clone(),
            prior: state.attributes.clone(),
            timeouts: state.timeouts.clone(),
        }
    }

    /// Bag for an update: planned attributes against the stored state
    pub fn for_update(state: &State, planned: &Attributes, timeouts: Timeouts) -> Self {
        Self {
            kind: state.kind.clone(),
            id: Some(state.id.clone()),
            attributes: planned.clone(),
            prior: state.attributes.clone(),
            timeouts,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Identifier of the instance, or an empty string if none has been assigned
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Mark the object as gone; the host will plan re-creation
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(self.kind.clone(), self.id_str())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// String attribute, treating the empty string as unset
    pub fn get_non_empty_str(&self, key: &str) -> Option<&str> {
        self.get_str(key).filter(|s| !s.is_empty())
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_int)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_float)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    pub fn get_list(&self, key: &str) -> &[Value] {
        self.attributes
            .get(key)
            .and_then(Value::as_list)
            .unwrap_or(&[])
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// First element of a single-item block
    pub fn get_block(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.get_list(key).first().and_then(Value::as_map)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Set when present, remove otherwise
    pub fn set_opt<V: Into<Value>>(&mut self, key: impl Into<String>, value: Option<V>) {
        let key = key.into();
        match value {
            Some(v) => {
                self.attributes.insert(key, v.into());
            }
            None => {
                self.attributes.remove(&key);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Value of `key` in the state the operation started from
    pub fn old(&self, key: &str) -> Option<&Value> {
        self.prior.get(key)
    }

    pub fn has_change(&self, key: &str) -> bool {
        self.prior.get(key) != self.attributes.get(key)
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn timeout(&self, op: Operation, default: Duration) -> Duration {
        self.timeouts.get(op).unwrap_or(default)
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Snapshot the bag as host state; `None` when the id was cleared
    pub fn to_state(&self) -> Option<State> {
        self.id.as_ref().map(|id| State {
            kind: self.kind.clone(),
            id: id.clone(),
            attributes: self.attributes.clone(),
            timeouts: self.timeouts.clone(),
        })
    }
}
