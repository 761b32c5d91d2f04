//! Differ - Compare desired configuration with stored state to produce a plan
//!
//! The diff is computed per attribute under the schema: values are
//! canonicalised through `state_func`, compared with the type's equality
//! (sets ignore order), then offered to the attribute's diff suppressor. A
//! surviving change on a `force_new` attribute turns the plan into a
//! replacement.

use std::collections::HashMap;

use crate::resource::{Attributes, Resource, State, Timeouts, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Planned action for one resource instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffAction {
    Create,
    Update,
    /// Destroy then create
    Replace,
    NoChange,
    Delete,
}

/// One attribute that differs between state and configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub name: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
    pub requires_replace: bool,
    /// New value is only known after apply
    pub computed: bool,
}

/// Result of a diff operation
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    pub kind: String,
    pub action: DiffAction,
    pub changes: Vec<AttributeChange>,
    /// Stored attributes, `None` on create
    pub prior: Option<Attributes>,
    /// Attributes the apply should produce
    pub planned: Attributes,
    pub timeouts: Timeouts,
}

impl ResourceDiff {
    /// Returns whether this diff involves a change
    pub fn is_change(&self) -> bool {
        self.action != DiffAction::NoChange
    }

    pub fn is_create(&self) -> bool {
        self.prior.is_none()
    }

    /// Planned value of an attribute
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.planned.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn old(&self, key: &str) -> Option<&Value> {
        self.prior.as_ref().and_then(|p| p.get(key))
    }

    pub fn has_change(&self, key: &str) -> bool {
        self.changes.iter().any(|c| c.name == key)
    }

    pub fn changed_attributes(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.name.as_str()).collect()
    }

    /// Mark a changed attribute as requiring replacement
    pub fn force_new(&mut self, key: &str) {
        if let Some(change) = self.changes.iter_mut().find(|c| c.name == key) {
            change.requires_replace = true;
        }
        self.recompute_action();
    }

    /// Declare that `key` will change to a value only known after apply
    pub fn set_new_computed(&mut self, key: &str) {
        self.planned.remove(key);
        match self.changes.iter_mut().find(|c| c.name == key) {
            Some(change) => {
                change.new = None;
                change.computed = true;
            }
            None => self.changes.push(AttributeChange {
                name: key.to_string(),
                old: self.old(key).cloned(),
                new: None,
                requires_replace: false,
                computed: true,
            }),
        }
        self.recompute_action();
    }

    pub fn requires_replace(&self) -> bool {
        self.changes.iter().any(|c| c.requires_replace)
    }

    fn recompute_action(&mut self) {
        if matches!(self.action, DiffAction::Create | DiffAction::Delete) {
            return;
        }
        self.action = if self.requires_replace() {
            DiffAction::Replace
        } else if self.changes.is_empty() {
            DiffAction::NoChange
        } else {
            DiffAction::Update
        };
    }
}

/// Compare desired configuration with the stored state.
///
/// `desired` is `None` when the configuration no longer declares the
/// instance; `current` is `None` when nothing is stored yet.
pub fn diff(schema: &ResourceSchema, desired: Option<&Resource>, current: Option<&State>) -> ResourceDiff {
    match (desired, current) {
        (None, Some(state)) => ResourceDiff {
            kind: state.kind.clone(),
            action: DiffAction::Delete,
            changes: Vec::new(),
            prior: Some(state.attributes.clone()),
            planned: Attributes::new(),
            timeouts: state.timeouts.clone(),
        },
        (Some(resource), None) => {
            let planned = schema.normalize(&resource.attributes);
            let mut changes: Vec<AttributeChange> = planned
                .iter()
                .map(|(name, value)| AttributeChange {
                    name: name.clone(),
                    old: None,
                    new: Some(value.clone()),
                    requires_replace: false,
                    computed: false,
                })
                .collect();
            changes.sort_by(|a, b| a.name.cmp(&b.name));
            ResourceDiff {
                kind: resource.kind.clone(),
                action: DiffAction::Create,
                changes,
                prior: None,
                planned,
                timeouts: resource.timeouts.clone(),
            }
        }
        (Some(resource), Some(state)) => diff_existing(schema, resource, state),
        (None, None) => ResourceDiff {
            kind: schema.resource_type.clone(),
            action: DiffAction::NoChange,
            changes: Vec::new(),
            prior: None,
            planned: Attributes::new(),
            timeouts: Timeouts::default(),
        },
    }
}

fn diff_existing(schema: &ResourceSchema, resource: &Resource, state: &State) -> ResourceDiff {
    let desired = schema.normalize(&resource.attributes);
    let current = &state.attributes;
    let mut planned: Attributes = HashMap::new();
    let mut changes = Vec::new();

    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();

    for name in names {
        let attr = &schema.attributes[name];
        let old = current.get(name);
        let new = desired.get(name);

        // Server-managed values carry over unless configured
        if new.is_none() && attr.mode.is_computed() {
            if let Some(old) = old {
                planned.insert(name.clone(), old.clone());
            }
            continue;
        }

        if is_equivalent(attr, name, old, new, &desired) {
            if let Some(old) = old {
                planned.insert(name.clone(), old.clone());
            }
            continue;
        }

        if let Some(new) = new {
            planned.insert(name.clone(), new.clone());
        }
        changes.push(AttributeChange {
            name: name.clone(),
            old: old.cloned(),
            new: new.cloned(),
            requires_replace: attr.force_new || nested_requires_replace(&attr.attr_type, old, new),
            computed: false,
        });
    }

    let mut result = ResourceDiff {
        kind: resource.kind.clone(),
        action: DiffAction::NoChange,
        changes,
        prior: Some(current.clone()),
        planned,
        timeouts: resource.timeouts.clone(),
    };
    result.recompute_action();
    result
}

fn is_equivalent(
    attr: &AttributeSchema,
    name: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    desired: &Attributes,
) -> bool {
    match (old, new) {
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) if v.is_zero() => true,
        (Some(o), Some(n)) if attr.attr_type.values_equal(o, n) => true,
        _ => {
            let empty = Value::String(String::new());
            match attr.suppress_diff {
                Some(suppress) => suppress(name, old.unwrap_or(&empty), new.unwrap_or(&empty), desired),
                None => false,
            }
        }
    }
}

/// Whether a change inside a nested block touches a `force_new` field
fn nested_requires_replace(t: &AttributeType, old: Option<&Value>, new: Option<&Value>) -> bool {
    let fields = match t {
        AttributeType::List(inner) | AttributeType::Set(inner) => match inner.as_ref() {
            AttributeType::Object(fields) => fields,
            _ => return false,
        },
        _ => return false,
    };
    let first = |v: Option<&Value>| {
        v.and_then(Value::as_list)
            .and_then(|l| l.first())
            .and_then(Value::as_map)
            .cloned()
            .unwrap_or_default()
    };
    let (old, new) = (first(old), first(new));
    fields.iter().filter(|f| f.force_new).any(|f| {
        match (old.get(&f.name), new.get(&f.name)) {
            (Some(o), Some(n)) => !f.attr_type.values_equal(o, n),
            (None, None) => false,
            (Some(v), None) | (None, Some(v)) => !v.is_zero(),
        }
    })
}
