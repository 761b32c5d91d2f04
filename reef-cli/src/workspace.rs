//! Configuration and state files
//!
//! The configuration file is JSON with a `provider` block and, for the
//! single-instance commands, a `resource` block:
//!
//! ```json
//! {
//!   "provider": { "token": "..." },
//!   "resource": {
//!     "kind": "record",
//!     "attributes": { "domain": "example.com", "type": "A", "name": "www", "value": "192.0.2.1" },
//!     "timeouts": { "create": "10m" }
//!   }
//! }
//! ```
//!
//! The state file holds the serialized [`State`] of that one instance.

use std::fs;
use std::path::Path;

use reef_core::resource::{Attributes, Resource, State, Timeouts, attributes_from_json};

/// Parsed configuration file
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub provider: Attributes,
    pub resource: Option<Resource>,
}

impl Workspace {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let json: serde_json::Value = serde_json::from_str(content).map_err(|e| format!("invalid JSON: {e}"))?;
        let provider = json.get("provider").map(attributes_from_json).unwrap_or_default();
        let resource = match json.get("resource") {
            None | Some(serde_json::Value::Null) => None,
            Some(block) => Some(parse_resource(block)?),
        };
        Ok(Self { provider, resource })
    }

    /// The `resource` block, required by plan and apply
    pub fn require_resource(&self) -> Result<&Resource, String> {
        self.resource
            .as_ref()
            .ok_or_else(|| "configuration has no `resource` block".to_string())
    }
}

fn parse_resource(block: &serde_json::Value) -> Result<Resource, String> {
    let kind = block
        .get("kind")
        .and_then(|k| k.as_str())
        .ok_or("resource is missing 'kind'")?;
    let attributes = block.get("attributes").map(attributes_from_json).unwrap_or_default();
    let timeouts = match block.get("timeouts") {
        Some(t) => Timeouts::from_attributes(&attributes_from_json(t))?,
        None => Timeouts::default(),
    };
    Ok(Resource {
        kind: kind.to_string(),
        attributes,
        timeouts,
    })
}

/// Read the stored instance; a missing file means nothing is stored
pub fn load_state(path: &Path) -> Result<Option<State>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let json: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| format!("{}: invalid JSON: {}", path.display(), e))?;
    if json.is_null() {
        return Ok(None);
    }
    State::from_json(&json)
        .map(Some)
        .map_err(|e| format!("{}: {}", path.display(), e))
}

/// Write the stored instance, or remove the file when there is none
pub fn save_state(path: &Path, state: Option<&State>) -> Result<(), String> {
    match state {
        Some(state) => {
            let content = serde_json::to_string_pretty(&state.to_json()).map_err(|e| e.to_string())?;
            fs::write(path, content + "\n").map_err(|e| format!("Failed to write {}: {}", path.display(), e))
        }
        None if path.exists() => {
            fs::remove_file(path).map_err(|e| format!("Failed to remove {}: {}", path.display(), e))
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reef_core::resource::Value;

    use super::*;

    #[test]
    fn parses_provider_and_resource() {
        let ws = Workspace::parse(
            r#"{
                "provider": {"token": "t"},
                "resource": {
                    "kind": "record",
                    "attributes": {"domain": "example.com", "ttl": 300},
                    "timeouts": {"create": "10m"}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(ws.provider["token"], Value::from("t"));
        let resource = ws.require_resource().unwrap();
        assert_eq!(resource.kind, "record");
        assert_eq!(resource.attributes["ttl"], Value::from(300i64));
        assert_eq!(resource.timeouts.create, Some(Duration::from_secs(600)));
    }

    #[test]
    fn resource_block_is_optional() {
        let ws = Workspace::parse(r#"{"provider": {}}"#).unwrap();
        assert!(ws.resource.is_none());
        assert!(ws.require_resource().is_err());
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = Workspace::parse(r#"{"resource": {"kind": "record", "timeouts": {"create": 5}}}"#).unwrap_err();
        assert!(err.contains("timeouts.create"));
    }

    #[test]
    fn state_file_round_trip_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reef.state.json");
        assert!(load_state(&path).unwrap().is_none());

        let attributes: Attributes = [("name".to_string(), Value::from("example.com"))].into_iter().collect();
        let state = State::new("domain", "example.com", attributes);
        save_state(&path, Some(&state)).unwrap();
        let loaded = load_state(&path).unwrap().unwrap();
        assert_eq!(loaded.id, "example.com");
        assert_eq!(loaded.attributes["name"], Value::from("example.com"));

        save_state(&path, None).unwrap();
        assert!(!path.exists());
    }
}
