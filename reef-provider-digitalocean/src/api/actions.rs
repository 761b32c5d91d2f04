//! Asynchronous actions

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

pub const STATUS_NEW: &str = "new";
pub const STATUS_IN_PROGRESS: &str = "in-progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_ERRORED: &str = "errored";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Action {
    pub id: i64,
    pub status: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub resource_id: Option<i64>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub region_slug: Option<String>,
}

/// Body of an action request; unset fields are omitted
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub droplet_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<bool>,
}

impl ActionRequest {
    pub fn new(action_type: &str) -> Self {
        Self {
            action_type: action_type.to_string(),
            ..Default::default()
        }
    }
}

impl Client {
    pub async fn get_action(&self, id: i64) -> ProviderResult<Action> {
        self.get(&format!("/v2/actions/{id}"), "action").await
    }
}
