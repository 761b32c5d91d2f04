//! Bring-your-own-IP prefixes

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ByoipPrefix {
    pub uuid: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub advertised: bool,
    #[serde(default)]
    pub failure_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ByoipPrefixCreateRequest {
    pub prefix: String,
    pub signature: String,
    pub region: String,
}

/// The create call answers with a bare object, not an envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ByoipPrefixCreateResponse {
    pub uuid: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ByoipPrefixUpdateRequest {
    pub advertise: bool,
}

fn prefix_path(uuid: &str) -> String {
    format!("/v2/byoip_prefixes/{}", urlencoding::encode(uuid))
}

impl Client {
    pub async fn create_byoip_prefix(
        &self,
        req: &ByoipPrefixCreateRequest,
    ) -> ProviderResult<ByoipPrefixCreateResponse> {
        self.post_bare("/v2/byoip_prefixes", req).await
    }

    pub async fn get_byoip_prefix(&self, uuid: &str) -> ProviderResult<ByoipPrefix> {
        self.get(&prefix_path(uuid), "byoip_prefix").await
    }

    pub async fn update_byoip_prefix(&self, uuid: &str, req: &ByoipPrefixUpdateRequest) -> ProviderResult<ByoipPrefix> {
        self.patch(&prefix_path(uuid), req, "byoip_prefix").await
    }

    pub async fn delete_byoip_prefix(&self, uuid: &str) -> ProviderResult<()> {
        self.delete(&prefix_path(uuid)).await
    }

    pub async fn list_byoip_prefixes(&self) -> ProviderResult<Vec<ByoipPrefix>> {
        self.list_all("/v2/byoip_prefixes", "byoip_prefixes", "BYOIP prefixes").await
    }
}
