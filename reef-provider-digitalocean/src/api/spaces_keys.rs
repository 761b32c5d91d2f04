//! Spaces access keys

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default)]
    pub bucket: String,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpacesKey {
    pub name: String,
    pub access_key: String,
    /// Only present in the create response
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpacesKeyRequest {
    pub name: String,
    pub grants: Vec<Grant>,
}

fn key_path(access_key: &str) -> String {
    format!("/v2/spaces/keys/{}", urlencoding::encode(access_key))
}

impl Client {
    pub async fn create_spaces_key(&self, req: &SpacesKeyRequest) -> ProviderResult<SpacesKey> {
        self.post("/v2/spaces/keys", req, "key").await
    }

    pub async fn update_spaces_key(&self, access_key: &str, req: &SpacesKeyRequest) -> ProviderResult<SpacesKey> {
        self.put(&key_path(access_key), req, "key").await
    }

    pub async fn delete_spaces_key(&self, access_key: &str) -> ProviderResult<()> {
        self.delete(&key_path(access_key)).await
    }

    pub async fn list_spaces_keys(&self) -> ProviderResult<Vec<SpacesKey>> {
        self.list_all("/v2/spaces/keys", "keys", "Spaces keys").await
    }
}
