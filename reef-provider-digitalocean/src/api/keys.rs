//! SSH keys

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SshKey {
    pub id: i64,
    pub name: String,
    pub public_key: String,
    #[serde(default)]
    pub fingerprint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SshKeyCreateRequest {
    pub name: String,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SshKeyUpdateRequest {
    pub name: String,
}

impl Client {
    pub async fn create_ssh_key(&self, req: &SshKeyCreateRequest) -> ProviderResult<SshKey> {
        self.post("/v2/account/keys", req, "ssh_key").await
    }

    /// Keys are addressable by numeric id or fingerprint
    pub async fn get_ssh_key(&self, id_or_fingerprint: &str) -> ProviderResult<SshKey> {
        self.get(
            &format!("/v2/account/keys/{}", urlencoding::encode(id_or_fingerprint)),
            "ssh_key",
        )
        .await
    }

    pub async fn update_ssh_key(&self, id: &str, req: &SshKeyUpdateRequest) -> ProviderResult<SshKey> {
        self.put(&format!("/v2/account/keys/{}", urlencoding::encode(id)), req, "ssh_key")
            .await
    }

    pub async fn delete_ssh_key(&self, id: &str) -> ProviderResult<()> {
        self.delete(&format!("/v2/account/keys/{}", urlencoding::encode(id)))
            .await
    }

    pub async fn list_ssh_keys(&self) -> ProviderResult<Vec<SshKey>> {
        self.list_all("/v2/account/keys", "ssh_keys", "ssh keys").await
    }
}
