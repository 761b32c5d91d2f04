//! Droplet and volume snapshots

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub created_at: String,
    pub regions: Vec<String>,
    pub resource_id: String,
    pub resource_type: String,
    pub min_disk_size: i64,
    pub size_gigabytes: f64,
    pub tags: Vec<String>,
}

/// Droplet snapshot ids are numeric on the wire, volume snapshot ids are not
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SnapshotId {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
struct WireSnapshot {
    id: SnapshotId,
    name: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    regions: Vec<String>,
    #[serde(default)]
    resource_id: Option<serde_json::Value>,
    #[serde(default)]
    resource_type: String,
    #[serde(default)]
    min_disk_size: i64,
    #[serde(default)]
    size_gigabytes: f64,
    #[serde(default)]
    tags: Option<Vec<String>>,
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireSnapshot::deserialize(deserializer)?;
        let id = match wire.id {
            SnapshotId::Number(n) => n.to_string(),
            SnapshotId::Text(s) => s,
        };
        let resource_id = match wire.resource_id {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        Ok(Snapshot {
            id,
            name: wire.name,
            created_at: wire.created_at,
            regions: wire.regions,
            resource_id,
            resource_type: wire.resource_type,
            min_disk_size: wire.min_disk_size,
            size_gigabytes: wire.size_gigabytes,
            tags: wire.tags.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeSnapshotCreateRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Client {
    pub async fn get_snapshot(&self, id: &str) -> ProviderResult<Snapshot> {
        self.get(&format!("/v2/snapshots/{}", urlencoding::encode(id)), "snapshot")
            .await
    }

    pub async fn delete_snapshot(&self, id: &str) -> ProviderResult<()> {
        self.delete(&format!("/v2/snapshots/{}", urlencoding::encode(id)))
            .await
    }

    pub async fn list_all_droplet_snapshots(&self) -> ProviderResult<Vec<Snapshot>> {
        let path = "/v2/snapshots?resource_type=droplet";
        self.list_all(path, "snapshots", "snapshots").await
    }

    pub async fn create_volume_snapshot(
        &self,
        volume_id: &str,
        req: &VolumeSnapshotCreateRequest,
    ) -> ProviderResult<Snapshot> {
        self.post(
            &format!("/v2/volumes/{}/snapshots", urlencoding::encode(volume_id)),
            req,
            "snapshot",
        )
        .await
    }
}
