//! Droplets, droplet actions and resource tags

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;
use super::actions::{Action, ActionRequest};
use super::reserved_ips::RegionRef;
use super::snapshots::Snapshot;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NetworkV6 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
    #[serde(default)]
    pub v6: Vec<NetworkV6>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SizeRef {
    #[serde(default)]
    pub price_monthly: f64,
    #[serde(default)]
    pub price_hourly: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Droplet {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub vcpus: i64,
    #[serde(default)]
    pub disk: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub size_slug: String,
    #[serde(default)]
    pub size: Option<SizeRef>,
    #[serde(default)]
    pub image: Option<ImageRef>,
    #[serde(default)]
    pub networks: Networks,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub vpc_uuid: Option<String>,
}

impl Droplet {
    pub fn urn(&self) -> String {
        format!("do:droplet:{}", self.id)
    }

    fn v4(&self, network_type: &str) -> Option<&str> {
        self.networks
            .v4
            .iter()
            .find(|n| n.network_type == network_type)
            .map(|n| n.ip_address.as_str())
    }

    pub fn public_ipv4(&self) -> Option<&str> {
        self.v4("public")
    }

    pub fn private_ipv4(&self) -> Option<&str> {
        self.v4("private")
    }

    pub fn public_ipv6(&self) -> Option<&str> {
        self.networks
            .v6
            .iter()
            .find(|n| n.network_type == "public")
            .map(|n| n.ip_address.as_str())
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DropletCreateRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
    pub backups: bool,
    pub ipv6: bool,
    pub monitoring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct TagCreateRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct TagResource {
    resource_id: String,
    resource_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct TagResourcesRequest {
    resources: Vec<TagResource>,
}

impl TagResourcesRequest {
    fn single(resource_id: &str, resource_type: &'static str) -> Self {
        Self {
            resources: vec![TagResource {
                resource_id: resource_id.to_string(),
                resource_type,
            }],
        }
    }
}

impl Client {
    pub async fn create_droplet(&self, req: &DropletCreateRequest) -> ProviderResult<Droplet> {
        self.post("/v2/droplets", req, "droplet").await
    }

    pub async fn get_droplet(&self, id: i64) -> ProviderResult<Droplet> {
        self.get(&format!("/v2/droplets/{id}"), "droplet").await
    }

    pub async fn delete_droplet(&self, id: i64) -> ProviderResult<()> {
        self.delete(&format!("/v2/droplets/{id}")).await
    }

    pub async fn list_droplets(&self) -> ProviderResult<Vec<Droplet>> {
        self.list_all("/v2/droplets", "droplets", "droplets").await
    }

    pub async fn droplet_action(&self, id: i64, req: &ActionRequest) -> ProviderResult<Action> {
        self.post(&format!("/v2/droplets/{id}/actions"), req, "action").await
    }

    pub async fn list_droplet_snapshots(&self, id: i64) -> ProviderResult<Vec<Snapshot>> {
        self.list_all(&format!("/v2/droplets/{id}/snapshots"), "snapshots", "droplet snapshots")
            .await
    }

    /// Tag a resource (`droplet`, `volume_snapshot`, ...), creating the tag first
    pub async fn tag_resource(&self, tag: &str, resource_id: &str, resource_type: &'static str) -> ProviderResult<()> {
        match self.post_no_content("/v2/tags", &TagCreateRequest { name: tag }).await {
            Ok(()) => {}
            // The tag already exists
            Err(e) if e.status() == Some(422) => {}
            Err(e) => return Err(e),
        }
        self.post_no_content(
            &format!("/v2/tags/{}/resources", urlencoding::encode(tag)),
            &TagResourcesRequest::single(resource_id, resource_type),
        )
        .await
    }

    pub async fn untag_resource(&self, tag: &str, resource_id: &str, resource_type: &'static str) -> ProviderResult<()> {
        self.delete_with_body(
            &format!("/v2/tags/{}/resources", urlencoding::encode(tag)),
            &TagResourcesRequest::single(resource_id, resource_type),
        )
        .await
    }
}
