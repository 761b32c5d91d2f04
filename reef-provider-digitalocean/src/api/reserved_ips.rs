//! Reserved IPv4 and IPv6 addresses

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;
use super::actions::{Action, ActionRequest};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionRef {
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DropletRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReservedIp {
    pub ip: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub droplet: Option<DropletRef>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

impl ReservedIp {
    pub fn urn(&self) -> String {
        format!("do:reservedip:{}", self.ip)
    }

    pub fn droplet_id(&self) -> Option<i64> {
        self.droplet.as_ref().map(|d| d.id)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReservedIpCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub droplet_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReservedIpv6 {
    pub ip: String,
    #[serde(default)]
    pub region_slug: String,
    #[serde(default)]
    pub droplet: Option<DropletRef>,
    #[serde(default)]
    pub reserved_at: Option<String>,
}

impl ReservedIpv6 {
    pub fn droplet_id(&self) -> Option<i64> {
        self.droplet.as_ref().map(|d| d.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservedIpv6CreateRequest {
    pub region_slug: String,
}

fn ip_path(ip: &str) -> String {
    format!("/v2/reserved_ips/{}", urlencoding::encode(ip))
}

fn ipv6_path(ip: &str) -> String {
    format!("/v2/reserved_ipv6/{}", urlencoding::encode(ip))
}

impl Client {
    pub async fn create_reserved_ip(&self, req: &ReservedIpCreateRequest) -> ProviderResult<ReservedIp> {
        self.post("/v2/reserved_ips", req, "reserved_ip").await
    }

    pub async fn get_reserved_ip(&self, ip: &str) -> ProviderResult<ReservedIp> {
        self.get(&ip_path(ip), "reserved_ip").await
    }

    pub async fn delete_reserved_ip(&self, ip: &str) -> ProviderResult<()> {
        self.delete(&ip_path(ip)).await
    }

    pub async fn list_reserved_ips(&self) -> ProviderResult<Vec<ReservedIp>> {
        self.list_all("/v2/reserved_ips", "reserved_ips", "reserved IPs").await
    }

    pub async fn assign_reserved_ip(&self, ip: &str, droplet_id: i64) -> ProviderResult<Action> {
        let req = ActionRequest {
            droplet_id: Some(droplet_id),
            ..ActionRequest::new("assign")
        };
        self.post(&format!("{}/actions", ip_path(ip)), &req, "action").await
    }

    pub async fn unassign_reserved_ip(&self, ip: &str) -> ProviderResult<Action> {
        self.post(&format!("{}/actions", ip_path(ip)), &ActionRequest::new("unassign"), "action")
            .await
    }

    pub async fn create_reserved_ipv6(&self, req: &ReservedIpv6CreateRequest) -> ProviderResult<ReservedIpv6> {
        self.post("/v2/reserved_ipv6", req, "reserved_ipv6").await
    }

    pub async fn get_reserved_ipv6(&self, ip: &str) -> ProviderResult<ReservedIpv6> {
        self.get(&ipv6_path(ip), "reserved_ipv6").await
    }

    pub async fn delete_reserved_ipv6(&self, ip: &str) -> ProviderResult<()> {
        self.delete(&ipv6_path(ip)).await
    }

    pub async fn assign_reserved_ipv6(&self, ip: &str, droplet_id: i64) -> ProviderResult<Action> {
        let req = ActionRequest {
            droplet_id: Some(droplet_id),
            ..ActionRequest::new("assign")
        };
        self.post(&format!("{}/actions", ipv6_path(ip)), &req, "action").await
    }

    pub async fn unassign_reserved_ipv6(&self, ip: &str) -> ProviderResult<Action> {
        self.post(&format!("{}/actions", ipv6_path(ip)), &ActionRequest::new("unassign"), "action")
            .await
    }
}
