//! Partner Network Connect attachments

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bgp {
    #[serde(default)]
    pub local_router_ip: String,
    #[serde(default)]
    pub peer_router_asn: i64,
    #[serde(default)]
    pub peer_router_ip: String,
    /// Only sent on create; never returned
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PartnerAttachment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub connection_bandwidth_in_mbps: i64,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub naas_provider: String,
    #[serde(default)]
    pub vpc_ids: Vec<String>,
    #[serde(default)]
    pub bgp: Option<Bgp>,
    #[serde(default)]
    pub redundancy_zone: Option<String>,
    #[serde(default)]
    pub parent_uuid: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerAttachmentCreateRequest {
    pub name: String,
    pub connection_bandwidth_in_mbps: i64,
    pub region: String,
    pub naas_provider: String,
    pub vpc_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgp: Option<Bgp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redundancy_zone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PartnerAttachmentUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_ids: Option<Vec<String>>,
}

const BASE: &str = "/v2/partner_network_connect/attachments";

fn attachment_path(id: &str) -> String {
    format!("{BASE}/{}", urlencoding::encode(id))
}

impl Client {
    pub async fn create_partner_attachment(
        &self,
        req: &PartnerAttachmentCreateRequest,
    ) -> ProviderResult<PartnerAttachment> {
        self.post(BASE, req, "partner_attachment").await
    }

    pub async fn get_partner_attachment(&self, id: &str) -> ProviderResult<PartnerAttachment> {
        self.get(&attachment_path(id), "partner_attachment").await
    }

    pub async fn update_partner_attachment(
        &self,
        id: &str,
        req: &PartnerAttachmentUpdateRequest,
    ) -> ProviderResult<PartnerAttachment> {
        self.patch(&attachment_path(id), req, "partner_attachment").await
    }

    pub async fn delete_partner_attachment(&self, id: &str) -> ProviderResult<()> {
        self.delete(&attachment_path(id)).await
    }

    pub async fn list_partner_attachments(&self) -> ProviderResult<Vec<PartnerAttachment>> {
        self.list_all(BASE, "partner_attachments", "partner attachments").await
    }
}
