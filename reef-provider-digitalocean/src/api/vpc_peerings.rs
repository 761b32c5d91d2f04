//! VPC peerings

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VpcPeering {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vpc_ids: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpcPeeringCreateRequest {
    pub name: String,
    pub vpc_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VpcPeeringUpdateRequest {
    pub name: String,
}

fn peering_path(id: &str) -> String {
    format!("/v2/vpc_peerings/{}", urlencoding::encode(id))
}

impl Client {
    pub async fn create_vpc_peering(&self, req: &VpcPeeringCreateRequest) -> ProviderResult<VpcPeering> {
        self.post("/v2/vpc_peerings", req, "vpc_peering").await
    }

    pub async fn get_vpc_peering(&self, id: &str) -> ProviderResult<VpcPeering> {
        self.get(&peering_path(id), "vpc_peering").await
    }

    pub async fn update_vpc_peering(&self, id: &str, req: &VpcPeeringUpdateRequest) -> ProviderResult<VpcPeering> {
        self.patch(&peering_path(id), req, "vpc_peering").await
    }

    pub async fn delete_vpc_peering(&self, id: &str) -> ProviderResult<()> {
        self.delete(&peering_path(id)).await
    }

    pub async fn list_vpc_peerings(&self) -> ProviderResult<Vec<VpcPeering>> {
        self.list_all("/v2/vpc_peerings", "vpc_peerings", "VPC peerings").await
    }
}
