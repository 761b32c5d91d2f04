//! Domains and domain records

use reef_core::provider::ProviderResult;
use serde::{Deserialize, Serialize};

use super::Client;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub zone_file: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainCreateRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub flags: Option<i64>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Body of record create and edit calls
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainRecordEditRequest {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn domain_path(name: &str) -> String {
    format!("/v2/domains/{}", urlencoding::encode(name))
}

impl Client {
    pub async fn create_domain(&self, req: &DomainCreateRequest) -> ProviderResult<Domain> {
        self.post("/v2/domains", req, "domain").await
    }

    pub async fn get_domain(&self, name: &str) -> ProviderResult<Domain> {
        self.get(&domain_path(name), "domain").await
    }

    pub async fn delete_domain(&self, name: &str) -> ProviderResult<()> {
        self.delete(&domain_path(name)).await
    }

    pub async fn list_domains(&self) -> ProviderResult<Vec<Domain>> {
        self.list_all("/v2/domains", "domains", "domains").await
    }

    pub async fn create_record(&self, domain: &str, req: &DomainRecordEditRequest) -> ProviderResult<DomainRecord> {
        self.post(&format!("{}/records", domain_path(domain)), req, "domain_record")
            .await
    }

    pub async fn get_record(&self, domain: &str, id: i64) -> ProviderResult<DomainRecord> {
        self.get(&format!("{}/records/{id}", domain_path(domain)), "domain_record")
            .await
    }

    pub async fn edit_record(
        &self,
        domain: &str,
        id: i64,
        req: &DomainRecordEditRequest,
    ) -> ProviderResult<DomainRecord> {
        self.put(&format!("{}/records/{id}", domain_path(domain)), req, "domain_record")
            .await
    }

    pub async fn delete_record(&self, domain: &str, id: i64) -> ProviderResult<()> {
        self.delete(&format!("{}/records/{id}", domain_path(domain))).await
    }

    pub async fn list_records(&self, domain: &str) -> ProviderResult<Vec<DomainRecord>> {
        self.list_all(
            &format!("{}/records", domain_path(domain)),
            "domain_records",
            "domain records",
        )
        .await
    }
}
