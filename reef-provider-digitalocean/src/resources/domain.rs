//! domain - DNS zone

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::{Ctx, create_with_retry, found, merge, required_str};
use crate::api::domains::{Domain, DomainCreateRequest};
use crate::config::CombinedConfig;

pub struct DomainType;

pub(crate) fn flatten_domain(domain: &Domain) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), Value::from(domain.name.as_str()));
    attrs.insert("ttl".into(), Value::from(domain.ttl));
    attrs.insert("urn".into(), Value::from(format!("do:domain:{}", domain.name)));
    attrs.insert("zone_file".into(), Value::from(domain.zone_file.as_str()));
    attrs
}

pub(crate) fn domain_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("name", AttributeType::String).computed(),
        AttributeSchema::new("ttl", AttributeType::Int).computed(),
        AttributeSchema::new("urn", AttributeType::String).computed(),
        AttributeSchema::new("zone_file", AttributeType::String).computed(),
    ]
}

#[async_trait]
impl ResourceType<CombinedConfig> for DomainType {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("domain")
            .with_description("A DNS zone managed by DigitalOcean")
            .attributes(domain_fields().into_iter().filter(|f| f.name != "name"))
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("ip_address", AttributeType::String)
                    .force_new()
                    .validate(Validator::IpAddress)
                    .with_description("Creates an A record at the apex pointing here"),
            )
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let req = DomainCreateRequest {
            name: required_str(data, "name")?.to_string(),
            ip_address: data.get_non_empty_str("ip_address").map(str::to_string),
        };
        log::info!("Creating domain {}", req.name);
        let client = ctx.meta.api_client();
        let domain = create_with_retry(ctx, data, || client.create_domain(&req))
            .await
            .map_err(|e| e.with_context("error creating domain"))?;
        data.set_id(domain.name);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_domain(data.id_str()).await;
        if let Some(domain) = found(data, result)? {
            merge(data, flatten_domain(&domain));
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        // Every configurable attribute forces replacement
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        log::info!("Deleting domain {}", data.id_str());
        ctx.meta
            .api_client()
            .delete_domain(data.id_str())
            .await
            .map_err(|e| e.with_context("error deleting domain"))
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let name = data.id_str().to_string();
        data.set("name", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_sets_urn() {
        let attrs = flatten_domain(&Domain {
            name: "example.com".to_string(),
            ttl: 1800,
            zone_file: String::new(),
        });
        assert_eq!(attrs["urn"], Value::from("do:domain:example.com"));
        assert_eq!(attrs["ttl"], Value::from(1800i64));
    }

    #[test]
    fn name_and_ip_force_new() {
        let schema = DomainType.schema();
        assert!(schema.get("name").unwrap().force_new);
        assert!(schema.get("ip_address").unwrap().force_new);
        assert!(schema.get("zone_file").unwrap().mode.is_computed());
    }
}
