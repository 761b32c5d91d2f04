//! byoip_prefix - Bring-your-own-IP prefix

use std::time::Duration;

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};
use reef_core::waiter::StateChangeConf;

use super::{Ctx, create_with_retry, found, merge, required_str};
use crate::api::byoip::{ByoipPrefix, ByoipPrefixCreateRequest, ByoipPrefixUpdateRequest};
use crate::config::CombinedConfig;
use crate::utils::lowercase;

const CREATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

pub struct ByoipPrefixType;

pub(crate) fn flatten_byoip_prefix(prefix: &ByoipPrefix) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("uuid".into(), Value::from(prefix.uuid.as_str()));
    attrs.insert("prefix".into(), Value::from(prefix.prefix.as_str()));
    attrs.insert("region".into(), Value::from(prefix.region.to_lowercase()));
    attrs.insert("status".into(), Value::from(prefix.status.as_str()));
    attrs.insert("advertised".into(), Value::from(prefix.advertised));
    attrs.insert("failure_reason".into(), Value::from(prefix.failure_reason.as_str()));
    attrs
}

#[async_trait]
impl ResourceType<CombinedConfig> for ByoipPrefixType {
    fn name(&self) -> &'static str {
        "byoip_prefix"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("byoip_prefix")
            .with_description("An IP prefix owned by the account and announced by DigitalOcean")
            .attribute(
                AttributeSchema::new("prefix", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::Cidr),
            )
            .attribute(
                AttributeSchema::new("signature", AttributeType::String)
                    .required()
                    .force_new()
                    .sensitive(),
            )
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .required()
                    .force_new()
                    .state_func(lowercase),
            )
            .attribute(AttributeSchema::new("advertised", AttributeType::Bool).optional_computed())
            .attribute(AttributeSchema::new("uuid", AttributeType::String).computed())
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
            .attribute(AttributeSchema::new("failure_reason", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let req = ByoipPrefixCreateRequest {
            prefix: required_str(data, "prefix")?.to_string(),
            signature: required_str(data, "signature")?.to_string(),
            region: required_str(data, "region")?.to_string(),
        };
        log::info!("Creating BYOIP prefix {} in {}", req.prefix, req.region);
        let created = create_with_retry(ctx, data, || client.create_byoip_prefix(&req))
            .await
            .map_err(|e| e.with_context("error creating BYOIP prefix"))?;
        data.set_id(created.uuid.clone());

        let uuid = created.uuid;
        StateChangeConf::new(&["pending", "in_progress"], &["active"], data.timeout(Operation::Create, CREATE_TIMEOUT))
            .with_min_timeout(Duration::from_secs(10))
            .wait_for_state(&ctx.cancel, || {
                let uuid = uuid.clone();
                async move {
                    let prefix = client.get_byoip_prefix(&uuid).await?;
                    let status = prefix.status.to_lowercase();
                    Ok(Some((prefix, status)))
                }
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for BYOIP prefix {uuid} to become active")))?;

        if data.get_bool("advertised") == Some(true) {
            client
                .update_byoip_prefix(&uuid, &ByoipPrefixUpdateRequest { advertise: true })
                .await
                .map_err(|e| e.with_context(format!("error advertising BYOIP prefix {uuid}")))?;
        }
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_byoip_prefix(data.id_str()).await;
        if let Some(prefix) = found(data, result)? {
            merge(data, flatten_byoip_prefix(&prefix));
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("advertised") {
            let advertise = data.get_bool("advertised").unwrap_or(false);
            log::info!("Setting advertise={advertise} on BYOIP prefix {}", data.id_str());
            ctx.meta
                .api_client()
                .update_byoip_prefix(data.id_str(), &ByoipPrefixUpdateRequest { advertise })
                .await
                .map_err(|e| e.with_context(format!("error updating BYOIP prefix {}", data.id_str())))?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let uuid = data.id_str().to_string();
        log::info!("Deleting BYOIP prefix {uuid}");
        client
            .delete_byoip_prefix(&uuid)
            .await
            .map_err(|e| e.with_context(format!("error deleting BYOIP prefix {uuid}")))?;

        StateChangeConf::new(
            &["active", "deleting", "pending", "in_progress"],
            &[],
            data.timeout(Operation::Delete, DELETE_TIMEOUT),
        )
        .with_min_timeout(Duration::from_secs(5))
        .wait_for_state(&ctx.cancel, || {
            let uuid = uuid.clone();
            async move {
                let prefix = client.get_byoip_prefix(&uuid).await?;
                Ok(Some(((), prefix.status.to_lowercase())))
            }
        })
        .await
        .map_err(|e| e.with_context(format!("error waiting for BYOIP prefix {uuid} to be deleted")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_must_be_cidr() {
        let schema = ByoipPrefixType.schema();
        let attrs = [
            ("prefix".to_string(), Value::from("203.0.113.0")),
            ("signature".to_string(), Value::from("sig")),
            ("region".to_string(), Value::from("nyc3")),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn signature_is_sensitive() {
        assert!(ByoipPrefixType.schema().get("signature").unwrap().sensitive);
    }
}
