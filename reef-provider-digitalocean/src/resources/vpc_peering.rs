//! vpc_peering - Peering between two VPCs

use std::time::Duration;

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};
use reef_core::waiter::StateChangeConf;

use super::{Ctx, create_with_retry, found, merge, required_str};
use crate::api::vpc_peerings::{VpcPeering, VpcPeeringCreateRequest, VpcPeeringUpdateRequest};
use crate::config::CombinedConfig;

const DELETE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct VpcPeeringType;

pub(crate) fn flatten_vpc_peering(peering: &VpcPeering) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("id".into(), Value::from(peering.id.as_str()));
    attrs.insert("name".into(), Value::from(peering.name.as_str()));
    attrs.insert("vpc_ids".into(), Value::from(peering.vpc_ids.clone()));
    attrs.insert("status".into(), Value::from(peering.status.as_str()));
    attrs.insert("created_at".into(), Value::from(peering.created_at.as_str()));
    attrs
}

#[async_trait]
impl ResourceType<CombinedConfig> for VpcPeeringType {
    fn name(&self) -> &'static str {
        "vpc_peering"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("vpc_peering")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::regex(
                        "^[a-zA-Z0-9\\-\\.]+$",
                        "name may only contain alphanumerics, hyphens and dots",
                    )),
            )
            .attribute(
                AttributeSchema::new("vpc_ids", types::string_set())
                    .required()
                    .force_new()
                    .min_items(2)
                    .max_items(2)
                    .validate(Validator::NotEmpty),
            )
            .attribute(AttributeSchema::new("status", AttributeType::String).computed())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let req = VpcPeeringCreateRequest {
            name: required_str(data, "name")?.to_string(),
            vpc_ids: data.get_string_list("vpc_ids"),
        };
        log::info!("Creating VPC peering {} between {:?}", req.name, req.vpc_ids);
        let client = ctx.meta.api_client();
        let peering = create_with_retry(ctx, data, || client.create_vpc_peering(&req))
            .await
            .map_err(|e| e.with_context("error creating VPC peering"))?;
        // Peering becomes ACTIVE asynchronously; the status is refreshed on read
        data.set_id(peering.id);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_vpc_peering(data.id_str()).await;
        if let Some(peering) = found(data, result)? {
            let mut attrs = flatten_vpc_peering(&peering);
            attrs.remove("id");
            merge(data, attrs);
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("name") {
            let req = VpcPeeringUpdateRequest {
                name: required_str(data, "name")?.to_string(),
            };
            ctx.meta
                .api_client()
                .update_vpc_peering(data.id_str(), &req)
                .await
                .map_err(|e| e.with_context(format!("error updating VPC peering {}", data.id_str())))?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let id = data.id_str().to_string();
        log::info!("Deleting VPC peering {id}");
        client
            .delete_vpc_peering(&id)
            .await
            .map_err(|e| e.with_context(format!("error deleting VPC peering {id}")))?;

        let timeout = data.timeout(Operation::Delete, DELETE_TIMEOUT);
        StateChangeConf::new(&["DELETING"], &["DELETED"], timeout)
            .wait_for_state(&ctx.cancel, || {
                let id = id.clone();
                async move {
                    match client.get_vpc_peering(&id).await {
                        Ok(peering) => Ok(Some(((), peering.status))),
                        Err(e) if e.is_not_found() => Ok(Some(((), "DELETED".to_string()))),
                        Err(e) => Err(e),
                    }
                }
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for VPC peering {id} to be deleted")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reef_core::differ::{DiffAction, diff};
    use reef_core::resource::{Resource, State};

    use super::*;

    fn pair() -> Value {
        Value::from(vec!["vpc-a".to_string(), "vpc-b".to_string()])
    }

    #[test]
    fn vpc_ids_must_be_a_pair() {
        let schema = VpcPeeringType.schema();
        let attrs = [
            ("name".to_string(), Value::from("peer-a-b")),
            ("vpc_ids".to_string(), Value::from(vec!["vpc-1".to_string()])),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_err());
    }

    #[test]
    fn only_name_is_mutable() {
        let schema = VpcPeeringType.schema();
        assert!(!schema.get("name").unwrap().force_new);
        assert!(schema.get("vpc_ids").unwrap().force_new);
    }

    #[test]
    fn rename_plans_in_place_update() {
        let schema = VpcPeeringType.schema();
        let state = State::new(
            "vpc_peering",
            "peer-1",
            [
                ("name".to_string(), Value::from("a-to-b")),
                ("vpc_ids".to_string(), pair()),
                ("status".to_string(), Value::from("ACTIVE")),
                ("created_at".to_string(), Value::from("2024-05-01T00:00:00Z")),
            ]
            .into_iter()
            .collect(),
        );
        let renamed = Resource::new("vpc_peering")
            .with_attribute("name", "a-to-b-renamed")
            .with_attribute("vpc_ids", pair());
        assert_eq!(diff(&schema, Some(&renamed), Some(&state)).action, DiffAction::Update);

        let swapped = Resource::new("vpc_peering")
            .with_attribute("name", "a-to-b")
            .with_attribute("vpc_ids", Value::from(vec!["vpc-b".to_string(), "vpc-a".to_string()]));
        assert_eq!(diff(&schema, Some(&swapped), Some(&state)).action, DiffAction::NoChange);
    }
}
