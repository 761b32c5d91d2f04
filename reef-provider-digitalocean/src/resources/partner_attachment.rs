//! partner_attachment - Partner Network Connect attachment
//!
//! Creation is retried for transient failures and then waited until the
//! attachment reports `CREATED`. Only `name` and `vpc_ids` can change in
//! place. The BGP auth key is write-only: reads re-inject it from the prior
//! state so it never shows up as drift.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::retry::{RetryError, is_retryable_on_delete, retry};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};
use reef_core::waiter::StateChangeConf;

use super::{Ctx, found, merge, required_int, required_str};
use crate::api::partner_attachments::{
    Bgp, PartnerAttachment, PartnerAttachmentCreateRequest, PartnerAttachmentUpdateRequest,
};
use crate::config::CombinedConfig;
use crate::utils::lowercase;

const CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub const BANDWIDTHS: [i64; 6] = [50, 200, 500, 1000, 5000, 10000];

pub struct PartnerAttachmentType;

pub(crate) fn bgp_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("local_router_ip", AttributeType::String)
            .force_new()
            .validate(Validator::Cidr),
        AttributeSchema::new("peer_router_asn", AttributeType::Int)
            .force_new()
            .validate(Validator::IntBetween(1, 4_294_967_295)),
        AttributeSchema::new("peer_router_ip", AttributeType::String)
            .force_new()
            .validate(Validator::Cidr),
        AttributeSchema::new("auth_key", AttributeType::String)
            .force_new()
            .sensitive(),
    ]
}

fn flatten_bgp(bgp: &Bgp, auth_key: Option<&Value>) -> Value {
    let mut block: HashMap<String, Value> = HashMap::new();
    block.insert("local_router_ip".into(), Value::from(bgp.local_router_ip.as_str()));
    block.insert("peer_router_asn".into(), Value::from(bgp.peer_router_asn));
    block.insert("peer_router_ip".into(), Value::from(bgp.peer_router_ip.as_str()));
    if let Some(key) = auth_key {
        block.insert("auth_key".into(), key.clone());
    }
    Value::List(vec![Value::Map(block)])
}

/// Flatten for state; `auth_key` comes from the prior state since the API never returns it
pub(crate) fn flatten_partner_attachment(attachment: &PartnerAttachment, auth_key: Option<&Value>) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("id".into(), Value::from(attachment.id.as_str()));
    attrs.insert("name".into(), Value::from(attachment.name.as_str()));
    attrs.insert("state".into(), Value::from(attachment.state.as_str()));
    attrs.insert(
        "connection_bandwidth_in_mbps".into(),
        Value::from(attachment.connection_bandwidth_in_mbps),
    );
    attrs.insert("region".into(), Value::from(attachment.region.to_lowercase()));
    attrs.insert("naas_provider".into(), Value::from(attachment.naas_provider.as_str()));
    attrs.insert("vpc_ids".into(), Value::from(attachment.vpc_ids.clone()));
    attrs.insert("children".into(), Value::from(attachment.children.clone()));
    attrs.insert("created_at".into(), Value::from(attachment.created_at.as_str()));
    if let Some(zone) = attachment.redundancy_zone.as_deref().filter(|z| !z.is_empty()) {
        attrs.insert("redundancy_zone".into(), Value::from(zone));
    }
    if let Some(parent) = attachment.parent_uuid.as_deref().filter(|p| !p.is_empty()) {
        attrs.insert("parent_uuid".into(), Value::from(parent));
    }
    if let Some(bgp) = &attachment.bgp
        && !bgp.local_router_ip.is_empty()
    {
        attrs.insert("bgp".into(), flatten_bgp(bgp, auth_key));
    }
    attrs
}

fn expand_bgp(data: &ResourceData) -> Option<Bgp> {
    let block = data.get_block("bgp")?;
    let text = |key: &str| block.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    Some(Bgp {
        local_router_ip: text("local_router_ip"),
        peer_router_asn: block.get("peer_router_asn").and_then(Value::as_int).unwrap_or_default(),
        peer_router_ip: text("peer_router_ip"),
        auth_key: text("auth_key"),
    })
}

/// 400, 409 and 422 are final; anything else may clear up
fn attachment_create_retryable(err: &ProviderError) -> bool {
    !matches!(err.status(), Some(400 | 409 | 422))
}

#[async_trait]
impl ResourceType<CombinedConfig> for PartnerAttachmentType {
    fn name(&self) -> &'static str {
        "partner_attachment"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("partner_attachment")
            .with_description("A Partner Network Connect attachment")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("connection_bandwidth_in_mbps", AttributeType::Int)
                    .required()
                    .force_new()
                    .validate(Validator::IntOneOf(BANDWIDTHS.to_vec())),
            )
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .required()
                    .force_new()
                    .state_func(lowercase),
            )
            .attribute(
                AttributeSchema::new("naas_provider", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("vpc_ids", types::string_set())
                    .required()
                    .min_items(1),
            )
            .attribute(
                AttributeSchema::new("redundancy_zone", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .validate(Validator::one_of(&["MEGAPORT_BLUE", "MEGAPORT_RED"])),
            )
            .attribute(
                AttributeSchema::new("parent_uuid", AttributeType::String)
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("bgp", types::block(bgp_fields()))
                    .optional_computed()
                    .max_items(1),
            )
            .attribute(AttributeSchema::new("state", AttributeType::String).computed())
            .attribute(AttributeSchema::new("children", types::string_list()).computed())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let req = PartnerAttachmentCreateRequest {
            name: required_str(data, "name")?.to_string(),
            connection_bandwidth_in_mbps: required_int(data, "connection_bandwidth_in_mbps")?,
            region: required_str(data, "region")?.to_string(),
            naas_provider: required_str(data, "naas_provider")?.to_string(),
            vpc_ids: data.get_string_list("vpc_ids"),
            bgp: expand_bgp(data),
            redundancy_zone: data.get_non_empty_str("redundancy_zone").map(str::to_string),
            parent_uuid: data.get_non_empty_str("parent_uuid").map(str::to_string),
        };
        let timeout = data.timeout(Operation::Create, CREATE_TIMEOUT);

        log::info!("Creating partner attachment {}", req.name);
        let req = &req;
        let attachment = retry(&ctx.cancel, timeout, || async move {
            client
                .create_partner_attachment(req)
                .await
                .map_err(|e| RetryError::classify(e, attachment_create_retryable))
        })
        .await
        .map_err(|e| e.with_context("error creating partner attachment"))?;
        data.set_id(attachment.id.clone());

        let id = attachment.id;
        StateChangeConf::new(&["CREATING"], &["CREATED"], timeout)
            .with_min_timeout(Duration::from_secs(5))
            .wait_for_state(&ctx.cancel, || {
                let id = id.clone();
                async move {
                    let attachment = client.get_partner_attachment(&id).await?;
                    let state = attachment.state.clone();
                    Ok(Some((attachment, state)))
                }
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for partner attachment {id} to be created")))?;

        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_partner_attachment(data.id_str()).await;
        let Some(attachment) = found(data, result)? else {
            return Ok(());
        };
        let auth_key = data.get_block("bgp").and_then(|b| b.get("auth_key")).cloned();
        let mut attrs = flatten_partner_attachment(&attachment, auth_key.as_ref());
        attrs.remove("id");
        if !attrs.contains_key("bgp") {
            data.remove("bgp");
        }
        merge(data, attrs);
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let mut req = PartnerAttachmentUpdateRequest::default();
        if data.has_change("name") {
            req.name = Some(required_str(data, "name")?.to_string());
        }
        if data.has_change("vpc_ids") {
            req.vpc_ids = Some(data.get_string_list("vpc_ids"));
        }
        if req.name.is_some() || req.vpc_ids.is_some() {
            log::info!("Updating partner attachment {}", data.id_str());
            ctx.meta
                .api_client()
                .update_partner_attachment(data.id_str(), &req)
                .await
                .map_err(|e| e.with_context(format!("error updating partner attachment {}", data.id_str())))?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let id = data.id_str().to_string();
        let timeout = data.timeout(Operation::Delete, DELETE_TIMEOUT);

        log::info!("Deleting partner attachment {id}");
        // 403 is returned while dependent resources are still being torn down
        let deleted = retry(&ctx.cancel, timeout, || {
            let id = id.as_str();
            async move {
                match client.delete_partner_attachment(id).await {
                    Err(e) if e.is_not_found() => Ok(false),
                    other => other
                        .map(|()| true)
                        .map_err(|e| RetryError::classify(e, is_retryable_on_delete)),
                }
            }
        })
        .await
        .map_err(|e| e.with_context(format!("error deleting partner attachment {id}")))?;
        if !deleted {
            return Ok(());
        }

        StateChangeConf::new(&["DELETING", "CREATED", "CREATING"], &[], timeout)
            .wait_for_state(&ctx.cancel, || {
                let id = id.clone();
                async move {
                    let attachment = client.get_partner_attachment(&id).await?;
                    let state = attachment.state.clone();
                    Ok(Some(((), state)))
                }
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for partner attachment {id} to be deleted")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_core::differ::{DiffAction, diff};
    use reef_core::resource::{Resource, State};

    fn attachment() -> PartnerAttachment {
        PartnerAttachment {
            id: "pa-1".to_string(),
            name: "edge".to_string(),
            state: "CREATED".to_string(),
            connection_bandwidth_in_mbps: 1000,
            region: "NYC".to_string(),
            naas_provider: "MEGAPORT".to_string(),
            vpc_ids: vec!["vpc-1".to_string()],
            bgp: Some(Bgp {
                local_router_ip: "169.254.0.1/29".to_string(),
                peer_router_asn: 64532,
                peer_router_ip: "169.254.0.6/29".to_string(),
                auth_key: String::new(),
            }),
            redundancy_zone: Some("MEGAPORT_BLUE".to_string()),
            parent_uuid: None,
            children: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn auth_key_is_reinjected() {
        let attrs = flatten_partner_attachment(&attachment(), Some(&Value::from("s3cret")));
        let bgp = attrs["bgp"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(bgp["auth_key"], Value::from("s3cret"));
        assert_eq!(attrs["region"], Value::from("nyc"));
    }

    #[test]
    fn create_retry_policy() {
        assert!(!attachment_create_retryable(&ProviderError::from_status(422, "invalid")));
        assert!(!attachment_create_retryable(&ProviderError::from_status(400, "bad")));
        assert!(attachment_create_retryable(&ProviderError::from_status(503, "busy")));
        assert!(attachment_create_retryable(&ProviderError::from_status(412, "locked")));
    }

    #[test]
    fn changing_a_bgp_field_forces_replacement() {
        let schema = PartnerAttachmentType.schema();
        let mut attrs = flatten_partner_attachment(&attachment(), None);
        attrs.remove("id");
        let state = State::new("partner_attachment", "pa-1", attrs.clone());

        let mut desired = Resource::new("partner_attachment");
        desired.attributes = attrs;
        let mut bgp = desired.attributes["bgp"].as_list().unwrap()[0].as_map().unwrap().clone();
        bgp.insert("peer_router_asn".to_string(), Value::from(64999i64));
        desired.attributes.insert("bgp".to_string(), Value::List(vec![Value::Map(bgp)]));
        for computed in ["state", "children", "created_at"] {
            desired.attributes.remove(computed);
        }

        assert_eq!(diff(&schema, Some(&desired), Some(&state)).action, DiffAction::Replace);
    }

    #[test]
    fn renaming_updates_in_place() {
        let schema = PartnerAttachmentType.schema();
        let mut attrs = flatten_partner_attachment(&attachment(), None);
        attrs.remove("id");
        let state = State::new("partner_attachment", "pa-1", attrs.clone());

        let mut desired = Resource::new("partner_attachment");
        desired.attributes = attrs;
        desired.attributes.insert("name".to_string(), Value::from("edge-2"));
        for computed in ["state", "children", "created_at"] {
            desired.attributes.remove(computed);
        }

        assert_eq!(diff(&schema, Some(&desired), Some(&state)).action, DiffAction::Update);
    }
}
