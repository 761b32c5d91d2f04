//! reserved_ipv6 - Reserved IPv6 address in a region

use std::time::Duration;

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::{Ctx, create_with_retry, found, required_str};
use crate::actions::{ACTION_TIMEOUT, wait_for_action};
use crate::api::Client;
use crate::api::reserved_ips::ReservedIpv6CreateRequest;
use crate::config::CombinedConfig;
use crate::utils::lowercase;

pub struct ReservedIpv6Type;

/// Unassign an IPv6 address; 422 means it was not assigned
pub(crate) async fn unassign_v6(client: &Client, ctx: &Ctx, ip: &str, timeout: Duration) -> ProviderResult<()> {
    log::info!("Unassigning reserved IPv6 {ip}");
    match client.unassign_reserved_ipv6(ip).await {
        Ok(action) => wait_for_action(client, &ctx.cancel, &action, timeout).await.map(|_| ()),
        Err(e) if e.status() == Some(422) => {
            log::debug!("Reserved IPv6 {ip} was not assigned: {e}");
            Ok(())
        }
        Err(e) => Err(e.with_context(format!("error unassigning reserved IPv6 {ip}"))),
    }
}

#[async_trait]
impl ResourceType<CombinedConfig> for ReservedIpv6Type {
    fn name(&self) -> &'static str {
        "reserved_ipv6"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("reserved_ipv6")
            .with_description("A reserved IPv6 address")
            .attribute(
                AttributeSchema::new("region_slug", AttributeType::String)
                    .required()
                    .force_new()
                    .state_func(lowercase)
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("ip", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .validate(Validator::Ipv6Address),
            )
            .attribute(AttributeSchema::new("droplet_id", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("reserved_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let req = ReservedIpv6CreateRequest {
            region_slug: required_str(data, "region_slug")?.to_string(),
        };
        log::info!("Creating reserved IPv6 in {}", req.region_slug);
        let client = ctx.meta.api_client();
        let ip = create_with_retry(ctx, data, || client.create_reserved_ipv6(&req))
            .await
            .map_err(|e| e.with_context("error creating reserved IPv6"))?;
        data.set_id(ip.ip);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_reserved_ipv6(data.id_str()).await;
        let Some(ip) = found(data, result)? else {
            return Ok(());
        };
        data.set("ip", ip.ip.as_str());
        data.set("region_slug", ip.region_slug.as_str());
        data.set_opt("droplet_id", ip.droplet_id());
        data.set_opt("reserved_at", ip.reserved_at.clone());
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let ip = data.id_str().to_string();
        if data.get("droplet_id").and_then(Value::as_int).is_some() {
            unassign_v6(client, ctx, &ip, data.timeout(Operation::Delete, ACTION_TIMEOUT)).await?;
        }
        log::info!("Deleting reserved IPv6 {ip}");
        client
            .delete_reserved_ipv6(&ip)
            .await
            .map_err(|e| e.with_context(format!("error deleting reserved IPv6 {ip}")))
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let ip = data.id_str().to_string();
        data.set("ip", ip);
        Ok(())
    }
}
