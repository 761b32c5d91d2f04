//! reserved_ip - Reserved IPv4 address, optionally assigned to a droplet

use std::time::Duration;

use async_trait::async_trait;
use reef_core::differ::ResourceDiff;
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};
use reef_core::waiter::StateChangeConf;

use super::{Ctx, create_with_retry, found, merge};
use crate::actions::{ACTION_TIMEOUT, wait_for_action};
use crate::api::Client;
use crate::api::reserved_ips::{ReservedIp, ReservedIpCreateRequest};
use crate::config::CombinedConfig;
use crate::utils::lowercase;

pub struct ReservedIpType;

pub(crate) fn flatten_reserved_ip(ip: &ReservedIp) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("ip_address".into(), Value::from(ip.ip.as_str()));
    attrs.insert("urn".into(), Value::from(ip.urn()));
    if let Some(region) = &ip.region {
        attrs.insert("region".into(), Value::from(region.slug.as_str()));
    }
    if let Some(droplet_id) = ip.droplet_id() {
        attrs.insert("droplet_id".into(), Value::from(droplet_id));
    }
    attrs
}

/// Unassign `ip`, tolerating an address that is already unassigned
pub(crate) async fn unassign(client: &Client, ctx: &Ctx, ip: &str, timeout: Duration) -> ProviderResult<()> {
    log::info!("Unassigning reserved IP {ip}");
    match client.unassign_reserved_ip(ip).await {
        Ok(action) => {
            wait_for_action(client, &ctx.cancel, &action, timeout).await?;
            Ok(())
        }
        Err(e) if e.status() == Some(422) => {
            log::debug!("Reserved IP {ip} was not assigned: {e}");
            Ok(())
        }
        Err(e) => Err(e.with_context(format!("error unassigning reserved IP {ip}"))),
    }
}

pub(crate) async fn assign(
    client: &Client,
    ctx: &Ctx,
    ip: &str,
    droplet_id: i64,
    timeout: Duration,
) -> ProviderResult<()> {
    log::info!("Assigning reserved IP {ip} to droplet {droplet_id}");
    let action = client
        .assign_reserved_ip(ip, droplet_id)
        .await
        .map_err(|e| e.with_context(format!("error assigning reserved IP {ip} to droplet {droplet_id}")))?;
    wait_for_action(client, &ctx.cancel, &action, timeout).await?;
    Ok(())
}

#[async_trait]
impl ResourceType<CombinedConfig> for ReservedIpType {
    fn name(&self) -> &'static str {
        "reserved_ip"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("reserved_ip")
            .with_description("A reserved IPv4 address")
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .state_func(lowercase),
            )
            .attribute(
                AttributeSchema::new("droplet_id", AttributeType::Int)
                    .optional_computed()
                    .validate(Validator::NonZero),
            )
            .attribute(
                AttributeSchema::new("ip_address", AttributeType::String)
                    .optional_computed()
                    .force_new()
                    .validate(Validator::Ipv4Address),
            )
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed())
    }

    fn customize_diff(&self, diff: &mut ResourceDiff) -> ProviderResult<()> {
        if diff.is_create() && diff.get("region").is_none() && diff.get("droplet_id").is_none() {
            return Err(ProviderError::validation("one of `region` or `droplet_id` must be set").with_attribute("region"));
        }
        Ok(())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let req = ReservedIpCreateRequest {
            // The region is implied by the droplet when one is given
            region: match data.get_int("droplet_id") {
                Some(_) => None,
                None => data.get_non_empty_str("region").map(str::to_string),
            },
            droplet_id: data.get_int("droplet_id"),
            project_id: None,
        };
        log::info!("Creating reserved IP");
        let ip = create_with_retry(ctx, data, || client.create_reserved_ip(&req))
            .await
            .map_err(|e| e.with_context("error creating reserved IP"))?;
        data.set_id(ip.ip.clone());

        if let Some(droplet_id) = req.droplet_id {
            let timeout = data.timeout(Operation::Create, ACTION_TIMEOUT);
            let address = ip.ip.clone();
            StateChangeConf::new(&["unassigned"], &["assigned"], timeout)
                .with_min_timeout(Duration::from_secs(3))
                .wait_for_state(&ctx.cancel, || {
                    let address = address.clone();
                    async move {
                        let ip = client.get_reserved_ip(&address).await?;
                        let state = if ip.droplet_id() == Some(droplet_id) { "assigned" } else { "unassigned" };
                        Ok(Some(((), state.to_string())))
                    }
                })
                .await
                .map_err(|e| e.with_context(format!("error waiting for reserved IP {address} assignment")))?;
        }
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_reserved_ip(data.id_str()).await;
        if let Some(ip) = found(data, result)? {
            if ip.droplet_id().is_none() {
                data.remove("droplet_id");
            }
            merge(data, flatten_reserved_ip(&ip));
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("droplet_id") {
            let client = ctx.meta.api_client();
            let ip = data.id_str().to_string();
            let timeout = data.timeout(Operation::Update, ACTION_TIMEOUT);
            // Assigning moves the address off its current droplet
            match data.get_int("droplet_id") {
                Some(droplet_id) => assign(client, ctx, &ip, droplet_id, timeout).await?,
                None => unassign(client, ctx, &ip, timeout).await?,
            }
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let ip = data.id_str().to_string();
        if data.get_int("droplet_id").is_some() {
            let timeout = data.timeout(Operation::Delete, ACTION_TIMEOUT);
            unassign(client, ctx, &ip, timeout).await?;
        }
        log::info!("Deleting reserved IP {ip}");
        client
            .delete_reserved_ip(&ip)
            .await
            .map_err(|e| e.with_context(format!("error deleting reserved IP {ip}")))
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let ip = data.id_str().to_string();
        data.set("ip_address", ip);
        Ok(())
    }
}
