//! reserved_ip_assignment / reserved_ipv6_assignment - Binding of a reserved
//! address to a droplet
//!
//! The binding has no remote identity of its own; its id is synthesised from
//! the address and droplet plus a random suffix. Import accepts
//! `<ip>,<droplet_id>`.

use std::time::Duration;

use async_trait::async_trait;
use reef_core::composite;
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Operation, ResourceData};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::reserved_ip::{assign, unassign};
use super::reserved_ipv6::unassign_v6;
use super::{Ctx, required_int, required_str};
use crate::actions::{ACTION_TIMEOUT, wait_for_action};
use crate::config::CombinedConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn kind(self) -> &'static str {
        match self {
            Family::V4 => "reserved_ip_assignment",
            Family::V6 => "reserved_ipv6_assignment",
        }
    }

    fn ip_attribute(self) -> &'static str {
        match self {
            Family::V4 => "ip_address",
            Family::V6 => "ip",
        }
    }

    fn validator(self) -> Validator {
        match self {
            Family::V4 => Validator::Ipv4Address,
            Family::V6 => Validator::Ipv6Address,
        }
    }

    fn import_usage(self) -> &'static str {
        match self {
            Family::V4 => "must use the reserved IP and the droplet ID joined with a comma, e.g. 192.0.2.1,12345",
            Family::V6 => "must use the reserved IPv6 and the droplet ID joined with a comma, e.g. 2001:db8::1,12345",
        }
    }

    fn schema(self) -> ResourceSchema {
        ResourceSchema::new(self.kind())
            .attribute(
                AttributeSchema::new(self.ip_attribute(), AttributeType::String)
                    .required()
                    .force_new()
                    .validate(self.validator()),
            )
            .attribute(
                AttributeSchema::new("droplet_id", AttributeType::Int)
                    .required()
                    .force_new()
                    .validate(Validator::NonZero),
            )
    }

    /// Droplet currently holding `ip`, if any
    async fn current_droplet(self, ctx: &Ctx, ip: &str) -> ProviderResult<Option<i64>> {
        let client = ctx.meta.api_client();
        match self {
            Family::V4 => Ok(client.get_reserved_ip(ip).await?.droplet_id()),
            Family::V6 => Ok(client.get_reserved_ipv6(ip).await?.droplet_id()),
        }
    }

    async fn assign(self, ctx: &Ctx, ip: &str, droplet_id: i64, timeout: Duration) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        match self {
            Family::V4 => assign(client, ctx, ip, droplet_id, timeout).await,
            Family::V6 => {
                log::info!("Assigning reserved IPv6 {ip} to droplet {droplet_id}");
                let action = client
                    .assign_reserved_ipv6(ip, droplet_id)
                    .await
                    .map_err(|e| e.with_context(format!("error assigning reserved IPv6 {ip} to droplet {droplet_id}")))?;
                wait_for_action(client, &ctx.cancel, &action, timeout).await.map(|_| ())
            }
        }
    }

    async fn unassign(self, ctx: &Ctx, ip: &str, timeout: Duration) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        match self {
            Family::V4 => unassign(client, ctx, ip, timeout).await,
            Family::V6 => unassign_v6(client, ctx, ip, timeout).await,
        }
    }
}

/// `<ip>,<droplet_id>-<suffix>`
fn assignment_id(ip: &str, droplet_id: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{},{droplet_id}-{}", ip, &suffix[..12])
}

async fn create(family: Family, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
    let ip = required_str(data, family.ip_attribute())?.to_string();
    let droplet_id = required_int(data, "droplet_id")?;
    family
        .assign(ctx, &ip, droplet_id, data.timeout(Operation::Create, ACTION_TIMEOUT))
        .await?;
    data.set_id(assignment_id(&ip, droplet_id));
    read(family, ctx, data).await
}

async fn read(family: Family, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
    let ip = required_str(data, family.ip_attribute())?.to_string();
    let droplet_id = required_int(data, "droplet_id")?;
    match family.current_droplet(ctx, &ip).await {
        Ok(Some(current)) if current == droplet_id => Ok(()),
        Ok(current) => {
            log::warn!(
                "{} is assigned to {:?} rather than droplet {droplet_id}, removing from state",
                ip,
                current
            );
            data.clear_id();
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            log::warn!("{} not found, removing from state", data.resource_id());
            data.clear_id();
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn delete(family: Family, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
    let ip = required_str(data, family.ip_attribute())?.to_string();
    let droplet_id = required_int(data, "droplet_id")?;
    match family.current_droplet(ctx, &ip).await? {
        Some(current) if current == droplet_id => {
            family
                .unassign(ctx, &ip, data.timeout(Operation::Delete, ACTION_TIMEOUT))
                .await
        }
        other => {
            log::info!("{ip} is no longer assigned to droplet {droplet_id} ({other:?}), nothing to unassign");
            Ok(())
        }
    }
}

fn import(family: Family, data: &mut ResourceData) -> ProviderResult<()> {
    let (ip, droplet) = composite::split_pair(data.id_str(), family.import_usage())?;
    let droplet_id: i64 = droplet.parse().map_err(|_| {
        ProviderError::new(
            ErrorKind::InvalidCompositeId,
            format!("{} (droplet ID '{droplet}' is not numeric)", family.import_usage()),
        )
    })?;
    data.set(family.ip_attribute(), ip.as_str());
    data.set("droplet_id", droplet_id);
    data.set_id(assignment_id(&ip, droplet_id));
    Ok(())
}

pub struct ReservedIpAssignmentType;

#[async_trait]
impl ResourceType<CombinedConfig> for ReservedIpAssignmentType {
    fn name(&self) -> &'static str {
        Family::V4.kind()
    }

    fn schema(&self) -> ResourceSchema {
        Family::V4.schema()
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        create(Family::V4, ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        read(Family::V4, ctx, data).await
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        read(Family::V4, ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        delete(Family::V4, ctx, data).await
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import(Family::V4, data)
    }
}

pub struct ReservedIpv6AssignmentType;

#[async_trait]
impl ResourceType<CombinedConfig> for ReservedIpv6AssignmentType {
    fn name(&self) -> &'static str {
        Family::V6.kind()
    }

    fn schema(&self) -> ResourceSchema {
        Family::V6.schema()
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        create(Family::V6, ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        read(Family::V6, ctx, data).await
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        read(Family::V6, ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        delete(Family::V6, ctx, data).await
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import(Family::V6, data)
    }
}
