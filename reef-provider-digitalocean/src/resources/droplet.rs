//! droplet - Virtual machine
//!
//! Create waits for the droplet to become `active`. In-place updates are
//! carried out as droplet actions (rename, resize, backups, IPv6), each
//! waited to completion; tags are reconciled through the tags API.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reef_core::differ::ResourceDiff;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};
use reef_core::waiter::StateChangeConf;

use super::{Ctx, create_with_retry, found, int_id, merge, required_str};
use crate::actions::{ACTION_TIMEOUT, wait_for_action};
use crate::api::actions::ActionRequest;
use crate::api::droplets::{Droplet, DropletCreateRequest};
use crate::config::CombinedConfig;
use crate::utils::lowercase;

const DROPLET_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const STATUSES: [&str; 4] = ["new", "active", "off", "archive"];

pub struct DropletType;

pub(crate) fn flatten_droplet(droplet: &Droplet) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("id".into(), Value::from(droplet.id));
    attrs.insert("name".into(), Value::from(droplet.name.as_str()));
    attrs.insert("urn".into(), Value::from(droplet.urn()));
    attrs.insert("status".into(), Value::from(droplet.status.as_str()));
    attrs.insert("size".into(), Value::from(droplet.size_slug.as_str()));
    attrs.insert("memory".into(), Value::from(droplet.memory));
    attrs.insert("vcpus".into(), Value::from(droplet.vcpus));
    attrs.insert("disk".into(), Value::from(droplet.disk));
    attrs.insert("locked".into(), Value::from(droplet.locked));
    attrs.insert("created_at".into(), Value::from(droplet.created_at.as_str()));
    attrs.insert("tags".into(), Value::from(droplet.tags.clone()));
    attrs.insert("backups".into(), Value::from(droplet.has_feature("backups")));
    attrs.insert("monitoring".into(), Value::from(droplet.has_feature("monitoring")));
    attrs.insert("ipv6".into(), Value::from(droplet.public_ipv6().is_some()));
    if let Some(region) = &droplet.region {
        attrs.insert("region".into(), Value::from(region.slug.as_str()));
    }
    if let Some(size) = &droplet.size {
        attrs.insert("price_hourly".into(), Value::from(size.price_hourly));
        attrs.insert("price_monthly".into(), Value::from(size.price_monthly));
    }
    if let Some(image) = &droplet.image {
        let image = image.slug.clone().unwrap_or_else(|| image.id.to_string());
        attrs.insert("image".into(), Value::from(image));
    }
    if let Some(vpc) = droplet.vpc_uuid.as_deref().filter(|v| !v.is_empty()) {
        attrs.insert("vpc_uuid".into(), Value::from(vpc));
    }
    let ipv6 = droplet.public_ipv6().map(str::to_lowercase);
    let addresses = [
        ("ipv4_address", droplet.public_ipv4()),
        ("ipv4_address_private", droplet.private_ipv4()),
        ("ipv6_address", ipv6.as_deref()),
    ];
    for (key, address) in addresses {
        if let Some(address) = address {
            attrs.insert(key.into(), Value::from(address));
        }
    }
    attrs
}

async fn wait_for_status(ctx: &Ctx, id: i64, target: &str, timeout: Duration) -> ProviderResult<()> {
    let client = ctx.meta.api_client();
    let pending: Vec<&str> = STATUSES.iter().copied().filter(|s| *s != target).collect();
    StateChangeConf::new(&pending, &[target], timeout)
        .with_delay(Duration::from_secs(1))
        .with_min_timeout(Duration::from_secs(3))
        .wait_for_state(&ctx.cancel, || async move {
            let droplet = client.get_droplet(id).await?;
            let status = droplet.status.clone();
            Ok(Some((droplet, status)))
        })
        .await
        .map_err(|e| e.with_context(format!("error waiting for droplet {id} to become {target}")))?;
    Ok(())
}

async fn run_action(ctx: &Ctx, id: i64, req: ActionRequest, timeout: Duration) -> ProviderResult<()> {
    let client = ctx.meta.api_client();
    log::info!("Running {} on droplet {id}", req.action_type);
    let action = client
        .droplet_action(id, &req)
        .await
        .map_err(|e| e.with_context(format!("error running {} on droplet {id}", req.action_type)))?;
    wait_for_action(client, &ctx.cancel, &action, timeout).await?;
    Ok(())
}

async fn resize(ctx: &Ctx, data: &ResourceData, id: i64, timeout: Duration) -> ProviderResult<()> {
    let size = required_str(data, "size")?.to_string();
    let was_active = data.get_str("status") == Some("active");
    if was_active {
        let stop = if data.get_bool("graceful_shutdown").unwrap_or(false) { "shutdown" } else { "power_off" };
        run_action(ctx, id, ActionRequest::new(stop), timeout).await?;
    }
    let req = ActionRequest {
        size: Some(size),
        disk: Some(data.get_bool("resize_disk").unwrap_or(true)),
        ..ActionRequest::new("resize")
    };
    run_action(ctx, id, req, timeout).await?;
    if was_active {
        run_action(ctx, id, ActionRequest::new("power_on"), timeout).await?;
        wait_for_status(ctx, id, "active", timeout).await?;
    }
    Ok(())
}

async fn reconcile_tags(ctx: &Ctx, data: &ResourceData, id: i64) -> ProviderResult<()> {
    let client = ctx.meta.api_client();
    let old: HashSet<String> = data
        .old("tags")
        .and_then(Value::as_list)
        .unwrap_or(&[])
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    let new: HashSet<String> = data.get_string_list("tags").into_iter().collect();
    let droplet_id = id.to_string();

    for tag in old.difference(&new) {
        log::debug!("Removing tag {tag} from droplet {id}");
        client.untag_resource(tag, &droplet_id, "droplet").await?;
    }
    for tag in new.difference(&old) {
        log::debug!("Adding tag {tag} to droplet {id}");
        client.tag_resource(tag, &droplet_id, "droplet").await?;
    }
    Ok(())
}

#[async_trait]
impl ResourceType<CombinedConfig> for DropletType {
    fn name(&self) -> &'static str {
        "droplet"
    }

    fn schema(&self) -> ResourceSchema {
        let computed = |name: &str, t: AttributeType| AttributeSchema::new(name, t).computed();
        ResourceSchema::new("droplet")
            .with_description("A DigitalOcean droplet")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .required()
                    .force_new()
                    .state_func(lowercase),
            )
            .attribute(
                AttributeSchema::new("size", AttributeType::String)
                    .required()
                    .state_func(lowercase),
            )
            .attribute(AttributeSchema::new("image", AttributeType::String).required().force_new())
            .attribute(AttributeSchema::new("ssh_keys", types::string_set()).force_new())
            .attribute(AttributeSchema::new("backups", AttributeType::Bool).with_default(false))
            .attribute(
                AttributeSchema::new("monitoring", AttributeType::Bool)
                    .with_default(false)
                    .force_new(),
            )
            .attribute(AttributeSchema::new("ipv6", AttributeType::Bool).with_default(false))
            .attribute(
                AttributeSchema::new("vpc_uuid", AttributeType::String)
                    .optional_computed()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("user_data", AttributeType::String)
                    .force_new()
                    .sensitive(),
            )
            .attribute(AttributeSchema::new("tags", types::string_set()).optional_computed())
            .attribute(
                AttributeSchema::new("resize_disk", AttributeType::Bool)
                    .with_default(true)
                    .with_description("Grow the disk on resize; a grown disk cannot shrink again"),
            )
            .attribute(AttributeSchema::new("graceful_shutdown", AttributeType::Bool).with_default(false))
            .attributes([
                computed("ipv4_address", AttributeType::String),
                computed("ipv4_address_private", AttributeType::String),
                computed("ipv6_address", AttributeType::String),
                computed("status", AttributeType::String),
                computed("urn", AttributeType::String),
                computed("memory", AttributeType::Int),
                computed("vcpus", AttributeType::Int),
                computed("disk", AttributeType::Int),
                computed("price_hourly", AttributeType::Float),
                computed("price_monthly", AttributeType::Float),
                computed("locked", AttributeType::Bool),
                computed("created_at", AttributeType::String),
            ])
    }

    fn customize_diff(&self, diff: &mut ResourceDiff) -> ProviderResult<()> {
        // IPv6 can be enabled in place but never disabled
        let was_enabled = diff.old("ipv6").and_then(Value::as_bool) == Some(true);
        let now_enabled = diff.get("ipv6").and_then(Value::as_bool) == Some(true);
        if was_enabled && !now_enabled {
            diff.force_new("ipv6");
        }
        Ok(())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let req = DropletCreateRequest {
            name: required_str(data, "name")?.to_string(),
            region: required_str(data, "region")?.to_string(),
            size: required_str(data, "size")?.to_string(),
            image: required_str(data, "image")?.to_string(),
            ssh_keys: data.get_string_list("ssh_keys"),
            backups: data.get_bool("backups").unwrap_or(false),
            ipv6: data.get_bool("ipv6").unwrap_or(false),
            monitoring: data.get_bool("monitoring").unwrap_or(false),
            vpc_uuid: data.get_non_empty_str("vpc_uuid").map(str::to_string),
            user_data: data.get_non_empty_str("user_data").map(str::to_string),
            tags: data.get_string_list("tags"),
        };
        log::info!("Creating droplet {} in {}", req.name, req.region);
        let client = ctx.meta.api_client();
        let droplet = create_with_retry(ctx, data, || client.create_droplet(&req))
            .await
            .map_err(|e| e.with_context("error creating droplet"))?;
        data.set_id(droplet.id.to_string());

        wait_for_status(ctx, droplet.id, "active", data.timeout(Operation::Create, DROPLET_TIMEOUT)).await?;
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let id = int_id(data)?;
        let result = ctx.meta.api_client().get_droplet(id).await;
        let Some(droplet) = found(data, result)? else {
            return Ok(());
        };
        let mut attrs = flatten_droplet(&droplet);
        attrs.remove("id");
        // Images can be retired after creation; keep what was configured
        if data.get("image").is_some() {
            attrs.remove("image");
        }
        for key in ["ipv4_address", "ipv4_address_private", "ipv6_address", "vpc_uuid"] {
            if !attrs.contains_key(key) {
                data.remove(key);
            }
        }
        merge(data, attrs);
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let id = int_id(data)?;
        let timeout = data.timeout(Operation::Update, ACTION_TIMEOUT);

        if data.has_change("name") {
            let req = ActionRequest {
                name: Some(required_str(data, "name")?.to_string()),
                ..ActionRequest::new("rename")
            };
            run_action(ctx, id, req, timeout).await?;
        }
        if data.has_change("size") {
            resize(ctx, data, id, timeout).await?;
        }
        if data.has_change("backups") {
            let action = if data.get_bool("backups").unwrap_or(false) { "enable_backups" } else { "disable_backups" };
            run_action(ctx, id, ActionRequest::new(action), timeout).await?;
        }
        if data.has_change("ipv6") && data.get_bool("ipv6").unwrap_or(false) {
            run_action(ctx, id, ActionRequest::new("enable_ipv6"), timeout).await?;
        }
        if data.has_change("tags") {
            reconcile_tags(ctx, data, id).await?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let id = int_id(data)?;
        log::info!("Deleting droplet {id}");
        client
            .delete_droplet(id)
            .await
            .map_err(|e| e.with_context(format!("error deleting droplet {id}")))?;

        StateChangeConf::new(&STATUSES, &[], data.timeout(Operation::Delete, DROPLET_TIMEOUT))
            .with_min_timeout(Duration::from_secs(3))
            .wait_for_state(&ctx.cancel, || async move {
                let droplet = client.get_droplet(id).await?;
                Ok(Some(((), droplet.status)))
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for droplet {id} to be destroyed")))?;
        Ok(())
    }
}
