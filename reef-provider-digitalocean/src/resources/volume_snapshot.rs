//! volume_snapshot - Snapshot of a block storage volume

use std::collections::HashSet;

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use super::droplet_snapshot::flatten_snapshot;
use super::{Ctx, create_with_retry, found, merge, required_str};
use crate::api::snapshots::VolumeSnapshotCreateRequest;
use crate::config::CombinedConfig;

pub struct VolumeSnapshotType;

#[async_trait]
impl ResourceType<CombinedConfig> for VolumeSnapshotType {
    fn name(&self) -> &'static str {
        "volume_snapshot"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("volume_snapshot")
            .attribute(
                AttributeSchema::new("volume_id", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::NotEmpty),
            )
            .attribute(AttributeSchema::new("tags", types::string_set()))
            .attribute(AttributeSchema::new("regions", types::string_set()).computed())
            .attribute(AttributeSchema::new("size", AttributeType::Float).computed())
            .attribute(AttributeSchema::new("min_disk_size", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let volume_id = required_str(data, "volume_id")?.to_string();
        let req = VolumeSnapshotCreateRequest {
            name: required_str(data, "name")?.to_string(),
            tags: data.get_string_list("tags"),
        };
        log::info!("Snapshotting volume {volume_id} as {}", req.name);
        let client = ctx.meta.api_client();
        let snapshot = create_with_retry(ctx, data, || client.create_volume_snapshot(&volume_id, &req))
            .await
            .map_err(|e| e.with_context(format!("error creating snapshot of volume {volume_id}")))?;
        data.set_id(snapshot.id);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_snapshot(data.id_str()).await;
        let Some(snapshot) = found(data, result)? else {
            return Ok(());
        };
        let mut attrs = flatten_snapshot(&snapshot);
        attrs.remove("id");
        attrs.insert("volume_id".into(), Value::from(snapshot.resource_id.as_str()));
        merge(data, attrs);
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("tags") {
            let client = ctx.meta.api_client();
            let id = data.id_str().to_string();
            let old: HashSet<String> = data
                .old("tags")
                .and_then(Value::as_list)
                .unwrap_or(&[])
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            let new: HashSet<String> = data.get_string_list("tags").into_iter().collect();
            for tag in old.difference(&new) {
                client.untag_resource(tag, &id, "volume_snapshot").await?;
            }
            for tag in new.difference(&old) {
                client.tag_resource(tag, &id, "volume_snapshot").await?;
            }
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        log::info!("Deleting volume snapshot {}", data.id_str());
        ctx.meta
            .api_client()
            .delete_snapshot(data.id_str())
            .await
            .map_err(|e| e.with_context(format!("error deleting volume snapshot {}", data.id_str())))
    }
}
