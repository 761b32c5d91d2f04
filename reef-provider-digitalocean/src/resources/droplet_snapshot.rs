//! droplet_snapshot - Point-in-time image of a droplet
//!
//! The snapshot action does not report the id of the image it produces.
//! After the action completes the droplet's snapshots are listed and the
//! newest one with the requested name, taken no earlier than the action
//! started, is adopted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use super::{Ctx, found, merge, required_int, required_str};
use crate::actions::{ACTION_TIMEOUT, wait_for_action};
use crate::api::actions::ActionRequest;
use crate::api::snapshots::Snapshot;
use crate::config::CombinedConfig;

pub struct DropletSnapshotType;

pub(crate) fn flatten_snapshot(snapshot: &Snapshot) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("id".into(), Value::from(snapshot.id.as_str()));
    attrs.insert("name".into(), Value::from(snapshot.name.as_str()));
    attrs.insert("regions".into(), Value::from(snapshot.regions.clone()));
    attrs.insert("size".into(), Value::from(snapshot.size_gigabytes));
    attrs.insert("min_disk_size".into(), Value::from(snapshot.min_disk_size));
    attrs.insert("created_at".into(), Value::from(snapshot.created_at.as_str()));
    attrs.insert("tags".into(), Value::from(snapshot.tags.clone()));
    attrs
}

pub(crate) fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

/// Newest snapshot named `name` created at or after `started_at`
pub(crate) fn pick_snapshot<'a>(
    snapshots: &'a [Snapshot],
    name: &str,
    started_at: Option<&str>,
) -> Option<&'a Snapshot> {
    let since = started_at.and_then(parse_time);
    snapshots
        .iter()
        .filter(|s| s.name == name)
        .filter_map(|s| parse_time(&s.created_at).map(|t| (t, s)))
        .filter(|(t, _)| since.is_none_or(|since| *t >= since))
        .max_by_key(|(t, _)| *t)
        .map(|(_, s)| s)
}

#[async_trait]
impl ResourceType<CombinedConfig> for DropletSnapshotType {
    fn name(&self) -> &'static str {
        "droplet_snapshot"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("droplet_snapshot")
            .attribute(
                AttributeSchema::new("droplet_id", AttributeType::Int)
                    .required()
                    .force_new()
                    .validate(Validator::NonZero),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::NotEmpty),
            )
            .attribute(AttributeSchema::new("regions", types::string_set()).computed())
            .attribute(AttributeSchema::new("size", AttributeType::Float).computed())
            .attribute(AttributeSchema::new("min_disk_size", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let droplet_id = required_int(data, "droplet_id")?;
        let name = required_str(data, "name")?.to_string();

        log::info!("Snapshotting droplet {droplet_id} as {name}");
        let req = ActionRequest {
            name: Some(name.clone()),
            ..ActionRequest::new("snapshot")
        };
        let action = client
            .droplet_action(droplet_id, &req)
            .await
            .map_err(|e| e.with_context(format!("error creating snapshot of droplet {droplet_id}")))?;
        let action = wait_for_action(client, &ctx.cancel, &action, data.timeout(Operation::Create, ACTION_TIMEOUT))
            .await?;

        let snapshots = client.list_droplet_snapshots(droplet_id).await?;
        let snapshot = pick_snapshot(&snapshots, &name, action.started_at.as_deref()).ok_or_else(|| {
            ProviderError::new(
                ErrorKind::NotFound,
                format!("snapshot '{name}' of droplet {droplet_id} not found after action {}", action.id),
            )
        })?;
        data.set_id(snapshot.id.clone());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_snapshot(data.id_str()).await;
        let Some(snapshot) = found(data, result)? else {
            return Ok(());
        };
        let mut attrs = flatten_snapshot(&snapshot);
        attrs.remove("id");
        attrs.remove("tags");
        if let Ok(droplet_id) = snapshot.resource_id.parse::<i64>() {
            attrs.insert("droplet_id".into(), Value::from(droplet_id));
        }
        merge(data, attrs);
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        log::info!("Deleting snapshot {}", data.id_str());
        ctx.meta
            .api_client()
            .delete_snapshot(data.id_str())
            .await
            .map_err(|e| e.with_context(format!("error deleting snapshot {}", data.id_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, name: &str, created_at: &str) -> Snapshot {
        Snapshot {
            id: id.to_string(),
            name: name.to_string(),
            created_at: created_at.to_string(),
            regions: vec!["nyc3".to_string()],
            resource_id: "100".to_string(),
            resource_type: "droplet".to_string(),
            min_disk_size: 25,
            size_gigabytes: 1.2,
            tags: Vec::new(),
        }
    }

    #[test]
    fn picks_newest_matching_snapshot_after_action_start() {
        let snapshots = vec![
            snapshot("1", "nightly", "2024-05-01T00:00:00Z"),
            snapshot("2", "nightly", "2024-05-02T00:00:10Z"),
            snapshot("3", "other", "2024-05-02T00:00:20Z"),
            snapshot("4", "nightly", "2024-05-02T00:00:05Z"),
        ];
        let picked = pick_snapshot(&snapshots, "nightly", Some("2024-05-02T00:00:00Z")).unwrap();
        assert_eq!(picked.id, "2");
    }

    #[test]
    fn older_snapshots_with_same_name_are_ignored() {
        let snapshots = vec![snapshot("1", "nightly", "2024-05-01T00:00:00Z")];
        assert!(pick_snapshot(&snapshots, "nightly", Some("2024-05-02T00:00:00Z")).is_none());
        assert_eq!(pick_snapshot(&snapshots, "nightly", None).unwrap().id, "1");
    }
}
