//! Compute data sources: droplets, SSH keys, droplet snapshots

use async_trait::async_trait;
use regex::Regex;
use reef_core::datalist::DataListConfig;
use reef_core::provider::{Context, DataSource, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, ResourceData};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::{lookup_schema, populate, single};
use crate::api::droplets::Droplet;
use crate::api::keys::SshKey;
use crate::api::snapshots::Snapshot;
use crate::config::CombinedConfig;
use crate::resources::Ctx;
use crate::resources::droplet::flatten_droplet;
use crate::resources::droplet_snapshot::{flatten_snapshot, parse_time};
use crate::resources::ssh_key::flatten_ssh_key;
use crate::utils::lowercase;

fn droplet_fields() -> Vec<AttributeSchema> {
    let string = |name: &str| AttributeSchema::new(name, AttributeType::String);
    let int = |name: &str| AttributeSchema::new(name, AttributeType::Int);
    let boolean = |name: &str| AttributeSchema::new(name, AttributeType::Bool);
    vec![
        int("id"),
        string("name"),
        string("urn"),
        string("status"),
        string("region"),
        string("size"),
        string("image"),
        int("memory"),
        int("vcpus"),
        int("disk"),
        AttributeSchema::new("price_hourly", AttributeType::Float),
        AttributeSchema::new("price_monthly", AttributeType::Float),
        boolean("locked"),
        boolean("backups"),
        boolean("monitoring"),
        boolean("ipv6"),
        string("ipv4_address"),
        string("ipv4_address_private"),
        string("ipv6_address"),
        string("vpc_uuid"),
        string("created_at"),
        AttributeSchema::new("tags", types::string_set()),
    ]
}

fn ssh_key_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::Int),
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("public_key", AttributeType::String),
        AttributeSchema::new("fingerprint", AttributeType::String),
    ]
}

fn snapshot_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::String),
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("regions", types::string_set()),
        AttributeSchema::new("size", AttributeType::Float),
        AttributeSchema::new("min_disk_size", AttributeType::Int),
        AttributeSchema::new("created_at", AttributeType::String),
        AttributeSchema::new("tags", types::string_set()),
    ]
}

pub struct DropletDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for DropletDataSource {
    fn name(&self) -> &'static str {
        "droplet"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "droplet",
            vec![
                AttributeSchema::new("id", AttributeType::Int)
                    .conflicts_with("name")
                    .conflicts_with("tag"),
                AttributeSchema::new("name", AttributeType::String).conflicts_with("tag"),
                AttributeSchema::new("tag", AttributeType::String),
            ],
            droplet_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let droplet = if let Some(id) = data.get_int("id").filter(|id| *id > 0) {
            client
                .get_droplet(id)
                .await
                .map_err(|e| e.with_context(format!("error retrieving droplet {id}")))?
        } else if let Some(name) = data.get_non_empty_str("name") {
            let matches = client.list_droplets().await?.into_iter().filter(|d| d.name == name).collect();
            single(matches, &format!("droplet named {name}"))?
        } else if let Some(tag) = data.get_non_empty_str("tag") {
            let matches = client
                .list_droplets()
                .await?
                .into_iter()
                .filter(|d| d.tags.iter().any(|t| t == tag))
                .collect();
            single(matches, &format!("droplet tagged {tag}"))?
        } else {
            return Err(ProviderError::validation("one of `id`, `name` or `tag` must be set"));
        };
        populate(data, droplet.id.to_string(), flatten_droplet(&droplet));
        Ok(())
    }
}

pub struct SshKeyDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for SshKeyDataSource {
    fn name(&self) -> &'static str {
        "ssh_key"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "ssh_key",
            vec![AttributeSchema::new("name", AttributeType::String).required()],
            ssh_key_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let name = data.get_str("name").unwrap_or_default().to_string();
        let keys = ctx.meta.api_client().list_ssh_keys().await?;
        let key = single(
            keys.into_iter().filter(|k| k.name == name).collect(),
            &format!("SSH key named {name}"),
        )?;
        populate(data, key.id.to_string(), flatten_ssh_key(&key));
        Ok(())
    }
}

/// Snapshots matching a droplet snapshot lookup
pub(crate) fn matching_snapshots(
    snapshots: Vec<Snapshot>,
    name: Option<&str>,
    name_regex: Option<&Regex>,
    region: Option<&str>,
) -> Vec<Snapshot> {
    snapshots
        .into_iter()
        .filter(|s| name.is_none_or(|n| s.name == n))
        .filter(|s| name_regex.is_none_or(|re| re.is_match(&s.name)))
        .filter(|s| region.is_none_or(|r| s.regions.iter().any(|sr| sr == r)))
        .collect()
}

pub struct DropletSnapshotDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for DropletSnapshotDataSource {
    fn name(&self) -> &'static str {
        "droplet_snapshot"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "droplet_snapshot",
            vec![
                AttributeSchema::new("name", AttributeType::String).conflicts_with("name_regex"),
                AttributeSchema::new("name_regex", AttributeType::String),
                AttributeSchema::new("region", AttributeType::String).state_func(lowercase),
                AttributeSchema::new("most_recent", AttributeType::Bool).with_default(false),
            ],
            snapshot_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let name = data.get_non_empty_str("name");
        let name_regex = data
            .get_non_empty_str("name_regex")
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ProviderError::validation(format!("invalid name_regex '{pattern}': {e}")).with_attribute("name_regex")
                })
            })
            .transpose()?;
        if name.is_none() && name_regex.is_none() {
            return Err(ProviderError::validation("one of `name` or `name_regex` must be set"));
        }

        let snapshots = ctx.meta.api_client().list_all_droplet_snapshots().await?;
        let mut matches = matching_snapshots(snapshots, name, name_regex.as_ref(), data.get_non_empty_str("region"));
        if matches.len() > 1 && data.get_bool("most_recent") == Some(true) {
            matches.sort_by_key(|s| parse_time(&s.created_at));
            matches = matches.pop().into_iter().collect();
        }
        let snapshot = single(matches, "droplet snapshot").map_err(|e| {
            if e.is_not_found() {
                e
            } else {
                e.with_context("set `most_recent` to pick the newest of several matches")
            }
        })?;
        populate(data, snapshot.id.clone(), flatten_snapshot(&snapshot));
        Ok(())
    }
}

pub struct DropletsList;

#[async_trait]
impl DataListConfig<CombinedConfig> for DropletsList {
    type Record = Droplet;

    fn name(&self) -> &'static str {
        "droplets"
    }

    fn result_attribute_name(&self) -> &'static str {
        "droplets"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        droplet_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<Droplet>> {
        ctx.meta.api_client().list_droplets().await
    }

    fn flatten_record(&self, record: &Droplet, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_droplet(record))
    }
}

pub struct SshKeysList;

#[async_trait]
impl DataListConfig<CombinedConfig> for SshKeysList {
    type Record = SshKey;

    fn name(&self) -> &'static str {
        "ssh_keys"
    }

    fn result_attribute_name(&self) -> &'static str {
        "ssh_keys"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        ssh_key_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<SshKey>> {
        ctx.meta.api_client().list_ssh_keys().await
    }

    fn flatten_record(&self, record: &SshKey, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_ssh_key(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, region: &str) -> Snapshot {
        Snapshot {
            id: format!("{name}-{region}"),
            name: name.to_string(),
            created_at: "2024-05-01T00:00:00Z".to_string(),
            regions: vec![region.to_string()],
            resource_id: "1".to_string(),
            resource_type: "droplet".to_string(),
            min_disk_size: 25,
            size_gigabytes: 0.5,
            tags: Vec::new(),
        }
    }

    #[test]
    fn snapshots_match_by_regex_and_region() {
        let snapshots = vec![
            snapshot("web-1", "nyc3"),
            snapshot("web-2", "fra1"),
            snapshot("db-1", "nyc3"),
        ];
        let re = Regex::new("^web-").unwrap();
        let matched = matching_snapshots(snapshots, None, Some(&re), Some("nyc3"));
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "web-1-nyc3");
    }

    #[test]
    fn droplet_lookup_keys_conflict() {
        let schema = DropletDataSource.schema();
        let attrs = [
            ("id".to_string(), reef_core::resource::Value::from(1i64)),
            ("name".to_string(), reef_core::resource::Value::from("web")),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_err());
    }
}
