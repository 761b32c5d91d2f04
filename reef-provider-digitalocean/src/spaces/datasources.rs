//! Spaces data sources

use async_trait::async_trait;
use reef_core::datalist::DataListConfig;
use reef_core::provider::{Context, DataSource, ErrorKind, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use super::bucket_policy::get_policy;
use super::key::{flatten_spaces_key, grant_fields};
use super::{REGIONS, bucket_exists, client_for, endpoint_host, s3_error};
use crate::api::spaces_keys::SpacesKey;
use crate::config::CombinedConfig;
use crate::resources::{Ctx, required_str};
use crate::utils::lowercase;

const MAX_OBJECT_KEYS: i64 = 1000;

fn lookup_region() -> AttributeSchema {
    AttributeSchema::new("region", AttributeType::String)
        .required()
        .state_func(lowercase)
        .validate(Validator::one_of(&REGIONS))
}

fn bucket_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("region", AttributeType::String),
        AttributeSchema::new("urn", AttributeType::String),
        AttributeSchema::new("bucket_domain_name", AttributeType::String),
        AttributeSchema::new("endpoint", AttributeType::String),
    ]
}

/// A bucket as seen through one regional endpoint
pub struct BucketRecord {
    name: String,
    region: String,
    host: String,
}

fn flatten_bucket(bucket: &BucketRecord) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), Value::from(bucket.name.as_str()));
    attrs.insert("region".into(), Value::from(bucket.region.as_str()));
    attrs.insert("urn".into(), Value::from(format!("do:space:{}", bucket.name)));
    attrs.insert(
        "bucket_domain_name".into(),
        Value::from(format!("{}.{}", bucket.name, bucket.host)),
    );
    attrs.insert("endpoint".into(), Value::from(bucket.host.as_str()));
    attrs
}

fn missing_bucket(bucket: &str) -> ProviderError {
    ProviderError::new(ErrorKind::NotFound, format!("bucket '{bucket}' does not exist")).with_attribute("bucket")
}

// ====================
// spaces_bucket
// ====================

pub struct BucketDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for BucketDataSource {
    fn name(&self) -> &'static str {
        "spaces_bucket"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(lookup_region())
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed())
            .attribute(AttributeSchema::new("bucket_domain_name", AttributeType::String).computed())
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed())
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let name = required_str(data, "name")?.to_string();
        if !bucket_exists(&client, &name).await? {
            return Err(missing_bucket(&name).with_attribute("name"));
        }
        let region = required_str(data, "region")?.to_string();
        let record = BucketRecord {
            host: endpoint_host(&ctx.meta, &region),
            name: name.clone(),
            region,
        };
        for (key, value) in flatten_bucket(&record) {
            data.set(key, value);
        }
        data.set_id(name);
        Ok(())
    }
}

// ====================
// spaces_bucket_policy
// ====================

pub struct BucketPolicyDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for BucketPolicyDataSource {
    fn name(&self) -> &'static str {
        "spaces_bucket_policy"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket_policy")
            .attribute(lookup_region())
            .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
            .attribute(AttributeSchema::new("policy", AttributeType::String).computed())
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = required_str(data, "bucket")?.to_string();
        if !bucket_exists(&client, &bucket).await? {
            return Err(missing_bucket(&bucket));
        }
        let policy = get_policy(&client, &bucket).await?.unwrap_or_default();
        data.set("policy", policy);
        data.set_id(format!("bucket-policy-{bucket}"));
        Ok(())
    }
}

// ====================
// spaces_bucket_objects
// ====================

pub struct BucketObjectsDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for BucketObjectsDataSource {
    fn name(&self) -> &'static str {
        "spaces_bucket_objects"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket_objects")
            .with_description("Object keys in a bucket, optionally under a prefix")
            .attribute(lookup_region())
            .attribute(AttributeSchema::new("bucket", AttributeType::String).required())
            .attribute(AttributeSchema::new("prefix", AttributeType::String))
            .attribute(AttributeSchema::new("delimiter", AttributeType::String))
            .attribute(
                AttributeSchema::new("max_keys", AttributeType::Int)
                    .with_default(MAX_OBJECT_KEYS)
                    .validate(Validator::IntAtLeast(1)),
            )
            .attribute(AttributeSchema::new("keys", types::string_list()).computed())
            .attribute(AttributeSchema::new("common_prefixes", types::string_list()).computed())
            .attribute(AttributeSchema::new("owners", types::string_list()).computed())
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = required_str(data, "bucket")?.to_string();
        let prefix = data.get_non_empty_str("prefix").map(str::to_string);
        let delimiter = data.get_non_empty_str("delimiter").map(str::to_string);
        let max_keys = data.get_int("max_keys").unwrap_or(MAX_OBJECT_KEYS).max(1) as usize;

        let mut keys = Vec::new();
        let mut common_prefixes = Vec::new();
        let mut owners = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let remaining = max_keys - keys.len();
            let page = client
                .list_objects_v2()
                .bucket(&bucket)
                .set_prefix(prefix.clone())
                .set_delimiter(delimiter.clone())
                .max_keys(remaining.min(MAX_OBJECT_KEYS as usize) as i32)
                .fetch_owner(true)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| s3_error(e, &format!("Failed to list objects of bucket {bucket}")))?;

            for object in page.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
                if let Some(owner) = object.owner().and_then(|o| o.id()) {
                    owners.push(owner.to_string());
                }
            }
            common_prefixes.extend(page.common_prefixes().iter().filter_map(|p| p.prefix().map(str::to_string)));

            match page.next_continuation_token() {
                Some(next) if page.is_truncated() == Some(true) && keys.len() < max_keys => {
                    token = Some(next.to_string());
                }
                _ => break,
            }
        }

        log::debug!("[spaces] listed {} object(s) in {bucket}", keys.len());
        data.set("keys", keys);
        data.set("common_prefixes", common_prefixes);
        data.set("owners", owners);
        data.set_id(format!("{bucket}/{}", prefix.as_deref().unwrap_or("")));
        Ok(())
    }
}

// ====================
// spaces_buckets
// ====================

pub struct BucketsList;

#[async_trait]
impl DataListConfig<CombinedConfig> for BucketsList {
    type Record = BucketRecord;

    fn name(&self) -> &'static str {
        "spaces_buckets"
    }

    fn result_attribute_name(&self) -> &'static str {
        "buckets"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        bucket_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<BucketRecord>> {
        let mut records = Vec::new();
        for region in REGIONS {
            let client = ctx.meta.spaces_client(region).await?;
            let output = client
                .list_buckets()
                .send()
                .await
                .map_err(|e| s3_error(e, &format!("Failed to list buckets in {region}")))?;
            let host = endpoint_host(&ctx.meta, region);
            records.extend(output.buckets().iter().filter_map(|b| b.name()).map(|name| BucketRecord {
                name: name.to_string(),
                region: region.to_string(),
                host: host.clone(),
            }));
        }
        Ok(records)
    }

    fn flatten_record(&self, record: &BucketRecord, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_bucket(record))
    }
}

// ====================
// spaces_keys
// ====================

pub struct SpacesKeysList;

#[async_trait]
impl DataListConfig<CombinedConfig> for SpacesKeysList {
    type Record = SpacesKey;

    fn name(&self) -> &'static str {
        "spaces_keys"
    }

    fn result_attribute_name(&self) -> &'static str {
        "keys"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        vec![
            AttributeSchema::new("name", AttributeType::String),
            AttributeSchema::new("access_key", AttributeType::String),
            AttributeSchema::new("grant", types::block_set(grant_fields())),
            AttributeSchema::new("created_at", AttributeType::String),
        ]
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<SpacesKey>> {
        ctx.meta.api_client().list_spaces_keys().await
    }

    fn flatten_record(&self, record: &SpacesKey, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_spaces_key(record))
    }
}

#[cfg(test)]
mod tests {
    use reef_core::datalist::DataList;

    use super::*;

    #[test]
    fn bucket_record_flattens_endpoint_names() {
        let attrs = flatten_bucket(&BucketRecord {
            name: "assets".to_string(),
            region: "fra1".to_string(),
            host: "fra1.digitaloceanspaces.com".to_string(),
        });
        assert_eq!(attrs["urn"], Value::from("do:space:assets"));
        assert_eq!(attrs["bucket_domain_name"], Value::from("assets.fra1.digitaloceanspaces.com"));
    }

    #[test]
    fn buckets_list_exposes_results_and_filters() {
        let list = DataList::new(BucketsList);
        let schema = DataSource::<CombinedConfig>::schema(&list);
        assert!(schema.get("buckets").is_some());
        assert!(schema.get("filter").is_some());
        assert!(schema.get("sort").is_some());
    }

    #[test]
    fn bucket_lookup_requires_known_region() {
        let schema = BucketDataSource.schema();
        let attrs = [
            ("name".to_string(), Value::from("assets")),
            ("region".to_string(), Value::from("mars1")),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_err());
    }
}
