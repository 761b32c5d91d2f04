//! spaces_bucket - Spaces bucket with ACL, versioning, lifecycle and inline CORS

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::DateTime as S3DateTime;
use aws_sdk_s3::types::{
    AbortIncompleteMultipartUpload, BucketCannedAcl, BucketLifecycleConfiguration, BucketVersioningStatus, Delete,
    ExpirationStatus, LifecycleExpiration, LifecycleRule, LifecycleRuleFilter, NoncurrentVersionExpiration,
    ObjectIdentifier, Permission, VersioningConfiguration,
};
use chrono::NaiveDate;
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Operation, ResourceData, Value};
use reef_core::retry::{RetryError, retry};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};
use reef_core::waiter::StateChangeConf;

use super::cors::{cors_rule_fields, get_cors, put_cors};
use super::{
    REGIONS, bucket_attribute, bucket_exists, client_for, endpoint_host, error_code, import_region_and_bucket, s3_error,
};
use crate::config::CombinedConfig;
use crate::resources::{Ctx, required_str};
use crate::utils::lowercase;

const CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const LIFECYCLE_ID_PREFIX: &str = "reef-lifecycle-";
const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
const MAX_EMPTY_PASSES: usize = 10;

pub struct BucketType;

fn lifecycle_rule_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::String).optional_computed(),
        AttributeSchema::new("prefix", AttributeType::String).optional(),
        AttributeSchema::new("enabled", AttributeType::Bool).required(),
        AttributeSchema::new("abort_incomplete_multipart_upload_days", AttributeType::Int)
            .optional()
            .validate(Validator::IntAtLeast(1)),
        AttributeSchema::new(
            "expiration",
            types::block(vec![
                AttributeSchema::new("date", AttributeType::String)
                    .optional()
                    .validate(Validator::Date),
                AttributeSchema::new("days", AttributeType::Int)
                    .optional()
                    .validate(Validator::IntAtLeast(1)),
                AttributeSchema::new("expired_object_delete_marker", AttributeType::Bool).optional(),
            ]),
        )
        .optional()
        .max_items(1),
        AttributeSchema::new(
            "noncurrent_version_expiration",
            types::block(vec![
                AttributeSchema::new("days", AttributeType::Int)
                    .optional()
                    .validate(Validator::IntAtLeast(1)),
            ]),
        )
        .optional()
        .max_items(1),
    ]
}

fn block(data: &HashMap<String, Value>, key: &str) -> Option<HashMap<String, Value>> {
    data.get(key)
        .and_then(Value::as_list)
        .and_then(|items| items.first())
        .and_then(Value::as_map)
        .cloned()
}

fn lifecycle_date(raw: &str) -> ProviderResult<S3DateTime> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| ProviderError::validation(format!("invalid lifecycle expiration date '{raw}': {e}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ProviderError::validation(format!("invalid lifecycle expiration date '{raw}'")))?;
    Ok(S3DateTime::from_secs(midnight.and_utc().timestamp()))
}

fn format_lifecycle_date(date: &S3DateTime) -> Option<String> {
    chrono::DateTime::from_timestamp(date.secs(), 0).map(|t| t.format("%Y-%m-%d").to_string())
}

/// Give every lifecycle rule without an id a generated one
fn assign_rule_ids(data: &mut ResourceData) {
    let rules: Vec<Value> = data
        .get_list("lifecycle_rule")
        .iter()
        .map(|rule| match rule {
            Value::Map(map) if map.get("id").and_then(Value::as_str).is_none_or(str::is_empty) => {
                let mut map = map.clone();
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                map.insert("id".into(), Value::from(format!("{LIFECYCLE_ID_PREFIX}{}", &suffix[..12])));
                Value::Map(map)
            }
            other => other.clone(),
        })
        .collect();
    if !rules.is_empty() {
        data.set("lifecycle_rule", Value::List(rules));
    }
}

pub(crate) fn expand_lifecycle_rule(rule: &HashMap<String, Value>) -> ProviderResult<LifecycleRule> {
    let prefix = rule.get("prefix").and_then(Value::as_str).unwrap_or("");
    let status = if rule.get("enabled").and_then(Value::as_bool).unwrap_or(false) {
        ExpirationStatus::Enabled
    } else {
        ExpirationStatus::Disabled
    };
    let mut builder = LifecycleRule::builder()
        .set_id(rule.get("id").and_then(Value::as_str).map(str::to_string))
        .status(status)
        .filter(LifecycleRuleFilter::builder().prefix(prefix).build());

    if let Some(days) = rule.get("abort_incomplete_multipart_upload_days").and_then(Value::as_int)
        && days > 0
    {
        builder = builder.abort_incomplete_multipart_upload(
            AbortIncompleteMultipartUpload::builder()
                .days_after_initiation(days as i32)
                .build(),
        );
    }

    if let Some(expiration) = block(rule, "expiration") {
        let mut exp = LifecycleExpiration::builder();
        if let Some(date) = expiration.get("date").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            exp = exp.date(lifecycle_date(date)?);
        }
        if let Some(days) = expiration.get("days").and_then(Value::as_int).filter(|d| *d > 0) {
            exp = exp.days(days as i32);
        }
        if let Some(true) = expiration.get("expired_object_delete_marker").and_then(Value::as_bool) {
            exp = exp.expired_object_delete_marker(true);
        }
        builder = builder.expiration(exp.build());
    }

    if let Some(noncurrent) = block(rule, "noncurrent_version_expiration")
        && let Some(days) = noncurrent.get("days").and_then(Value::as_int)
    {
        builder = builder.noncurrent_version_expiration(
            NoncurrentVersionExpiration::builder()
                .noncurrent_days(days as i32)
                .build(),
        );
    }

    builder
        .build()
        .map_err(|e| ProviderError::validation(format!("Failed to build lifecycle rule: {e}")))
}

pub(crate) fn flatten_lifecycle_rule(rule: &LifecycleRule) -> Value {
    let mut map = HashMap::new();
    if let Some(id) = rule.id() {
        map.insert("id".to_string(), Value::from(id));
    }
    let prefix = rule.filter().and_then(|f| f.prefix()).unwrap_or("");
    map.insert("prefix".to_string(), Value::from(prefix));
    map.insert("enabled".to_string(), Value::from(*rule.status() == ExpirationStatus::Enabled));
    if let Some(days) = rule
        .abort_incomplete_multipart_upload()
        .and_then(|a| a.days_after_initiation())
    {
        map.insert("abort_incomplete_multipart_upload_days".to_string(), Value::from(days));
    }
    if let Some(expiration) = rule.expiration() {
        let mut exp = HashMap::new();
        if let Some(date) = expiration.date().and_then(format_lifecycle_date) {
            exp.insert("date".to_string(), Value::from(date));
        }
        if let Some(days) = expiration.days() {
            exp.insert("days".to_string(), Value::from(days));
        }
        if let Some(marker) = expiration.expired_object_delete_marker() {
            exp.insert("expired_object_delete_marker".to_string(), Value::from(marker));
        }
        map.insert("expiration".to_string(), Value::List(vec![Value::Map(exp)]));
    }
    if let Some(days) = rule.noncurrent_version_expiration().and_then(|n| n.noncurrent_days()) {
        let mut noncurrent = HashMap::new();
        noncurrent.insert("days".to_string(), Value::from(days));
        map.insert("noncurrent_version_expiration".to_string(), Value::List(vec![Value::Map(noncurrent)]));
    }
    Value::Map(map)
}

async fn put_acl(client: &S3Client, bucket: &str, acl: &str) -> ProviderResult<()> {
    log::info!("Setting ACL of bucket {bucket} to {acl}");
    client
        .put_bucket_acl()
        .bucket(bucket)
        .acl(BucketCannedAcl::from(acl))
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to set ACL of bucket {bucket}")))?;
    Ok(())
}

async fn put_versioning(client: &S3Client, bucket: &str, enabled: bool) -> ProviderResult<()> {
    let status = if enabled {
        BucketVersioningStatus::Enabled
    } else {
        BucketVersioningStatus::Suspended
    };
    let config = VersioningConfiguration::builder().status(status).build();
    client
        .put_bucket_versioning()
        .bucket(bucket)
        .versioning_configuration(config)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to configure versioning of bucket {bucket}")))?;
    Ok(())
}

async fn put_lifecycle(client: &S3Client, bucket: &str, rules: &[Value]) -> ProviderResult<()> {
    if rules.is_empty() {
        log::info!("Removing lifecycle configuration from bucket {bucket}");
        return match client.delete_bucket_lifecycle().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = s3_error(e, &format!("Failed to delete lifecycle of bucket {bucket}"));
                if err.is_not_found() { Ok(()) } else { Err(err) }
            }
        };
    }
    let rules = rules
        .iter()
        .filter_map(Value::as_map)
        .map(expand_lifecycle_rule)
        .collect::<ProviderResult<Vec<_>>>()?;
    let config = BucketLifecycleConfiguration::builder()
        .set_rules(Some(rules))
        .build()
        .map_err(|e| ProviderError::validation(format!("Failed to build lifecycle config: {e}")))?;
    client
        .put_bucket_lifecycle_configuration()
        .bucket(bucket)
        .lifecycle_configuration(config)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to set lifecycle of bucket {bucket}")))?;
    Ok(())
}

async fn read_acl(client: &S3Client, bucket: &str) -> ProviderResult<&'static str> {
    let output = client
        .get_bucket_acl()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to read ACL of bucket {bucket}")))?;
    let public = output.grants().iter().any(|grant| {
        grant.grantee().and_then(|g| g.uri()) == Some(ALL_USERS)
            && matches!(grant.permission(), Some(Permission::Read | Permission::FullControl))
    });
    Ok(if public { "public-read" } else { "private" })
}

async fn read_lifecycle(client: &S3Client, bucket: &str) -> ProviderResult<Vec<Value>> {
    match client.get_bucket_lifecycle_configuration().bucket(bucket).send().await {
        Ok(output) => Ok(output.rules().iter().map(flatten_lifecycle_rule).collect()),
        Err(e) => {
            let err = s3_error(e, &format!("Failed to read lifecycle of bucket {bucket}"));
            if err.is_not_found() { Ok(Vec::new()) } else { Err(err) }
        }
    }
}

/// Delete every object version and delete marker, one listing page at a time
async fn empty_bucket(client: &S3Client, bucket: &str) -> ProviderResult<usize> {
    let mut deleted = 0;
    let mut key_marker: Option<String> = None;
    let mut version_marker: Option<String> = None;
    loop {
        let page = client
            .list_object_versions()
            .bucket(bucket)
            .max_keys(1000)
            .set_key_marker(key_marker.take())
            .set_version_id_marker(version_marker.take())
            .send()
            .await
            .map_err(|e| s3_error(e, &format!("Failed to list objects of bucket {bucket}")))?;

        let mut objects = Vec::new();
        for version in page.versions() {
            if let Some(key) = version.key() {
                objects.push((key.to_string(), version.version_id().map(str::to_string)));
            }
        }
        for marker in page.delete_markers() {
            if let Some(key) = marker.key() {
                objects.push((key.to_string(), marker.version_id().map(str::to_string)));
            }
        }

        if !objects.is_empty() {
            let identifiers = objects
                .iter()
                .map(|(key, version)| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .set_version_id(version.clone())
                        .build()
                        .map_err(|e| ProviderError::internal(format!("invalid object identifier {key}: {e}")))
                })
                .collect::<ProviderResult<Vec<_>>>()?;
            let batch = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| ProviderError::internal(format!("invalid delete batch: {e}")))?;
            let output = client
                .delete_objects()
                .bucket(bucket)
                .delete(batch)
                .send()
                .await
                .map_err(|e| s3_error(e, &format!("Failed to delete objects of bucket {bucket}")))?;
            if let Some(failed) = output.errors().first() {
                return Err(ProviderError::new(
                    ErrorKind::Api,
                    format!(
                        "Failed to delete object {} from bucket {bucket}: {}",
                        failed.key().unwrap_or_default(),
                        failed.message().unwrap_or_default()
                    ),
                ));
            }
            deleted += objects.len();
            log::debug!("[spaces] deleted {} object version(s) from {bucket}", objects.len());
        }

        if page.is_truncated() != Some(true) {
            return Ok(deleted);
        }
        key_marker = page.next_key_marker().map(str::to_string);
        version_marker = page.next_version_id_marker().map(str::to_string);
    }
}

#[async_trait]
impl ResourceType<CombinedConfig> for BucketType {
    fn name(&self) -> &'static str {
        "spaces_bucket"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket")
            .with_description("A Spaces bucket (S3-compatible object storage)")
            .attribute(bucket_attribute("name"))
            .attribute(
                AttributeSchema::new("region", AttributeType::String)
                    .with_default("nyc3")
                    .force_new()
                    .state_func(lowercase)
                    .validate(Validator::one_of(&REGIONS)),
            )
            .attribute(
                AttributeSchema::new("acl", AttributeType::String)
                    .with_default("private")
                    .validate(Validator::one_of(&["private", "public-read"])),
            )
            .attribute(AttributeSchema::new("force_destroy", AttributeType::Bool).with_default(false))
            .attribute(
                AttributeSchema::new(
                    "versioning",
                    types::block(vec![AttributeSchema::new("enabled", AttributeType::Bool).optional()]),
                )
                .optional_computed()
                .max_items(1),
            )
            .attribute(AttributeSchema::new("lifecycle_rule", types::block(lifecycle_rule_fields())))
            .attribute(
                AttributeSchema::new("cors_rule", types::block(cors_rule_fields()))
                    .deprecated("use the spaces_bucket_cors_configuration resource instead"),
            )
            .attribute(AttributeSchema::new("urn", AttributeType::String).computed())
            .attribute(AttributeSchema::new("bucket_domain_name", AttributeType::String).computed())
            .attribute(AttributeSchema::new("endpoint", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let name = required_str(data, "name")?.to_string();
        let acl = data.get_str("acl").unwrap_or("private").to_string();
        let timeout = data.timeout(Operation::Create, CREATE_TIMEOUT);

        log::info!("Creating bucket {name}");
        {
            let (client, name, acl) = (&client, name.as_str(), acl.as_str());
            retry(&ctx.cancel, timeout, || async move {
                match client.create_bucket().bucket(name).acl(BucketCannedAcl::from(acl)).send().await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        let retryable = error_code(&e) == Some("OperationAborted");
                        let err = s3_error(e, &format!("Failed to create bucket {name}"));
                        Err(if retryable {
                            RetryError::Retryable(err)
                        } else {
                            RetryError::NonRetryable(err)
                        })
                    }
                }
            })
            .await?;
        }
        data.set_id(name.clone());

        StateChangeConf::new(&["pending"], &["available"], timeout)
            .wait_for_state(&ctx.cancel, || {
                let (client, name) = (&client, name.as_str());
                async move {
                    let state = if bucket_exists(client, name).await? { "available" } else { "pending" };
                    Ok(Some(((), state.to_string())))
                }
            })
            .await
            .map_err(|e| e.with_context(format!("error waiting for bucket {name} to become available")))?;

        let cors = data.get_list("cors_rule");
        if !cors.is_empty() {
            put_cors(&client, &name, cors).await?;
        }
        if let Some(enabled) = data.get_block("versioning").and_then(|b| b.get("enabled")).and_then(Value::as_bool)
            && enabled
        {
            put_versioning(&client, &name, true).await?;
        }
        assign_rule_ids(data);
        let rules = data.get_list("lifecycle_rule");
        if !rules.is_empty() {
            put_lifecycle(&client, &name, rules).await?;
        }
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let name = data.id_str().to_string();
        if !bucket_exists(&client, &name).await? {
            log::warn!("{} not found, removing from state", data.resource_id());
            data.clear_id();
            return Ok(());
        }

        let region = required_str(data, "region")?.to_string();
        let host = endpoint_host(&ctx.meta, &region);
        data.set("name", name.as_str());
        data.set("urn", format!("do:space:{name}"));
        data.set("bucket_domain_name", format!("{name}.{host}"));
        data.set("endpoint", host);
        data.set("acl", read_acl(&client, &name).await?);

        let versioning = client
            .get_bucket_versioning()
            .bucket(&name)
            .send()
            .await
            .map_err(|e| s3_error(e, &format!("Failed to read versioning of bucket {name}")))?;
        let enabled = versioning.status() == Some(&BucketVersioningStatus::Enabled);
        let mut block = HashMap::new();
        block.insert("enabled".to_string(), Value::from(enabled));
        data.set("versioning", Value::List(vec![Value::Map(block)]));

        data.set("lifecycle_rule", Value::List(read_lifecycle(&client, &name).await?));

        // CORS is tracked here only while the deprecated inline attribute is in use
        if !data.get_list("cors_rule").is_empty() {
            data.set("cors_rule", Value::List(get_cors(&client, &name).await?));
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let name = data.id_str().to_string();

        if data.has_change("acl") {
            put_acl(&client, &name, data.get_str("acl").unwrap_or("private")).await?;
        }
        if data.has_change("cors_rule") {
            put_cors(&client, &name, data.get_list("cors_rule")).await?;
        }
        if data.has_change("versioning") {
            let enabled = data
                .get_block("versioning")
                .and_then(|b| b.get("enabled"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            put_versioning(&client, &name, enabled).await?;
        }
        if data.has_change("lifecycle_rule") {
            assign_rule_ids(data);
            put_lifecycle(&client, &name, data.get_list("lifecycle_rule")).await?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let name = data.id_str().to_string();
        let force_destroy = data.get_bool("force_destroy").unwrap_or(false);

        for _ in 0..MAX_EMPTY_PASSES {
            log::info!("Deleting bucket {name}");
            let err = match client.delete_bucket().bucket(&name).send().await {
                Ok(_) => return Ok(()),
                Err(e) => e,
            };
            if error_code(&err) != Some("BucketNotEmpty") {
                let err = s3_error(err, &format!("Failed to delete bucket {name}"));
                return if err.is_not_found() { Ok(()) } else { Err(err) };
            }
            if !force_destroy {
                return Err(ProviderError::new(
                    ErrorKind::Conflict,
                    format!("bucket {name} is not empty; set force_destroy to delete it along with its objects"),
                )
                .for_resource(data.resource_id()));
            }
            let count = empty_bucket(&client, &name).await?;
            log::info!("Emptied bucket {name} ({count} object version(s) deleted)");
        }
        Err(ProviderError::new(
            ErrorKind::Conflict,
            format!("bucket {name} still not empty after {MAX_EMPTY_PASSES} attempts to empty it"),
        ))
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import_region_and_bucket(data, "name")?;
        data.set("force_destroy", false);
        Ok(())
    }
}
