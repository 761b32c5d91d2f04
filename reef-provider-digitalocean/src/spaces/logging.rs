//! spaces_bucket_logging - Access logging of one bucket into another

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::types::{BucketLoggingStatus, LoggingEnabled};
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::ResourceData;
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::{bucket_attribute, client_for, import_region_and_bucket, region_attribute, s3_error};
use crate::config::CombinedConfig;
use crate::resources::{Ctx, required_str};

pub struct BucketLoggingType;

async fn put_logging(client: &S3Client, bucket: &str, target: Option<(&str, &str)>) -> ProviderResult<()> {
    let status = match target {
        Some((target_bucket, target_prefix)) => {
            log::info!("Logging access to bucket {bucket} into {target_bucket}/{target_prefix}");
            let enabled = LoggingEnabled::builder()
                .target_bucket(target_bucket)
                .target_prefix(target_prefix)
                .build()
                .map_err(|e| ProviderError::validation(format!("invalid logging target: {e}")))?;
            BucketLoggingStatus::builder().logging_enabled(enabled).build()
        }
        None => {
            log::info!("Disabling access logging of bucket {bucket}");
            BucketLoggingStatus::builder().build()
        }
    };
    client
        .put_bucket_logging()
        .bucket(bucket)
        .bucket_logging_status(status)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to configure logging of bucket {bucket}")))?;
    Ok(())
}

#[async_trait]
impl ResourceType<CombinedConfig> for BucketLoggingType {
    fn name(&self) -> &'static str {
        "spaces_bucket_logging"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket_logging")
            .attribute(region_attribute())
            .attribute(bucket_attribute("bucket"))
            .attribute(AttributeSchema::new("target_bucket", AttributeType::String).required())
            .attribute(AttributeSchema::new("target_prefix", AttributeType::String).with_default(""))
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = required_str(data, "bucket")?.to_string();
        let target = (
            required_str(data, "target_bucket")?,
            data.get_str("target_prefix").unwrap_or(""),
        );
        put_logging(&client, &bucket, Some(target)).await?;
        data.set_id(bucket);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = data.id_str().to_string();
        let output = match client.get_bucket_logging().bucket(&bucket).send().await {
            Ok(output) => output,
            Err(e) => {
                let err = s3_error(e, &format!("Failed to read logging of bucket {bucket}"));
                if err.is_not_found() {
                    log::warn!("{} not found, removing from state", data.resource_id());
                    data.clear_id();
                    return Ok(());
                }
                return Err(err);
            }
        };
        let Some(enabled) = output.logging_enabled() else {
            log::warn!("{} has logging disabled, removing from state", data.resource_id());
            data.clear_id();
            return Ok(());
        };
        data.set("bucket", bucket.as_str());
        data.set("target_bucket", enabled.target_bucket());
        data.set("target_prefix", enabled.target_prefix());
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_changes(&["target_bucket", "target_prefix"]) {
            let client = client_for(&ctx.meta, data).await?;
            let target = (
                required_str(data, "target_bucket")?,
                data.get_str("target_prefix").unwrap_or(""),
            );
            put_logging(&client, data.id_str(), Some(target)).await?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        match put_logging(&client, data.id_str(), None).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import_region_and_bucket(data, "bucket")
    }
}

#[cfg(test)]
mod tests {
    use reef_core::resource::Value;

    use super::*;

    #[test]
    fn target_prefix_defaults_to_empty() {
        let schema = BucketLoggingType.schema();
        let attrs = [
            ("region".to_string(), Value::from("nyc3")),
            ("bucket".to_string(), Value::from("assets")),
            ("target_bucket".to_string(), Value::from("logs")),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_ok());
        assert_eq!(schema.normalize(&attrs)["target_prefix"], Value::from(""));
    }

    #[test]
    fn import_requires_region() {
        let mut data = ResourceData::new("spaces_bucket_logging");
        data.set_id("assets");
        let err = import_region_and_bucket(&mut data, "bucket").unwrap_err();
        assert!(err.to_string().contains("nyc3,my-bucket"));
    }
}
