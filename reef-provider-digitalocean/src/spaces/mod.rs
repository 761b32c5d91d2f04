//! Spaces - S3-compatible object storage
//!
//! Spaces resources talk to a regional S3 endpoint through `aws-sdk-s3`
//! with static Spaces credentials (see [`CombinedConfig::spaces_client`]).
//! Bucket-scoped resources are identified by bucket name and import as
//! `<region>,<bucket>`.

pub mod bucket;
pub mod bucket_policy;
pub mod cors;
pub mod datasources;
pub mod key;
pub mod logging;

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use reef_core::composite;
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult};
use reef_core::resource::ResourceData;
use reef_core::schema::{AttributeSchema, AttributeType, Validator};

use crate::config::CombinedConfig;
use crate::resources::required_str;
use crate::utils::lowercase;

/// Regions with Spaces available
pub const REGIONS: [&str; 11] = [
    "ams3", "atl1", "blr1", "fra1", "lon1", "nyc3", "sfo2", "sfo3", "sgp1", "syd1", "tor1",
];

const IMPORT_USAGE: &str = "must use the region and bucket name joined with a comma, e.g. nyc3,my-bucket";

/// S3 error codes meaning the object in question does not exist
const NOT_FOUND_CODES: [&str; 6] = [
    "NoSuchBucket",
    "NoSuchBucketPolicy",
    "NoSuchCORSConfiguration",
    "NoSuchLifecycleConfiguration",
    "NoSuchKey",
    "NotFound",
];

pub(crate) fn error_code<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> Option<&str> {
    err.code()
}

/// Classify an SDK failure the same way REST failures are classified
pub(crate) fn s3_error<E>(err: SdkError<E, HttpResponse>, action: &str) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().map(str::to_string);
    let message = format!("{action}: {}", DisplayErrorContext(&err));
    let mut error = match status {
        Some(status) => ProviderError::from_status(status, message),
        None => ProviderError::new(ErrorKind::Transient, message),
    };
    if code.as_deref().is_some_and(|c| NOT_FOUND_CODES.contains(&c)) {
        error.kind = ErrorKind::NotFound;
    }
    error
}

/// `region` attribute shared by bucket-scoped resources
pub(crate) fn region_attribute() -> AttributeSchema {
    AttributeSchema::new("region", AttributeType::String)
        .required()
        .force_new()
        .state_func(lowercase)
        .validate(Validator::one_of(&REGIONS))
}

pub(crate) fn bucket_attribute(name: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::String)
        .required()
        .force_new()
        .validate(Validator::regex(
            "^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$",
            "bucket names must be 3-63 lowercase letters, numbers, dots or hyphens",
        ))
}

/// Split a `<region>,<bucket>` import id, seeding `region` and `bucket_key`
pub(crate) fn import_region_and_bucket(data: &mut ResourceData, bucket_key: &str) -> ProviderResult<()> {
    let usage = format!("{} import id {IMPORT_USAGE}", data.kind());
    let (region, bucket) = composite::split_pair(data.id_str(), &usage)?;
    data.set("region", region.to_lowercase());
    data.set(bucket_key, bucket.as_str());
    data.set_id(bucket);
    Ok(())
}

/// Regional client for the bag's `region`
pub(crate) async fn client_for(meta: &CombinedConfig, data: &ResourceData) -> ProviderResult<S3Client> {
    let region = required_str(data, "region")?;
    meta.spaces_client(region).await
}

/// Host part of the regional endpoint, e.g. `nyc3.digitaloceanspaces.com`
pub(crate) fn endpoint_host(meta: &CombinedConfig, region: &str) -> String {
    let endpoint = meta.spaces_endpoint(region);
    match endpoint.split_once("://") {
        Some((_, host)) => host.trim_end_matches('/').to_string(),
        None => endpoint.trim_end_matches('/').to_string(),
    }
}

pub(crate) async fn bucket_exists(client: &S3Client, bucket: &str) -> ProviderResult<bool> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(_) => Ok(true),
        Err(e) => {
            let err = s3_error(e, &format!("Failed to check bucket {bucket}"));
            if err.is_not_found() { Ok(false) } else { Err(err) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_splits_region_and_bucket() {
        let mut data = ResourceData::new("spaces_bucket");
        data.set_id("NYC3,assets");
        import_region_and_bucket(&mut data, "name").unwrap();
        assert_eq!(data.get_str("region"), Some("nyc3"));
        assert_eq!(data.get_str("name"), Some("assets"));
        assert_eq!(data.id_str(), "assets");
    }

    #[test]
    fn import_without_region_is_rejected() {
        let mut data = ResourceData::new("spaces_bucket");
        data.set_id("assets");
        let err = import_region_and_bucket(&mut data, "name").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidCompositeId);
        assert!(err.message.starts_with("spaces_bucket import id must use"));
    }

    #[test]
    fn unknown_region_fails_validation() {
        let attr = region_attribute();
        assert!(attr.validators.iter().any(|v| v.check("region", &"mars1".into()).is_err()));
    }
}
