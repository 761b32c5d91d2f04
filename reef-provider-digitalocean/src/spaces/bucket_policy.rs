//! spaces_bucket_policy - Access policy document attached to a bucket

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};
use serde_json::Value as Json;

use super::{bucket_attribute, bucket_exists, client_for, import_region_and_bucket, region_attribute, s3_error};
use crate::config::CombinedConfig;
use crate::resources::{Ctx, required_str};

pub struct BucketPolicyType;

/// Canonical form of a policy document: single-element arrays collapse to
/// their element and every array is ordered by the serialized canonical form
/// of its elements, so statement and action order are irrelevant
fn canonical_policy(value: Json) -> Json {
    match value {
        Json::Object(map) => Json::Object(map.into_iter().map(|(k, v)| (k, canonical_policy(v))).collect()),
        Json::Array(items) => {
            let mut items: Vec<Json> = items.into_iter().map(canonical_policy).collect();
            if items.len() == 1 {
                return items.remove(0);
            }
            items.sort_by_cached_key(Json::to_string);
            Json::Array(items)
        }
        other => other,
    }
}

/// Whether two policy documents grant the same access
pub(crate) fn policies_equivalent(a: &str, b: &str) -> bool {
    match (serde_json::from_str::<Json>(a), serde_json::from_str::<Json>(b)) {
        (Ok(a), Ok(b)) => canonical_policy(a) == canonical_policy(b),
        _ => a == b,
    }
}

fn suppress_equivalent_policy(_key: &str, old: &Value, new: &Value, _state: &Attributes) -> bool {
    match (old.as_str(), new.as_str()) {
        (Some(old), Some(new)) if !old.is_empty() && !new.is_empty() => policies_equivalent(old, new),
        _ => false,
    }
}

pub(crate) async fn get_policy(client: &S3Client, bucket: &str) -> ProviderResult<Option<String>> {
    match client.get_bucket_policy().bucket(bucket).send().await {
        Ok(output) => Ok(output.policy().map(str::to_string)),
        Err(e) => {
            let err = s3_error(e, &format!("Failed to read policy of bucket {bucket}"));
            if err.is_not_found() { Ok(None) } else { Err(err) }
        }
    }
}

async fn put_policy(client: &S3Client, bucket: &str, policy: &str) -> ProviderResult<()> {
    log::info!("Setting policy of bucket {bucket}");
    log::debug!("[spaces] bucket {bucket} policy: {policy}");
    client
        .put_bucket_policy()
        .bucket(bucket)
        .policy(policy)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to set policy of bucket {bucket}")))?;
    Ok(())
}

#[async_trait]
impl ResourceType<CombinedConfig> for BucketPolicyType {
    fn name(&self) -> &'static str {
        "spaces_bucket_policy"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket_policy")
            .attribute(region_attribute())
            .attribute(bucket_attribute("bucket"))
            .attribute(
                AttributeSchema::new("policy", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty)
                    .validate(Validator::Json)
                    .suppress_diff(suppress_equivalent_policy),
            )
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = required_str(data, "bucket")?.to_string();
        if !bucket_exists(&client, &bucket).await? {
            return Err(ProviderError::validation(format!("bucket '{bucket}' does not exist")).with_attribute("bucket"));
        }
        put_policy(&client, &bucket, required_str(data, "policy")?).await?;
        data.set_id(bucket);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = data.id_str().to_string();
        let Some(remote) = get_policy(&client, &bucket).await? else {
            log::warn!("{} not found, removing from state", data.resource_id());
            data.clear_id();
            return Ok(());
        };
        data.set("bucket", bucket.as_str());
        // Keep the configured text when the server merely reformatted it
        let keep = data.get_str("policy").is_some_and(|local| policies_equivalent(local, &remote));
        if !keep {
            data.set("policy", remote);
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("policy") {
            let client = client_for(&ctx.meta, data).await?;
            put_policy(&client, data.id_str(), required_str(data, "policy")?).await?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = data.id_str();
        log::info!("Removing policy of bucket {bucket}");
        match client.delete_bucket_policy().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = s3_error(e, &format!("Failed to delete policy of bucket {bucket}"));
                if err.is_not_found() { Ok(()) } else { Err(err) }
            }
        }
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import_region_and_bucket(data, "bucket")
    }
}

#[cfg(test)]
mod tests {
    use reef_core::differ::{DiffAction, diff};
    use reef_core::resource::{Resource, State};

    use super::*;

    const POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":"*","Action":["s3:GetObject"],"Resource":["arn:aws:s3:::assets/*"]}]}"#;

    #[test]
    fn reformatted_policy_is_equivalent() {
        let reformatted = r#"{
            "Statement": [{
                "Resource": "arn:aws:s3:::assets/*",
                "Action": "s3:GetObject",
                "Principal": "*",
                "Effect": "Allow"
            }],
            "Version": "2012-10-17"
        }"#;
        assert!(policies_equivalent(POLICY, reformatted));
    }

    #[test]
    fn action_order_does_not_matter() {
        let a = r#"{"Action":["s3:GetObject","s3:PutObject"]}"#;
        let b = r#"{"Action":["s3:PutObject","s3:GetObject"]}"#;
        assert!(policies_equivalent(a, b));
        assert!(!policies_equivalent(a, r#"{"Action":["s3:GetObject"]}"#));
    }

    #[test]
    fn statement_order_does_not_matter() {
        let a = r#"{"Version":"2012-10-17","Statement":[
            {"Sid":"A","Effect":"Allow","Principal":"*","Action":"s3:GetObject","Resource":"arn:aws:s3:::assets/*"},
            {"Sid":"B","Effect":"Deny","Principal":"*","Action":"s3:DeleteObject","Resource":"arn:aws:s3:::assets/*"}
        ]}"#;
        let b = r#"{"Version":"2012-10-17","Statement":[
            {"Sid":"B","Effect":"Deny","Principal":"*","Action":"s3:DeleteObject","Resource":"arn:aws:s3:::assets/*"},
            {"Sid":"A","Effect":"Allow","Principal":"*","Action":"s3:GetObject","Resource":"arn:aws:s3:::assets/*"}
        ]}"#;
        assert!(policies_equivalent(a, b));

        let denied = b.replace("\"Deny\"", "\"Allow\"");
        assert!(!policies_equivalent(a, &denied));
    }

    #[test]
    fn empty_policy_is_rejected() {
        let schema = BucketPolicyType.schema();
        let attrs = [
            ("region".to_string(), Value::from("nyc3")),
            ("bucket".to_string(), Value::from("assets")),
            ("policy".to_string(), Value::from("")),
        ]
        .into_iter()
        .collect();
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("policy must not be empty")));
    }

    #[test]
    fn semantically_identical_policy_plans_no_change() {
        let schema = BucketPolicyType.schema();
        let state = State::new(
            "spaces_bucket_policy",
            "assets",
            [
                ("region".to_string(), Value::from("nyc3")),
                ("bucket".to_string(), Value::from("assets")),
                ("policy".to_string(), Value::from(POLICY)),
            ]
            .into_iter()
            .collect(),
        );
        let desired = Resource::new("spaces_bucket_policy")
            .with_attribute("region", "nyc3")
            .with_attribute("bucket", "assets")
            .with_attribute(
                "policy",
                r#"{"Version": "2012-10-17", "Statement": {"Effect": "Allow", "Principal": "*", "Action": "s3:GetObject", "Resource": "arn:aws:s3:::assets/*"}}"#,
            );
        assert_eq!(diff(&schema, Some(&desired), Some(&state)).action, DiffAction::NoChange);
    }
}
