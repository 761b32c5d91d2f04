//! spaces_bucket_cors_configuration - CORS rules of a bucket, replaced wholesale

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::types::{CorsConfiguration, CorsRule};
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use super::{bucket_attribute, client_for, import_region_and_bucket, region_attribute, s3_error};
use crate::config::CombinedConfig;
use crate::resources::{Ctx, required_str};

const METHODS: [&str; 5] = ["GET", "PUT", "HEAD", "POST", "DELETE"];

pub struct CorsConfigurationType;

/// Fields of one CORS rule, shared with the inline bucket attribute
pub(crate) fn cors_rule_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::String).optional(),
        AttributeSchema::new("allowed_headers", types::string_list()).optional(),
        AttributeSchema::new("allowed_methods", types::string_list())
            .required()
            .validate(Validator::one_of(&METHODS)),
        AttributeSchema::new("allowed_origins", types::string_list()).required(),
        AttributeSchema::new("expose_headers", types::string_list()).optional(),
        AttributeSchema::new("max_age_seconds", AttributeType::Int).optional(),
    ]
}

fn strings(block: &std::collections::HashMap<String, Value>, key: &str) -> Option<Vec<String>> {
    let items: Vec<String> = block
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or(&[])
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    (!items.is_empty()).then_some(items)
}

pub(crate) fn expand_cors_rules(rules: &[Value]) -> ProviderResult<CorsConfiguration> {
    let mut expanded = Vec::with_capacity(rules.len());
    for rule in rules.iter().filter_map(Value::as_map) {
        let built = CorsRule::builder()
            .set_id(rule.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string))
            .set_allowed_headers(strings(rule, "allowed_headers"))
            .set_allowed_methods(strings(rule, "allowed_methods"))
            .set_allowed_origins(strings(rule, "allowed_origins"))
            .set_expose_headers(strings(rule, "expose_headers"))
            .set_max_age_seconds(rule.get("max_age_seconds").and_then(Value::as_int).map(|n| n as i32))
            .build()
            .map_err(|e| ProviderError::validation(format!("invalid CORS rule: {e}")))?;
        expanded.push(built);
    }
    CorsConfiguration::builder()
        .set_cors_rules(Some(expanded))
        .build()
        .map_err(|e| ProviderError::validation(format!("invalid CORS configuration: {e}")))
}

pub(crate) fn flatten_cors_rule(rule: &CorsRule) -> Value {
    let list = |items: &[String]| Value::from(items.to_vec());
    let mut block = std::collections::HashMap::new();
    if let Some(id) = rule.id() {
        block.insert("id".to_string(), Value::from(id));
    }
    block.insert("allowed_headers".to_string(), list(rule.allowed_headers()));
    block.insert("allowed_methods".to_string(), list(rule.allowed_methods()));
    block.insert("allowed_origins".to_string(), list(rule.allowed_origins()));
    block.insert("expose_headers".to_string(), list(rule.expose_headers()));
    if let Some(max_age) = rule.max_age_seconds() {
        block.insert("max_age_seconds".to_string(), Value::from(max_age));
    }
    Value::Map(block)
}

/// Replace the bucket's CORS rules, or drop them when `rules` is empty
pub(crate) async fn put_cors(client: &S3Client, bucket: &str, rules: &[Value]) -> ProviderResult<()> {
    if rules.is_empty() {
        log::info!("Removing CORS configuration from bucket {bucket}");
        return match client.delete_bucket_cors().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = s3_error(e, &format!("Failed to delete CORS configuration of {bucket}"));
                if err.is_not_found() { Ok(()) } else { Err(err) }
            }
        };
    }
    log::info!("Setting {} CORS rule(s) on bucket {bucket}", rules.len());
    client
        .put_bucket_cors()
        .bucket(bucket)
        .cors_configuration(expand_cors_rules(rules)?)
        .send()
        .await
        .map_err(|e| s3_error(e, &format!("Failed to set CORS configuration of {bucket}")))?;
    Ok(())
}

/// Current CORS rules; a bucket without CORS yields an empty list
pub(crate) async fn get_cors(client: &S3Client, bucket: &str) -> ProviderResult<Vec<Value>> {
    match client.get_bucket_cors().bucket(bucket).send().await {
        Ok(output) => Ok(output.cors_rules().iter().map(flatten_cors_rule).collect()),
        Err(e) => {
            let err = s3_error(e, &format!("Failed to read CORS configuration of {bucket}"));
            if err.is_not_found() { Ok(Vec::new()) } else { Err(err) }
        }
    }
}

#[async_trait]
impl ResourceType<CombinedConfig> for CorsConfigurationType {
    fn name(&self) -> &'static str {
        "spaces_bucket_cors_configuration"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_bucket_cors_configuration")
            .with_description("CORS rules of a Spaces bucket; the whole rule set is replaced on every apply")
            .attribute(region_attribute())
            .attribute(bucket_attribute("bucket"))
            .attribute(
                AttributeSchema::new("cors_rule", types::block_set(cors_rule_fields()))
                    .required()
                    .min_items(1)
                    .max_items(100),
            )
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = required_str(data, "bucket")?.to_string();
        put_cors(&client, &bucket, data.get_list("cors_rule")).await?;
        data.set_id(bucket);
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        let bucket = data.id_str().to_string();
        let rules = get_cors(&client, &bucket).await?;
        if rules.is_empty() {
            log::warn!("{} has no CORS rules, removing from state", data.resource_id());
            data.clear_id();
            return Ok(());
        }
        data.set("bucket", bucket.as_str());
        data.set("cors_rule", Value::List(rules));
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("cors_rule") {
            let client = client_for(&ctx.meta, data).await?;
            put_cors(&client, data.id_str(), data.get_list("cors_rule")).await?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = client_for(&ctx.meta, data).await?;
        put_cors(&client, data.id_str(), &[]).await
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        import_region_and_bucket(data, "bucket")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn rule(methods: &[&str]) -> Value {
        let mut block = HashMap::new();
        block.insert(
            "allowed_methods".to_string(),
            Value::from(methods.iter().map(|m| m.to_string()).collect::<Vec<_>>()),
        );
        block.insert("allowed_origins".to_string(), Value::from(vec!["https://example.com".to_string()]));
        block.insert("max_age_seconds".to_string(), Value::from(3000i64));
        Value::Map(block)
    }

    #[test]
    fn expands_rules_for_the_sdk() {
        let config = expand_cors_rules(&[rule(&["GET", "PUT"])]).unwrap();
        let rules = config.cors_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].allowed_methods(), ["GET".to_string(), "PUT".to_string()]);
        assert_eq!(rules[0].max_age_seconds(), Some(3000));
        assert!(rules[0].allowed_headers().is_empty());
    }

    #[test]
    fn flattened_rule_matches_configured_rule() {
        let config = expand_cors_rules(&[rule(&["GET"])]).unwrap();
        let schema = CorsConfigurationType.schema();
        let attr = schema.get("cors_rule").unwrap();
        let flattened = Value::List(config.cors_rules().iter().map(flatten_cors_rule).collect());
        assert!(attr.attr_type.values_equal(&flattened, &Value::List(vec![rule(&["GET"])])));
    }

    fn s3_client(endpoint: &str) -> S3Client {
        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new("id", "secret", None, None, "test"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        S3Client::from_conf(config)
    }

    fn s3_error_body(code: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
             <Error><Code>{code}</Code><Message>{code}</Message><RequestId>tx0</RequestId></Error>"
        )
    }

    #[tokio::test]
    async fn clearing_absent_cors_configuration_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/assets"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(s3_error_body("NoSuchCORSConfiguration")),
            )
            .expect(1)
            .mount(&server)
            .await;

        put_cors(&s3_client(&server.uri()), "assets", &[]).await.unwrap();
    }

    #[tokio::test]
    async fn clearing_cors_surfaces_other_failures() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/assets"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("content-type", "application/xml")
                    .set_body_string(s3_error_body("AccessDenied")),
            )
            .mount(&server)
            .await;

        let err = put_cors(&s3_client(&server.uri()), "assets", &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let schema = CorsConfigurationType.schema();
        let attrs = [
            ("region".to_string(), Value::from("nyc3")),
            ("bucket".to_string(), Value::from("assets")),
            ("cors_rule".to_string(), Value::List(vec![rule(&["PATCH"])])),
        ]
        .into_iter()
        .collect();
        assert!(schema.validate(&attrs).is_err());
    }
}
