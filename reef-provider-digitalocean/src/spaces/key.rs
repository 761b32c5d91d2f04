//! spaces_key - Access key granting per-bucket Spaces permissions
//!
//! There is no lookup by access key, so reads list every key and match on
//! it. The secret is only returned by the create call and is kept in state
//! from then on.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reef_core::provider::{ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, Operation, ResourceData, Value};
use reef_core::retry::{RetryError, retry};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use crate::api::spaces_keys::{Grant, SpacesKey, SpacesKeyRequest};
use crate::config::CombinedConfig;
use crate::resources::{Ctx, merge, required_str};

const CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const PERMISSIONS: [&str; 3] = ["read", "readwrite", "fullaccess"];

pub struct SpacesKeyType;

/// Server-side failures and precondition failures are final; anything else
/// is retried until the create timeout
fn key_create_retryable(err: &ProviderError) -> bool {
    !matches!(err.status(), Some(412 | 500..=599))
}

pub(crate) fn grant_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("bucket", AttributeType::String).with_default(""),
        AttributeSchema::new("permission", AttributeType::String)
            .required()
            .validate(Validator::one_of(&PERMISSIONS)),
    ]
}

fn flatten_grant(grant: &Grant) -> Value {
    let mut block = HashMap::new();
    block.insert("bucket".to_string(), Value::from(grant.bucket.as_str()));
    block.insert("permission".to_string(), Value::from(grant.permission.as_str()));
    Value::Map(block)
}

pub(crate) fn flatten_spaces_key(key: &SpacesKey) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("name".into(), Value::from(key.name.as_str()));
    attrs.insert("access_key".into(), Value::from(key.access_key.as_str()));
    attrs.insert("grant".into(), Value::List(key.grants.iter().map(flatten_grant).collect()));
    attrs.insert("created_at".into(), Value::from(key.created_at.as_str()));
    attrs
}

fn expand_grants(data: &ResourceData) -> Vec<Grant> {
    data.get_list("grant")
        .iter()
        .filter_map(Value::as_map)
        .map(|block| Grant {
            bucket: block.get("bucket").and_then(Value::as_str).unwrap_or_default().to_string(),
            permission: block.get("permission").and_then(Value::as_str).unwrap_or_default().to_string(),
        })
        .collect()
}

fn key_request(data: &ResourceData) -> ProviderResult<SpacesKeyRequest> {
    Ok(SpacesKeyRequest {
        name: required_str(data, "name")?.to_string(),
        grants: expand_grants(data),
    })
}

#[async_trait]
impl ResourceType<CombinedConfig> for SpacesKeyType {
    fn name(&self) -> &'static str {
        "spaces_key"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("spaces_key")
            .with_description("A Spaces access key scoped by per-bucket grants")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty),
            )
            .attribute(AttributeSchema::new("grant", types::block_set(grant_fields())))
            .attribute(AttributeSchema::new("access_key", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("secret_key", AttributeType::String)
                    .computed()
                    .sensitive(),
            )
            .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let req = key_request(data)?;
        log::info!("Creating Spaces key {} with {} grant(s)", req.name, req.grants.len());

        let req = &req;
        let key = retry(&ctx.cancel, data.timeout(Operation::Create, CREATE_TIMEOUT), || async move {
            client
                .create_spaces_key(req)
                .await
                .map_err(|e| RetryError::classify(e, key_create_retryable))
        })
        .await
        .map_err(|e| e.with_context(format!("error creating Spaces key {}", req.name)))?;

        data.set_id(key.access_key.clone());
        data.set_opt("secret_key", key.secret_key.clone());
        merge(data, flatten_spaces_key(&key));
        Ok(())
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let keys = ctx.meta.api_client().list_spaces_keys().await?;
        match keys.iter().find(|k| k.access_key == data.id_str()) {
            Some(key) => merge(data, flatten_spaces_key(key)),
            None => {
                log::warn!("{} not found, removing from state", data.resource_id());
                data.clear_id();
            }
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_changes(&["name", "grant"]) {
            let req = key_request(data)?;
            log::info!("Updating Spaces key {}", data.id_str());
            ctx.meta
                .api_client()
                .update_spaces_key(data.id_str(), &req)
                .await
                .map_err(|e| e.with_context(format!("error updating Spaces key {}", data.id_str())))?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        log::info!("Deleting Spaces key {}", data.id_str());
        match ctx.meta.api_client().delete_spaces_key(data.id_str()).await {
            Err(e) if !e.is_not_found() => {
                Err(e.with_context(format!("error deleting Spaces key {}", data.id_str())))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_retry_policy() {
        assert!(!key_create_retryable(&ProviderError::from_status(500, "boom")));
        assert!(!key_create_retryable(&ProviderError::from_status(503, "busy")));
        assert!(!key_create_retryable(&ProviderError::from_status(412, "precondition")));
        assert!(key_create_retryable(&ProviderError::from_status(409, "conflict")));
        assert!(key_create_retryable(&ProviderError::from_status(429, "slow down")));
    }

    #[test]
    fn secret_key_is_sensitive_and_computed() {
        let schema = SpacesKeyType.schema();
        let secret = schema.get("secret_key").unwrap();
        assert!(secret.sensitive);
        assert!(secret.mode.is_computed());
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let mut grant = HashMap::new();
        grant.insert("bucket".to_string(), Value::from("assets"));
        grant.insert("permission".to_string(), Value::from("admin"));
        let attrs = [
            ("name".to_string(), Value::from("ci")),
            ("grant".to_string(), Value::List(vec![Value::Map(grant)])),
        ]
        .into_iter()
        .collect();
        assert!(SpacesKeyType.schema().validate(&attrs).is_err());
    }

    #[test]
    fn flatten_omits_the_secret() {
        let key = SpacesKey {
            name: "ci".to_string(),
            access_key: "DO00ABC".to_string(),
            secret_key: Some("hunter2".to_string()),
            grants: vec![Grant {
                bucket: "assets".to_string(),
                permission: "read".to_string(),
            }],
            created_at: "2024-05-01T00:00:00Z".to_string(),
        };
        let attrs = flatten_spaces_key(&key);
        assert!(!attrs.contains_key("secret_key"));
        assert_eq!(attrs["access_key"], Value::from("DO00ABC"));
        assert_eq!(attrs["grant"].as_list().unwrap().len(), 1);
    }
}
