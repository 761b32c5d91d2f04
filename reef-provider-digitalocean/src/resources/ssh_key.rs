//! ssh_key - Account SSH public key

use async_trait::async_trait;
use reef_core::provider::{ProviderResult, ResourceType};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::{Ctx, create_with_retry, found, merge, required_str};
use crate::api::keys::{SshKey, SshKeyCreateRequest, SshKeyUpdateRequest};
use crate::config::CombinedConfig;
use crate::utils::suppress_whitespace;

pub struct SshKeyType;

pub(crate) fn flatten_ssh_key(key: &SshKey) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("id".into(), Value::from(key.id));
    attrs.insert("name".into(), Value::from(key.name.as_str()));
    attrs.insert("public_key".into(), Value::from(key.public_key.as_str()));
    attrs.insert("fingerprint".into(), Value::from(key.fingerprint.as_str()));
    attrs
}

#[async_trait]
impl ResourceType<CombinedConfig> for SshKeyType {
    fn name(&self) -> &'static str {
        "ssh_key"
    }

    fn schema(&self) -> ResourceSchema {
        ResourceSchema::new("ssh_key")
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new("public_key", AttributeType::String)
                    .required()
                    .force_new()
                    .suppress_diff(suppress_whitespace),
            )
            .attribute(AttributeSchema::new("fingerprint", AttributeType::String).computed())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let req = SshKeyCreateRequest {
            name: required_str(data, "name")?.to_string(),
            public_key: required_str(data, "public_key")?.trim().to_string(),
        };
        log::info!("Creating SSH key {}", req.name);
        let client = ctx.meta.api_client();
        let key = create_with_retry(ctx, data, || client.create_ssh_key(&req))
            .await
            .map_err(|e| e.with_context("error creating SSH key"))?;
        data.set_id(key.id.to_string());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let result = ctx.meta.api_client().get_ssh_key(data.id_str()).await;
        if let Some(key) = found(data, result)? {
            let mut attrs = flatten_ssh_key(&key);
            attrs.remove("id");
            merge(data, attrs);
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        if data.has_change("name") {
            let req = SshKeyUpdateRequest {
                name: required_str(data, "name")?.to_string(),
            };
            ctx.meta
                .api_client()
                .update_ssh_key(data.id_str(), &req)
                .await
                .map_err(|e| e.with_context(format!("error updating SSH key {}", data.id_str())))?;
        }
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        log::info!("Deleting SSH key {}", data.id_str());
        ctx.meta
            .api_client()
            .delete_ssh_key(data.id_str())
            .await
            .map_err(|e| e.with_context(format!("error deleting SSH key {}", data.id_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reef_core::differ::{DiffAction, diff};
    use reef_core::resource::{Resource, State};

    #[test]
    fn trailing_newline_in_public_key_is_not_a_change() {
        let state = State::new(
            "ssh_key",
            "123",
            [
                ("name".to_string(), Value::from("laptop")),
                ("public_key".to_string(), Value::from("ssh-ed25519 AAAA")),
                ("fingerprint".to_string(), Value::from("aa:bb")),
            ]
            .into_iter()
            .collect(),
        );
        let desired = Resource::new("ssh_key")
            .with_attribute("name", "laptop")
            .with_attribute("public_key", "ssh-ed25519 AAAA\n");
        assert_eq!(diff(&SshKeyType.schema(), Some(&desired), Some(&state)).action, DiffAction::NoChange);
    }
}
