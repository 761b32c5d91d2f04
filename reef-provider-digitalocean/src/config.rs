//! Provider configuration and client factory

use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::config::Credentials;
use dashmap::DashMap;
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use crate::api::{Client, ClientOptions};

pub const DEFAULT_API_ENDPOINT: &str = "https://api.digitalocean.com";
pub const DEFAULT_SPACES_ENDPOINT: &str = "https://{region}.digitaloceanspaces.com";

const TOKEN_ENV: [&str; 2] = ["DIGITALOCEAN_TOKEN", "DIGITALOCEAN_ACCESS_TOKEN"];
const API_URL_ENV: &str = "DIGITALOCEAN_API_URL";
const SPACES_ENDPOINT_ENV: &str = "SPACES_ENDPOINT_URL";
const SPACES_ACCESS_ID_ENV: &str = "SPACES_ACCESS_KEY_ID";
const SPACES_SECRET_KEY_ENV: &str = "SPACES_SECRET_ACCESS_KEY";

/// Schema of the provider configuration block
pub fn schema() -> ResourceSchema {
    ResourceSchema::new("digitalocean").attributes([
        AttributeSchema::new("token", AttributeType::String)
            .sensitive()
            .with_description("API token. Falls back to DIGITALOCEAN_TOKEN or DIGITALOCEAN_ACCESS_TOKEN."),
        AttributeSchema::new("api_endpoint", AttributeType::String)
            .with_description("Base URL of the API. Falls back to DIGITALOCEAN_API_URL."),
        AttributeSchema::new("spaces_endpoint", AttributeType::String)
            .with_description("Spaces endpoint template; `{region}` is replaced by the bucket region."),
        AttributeSchema::new("spaces_access_id", AttributeType::String),
        AttributeSchema::new("spaces_secret_key", AttributeType::String).sensitive(),
        AttributeSchema::new("requests_per_second", AttributeType::Float)
            .with_description("Client-side rate limit; 0 disables it."),
        AttributeSchema::new("http_timeout_seconds", AttributeType::Int).validate(Validator::IntAtLeast(1)),
        AttributeSchema::new("http_retry_max", AttributeType::Int).validate(Validator::IntAtLeast(0)),
    ])
}

/// Provider configuration
#[derive(Clone)]
pub struct ProviderConfig {
    pub token: String,
    pub api_endpoint: String,
    pub spaces_endpoint: String,
    pub spaces_access_id: Option<String>,
    pub spaces_secret_key: Option<String>,
    pub requests_per_second: f64,
    pub http_timeout: Duration,
    pub http_retry_max: u32,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("spaces_endpoint", &self.spaces_endpoint)
            .field("requests_per_second", &self.requests_per_second)
            .field("http_timeout", &self.http_timeout)
            .field("http_retry_max", &self.http_retry_max)
            .finish_non_exhaustive()
    }
}

/// First non-empty value among `names`
fn first_set(names: &[&str], lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    names.iter().find_map(|n| lookup(n).filter(|v| !v.is_empty()))
}

impl ProviderConfig {
    /// Read the configuration block, falling back to the environment
    pub fn from_attributes(attrs: &Attributes) -> ProviderResult<Self> {
        Self::from_attributes_with(attrs, |name| std::env::var(name).ok())
    }

    /// Read the configuration block, falling back to `lookup` for unset values
    pub fn from_attributes_with(attrs: &Attributes, lookup: impl Fn(&str) -> Option<String>) -> ProviderResult<Self> {
        let string = |key: &str, env: &[&str]| -> Option<String> {
            attrs
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .or_else(|| first_set(env, &lookup))
        };

        let token = string("token", &TOKEN_ENV).ok_or_else(|| {
            ProviderError::new(
                ErrorKind::CredentialsMissing,
                "an API token is required; set `token` or DIGITALOCEAN_TOKEN",
            )
            .with_attribute("token")
        })?;

        Ok(Self {
            token,
            api_endpoint: string("api_endpoint", &[API_URL_ENV])
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            spaces_endpoint: string("spaces_endpoint", &[SPACES_ENDPOINT_ENV])
                .unwrap_or_else(|| DEFAULT_SPACES_ENDPOINT.to_string()),
            spaces_access_id: string("spaces_access_id", &[SPACES_ACCESS_ID_ENV]),
            spaces_secret_key: string("spaces_secret_key", &[SPACES_SECRET_KEY_ENV]),
            requests_per_second: attrs
                .get("requests_per_second")
                .and_then(Value::as_float)
                .unwrap_or(0.0),
            http_timeout: Duration::from_secs(
                attrs
                    .get("http_timeout_seconds")
                    .and_then(Value::as_int)
                    .unwrap_or(60) as u64,
            ),
            http_retry_max: attrs.get("http_retry_max").and_then(Value::as_int).unwrap_or(4) as u32,
        })
    }

    /// Build the shared client handle
    pub fn client(&self) -> ProviderResult<CombinedConfig> {
        let api = Client::new(
            &self.api_endpoint,
            &self.token,
            ClientOptions {
                timeout: self.http_timeout,
                retry_max: self.http_retry_max,
                requests_per_second: self.requests_per_second,
            },
        )?;
        log::debug!("Configured API client for {}", self.api_endpoint);
        Ok(CombinedConfig {
            api: Arc::new(api),
            spaces_endpoint: self.spaces_endpoint.clone(),
            spaces_credentials: self
                .spaces_access_id
                .clone()
                .zip(self.spaces_secret_key.clone()),
            spaces_clients: DashMap::new(),
        })
    }

    /// Spaces endpoint for a region
    pub fn spaces_endpoint_for(template: &str, region: &str) -> String {
        template.replace("{region}", region)
    }
}

/// Client handle passed to every handler
pub struct CombinedConfig {
    api: Arc<Client>,
    spaces_endpoint: String,
    spaces_credentials: Option<(String, String)>,
    spaces_clients: DashMap<String, S3Client>,
}

impl CombinedConfig {
    pub fn api_client(&self) -> &Client {
        &self.api
    }

    pub fn spaces_endpoint(&self, region: &str) -> String {
        ProviderConfig::spaces_endpoint_for(&self.spaces_endpoint, region)
    }

    /// Regional S3-compatible client, built on first use
    pub async fn spaces_client(&self, region: &str) -> ProviderResult<S3Client> {
        if let Some(client) = self.spaces_clients.get(region) {
            return Ok(client.clone());
        }

        let (access_id, secret_key) = self.spaces_credentials.clone().ok_or_else(|| {
            ProviderError::new(
                ErrorKind::CredentialsMissing,
                "Spaces credentials are required; set `spaces_access_id` and `spaces_secret_key` \
                 or SPACES_ACCESS_KEY_ID and SPACES_SECRET_ACCESS_KEY",
            )
        })?;

        let endpoint = self.spaces_endpoint(region);
        let credentials = Credentials::new(access_id, secret_key, None, None, "reef-spaces");
        // Spaces accepts any signing region; the endpoint selects the datacenter
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&endpoint)
            .load()
            .await;
        let client = S3Client::new(&sdk_config);

        log::debug!("Configured Spaces client for {region} at {endpoint}");
        self.spaces_clients.insert(region.to_string(), client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn explicit_values_win_and_defaults_apply() {
        let config = ProviderConfig::from_attributes(&attrs(&[
            ("token", Value::from("t0ken")),
            ("api_endpoint", Value::from("http://localhost:8080")),
        ]))
        .unwrap();
        assert_eq!(config.token, "t0ken");
        assert_eq!(config.api_endpoint, "http://localhost:8080");
        assert_eq!(config.http_timeout, Duration::from_secs(60));
        assert_eq!(config.http_retry_max, 4);
        assert!(!format!("{config:?}").contains("t0ken"));
    }

    #[test]
    fn missing_token_is_a_credentials_error() {
        let err = ProviderConfig::from_attributes_with(&attrs(&[]), |_| None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialsMissing);
        assert_eq!(err.attribute.as_deref(), Some("token"));

        let err = ProviderConfig::from_attributes_with(&attrs(&[("token", Value::from(""))]), |_| None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialsMissing);
    }

    #[test]
    fn token_falls_back_to_either_variable() {
        let env = |name: &str| match name {
            "DIGITALOCEAN_TOKEN" => Some(String::new()),
            "DIGITALOCEAN_ACCESS_TOKEN" => Some("from-env".to_string()),
            _ => None,
        };
        let config = ProviderConfig::from_attributes_with(&attrs(&[]), env).unwrap();
        assert_eq!(config.token, "from-env");

        let config = ProviderConfig::from_attributes_with(&attrs(&[("token", Value::from("explicit"))]), env).unwrap();
        assert_eq!(config.token, "explicit");
    }

    #[test]
    fn spaces_endpoint_substitutes_region() {
        assert_eq!(
            ProviderConfig::spaces_endpoint_for(DEFAULT_SPACES_ENDPOINT, "fra1"),
            "https://fra1.digitaloceanspaces.com"
        );
    }

    #[tokio::test]
    async fn spaces_client_requires_credentials() {
        let config = ProviderConfig::from_attributes(&attrs(&[("token", Value::from("t"))])).unwrap();
        let mut config = config;
        config.spaces_access_id = None;
        config.spaces_secret_key = None;
        let combined = config.client().unwrap();
        let err = combined.spaces_client("nyc3").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialsMissing);
    }

    #[tokio::test]
    async fn spaces_clients_are_cached_per_region() {
        let mut config = ProviderConfig::from_attributes(&attrs(&[("token", Value::from("t"))])).unwrap();
        config.spaces_access_id = Some("id".to_string());
        config.spaces_secret_key = Some("secret".to_string());
        let combined = config.client().unwrap();
        combined.spaces_client("nyc3").await.unwrap();
        combined.spaces_client("nyc3").await.unwrap();
        combined.spaces_client("ams3").await.unwrap();
        assert_eq!(combined.spaces_clients.len(), 2);
    }
}
