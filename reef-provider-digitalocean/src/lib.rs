//! Reef Provider DigitalOcean
//!
//! DigitalOcean resources and data sources for the reef lifecycle engine.
//! REST-backed kinds (DNS, droplets, snapshots, networking) talk to the
//! public API through [`api::Client`]; Spaces kinds talk to the
//! S3-compatible endpoint through a per-region `aws-sdk-s3` client.

pub mod actions;
pub mod api;
pub mod config;
pub mod datasources;
pub mod log_sanitizer;
pub mod resources;
pub mod spaces;
pub mod utils;

use reef_core::provider::{BoxFuture, DataSource, Provider, ProviderResult, ResourceType};
use reef_core::resource::Attributes;
use reef_core::schema::ResourceSchema;

use crate::config::{CombinedConfig, ProviderConfig};

/// DigitalOcean Provider
pub struct DigitalOceanProvider;

impl Provider for DigitalOceanProvider {
    type Meta = CombinedConfig;

    fn name(&self) -> &'static str {
        "digitalocean"
    }

    fn schema(&self) -> ResourceSchema {
        config::schema()
    }

    fn configure<'a>(&'a self, config: &'a Attributes) -> BoxFuture<'a, ProviderResult<CombinedConfig>> {
        Box::pin(async move {
            let config = ProviderConfig::from_attributes(config)?;
            log::debug!("Configuring provider with {config:?}");
            config.client()
        })
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType<CombinedConfig>>> {
        resources::resource_types()
    }

    fn data_sources(&self) -> Vec<Box<dyn DataSource<CombinedConfig>>> {
        datasources::data_sources()
    }
}

#[cfg(test)]
mod tests {
    use reef_core::resource::Value;

    use super::*;

    #[tokio::test]
    async fn configure_builds_client_handle() {
        let attrs: Attributes = [
            ("token".to_string(), Value::from("secret")),
            ("api_endpoint".to_string(), Value::from("http://127.0.0.1:1")),
            ("spaces_endpoint".to_string(), Value::from("https://{region}.spaces.test")),
        ]
        .into_iter()
        .collect();
        let meta = DigitalOceanProvider.configure(&attrs).await.unwrap();
        assert_eq!(meta.spaces_endpoint("fra1"), "https://fra1.spaces.test");
    }

    #[test]
    fn catalogues_are_not_empty() {
        assert!(!DigitalOceanProvider.resource_types().is_empty());
        assert!(!DigitalOceanProvider.data_sources().is_empty());
    }
}
