//! Networking data sources: reserved IPs, VPC peerings, partner attachments, BYOIP prefixes

use async_trait::async_trait;
use reef_core::datalist::DataListConfig;
use reef_core::provider::{Context, DataSource, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, ResourceData};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

use super::{lookup_schema, populate, single};
use crate::api::byoip::ByoipPrefix;
use crate::api::vpc_peerings::VpcPeering;
use crate::config::CombinedConfig;
use crate::resources::byoip_prefix::flatten_byoip_prefix;
use crate::resources::partner_attachment::{bgp_fields, flatten_partner_attachment};
use crate::resources::reserved_ip::flatten_reserved_ip;
use crate::resources::vpc_peering::flatten_vpc_peering;
use crate::resources::{Ctx, required_str};

fn vpc_peering_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::String),
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("vpc_ids", types::string_set()),
        AttributeSchema::new("status", AttributeType::String),
        AttributeSchema::new("created_at", AttributeType::String),
    ]
}

fn byoip_prefix_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("uuid", AttributeType::String),
        AttributeSchema::new("prefix", AttributeType::String),
        AttributeSchema::new("region", AttributeType::String),
        AttributeSchema::new("status", AttributeType::String),
        AttributeSchema::new("advertised", AttributeType::Bool),
        AttributeSchema::new("failure_reason", AttributeType::String),
    ]
}

fn id_or_name() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::String).conflicts_with("name"),
        AttributeSchema::new("name", AttributeType::String),
    ]
}

fn missing_id_or_name() -> ProviderError {
    ProviderError::validation("one of `id` or `name` must be set")
}

pub struct ReservedIpDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for ReservedIpDataSource {
    fn name(&self) -> &'static str {
        "reserved_ip"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "reserved_ip",
            vec![
                AttributeSchema::new("ip_address", AttributeType::String)
                    .required()
                    .validate(Validator::Ipv4Address),
            ],
            vec![
                AttributeSchema::new("region", AttributeType::String),
                AttributeSchema::new("droplet_id", AttributeType::Int),
                AttributeSchema::new("urn", AttributeType::String),
            ],
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let ip = required_str(data, "ip_address")?.to_string();
        let reserved = ctx
            .meta
            .api_client()
            .get_reserved_ip(&ip)
            .await
            .map_err(|e| e.with_context(format!("error retrieving reserved IP {ip}")))?;
        populate(data, reserved.ip.clone(), flatten_reserved_ip(&reserved));
        Ok(())
    }
}

pub struct VpcPeeringDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for VpcPeeringDataSource {
    fn name(&self) -> &'static str {
        "vpc_peering"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema("vpc_peering", id_or_name(), vpc_peering_fields())
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let peering = if let Some(id) = data.get_non_empty_str("id") {
            client
                .get_vpc_peering(id)
                .await
                .map_err(|e| e.with_context(format!("error retrieving VPC peering {id}")))?
        } else if let Some(name) = data.get_non_empty_str("name") {
            let matches = client
                .list_vpc_peerings()
                .await?
                .into_iter()
                .filter(|p| p.name == name)
                .collect();
            single(matches, &format!("VPC peering named {name}"))?
        } else {
            return Err(missing_id_or_name());
        };
        populate(data, peering.id.clone(), flatten_vpc_peering(&peering));
        Ok(())
    }
}

pub struct PartnerAttachmentDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for PartnerAttachmentDataSource {
    fn name(&self) -> &'static str {
        "partner_attachment"
    }

    fn schema(&self) -> ResourceSchema {
        let fields = vec![
            AttributeSchema::new("name", AttributeType::String),
            AttributeSchema::new("state", AttributeType::String),
            AttributeSchema::new("connection_bandwidth_in_mbps", AttributeType::Int),
            AttributeSchema::new("region", AttributeType::String),
            AttributeSchema::new("naas_provider", AttributeType::String),
            AttributeSchema::new("vpc_ids", types::string_set()),
            AttributeSchema::new("redundancy_zone", AttributeType::String),
            AttributeSchema::new("parent_uuid", AttributeType::String),
            AttributeSchema::new("children", types::string_list()),
            AttributeSchema::new("created_at", AttributeType::String),
            AttributeSchema::new(
                "bgp",
                types::block(bgp_fields().into_iter().filter(|f| f.name != "auth_key").collect()),
            ),
        ];
        lookup_schema("partner_attachment", id_or_name(), fields)
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let client = ctx.meta.api_client();
        let attachment = if let Some(id) = data.get_non_empty_str("id") {
            client
                .get_partner_attachment(id)
                .await
                .map_err(|e| e.with_context(format!("error retrieving partner attachment {id}")))?
        } else if let Some(name) = data.get_non_empty_str("name") {
            let matches = client
                .list_partner_attachments()
                .await?
                .into_iter()
                .filter(|a| a.name == name)
                .collect();
            single(matches, &format!("partner attachment named {name}"))?
        } else {
            return Err(missing_id_or_name());
        };
        populate(data, attachment.id.clone(), flatten_partner_attachment(&attachment, None));
        Ok(())
    }
}

pub struct ByoipPrefixDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for ByoipPrefixDataSource {
    fn name(&self) -> &'static str {
        "byoip_prefix"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "byoip_prefix",
            vec![AttributeSchema::new("uuid", AttributeType::String).required()],
            byoip_prefix_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let uuid = required_str(data, "uuid")?.to_string();
        let prefix = ctx
            .meta
            .api_client()
            .get_byoip_prefix(&uuid)
            .await
            .map_err(|e| e.with_context(format!("error retrieving BYOIP prefix {uuid}")))?;
        populate(data, prefix.uuid.clone(), flatten_byoip_prefix(&prefix));
        Ok(())
    }
}

pub struct VpcPeeringsList;

#[async_trait]
impl DataListConfig<CombinedConfig> for VpcPeeringsList {
    type Record = VpcPeering;

    fn name(&self) -> &'static str {
        "vpc_peerings"
    }

    fn result_attribute_name(&self) -> &'static str {
        "vpc_peerings"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        vpc_peering_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<VpcPeering>> {
        ctx.meta.api_client().list_vpc_peerings().await
    }

    fn flatten_record(&self, record: &VpcPeering, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_vpc_peering(record))
    }
}

pub struct ByoipPrefixesList;

#[async_trait]
impl DataListConfig<CombinedConfig> for ByoipPrefixesList {
    type Record = ByoipPrefix;

    fn name(&self) -> &'static str {
        "byoip_prefixes"
    }

    fn result_attribute_name(&self) -> &'static str {
        "byoip_prefixes"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        byoip_prefix_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<ByoipPrefix>> {
        ctx.meta.api_client().list_byoip_prefixes().await
    }

    fn flatten_record(&self, record: &ByoipPrefix, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_byoip_prefix(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partner_attachment_lookup_never_exposes_auth_key() {
        let schema = PartnerAttachmentDataSource.schema();
        let bgp = schema.get("bgp").unwrap();
        let reef_core::schema::AttributeType::List(inner) = &bgp.attr_type else {
            panic!("bgp should be a block");
        };
        let reef_core::schema::AttributeType::Object(fields) = inner.as_ref() else {
            panic!("bgp should hold objects");
        };
        assert!(fields.iter().all(|f| f.name != "auth_key"));
    }

    #[test]
    fn reserved_ip_lookup_requires_ipv4() {
        let schema = ReservedIpDataSource.schema();
        let attrs = [("ip_address".to_string(), reef_core::resource::Value::from("2001:db8::1"))]
            .into_iter()
            .collect();
        assert!(schema.validate(&attrs).is_err());
    }
}
