//! record - DNS record within a domain
//!
//! The API stores hostname-valued data (CNAME, MX, NS, SRV, CAA) as relative
//! or absolute names; reads normalise it to the absolute form with a trailing
//! dot and the `value` suppressor makes both spellings compare equal.

use async_trait::async_trait;
use reef_core::composite;
use reef_core::differ::{DiffAction, ResourceDiff};
use reef_core::provider::{ErrorKind, ProviderError, ProviderResult, ResourceType};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::{Ctx, create_with_retry, found, int_id, merge, required_str};
use crate::api::domains::{DomainRecord, DomainRecordEditRequest};
use crate::config::CombinedConfig;
use crate::utils::{HOSTNAME_RECORD_TYPES, record_fqdn, suppress_record_name, suppress_record_value};

pub const RECORD_TYPES: [&str; 9] = ["A", "AAAA", "CAA", "CNAME", "MX", "NS", "TXT", "SRV", "SOA"];

const IMPORT_USAGE: &str =
    "must use the domain name and record id joined with a comma, e.g. example.com,12345678";

pub struct RecordType;

/// Record data as it should appear in state
pub(crate) fn normalized_value(record: &DomainRecord) -> String {
    let data = record.data.as_str();
    let is_hostname = HOSTNAME_RECORD_TYPES.contains(&record.record_type.as_str());
    if !is_hostname || data == "@" || data.ends_with('.') || record.tag.as_deref() == Some("iodef") {
        return data.to_string();
    }
    format!("{data}.")
}

pub(crate) fn flatten_record(record: &DomainRecord, domain: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("type".into(), Value::from(record.record_type.as_str()));
    attrs.insert("name".into(), Value::from(record.name.as_str()));
    attrs.insert("value".into(), Value::from(normalized_value(record)));
    attrs.insert("ttl".into(), Value::from(record.ttl));
    attrs.insert("fqdn".into(), Value::from(record_fqdn(&record.name, domain)));
    let optional = [
        ("priority", record.priority),
        ("port", record.port),
        ("weight", record.weight),
        ("flags", record.flags),
    ];
    for (key, value) in optional {
        if let Some(v) = value {
            attrs.insert(key.into(), Value::from(v));
        }
    }
    if let Some(tag) = record.tag.as_deref().filter(|t| !t.is_empty()) {
        attrs.insert("tag".into(), Value::from(tag));
    }
    attrs
}

fn edit_request(data: &ResourceData) -> ProviderResult<DomainRecordEditRequest> {
    Ok(DomainRecordEditRequest {
        record_type: required_str(data, "type")?.to_string(),
        name: required_str(data, "name")?.to_string(),
        data: required_str(data, "value")?.to_string(),
        priority: data.get_int("priority"),
        port: data.get_int("port"),
        ttl: data.get_int("ttl"),
        weight: data.get_int("weight"),
        flags: data.get_int("flags"),
        tag: data.get_non_empty_str("tag").map(str::to_string),
    })
}

/// `flags` of a CAA record may be zero; every other required number must not be
fn require(diff: &ResourceDiff, key: &str, record_type: &str) -> ProviderResult<()> {
    let missing = match diff.get(key) {
        None => true,
        Some(value) => key != "flags" && value.as_int() == Some(0),
    };
    if missing {
        return Err(
            ProviderError::validation(format!("`{key}` is required for when type is `{record_type}`"))
                .with_attribute(key),
        );
    }
    Ok(())
}

#[async_trait]
impl ResourceType<CombinedConfig> for RecordType {
    fn name(&self) -> &'static str {
        "record"
    }

    fn schema(&self) -> ResourceSchema {
        let port_range = || Validator::IntBetween(0, 65535);
        ResourceSchema::new("record")
            .with_description("A DNS record within a DigitalOcean domain")
            .attribute(
                AttributeSchema::new("domain", AttributeType::String)
                    .required()
                    .force_new()
                    .validate(Validator::NotEmpty),
            )
            .attribute(
                AttributeSchema::new(
                    "type",
                    AttributeType::Enum(RECORD_TYPES.iter().map(|t| t.to_string()).collect()),
                )
                .required()
                .force_new(),
            )
            .attribute(
                AttributeSchema::new("name", AttributeType::String)
                    .required()
                    .validate(Validator::NotEmpty)
                    .suppress_diff(suppress_record_name),
            )
            .attribute(
                AttributeSchema::new("value", AttributeType::String)
                    .required()
                    .suppress_diff(suppress_record_value),
            )
            .attribute(AttributeSchema::new("priority", AttributeType::Int).validate(port_range()))
            .attribute(AttributeSchema::new("port", AttributeType::Int).validate(port_range()))
            .attribute(AttributeSchema::new("weight", AttributeType::Int).validate(port_range()))
            .attribute(
                AttributeSchema::new("ttl", AttributeType::Int)
                    .optional_computed()
                    .validate(Validator::IntAtLeast(1)),
            )
            .attribute(AttributeSchema::new("flags", AttributeType::Int).validate(Validator::IntBetween(0, 255)))
            .attribute(
                AttributeSchema::new("tag", AttributeType::String)
                    .validate(Validator::one_of(&["issue", "issuewild", "iodef"])),
            )
            .attribute(
                AttributeSchema::new("fqdn", AttributeType::String)
                    .computed()
                    .with_description("Fully qualified name of the record"),
            )
    }

    fn customize_diff(&self, diff: &mut ResourceDiff) -> ProviderResult<()> {
        let record_type = diff.get_str("type").unwrap_or_default().to_string();
        let creating = diff.is_create() || diff.action == DiffAction::Replace;
        match record_type.as_str() {
            "MX" => require(diff, "priority", "MX")?,
            "SRV" => {
                // The API only insists on a port when the record is created
                if creating {
                    require(diff, "port", "SRV")?;
                }
                require(diff, "priority", "SRV")?;
                require(diff, "weight", "SRV")?;
            }
            "CAA" => {
                require(diff, "flags", "CAA")?;
                require(diff, "tag", "CAA")?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn create(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let domain = required_str(data, "domain")?.to_string();
        let req = edit_request(data)?;
        log::info!("Creating {} record {} in {domain}", req.record_type, req.name);
        let client = ctx.meta.api_client();
        let record = create_with_retry(ctx, data, || client.create_record(&domain, &req))
            .await
            .map_err(|e| e.with_context("error creating domain record"))?;
        data.set_id(record.id.to_string());
        self.read(ctx, data).await
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let domain = required_str(data, "domain")?.to_string();
        let id = int_id(data)?;
        let result = ctx.meta.api_client().get_record(&domain, id).await;
        if let Some(record) = found(data, result)? {
            merge(data, flatten_record(&record, &domain));
        }
        Ok(())
    }

    async fn update(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let domain = required_str(data, "domain")?.to_string();
        let id = int_id(data)?;
        let req = edit_request(data)?;
        log::info!("Updating record {id} in {domain}");
        ctx.meta
            .api_client()
            .edit_record(&domain, id, &req)
            .await
            .map_err(|e| e.with_context(format!("error updating domain record {id}")))?;
        self.read(ctx, data).await
    }

    async fn delete(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let domain = required_str(data, "domain")?.to_string();
        let id = int_id(data)?;
        log::info!("Deleting record {id} in {domain}");
        ctx.meta
            .api_client()
            .delete_record(&domain, id)
            .await
            .map_err(|e| e.with_context(format!("error deleting domain record {id}")))
    }

    async fn import(&self, _ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let (domain, record_id) = composite::split_pair(data.id_str(), IMPORT_USAGE)?;
        if record_id.parse::<i64>().is_err() {
            return Err(ProviderError::new(
                ErrorKind::InvalidCompositeId,
                format!("{IMPORT_USAGE} (record id '{record_id}' is not numeric)"),
            ));
        }
        data.set("domain", domain);
        data.set_id(record_id);
        Ok(())
    }
}
