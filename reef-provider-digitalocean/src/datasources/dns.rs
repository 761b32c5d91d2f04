//! DNS data sources

use async_trait::async_trait;
use reef_core::datalist::DataListConfig;
use reef_core::provider::{Context, DataSource, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, ResourceData, Value};
use reef_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::{lookup_schema, populate, single};
use crate::api::domains::{Domain, DomainRecord};
use crate::config::CombinedConfig;
use crate::resources::domain::{domain_fields, flatten_domain};
use crate::resources::record::{RECORD_TYPES, flatten_record};
use crate::resources::{Ctx, required_str};

fn record_fields() -> Vec<AttributeSchema> {
    vec![
        AttributeSchema::new("id", AttributeType::Int),
        AttributeSchema::new("domain", AttributeType::String),
        AttributeSchema::new("type", AttributeType::String),
        AttributeSchema::new("name", AttributeType::String),
        AttributeSchema::new("value", AttributeType::String),
        AttributeSchema::new("ttl", AttributeType::Int),
        AttributeSchema::new("priority", AttributeType::Int),
        AttributeSchema::new("port", AttributeType::Int),
        AttributeSchema::new("weight", AttributeType::Int),
        AttributeSchema::new("flags", AttributeType::Int),
        AttributeSchema::new("tag", AttributeType::String),
        AttributeSchema::new("fqdn", AttributeType::String),
    ]
}

fn flatten_listed_record(record: &DomainRecord, domain: &str) -> Attributes {
    let mut attrs = flatten_record(record, domain);
    attrs.insert("id".into(), Value::from(record.id));
    attrs.insert("domain".into(), Value::from(domain));
    attrs
}

pub struct DomainDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for DomainDataSource {
    fn name(&self) -> &'static str {
        "domain"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "domain",
            vec![AttributeSchema::new("name", AttributeType::String).required()],
            domain_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let name = required_str(data, "name")?.to_string();
        let domain = ctx
            .meta
            .api_client()
            .get_domain(&name)
            .await
            .map_err(|e| e.with_context(format!("error retrieving domain {name}")))?;
        populate(data, domain.name.clone(), flatten_domain(&domain));
        Ok(())
    }
}

pub struct RecordDataSource;

#[async_trait]
impl DataSource<CombinedConfig> for RecordDataSource {
    fn name(&self) -> &'static str {
        "record"
    }

    fn schema(&self) -> ResourceSchema {
        lookup_schema(
            "record",
            vec![
                AttributeSchema::new("domain", AttributeType::String).required(),
                AttributeSchema::new("name", AttributeType::String).required(),
                AttributeSchema::new("type", AttributeType::String).validate(Validator::one_of(&RECORD_TYPES)),
            ],
            record_fields(),
        )
    }

    async fn read(&self, ctx: &Ctx, data: &mut ResourceData) -> ProviderResult<()> {
        let domain = required_str(data, "domain")?.to_string();
        let name = required_str(data, "name")?.to_string();
        let record_type = data.get_non_empty_str("type").map(str::to_string);

        let records = ctx
            .meta
            .api_client()
            .list_records(&domain)
            .await
            .map_err(|e| e.with_context(format!("error retrieving records of domain {domain}")))?;
        let matches: Vec<DomainRecord> = records
            .into_iter()
            .filter(|r| r.name == name)
            .filter(|r| record_type.as_deref().is_none_or(|t| r.record_type == t))
            .collect();
        let record = single(matches, &format!("DNS record named {name} in domain {domain}"))?;
        populate(data, record.id.to_string(), flatten_listed_record(&record, &domain));
        Ok(())
    }
}

pub struct DomainsList;

#[async_trait]
impl DataListConfig<CombinedConfig> for DomainsList {
    type Record = Domain;

    fn name(&self) -> &'static str {
        "domains"
    }

    fn result_attribute_name(&self) -> &'static str {
        "domains"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        domain_fields()
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, _query: &Attributes) -> ProviderResult<Vec<Domain>> {
        ctx.meta.api_client().list_domains().await
    }

    fn flatten_record(&self, record: &Domain, _query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_domain(record))
    }
}

pub struct RecordsList;

#[async_trait]
impl DataListConfig<CombinedConfig> for RecordsList {
    type Record = DomainRecord;

    fn name(&self) -> &'static str {
        "records"
    }

    fn result_attribute_name(&self) -> &'static str {
        "records"
    }

    fn record_schema(&self) -> Vec<AttributeSchema> {
        record_fields()
    }

    fn extra_query_schema(&self) -> Vec<AttributeSchema> {
        vec![AttributeSchema::new("domain", AttributeType::String).required()]
    }

    async fn get_records(&self, ctx: &Context<CombinedConfig>, query: &Attributes) -> ProviderResult<Vec<DomainRecord>> {
        let domain = query_domain(query)?;
        ctx.meta.api_client().list_records(domain).await
    }

    fn flatten_record(&self, record: &DomainRecord, query: &Attributes) -> ProviderResult<Attributes> {
        Ok(flatten_listed_record(record, query_domain(query)?))
    }
}

fn query_domain(query: &Attributes) -> ProviderResult<&str> {
    query
        .get("domain")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::validation("domain is required").with_attribute("domain"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listed_record_carries_id_and_domain() {
        let record = DomainRecord {
            id: 42,
            record_type: "CNAME".to_string(),
            name: "www".to_string(),
            data: "example.com".to_string(),
            priority: None,
            port: None,
            ttl: 1800,
            weight: None,
            flags: None,
            tag: None,
        };
        let attrs = flatten_listed_record(&record, "example.com");
        assert_eq!(attrs["id"], Value::from(42i64));
        assert_eq!(attrs["domain"], Value::from("example.com"));
        assert_eq!(attrs["fqdn"], Value::from("www.example.com"));
        assert_eq!(attrs["value"], Value::from("example.com."));
    }

    #[test]
    fn record_lookup_takes_domain_and_name() {
        let schema = RecordDataSource.schema();
        assert!(schema.get("domain").unwrap().is_required());
        assert!(schema.get("name").unwrap().is_required());
        assert!(schema.get("value").unwrap().mode.is_computed());
    }
}
