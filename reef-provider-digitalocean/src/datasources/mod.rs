//! Read-only data sources
//!
//! Single-object lookups reuse the resource flatteners so a data source and
//! the matching resource expose the same attributes. Lists are generated
//! with [`DataList`] from a record schema and a fetch function.

pub mod compute;
pub mod dns;
pub mod networking;

use reef_core::datalist::DataList;
use reef_core::provider::{DataSource, ErrorKind, ProviderError, ProviderResult};
use reef_core::resource::{Attributes, ResourceData};
use reef_core::schema::{AttributeSchema, ResourceSchema};

use crate::config::CombinedConfig;
use crate::spaces;

/// Schema of a single-object lookup: `lookup` attributes are the inputs,
/// every other field of the object is computed
pub(crate) fn lookup_schema(kind: &str, lookup: Vec<AttributeSchema>, fields: Vec<AttributeSchema>) -> ResourceSchema {
    let inputs: Vec<String> = lookup.iter().map(|a| a.name.clone()).collect();
    ResourceSchema::new(kind)
        .attributes(
            fields
                .into_iter()
                .filter(|f| !inputs.contains(&f.name))
                .map(|f| {
                    let mut f = f.computed();
                    f.validators.clear();
                    f.default = None;
                    f
                }),
        )
        .attributes(lookup)
}

/// Copy flattened attributes into a lookup's bag and set its id
pub(crate) fn populate(data: &mut ResourceData, id: impl Into<String>, attributes: Attributes) {
    for (key, value) in attributes {
        data.set(key, value);
    }
    data.set_id(id);
}

/// Exactly one match, or a diagnostic naming what was searched for
pub(crate) fn single<T>(mut matches: Vec<T>, what: &str) -> ProviderResult<T> {
    match matches.len() {
        0 => Err(ProviderError::new(ErrorKind::NotFound, format!("no {what} found"))),
        1 => Ok(matches.remove(0)),
        n => Err(ProviderError::validation(format!(
            "{n} {what}s found; the lookup must match exactly one"
        ))),
    }
}

/// Get all data sources
pub fn data_sources() -> Vec<Box<dyn DataSource<CombinedConfig>>> {
    vec![
        // ====================
        // DNS
        // ====================
        Box::new(dns::DomainDataSource),
        Box::new(dns::RecordDataSource),
        Box::new(DataList::new(dns::DomainsList)),
        Box::new(DataList::new(dns::RecordsList)),
        // ====================
        // Compute
        // ====================
        Box::new(compute::DropletDataSource),
        Box::new(compute::SshKeyDataSource),
        Box::new(compute::DropletSnapshotDataSource),
        Box::new(DataList::new(compute::DropletsList)),
        Box::new(DataList::new(compute::SshKeysList)),
        // ====================
        // Networking
        // ====================
        Box::new(networking::ReservedIpDataSource),
        Box::new(networking::VpcPeeringDataSource),
        Box::new(networking::PartnerAttachmentDataSource),
        Box::new(networking::ByoipPrefixDataSource),
        Box::new(DataList::new(networking::VpcPeeringsList)),
        Box::new(DataList::new(networking::ByoipPrefixesList)),
        // ====================
        // Spaces
        // ====================
        Box::new(spaces::datasources::BucketDataSource),
        Box::new(spaces::datasources::BucketPolicyDataSource),
        Box::new(spaces::datasources::BucketObjectsDataSource),
        Box::new(DataList::new(spaces::datasources::BucketsList)),
        Box::new(DataList::new(spaces::datasources::SpacesKeysList)),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use reef_core::schema::AttributeType;

    use super::*;

    #[test]
    fn data_source_names_are_unique() {
        let sources = data_sources();
        let names: HashSet<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names.len(), sources.len());
    }

    #[test]
    fn data_source_schema_names_match() {
        for source in data_sources() {
            assert_eq!(source.schema().resource_type, source.name());
        }
    }

    #[test]
    fn lookup_schema_computes_everything_but_inputs() {
        let schema = lookup_schema(
            "thing",
            vec![AttributeSchema::new("name", AttributeType::String).required()],
            vec![
                AttributeSchema::new("name", AttributeType::String).required(),
                AttributeSchema::new("size", AttributeType::Int).required(),
            ],
        );
        assert!(schema.get("name").unwrap().is_required());
        assert!(schema.get("size").unwrap().mode.is_computed());
    }

    #[test]
    fn single_rejects_ambiguous_lookups() {
        assert_eq!(single(vec![1], "droplet").unwrap(), 1);
        assert!(single(Vec::<i32>::new(), "droplet").unwrap_err().is_not_found());
        let err = single(vec![1, 2], "droplet").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.starts_with("2 droplets found"));
    }
}
