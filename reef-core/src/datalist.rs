//! Data lists - Filterable, sortable list data sources
//!
//! A data list is synthesised from a record schema, a function that fetches
//! every record, and a function that flattens one record into attributes.
//! The generated data source accepts `filter` and `sort` blocks and exposes
//! the matching records under a single list attribute.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;

use crate::provider::{Context, DataSource, ProviderError, ProviderResult};
use crate::resource::{Attributes, ResourceData, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator, types};

/// What a concrete data list supplies
#[async_trait]
pub trait DataListConfig<M: Send + Sync + 'static>: Send + Sync {
    /// Remote record type
    type Record: Send + Sync;

    /// Data source name (e.g., "domains")
    fn name(&self) -> &'static str;

    /// Name of the list attribute holding the results (e.g., "domains")
    fn result_attribute_name(&self) -> &'static str;

    /// Schema of one flattened record
    fn record_schema(&self) -> Vec<AttributeSchema>;

    /// Additional query attributes (e.g., the parent domain of records)
    fn extra_query_schema(&self) -> Vec<AttributeSchema> {
        Vec::new()
    }

    async fn get_records(&self, ctx: &Context<M>, query: &Attributes) -> ProviderResult<Vec<Self::Record>>;

    fn flatten_record(&self, record: &Self::Record, query: &Attributes) -> ProviderResult<Attributes>;
}

/// Data source generated from a [`DataListConfig`]
pub struct DataList<C> {
    config: C,
}

impl<C> DataList<C> {
    pub fn new(config: C) -> Self {
        Self { config }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Filter {
    key: String,
    values: Vec<String>,
    regex: bool,
    all: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Sort {
    key: String,
    descending: bool,
}

fn filter_schema() -> AttributeSchema {
    AttributeSchema::new(
        "filter",
        types::block_set(vec![
            AttributeSchema::new("key", AttributeType::String).required(),
            AttributeSchema::new("values", types::string_list()).required(),
            AttributeSchema::new("match_by", AttributeType::String)
                .with_default("exact")
                .validate(Validator::one_of(&["exact", "re"])),
            AttributeSchema::new("all", AttributeType::Bool).with_default(false),
        ]),
    )
}

fn sort_schema() -> AttributeSchema {
    AttributeSchema::new(
        "sort",
        types::block(vec![
            AttributeSchema::new("key", AttributeType::String).required(),
            AttributeSchema::new("direction", AttributeType::String)
                .with_default("asc")
                .validate(Validator::one_of(&["asc", "desc"])),
        ]),
    )
}

fn computed(mut attr: AttributeSchema) -> AttributeSchema {
    attr.mode = crate::schema::AttributeMode::Computed;
    attr.validators.clear();
    attr.default = None;
    attr
}

fn blocks(query: &Attributes, key: &str) -> Vec<HashMap<String, Value>> {
    query
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.as_map().cloned())
        .collect()
}

fn parse_filters(query: &Attributes, record: &[AttributeSchema]) -> ProviderResult<Vec<Filter>> {
    blocks(query, "filter")
        .into_iter()
        .map(|block| {
            let key = block.get("key").map(Value::to_plain_string).unwrap_or_default();
            let attr = record
                .iter()
                .find(|a| a.name == key)
                .ok_or_else(|| invalid("filter", format!("filtering by attribute '{key}' is not supported")))?;
            let filterable = match &attr.attr_type {
                AttributeType::List(inner) | AttributeType::Set(inner) => inner.is_scalar(),
                t => t.is_scalar(),
            };
            if !filterable {
                return Err(invalid("filter", format!("filtering by attribute '{key}' is not supported")));
            }
            let values = block
                .get("values")
                .and_then(Value::as_list)
                .unwrap_or_default()
                .iter()
                .map(Value::to_plain_string)
                .collect();
            Ok(Filter {
                key,
                values,
                regex: block.get("match_by").and_then(Value::as_str) == Some("re"),
                all: block.get("all").and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect()
}

fn parse_sorts(query: &Attributes, record: &[AttributeSchema]) -> ProviderResult<Vec<Sort>> {
    blocks(query, "sort")
        .into_iter()
        .map(|block| {
            let key = block.get("key").map(Value::to_plain_string).unwrap_or_default();
            let sortable = record
                .iter()
                .find(|a| a.name == key)
                .is_some_and(|a| a.attr_type.is_scalar());
            if !sortable {
                return Err(invalid("sort", format!("sorting by attribute '{key}' is not supported")));
            }
            Ok(Sort {
                key,
                descending: block.get("direction").and_then(Value::as_str) == Some("desc"),
            })
        })
        .collect()
}

fn invalid(attribute: &str, message: String) -> ProviderError {
    ProviderError::validation(message).with_attribute(attribute)
}

fn value_matches(value: &Value, pattern: &str, re: Option<&Regex>) -> bool {
    match value {
        Value::List(items) => items.iter().any(|item| value_matches(item, pattern, re)),
        Value::Float(f) => match re {
            Some(re) => re.is_match(&value.to_plain_string()),
            None => pattern.parse::<f64>().is_ok_and(|p| p == *f),
        },
        other => {
            let s = other.to_plain_string();
            match re {
                Some(re) => re.is_match(&s),
                None => s == pattern,
            }
        }
    }
}

fn apply_filters(records: Vec<Attributes>, filters: &[Filter]) -> ProviderResult<Vec<Attributes>> {
    let mut compiled = Vec::with_capacity(filters.len());
    for filter in filters {
        let regexes = if filter.regex {
            filter
                .values
                .iter()
                .map(|v| {
                    Regex::new(v).map_err(|e| invalid("filter", format!("invalid regular expression '{v}': {e}")))
                })
                .collect::<ProviderResult<Vec<_>>>()?
        } else {
            Vec::new()
        };
        compiled.push((filter, regexes));
    }

    Ok(records
        .into_iter()
        .filter(|record| {
            compiled.iter().all(|(filter, regexes)| {
                let Some(value) = record.get(&filter.key) else {
                    return false;
                };
                let matches = |i: usize| value_matches(value, &filter.values[i], regexes.get(i));
                if filter.all {
                    (0..filter.values.len()).all(matches)
                } else {
                    (0..filter.values.len()).any(matches)
                }
            })
        })
        .collect())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x @ (Value::Int(_) | Value::Float(_))), Some(y @ (Value::Int(_) | Value::Float(_)))) => x
            .as_float()
            .partial_cmp(&y.as_float())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => x.to_plain_string().cmp(&y.to_plain_string()),
    }
}

/// Sorts apply in order with a stable sort, so the last one is the outer-most key
fn apply_sorts(records: &mut [Attributes], sorts: &[Sort]) {
    for sort in sorts {
        records.sort_by(|a, b| {
            let ord = compare_values(a.get(&sort.key), b.get(&sort.key));
            if sort.descending { ord.reverse() } else { ord }
        });
    }
}

#[async_trait]
impl<M, C> DataSource<M> for DataList<C>
where
    M: Send + Sync + 'static,
    C: DataListConfig<M>,
{
    fn name(&self) -> &'static str {
        self.config.name()
    }

    fn schema(&self) -> ResourceSchema {
        let record: Vec<AttributeSchema> = self.config.record_schema().into_iter().map(computed).collect();
        ResourceSchema::new(self.config.name())
            .attribute(filter_schema())
            .attribute(sort_schema())
            .attribute(AttributeSchema::new(self.config.result_attribute_name(), types::block(record)).computed())
            .attributes(self.config.extra_query_schema())
    }

    async fn read(&self, ctx: &Context<M>, data: &mut ResourceData) -> ProviderResult<()> {
        let query = data.attributes().clone();
        let record_schema = self.config.record_schema();
        let filters = parse_filters(&query, &record_schema)?;
        let sorts = parse_sorts(&query, &record_schema)?;

        let records = self.config.get_records(ctx, &query).await?;
        let flattened = records
            .iter()
            .map(|r| self.config.flatten_record(r, &query))
            .collect::<ProviderResult<Vec<_>>>()?;

        let mut matched = apply_filters(flattened, &filters)?;
        apply_sorts(&mut matched, &sorts);
        log::debug!(
            "[{}] {} of {} records matched",
            self.config.name(),
            matched.len(),
            records.len()
        );

        data.set(
            self.config.result_attribute_name(),
            Value::List(matched.into_iter().map(Value::Map).collect()),
        );
        data.set_id(uuid::Uuid::new_v4().to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Fixture;

    #[derive(Clone)]
    struct Droplet {
        name: &'static str,
        region: &'static str,
        memory: i64,
        tags: Vec<&'static str>,
    }

    #[async_trait]
    impl DataListConfig<()> for Fixture {
        type Record = Droplet;

        fn name(&self) -> &'static str {
            "droplets"
        }

        fn result_attribute_name(&self) -> &'static str {
            "droplets"
        }

        fn record_schema(&self) -> Vec<AttributeSchema> {
            vec![
                AttributeSchema::new("name", AttributeType::String),
                AttributeSchema::new("region", AttributeType::String),
                AttributeSchema::new("memory", AttributeType::Int),
                AttributeSchema::new("tags", types::string_set()),
                AttributeSchema::new("labels", types::string_map()),
            ]
        }

        async fn get_records(&self, _ctx: &Context<()>, _query: &Attributes) -> ProviderResult<Vec<Droplet>> {
            Ok(vec![
                Droplet { name: "web-1", region: "nyc3", memory: 2048, tags: vec!["web"] },
                Droplet { name: "db-1", region: "sfo3", memory: 4096, tags: vec!["db"] },
                Droplet { name: "web-2", region: "sfo3", memory: 1024, tags: vec!["web", "canary"] },
                Droplet { name: "web-3", region: "nyc3", memory: 1024, tags: vec!["web"] },
            ])
        }

        fn flatten_record(&self, d: &Droplet, _query: &Attributes) -> ProviderResult<Attributes> {
            let mut attrs = Attributes::new();
            attrs.insert("name".to_string(), Value::from(d.name));
            attrs.insert("region".to_string(), Value::from(d.region));
            attrs.insert("memory".to_string(), Value::Int(d.memory));
            attrs.insert(
                "tags".to_string(),
                Value::from(d.tags.iter().map(|t| t.to_string()).collect::<Vec<_>>()),
            );
            Ok(attrs)
        }
    }

    fn block(pairs: &[(&str, Value)]) -> Value {
        Value::Map(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    async fn run(query: Attributes) -> ProviderResult<Vec<String>> {
        let list = DataList::new(Fixture);
        let mut data = ResourceData::new("droplets");
        for (k, v) in DataSource::<()>::schema(&list).normalize(&query) {
            data.set(k, v);
        }
        let ctx = Context::new(Arc::new(()), CancellationToken::new());
        DataSource::<()>::read(&list, &ctx, &mut data).await?;
        assert!(uuid::Uuid::parse_str(data.id_str()).is_ok());
        Ok(data
            .get_list("droplets")
            .iter()
            .filter_map(|d| d.as_map().and_then(|m| m.get("name")).map(Value::to_plain_string))
            .collect())
    }

    #[tokio::test]
    async fn filters_are_and_combined() {
        let query: Attributes = [(
            "filter".to_string(),
            Value::List(vec![
                block(&[("key", Value::from("region")), ("values", Value::from(vec!["nyc3".to_string()]))]),
                block(&[("key", Value::from("tags")), ("values", Value::from(vec!["web".to_string()]))]),
            ]),
        )]
        .into_iter()
        .collect();
        assert_eq!(run(query).await.unwrap(), vec!["web-1", "web-3"]);
    }

    #[tokio::test]
    async fn regex_and_all_matching() {
        let query: Attributes = [(
            "filter".to_string(),
            Value::List(vec![block(&[
                ("key", Value::from("tags")),
                ("values", Value::from(vec!["^web$".to_string(), "^can".to_string()])),
                ("match_by", Value::from("re")),
                ("all", Value::Bool(true)),
            ])]),
        )]
        .into_iter()
        .collect();
        assert_eq!(run(query).await.unwrap(), vec!["web-2"]);
    }

    #[tokio::test]
    async fn last_sort_is_outermost_key() {
        let query: Attributes = [(
            "sort".to_string(),
            Value::List(vec![
                block(&[("key", Value::from("name"))]),
                block(&[("key", Value::from("memory")), ("direction", Value::from("desc"))]),
            ]),
        )]
        .into_iter()
        .collect();
        assert_eq!(run(query).await.unwrap(), vec!["db-1", "web-1", "web-2", "web-3"]);
    }

    #[tokio::test]
    async fn unsupported_keys_are_rejected() {
        let sort_map: Attributes = [(
            "sort".to_string(),
            Value::List(vec![block(&[("key", Value::from("labels"))])]),
        )]
        .into_iter()
        .collect();
        let err = run(sort_map).await.unwrap_err();
        assert_eq!(err.kind, crate::provider::ErrorKind::Validation);
        assert!(err.message.contains("sorting by attribute 'labels'"));

        let unknown: Attributes = [(
            "filter".to_string(),
            Value::List(vec![block(&[
                ("key", Value::from("bogus")),
                ("values", Value::from(vec!["x".to_string()])),
            ])]),
        )]
        .into_iter()
        .collect();
        assert!(run(unknown).await.is_err());
    }

    #[test]
    fn schema_exposes_filter_sort_and_results() {
        let schema = DataSource::<()>::schema(&DataList::new(Fixture));
        assert!(schema.get("filter").is_some());
        assert!(schema.get("sort").is_some());
        assert!(schema.get("droplets").is_some_and(|a| a.mode.is_computed()));
    }
}
