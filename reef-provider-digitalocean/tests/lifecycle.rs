//! End-to-end lifecycle calls against a mocked API

use std::collections::HashMap;

use reef_core::differ::DiffAction;
use reef_core::interpreter::Lifecycle;
use reef_core::resource::{Attributes, Resource, State, Value};
use reef_provider_digitalocean::DigitalOceanProvider;
use reef_provider_digitalocean::config::CombinedConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn lifecycle(server: &MockServer) -> Lifecycle<CombinedConfig> {
    let config: Attributes = [
        ("token".to_string(), Value::from("test-token")),
        ("api_endpoint".to_string(), Value::from(server.uri())),
        ("http_retry_max".to_string(), Value::from(0i64)),
    ]
    .into_iter()
    .collect();
    Lifecycle::configure(&DigitalOceanProvider, &config).await.unwrap()
}

fn cname_record(id: i64, data: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "CNAME",
        "name": "www",
        "data": data,
        "ttl": 1800,
        "priority": null,
        "port": null,
        "weight": null,
        "flags": null,
        "tag": null
    })
}

#[tokio::test]
async fn record_create_plan_and_destroy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/domains/example.com/records"))
        .and(body_partial_json(json!({"type": "CNAME", "name": "www", "data": "target.example.org"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"domain_record": cname_record(10, "target.example.org")})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com/records/10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"domain_record": cname_record(10, "target.example.org")})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/domains/example.com/records/10"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let desired = Resource::new("record")
        .with_attribute("domain", "example.com")
        .with_attribute("type", "CNAME")
        .with_attribute("name", "www")
        .with_attribute("value", "target.example.org");

    let diff = lifecycle.plan(Some(&desired), None).unwrap();
    assert_eq!(diff.action, DiffAction::Create);
    let state = lifecycle.apply(&diff, None).await.unwrap().unwrap();
    assert_eq!(state.id, "10");
    assert_eq!(state.attributes["fqdn"], Value::from("www.example.com"));
    assert_eq!(state.attributes["value"], Value::from("target.example.org."));
    assert_eq!(state.attributes["ttl"], Value::from(1800i64));

    // The relative and absolute spellings of the target are the same record
    let diff = lifecycle.plan(Some(&desired), Some(&state)).unwrap();
    assert_eq!(diff.action, DiffAction::NoChange);

    lifecycle.destroy(&state).await.unwrap();
}

#[tokio::test]
async fn refresh_drops_missing_record() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com/records/11"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"id": "not_found", "message": "The resource you were accessing could not be found."})),
        )
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let attributes: Attributes = [
        ("domain".to_string(), Value::from("example.com")),
        ("type".to_string(), Value::from("A")),
        ("name".to_string(), Value::from("www")),
        ("value".to_string(), Value::from("192.0.2.1")),
    ]
    .into_iter()
    .collect();
    let state = State::new("record", "11", attributes);
    assert!(lifecycle.refresh(&state).await.unwrap().is_none());
}

#[tokio::test]
async fn record_import_rejects_malformed_id() {
    let server = MockServer::start().await;
    let lifecycle = lifecycle(&server).await;
    let err = lifecycle.import("record", "example.com").await.unwrap_err();
    assert_eq!(err.kind, reef_core::provider::ErrorKind::InvalidCompositeId);
    assert!(err.message.contains("example.com,12345678"));
}

#[tokio::test]
async fn vpc_peering_delete_waits_until_gone() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/vpc_peerings/peer-1"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/vpc_peerings/peer-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vpc_peering": {
                "id": "peer-1",
                "name": "a-to-b",
                "vpc_ids": ["vpc-a", "vpc-b"],
                "status": "DELETING",
                "created_at": "2024-05-01T00:00:00Z"
            }
        })))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/vpc_peerings/peer-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"id": "not_found", "message": "not found"})))
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let attributes: Attributes = [
        ("name".to_string(), Value::from("a-to-b")),
        ("vpc_ids".to_string(), Value::from(vec!["vpc-a".to_string(), "vpc-b".to_string()])),
    ]
    .into_iter()
    .collect();
    lifecycle
        .destroy(&State::new("vpc_peering", "peer-1", attributes))
        .await
        .unwrap();

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "GET")
        .count();
    assert_eq!(polls, 3);
}

#[tokio::test]
async fn reserved_ip_assignment_import_and_drift() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/reserved_ips/192.0.2.10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reserved_ip": {
                "ip": "192.0.2.10",
                "region": {"slug": "nyc3"},
                "droplet": {"id": 123},
                "locked": false
            }
        })))
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let state = lifecycle
        .import("reserved_ip_assignment", "192.0.2.10,123")
        .await
        .unwrap();
    assert!(state.id.starts_with("192.0.2.10,123-"));
    assert_eq!(state.attributes["ip_address"], Value::from("192.0.2.10"));
    assert_eq!(state.attributes["droplet_id"], Value::from(123i64));

    // Held by another droplet: the binding is gone and deleting it is a no-op
    let mut moved = state.clone();
    moved.attributes.insert("droplet_id".into(), Value::from(456i64));
    assert!(lifecycle.refresh(&moved).await.unwrap().is_none());
    lifecycle.destroy(&moved).await.unwrap();
    let posts = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 0);
}

fn filter_block(key: &str, values: &[&str], match_by: &str) -> Value {
    let block: HashMap<String, Value> = [
        ("key".to_string(), Value::from(key)),
        ("values".to_string(), Value::from(values.iter().map(|v| v.to_string()).collect::<Vec<_>>())),
        ("match_by".to_string(), Value::from(match_by)),
        ("all".to_string(), Value::from(false)),
    ]
    .into_iter()
    .collect();
    Value::Map(block)
}

fn sort_block(key: &str, direction: &str) -> Value {
    let block: HashMap<String, Value> = [
        ("key".to_string(), Value::from(key)),
        ("direction".to_string(), Value::from(direction)),
    ]
    .into_iter()
    .collect();
    Value::Map(block)
}

#[tokio::test]
async fn domains_list_filters_sorts_and_pages() {
    let server = MockServer::start().await;
    let domain = |name: &str| json!({"name": name, "ttl": 1800, "zone_file": ""});
    Mock::given(method("GET"))
        .and(path("/v2/domains"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domains": [domain("alpha.com"), domain("beta.com")],
            "links": {"pages": {
                "next": format!("{}/v2/domains?page=2&per_page=200", server.uri()),
                "last": format!("{}/v2/domains?page=2&per_page=200", server.uri())
            }},
            "meta": {"total": 3}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/domains"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domains": [domain("bravo.com")],
            "links": {"pages": {
                "first": format!("{}/v2/domains?page=1&per_page=200", server.uri()),
                "prev": format!("{}/v2/domains?page=1&per_page=200", server.uri())
            }},
            "meta": {"total": 3}
        })))
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let query: Attributes = [
        ("filter".to_string(), Value::List(vec![filter_block("name", &["^b"], "re")])),
        ("sort".to_string(), Value::List(vec![sort_block("name", "desc")])),
    ]
    .into_iter()
    .collect();
    let state = lifecycle.read_data_source("domains", &query).await.unwrap();

    let names: Vec<String> = state.attributes["domains"]
        .as_list()
        .unwrap()
        .iter()
        .map(|d| d.as_map().unwrap()["name"].to_plain_string())
        .collect();
    assert_eq!(names, vec!["bravo.com", "beta.com"]);
}

#[tokio::test]
async fn domains_list_rejects_unknown_filter_key() {
    let server = MockServer::start().await;
    let lifecycle = lifecycle(&server).await;
    let query: Attributes = [("filter".to_string(), Value::List(vec![filter_block("owner", &["x"], "exact")]))]
        .into_iter()
        .collect();
    let err = lifecycle.read_data_source("domains", &query).await.unwrap_err();
    assert!(err.message.contains("filtering by attribute 'owner' is not supported"));
}

#[tokio::test]
async fn records_list_filters_by_type_and_sorts_by_name() {
    let server = MockServer::start().await;
    let record = |id: i64, record_type: &str, name: &str, data: &str, priority: Option<i64>| {
        json!({
            "id": id,
            "type": record_type,
            "name": name,
            "data": data,
            "ttl": 3600,
            "priority": priority,
            "port": null,
            "weight": null,
            "flags": null,
            "tag": null
        })
    };
    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domain_records": [
                record(1, "A", "www", "192.0.2.1", None),
                record(2, "MX", "@", "mail.example.com", Some(10)),
                record(3, "A", "api", "192.0.2.2", None)
            ],
            "links": {},
            "meta": {"total": 3}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let query: Attributes = [
        ("domain".to_string(), Value::from("example.com")),
        ("filter".to_string(), Value::List(vec![filter_block("type", &["A"], "exact")])),
        ("sort".to_string(), Value::List(vec![sort_block("name", "asc")])),
    ]
    .into_iter()
    .collect();
    let state = lifecycle.read_data_source("records", &query).await.unwrap();
    assert_eq!(state.attributes["domain"], Value::from("example.com"));

    let records = state.attributes["records"].as_list().unwrap();
    let rows: Vec<(String, String, String)> = records
        .iter()
        .map(|r| {
            let r = r.as_map().unwrap();
            (r["name"].to_plain_string(), r["type"].to_plain_string(), r["domain"].to_plain_string())
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("api".to_string(), "A".to_string(), "example.com".to_string()),
            ("www".to_string(), "A".to_string(), "example.com".to_string()),
        ]
    );
}

fn vpc_peering(name: &str) -> serde_json::Value {
    json!({
        "vpc_peering": {
            "id": "peer-1",
            "name": name,
            "vpc_ids": ["vpc-a", "vpc-b"],
            "status": "ACTIVE",
            "created_at": "2024-05-01T00:00:00Z"
        }
    })
}

#[tokio::test]
async fn vpc_peering_rename_patches_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/v2/vpc_peerings/peer-1"))
        .and(body_partial_json(json!({"name": "a-to-b-renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(vpc_peering("a-to-b-renamed")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/vpc_peerings/peer-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vpc_peering("a-to-b-renamed")))
        .expect(1)
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let vpc_ids = Value::from(vec!["vpc-a".to_string(), "vpc-b".to_string()]);
    let attributes: Attributes = [
        ("name".to_string(), Value::from("a-to-b")),
        ("vpc_ids".to_string(), vpc_ids.clone()),
        ("status".to_string(), Value::from("ACTIVE")),
        ("created_at".to_string(), Value::from("2024-05-01T00:00:00Z")),
    ]
    .into_iter()
    .collect();
    let state = State::new("vpc_peering", "peer-1", attributes);
    let desired = Resource::new("vpc_peering")
        .with_attribute("name", "a-to-b-renamed")
        .with_attribute("vpc_ids", vpc_ids);

    let diff = lifecycle.plan(Some(&desired), Some(&state)).unwrap();
    assert_eq!(diff.action, DiffAction::Update);
    let updated = lifecycle.apply(&diff, Some(&state)).await.unwrap().unwrap();
    assert_eq!(updated.id, "peer-1");
    assert_eq!(updated.attributes["name"], Value::from("a-to-b-renamed"));

    let methods: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.method.to_string())
        .collect();
    assert_eq!(methods, vec!["PATCH", "GET"]);
}

#[tokio::test]
async fn domain_create_retries_server_errors() {
    let server = MockServer::start().await;
    let domain = json!({"domain": {"name": "example.com", "ttl": 1800, "zone_file": ""}});
    Mock::given(method("POST"))
        .and(path("/v2/domains"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"id": "server_error", "message": "try again"})))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/domains"))
        .respond_with(ResponseTemplate::new(201).set_body_json(domain.clone()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/domains/example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(domain))
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let desired = Resource::new("domain").with_attribute("name", "example.com");
    let diff = lifecycle.plan(Some(&desired), None).unwrap();
    let state = lifecycle.apply(&diff, None).await.unwrap().unwrap();
    assert_eq!(state.id, "example.com");
}

#[tokio::test]
async fn domain_create_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/domains"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"id": "unprocessable_entity", "message": "Name already in use"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let desired = Resource::new("domain").with_attribute("name", "example.com");
    let diff = lifecycle.plan(Some(&desired), None).unwrap();
    let err = lifecycle.apply(&diff, None).await.unwrap_err();
    assert_eq!(err.error.status(), Some(422));
    assert!(err.partial.is_none());
}

#[tokio::test]
async fn reserved_ip_reassignment_issues_single_assign() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/reserved_ips/192.0.2.10/actions"))
        .and(body_partial_json(json!({"type": "assign", "droplet_id": 456})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"action": {"id": 7, "status": "in-progress", "type": "assign_ip"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/actions/7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"action": {"id": 7, "status": "completed", "type": "assign_ip"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/reserved_ips/192.0.2.10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reserved_ip": {
                "ip": "192.0.2.10",
                "region": {"slug": "nyc3"},
                "droplet": {"id": 456},
                "locked": false
            }
        })))
        .mount(&server)
        .await;

    let lifecycle = lifecycle(&server).await;
    let attributes: Attributes = [
        ("ip_address".to_string(), Value::from("192.0.2.10")),
        ("region".to_string(), Value::from("nyc3")),
        ("droplet_id".to_string(), Value::from(123i64)),
        ("urn".to_string(), Value::from("do:reservedip:192.0.2.10")),
    ]
    .into_iter()
    .collect();
    let state = State::new("reserved_ip", "192.0.2.10", attributes);
    let desired = Resource::new("reserved_ip")
        .with_attribute("region", "nyc3")
        .with_attribute("droplet_id", 456i64);

    let diff = lifecycle.plan(Some(&desired), Some(&state)).unwrap();
    assert_eq!(diff.action, DiffAction::Update);
    let updated = lifecycle.apply(&diff, Some(&state)).await.unwrap().unwrap();
    assert_eq!(updated.attributes["droplet_id"], Value::from(456i64));

    let posts = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "POST")
        .count();
    assert_eq!(posts, 1);
}
