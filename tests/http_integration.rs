//! Integration tests for the ARM clients using wiremock
//!
//! These tests run the lister, the getter and the sub-resource enrichers
//! against mocked Resource Manager endpoints.

use azsql::azure::auth::{AzureCredentials, TokenSource};
use azsql::azure::client::ArmClient;
use azsql::azure::error::ArmError;
use azsql::query::{KeyQuals, QueryContext};
use azsql::sql::{ServerKey, SqlClients, SqlServerTable, SubResourceKind};
use futures::TryStreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{
    bearer_token, body_string_contains, header_exists, method, path, query_param,
    query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUB: &str = "sub1";
const API_VERSION: &str = "2021-11-01";
const SERVERS_PATH: &str = "/subscriptions/sub1/providers/Microsoft.Sql/servers";

fn server_id(rg: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}",
        SUB, rg, name
    )
}

fn server_json(rg: &str, name: &str) -> Value {
    json!({
        "id": server_id(rg, name),
        "name": name,
        "type": "Microsoft.Sql/servers",
        "kind": "v12.0",
        "location": "westeurope",
        "tags": {"owner": "data"},
        "properties": {
            "administratorLogin": "sqladmin",
            "version": "12.0",
            "state": "Ready",
            "fullyQualifiedDomainName": format!("{}.database.windows.net", name),
            "minimalTlsVersion": "1.2",
            "publicNetworkAccess": "Enabled"
        }
    })
}

fn server_path(rg: &str, name: &str) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Sql/servers/{}",
        SUB, rg, name
    )
}

fn child_path(rg: &str, name: &str, collection: &str) -> String {
    format!("{}/{}", server_path(rg, name), collection)
}

fn clients_for(server: &MockServer) -> SqlClients {
    let creds = AzureCredentials::from_static_token("test-token").unwrap();
    let client = ArmClient::with_endpoint(SUB, creds, &server.uri()).unwrap();
    SqlClients::new(client)
}

/// Mount a servers list page. `token` selects the page via `$skiptoken`;
/// `None` is the first page.
async fn mount_server_page(
    server: &MockServer,
    token: Option<&str>,
    items: Vec<Value>,
    next: Option<&str>,
    expected_calls: u64,
) {
    let mut body = json!({ "value": items });
    if let Some(next) = next {
        body["nextLink"] = json!(format!(
            "{}{}?api-version={}&$skiptoken={}",
            server.uri(),
            SERVERS_PATH,
            API_VERSION,
            next
        ));
    }

    let mock = Mock::given(method("GET")).and(path(SERVERS_PATH));
    let mock = match token {
        Some(token) => mock.and(query_param("$skiptoken", token)),
        None => mock.and(query_param_is_missing("$skiptoken")),
    };

    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn names(servers: &[azsql::sql::Server]) -> Vec<String> {
    servers.iter().filter_map(|s| s.name.clone()).collect()
}

mod lister_tests {
    use super::*;

    /// Every page is followed and items come back in page order
    #[tokio::test]
    async fn test_list_follows_next_link() {
        let server = MockServer::start().await;
        mount_server_page(
            &server,
            None,
            vec![server_json("rg1", "a"), server_json("rg1", "b")],
            Some("p2"),
            1,
        )
        .await;
        mount_server_page(&server, Some("p2"), vec![], Some("p3"), 1).await;
        mount_server_page(
            &server,
            Some("p3"),
            vec![
                server_json("rg2", "c"),
                server_json("rg2", "d"),
                server_json("rg3", "e"),
            ],
            None,
            1,
        )
        .await;

        let clients = clients_for(&server);
        let servers = assert_ok!(clients.servers().list(&QueryContext::new()).collect_all().await);

        assert_eq!(names(&servers), vec!["a", "b", "c", "d", "e"]);
    }

    /// Reaching the row limit stops paging: page two is never requested
    #[tokio::test]
    async fn test_limit_stops_before_next_page() {
        let server = MockServer::start().await;
        mount_server_page(
            &server,
            None,
            vec![server_json("rg1", "a"), server_json("rg1", "b")],
            Some("p2"),
            1,
        )
        .await;
        mount_server_page(&server, Some("p2"), vec![server_json("rg1", "c")], None, 0).await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new().with_limit(Some(2));
        let mut lister = clients.servers().list(&ctx);

        let mut seen = Vec::new();
        while let Some(s) = lister.next().await.unwrap() {
            seen.push(s);
        }

        assert_eq!(names(&seen), vec!["a", "b"]);
        assert_eq!(lister.pages_fetched(), 1);
    }

    /// A limit that falls inside a later page fetches exactly up to it
    #[tokio::test]
    async fn test_limit_inside_second_page() {
        let server = MockServer::start().await;
        mount_server_page(
            &server,
            None,
            vec![server_json("rg1", "a"), server_json("rg1", "b")],
            Some("p2"),
            1,
        )
        .await;
        mount_server_page(
            &server,
            Some("p2"),
            vec![server_json("rg1", "c"), server_json("rg1", "d")],
            Some("p3"),
            1,
        )
        .await;
        mount_server_page(&server, Some("p3"), vec![server_json("rg1", "e")], None, 0).await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new().with_limit(Some(3));
        let servers = clients.servers().list(&ctx).collect_all().await.unwrap();

        assert_eq!(names(&servers), vec!["a", "b", "c"]);
    }

    /// A zero limit issues no request at all
    #[tokio::test]
    async fn test_zero_limit_fetches_nothing() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "a")], None, 0).await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new().with_limit(Some(0));
        let servers = clients.servers().list(&ctx).collect_all().await.unwrap();
        assert!(servers.is_empty());
    }

    /// A failing page surfaces immediately; earlier items stay valid
    #[tokio::test]
    async fn test_page_error_ends_listing() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "a")], Some("p2"), 1).await;
        Mock::given(method("GET"))
            .and(path(SERVERS_PATH))
            .and(query_param("$skiptoken", "p2"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": "TooManyRequests", "message": "slow down"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new();
        let mut lister = clients.servers().list(&ctx);

        let first = lister.next().await.unwrap().unwrap();
        assert_eq!(first.name.as_deref(), Some("a"));

        let err = assert_err!(lister.next().await);
        assert_eq!(ArmError::from_anyhow(&err).and_then(ArmError::status), Some(429));

        assert!(lister.next().await.unwrap().is_none());
    }

    /// Requests carry the bearer token and a client request id
    #[tokio::test]
    async fn test_requests_are_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVERS_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(bearer_token("test-token"))
            .and(header_exists("x-ms-client-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let servers = clients.servers().list(&QueryContext::new()).collect_all().await;
        assert!(assert_ok!(servers).is_empty());
    }

    /// The stream adapter yields the same servers as pulling by hand
    #[tokio::test]
    async fn test_list_as_stream() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "a")], Some("p2"), 1).await;
        mount_server_page(&server, Some("p2"), vec![server_json("rg1", "b")], None, 1).await;

        let clients = clients_for(&server);
        let servers: Vec<_> = clients
            .servers()
            .list(&QueryContext::new())
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(names(&servers), vec!["a", "b"]);
    }
}

mod getter_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_existing_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(server_path("rg1", "srv1")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(server_json("rg1", "srv1"))
                    .insert_header("x-ms-request-id", "req-123"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let response = clients
            .servers()
            .get("rg1", "srv1", &QueryContext::new())
            .await
            .unwrap()
            .expect("server should be found");

        assert_eq!(response.server.name.as_deref(), Some("srv1"));
        assert_eq!(response.request_id.as_deref(), Some("req-123"));
        assert_eq!(
            response
                .server
                .properties
                .as_ref()
                .and_then(|p| p.fully_qualified_domain_name.as_deref()),
            Some("srv1.database.windows.net")
        );
    }

    /// Every not-found class error maps to "no row"
    #[tokio::test]
    async fn test_not_found_errors_are_no_row() {
        let cases = [
            (404, "ResourceNotFound"),
            (404, "ResourceGroupNotFound"),
            (400, "InvalidApiVersionParameter"),
            (404, "SomethingElseButStill404"),
        ];

        for (status, code) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(server_path("rg1", "srv1")))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": {"code": code, "message": "not here"}
                })))
                .mount(&server)
                .await;

            let clients = clients_for(&server);
            let result = clients.servers().get("rg1", "srv1", &QueryContext::new()).await;
            assert!(
                matches!(result, Ok(None)),
                "{} {} should be no row, got {:?}",
                status,
                code,
                result
            );
        }
    }

    /// A successful response without an id is also "no row"
    #[tokio::test]
    async fn test_empty_id_is_no_row() {
        for body in [json!({}), json!({"id": "", "name": "srv1"}), json!({"name": "srv1"})] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(server_path("rg1", "srv1")))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .mount(&server)
                .await;

            let clients = clients_for(&server);
            let result = clients
                .servers()
                .get("rg1", "srv1", &QueryContext::new())
                .await
                .unwrap();
            assert!(result.is_none());
        }
    }

    /// Anything else is fatal
    #[tokio::test]
    async fn test_other_errors_are_surfaced() {
        let cases = [
            (403, "AuthorizationFailed"),
            (401, "InvalidAuthenticationToken"),
            (500, "InternalError"),
        ];

        for (status, code) in cases {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path(server_path("rg1", "srv1")))
                .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                    "error": {"code": code, "message": "nope"}
                })))
                .mount(&server)
                .await;

            let clients = clients_for(&server);
            let err = clients
                .servers()
                .get("rg1", "srv1", &QueryContext::new())
                .await
                .unwrap_err();
            let arm = ArmError::from_anyhow(&err).expect("typed error");
            assert_eq!(arm.status(), Some(status));
            assert_eq!(arm.code(), Some(code));
        }
    }

    #[tokio::test]
    async fn test_get_by_quals_requires_both_keys() {
        let server = MockServer::start().await;
        let clients = clients_for(&server);
        let quals = KeyQuals::new().with("name", "srv1");
        assert!(clients
            .servers()
            .get_by_quals(&quals, &QueryContext::new())
            .await
            .is_err());
    }
}

mod enricher_tests {
    use super::*;

    fn parent() -> azsql::sql::Server {
        serde_json::from_value(server_json("rg1", "srv1")).unwrap()
    }

    #[tokio::test]
    async fn test_no_sub_resources_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(child_path("rg1", "srv1", "firewallRules")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let rules = clients
            .hydrate(SubResourceKind::FirewallRules, &parent(), &QueryContext::new())
            .await
            .unwrap();
        assert!(rules.is_empty());
    }

    #[tokio::test]
    async fn test_pages_are_concatenated() {
        let server = MockServer::start().await;
        let collection = child_path("rg1", "srv1", "firewallRules");
        Mock::given(method("GET"))
            .and(path(collection.clone()))
            .and(query_param_is_missing("$skiptoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "rule1", "properties": {"startIpAddress": "10.0.0.1"}}],
                "nextLink": format!("{}{}?api-version={}&$skiptoken=2", server.uri(), collection, API_VERSION)
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(collection.clone()))
            .and(query_param("$skiptoken", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "rule2"}, {"name": "rule3"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let rules = clients
            .hydrate(SubResourceKind::FirewallRules, &parent(), &QueryContext::new())
            .await
            .unwrap();
        let rule_names: Vec<_> = rules.iter().filter_map(|r| r.name.as_deref()).collect();
        assert_eq!(rule_names, vec!["rule1", "rule2", "rule3"]);
    }

    #[tokio::test]
    async fn test_page_error_fails_whole_enrichment() {
        let server = MockServer::start().await;
        let collection = child_path("rg1", "srv1", "securityAlertPolicies");
        Mock::given(method("GET"))
            .and(path(collection.clone()))
            .and(query_param_is_missing("$skiptoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "Default"}],
                "nextLink": format!("{}{}?api-version={}&$skiptoken=2", server.uri(), collection, API_VERSION)
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(collection))
            .and(query_param("$skiptoken", "2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let err = clients
            .hydrate(SubResourceKind::SecurityAlertPolicies, &parent(), &QueryContext::new())
            .await
            .unwrap_err();
        assert_eq!(ArmError::from_anyhow(&err).and_then(ArmError::status), Some(503));
    }

    /// Each kind calls its own collection under the parent server
    #[tokio::test]
    async fn test_every_kind_hits_its_collection() {
        let server = MockServer::start().await;
        for kind in SubResourceKind::ALL {
            Mock::given(method("GET"))
                .and(path(child_path("rg1", "srv1", kind.collection())))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "value": [{"name": kind.key(), "properties": {}}]
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let clients = clients_for(&server);
        for kind in SubResourceKind::ALL {
            let items = clients
                .hydrate(kind, &parent(), &QueryContext::new())
                .await
                .unwrap();
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].name.as_deref(), Some(kind.key()));
        }
    }

    /// Listed servers, get responses and explicit keys are all valid parents
    #[tokio::test]
    async fn test_virtual_network_rules_accept_any_parent_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(server_path("rg1", "srv1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json("rg1", "srv1")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(child_path("rg1", "srv1", "virtualNetworkRules")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "vnet-rule", "properties": {"virtualNetworkSubnetId": "/x"}}]
            })))
            .expect(3)
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new();
        let kind = SubResourceKind::VirtualNetworkRules;

        let from_list = clients.hydrate(kind, &parent(), &ctx).await.unwrap();

        let response = clients
            .servers()
            .get("rg1", "srv1", &ctx)
            .await
            .unwrap()
            .unwrap();
        let from_get = clients.hydrate(kind, &response, &ctx).await.unwrap();

        let key = ServerKey::new(SUB, "rg1", "srv1");
        let from_key = clients.hydrate(kind, &key, &ctx).await.unwrap();

        assert_eq!(from_list, from_get);
        assert_eq!(from_get, from_key);
    }

    #[tokio::test]
    async fn test_missing_name_fails_without_request() {
        let server = MockServer::start().await;
        let clients = clients_for(&server);
        let mut nameless = parent();
        nameless.name = None;

        let err = clients
            .hydrate(SubResourceKind::EncryptionProtectors, &nameless, &QueryContext::new())
            .await
            .unwrap_err();
        assert!(matches!(
            ArmError::from_anyhow(&err),
            Some(ArmError::IncompleteReference(_))
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}

mod table_tests {
    use super::*;

    /// One failing enrichment only nulls its own column
    #[tokio::test]
    async fn test_row_with_partial_enrichment_failure() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "srv1")], None, 1).await;
        Mock::given(method("GET"))
            .and(path(child_path("rg1", "srv1", "firewallRules")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"name": "AllowAzure"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(child_path("rg1", "srv1", "auditingSettings")))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {"code": "AuthorizationFailed", "message": "no"}
            })))
            .mount(&server)
            .await;

        let table = SqlServerTable::new(clients_for(&server)).unwrap();
        let names = vec![
            "name".to_string(),
            "resource_group".to_string(),
            "firewall_rules".to_string(),
            "server_audit_policy".to_string(),
        ];
        let columns = table.definition().project(Some(names.as_slice())).unwrap();
        let ctx = QueryContext::new();

        let rows: Vec<_> = table
            .list_rows(&columns, &ctx, 2)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("name"), Some(&json!("srv1")));
        assert_eq!(row.get("resource_group"), Some(&json!("rg1")));
        assert_eq!(row.get("firewall_rules"), Some(&json!([{"name": "AllowAzure"}])));
        assert_eq!(row.get("server_audit_policy"), Some(&Value::Null));
        assert!(row.errors.contains_key("server_audit_policy"));
    }

    /// Columns that need no enrichment trigger no sub-resource calls
    #[tokio::test]
    async fn test_projection_skips_unneeded_enrichers() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "srv1")], None, 1).await;

        let table = SqlServerTable::new(clients_for(&server)).unwrap();
        let names = vec!["name".to_string(), "region".to_string()];
        let columns = table.definition().project(Some(names.as_slice())).unwrap();
        let ctx = QueryContext::new();

        let rows: Vec<_> = table.list_rows(&columns, &ctx, 4).try_collect().await.unwrap();
        assert_eq!(rows[0].get("region"), Some(&json!("westeurope")));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_row_for_missing_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(server_path("rg1", "gone")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "ResourceNotFound", "message": "gone"}
            })))
            .mount(&server)
            .await;

        let table = SqlServerTable::new(clients_for(&server)).unwrap();
        let columns = table.definition().project(None).unwrap();
        let quals = KeyQuals::new().with("name", "gone").with("resource_group", "rg1");

        let row = table.get_row(&quals, &columns, &QueryContext::new()).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_get_row_includes_session_columns() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(server_path("rg1", "srv1")))
            .respond_with(ResponseTemplate::new(200).set_body_json(server_json("rg1", "srv1")))
            .mount(&server)
            .await;

        let table = SqlServerTable::new(clients_for(&server)).unwrap();
        let names = vec![
            "id".to_string(),
            "subscription_id".to_string(),
            "cloud_environment".to_string(),
            "tags_src".to_string(),
        ];
        let columns = table.definition().project(Some(names.as_slice())).unwrap();
        let quals = KeyQuals::new().with("name", "srv1").with("resource_group", "rg1");

        let row = table
            .get_row(&quals, &columns, &QueryContext::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get("id"), Some(&json!(server_id("rg1", "srv1"))));
        assert_eq!(row.get("subscription_id"), Some(&json!(SUB)));
        assert_eq!(row.get("cloud_environment"), Some(&json!("AzureCustomCloud")));
        assert_eq!(row.get("tags_src"), Some(&json!({"owner": "data"})));
    }

    /// Cancelling while an enricher is in flight fails the row
    #[tokio::test]
    async fn test_cancel_during_enrichment_yields_no_row() {
        let server = MockServer::start().await;
        mount_server_page(&server, None, vec![server_json("rg1", "srv1")], None, 1).await;
        Mock::given(method("GET"))
            .and(path(child_path("rg1", "srv1", "firewallRules")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"value": []}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let table = SqlServerTable::new(clients_for(&server)).unwrap();
        let names = vec!["name".to_string(), "firewall_rules".to_string()];
        let columns = table.definition().project(Some(names.as_slice())).unwrap();
        let ctx = QueryContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let result: Result<Vec<_>, _> = table.list_rows(&columns, &ctx, 2).try_collect().await;
        let err = assert_err!(result);
        assert!(matches!(ArmError::from_anyhow(&err), Some(ArmError::Cancelled)));
    }
}

mod auth_tests {
    use super::*;

    /// Service principal tokens are requested once and then cached
    #[tokio::test]
    async fn test_client_secret_flow_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app1"))
            .and(body_string_contains("scope="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "sp-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let creds = AzureCredentials::with_endpoints(
            TokenSource::ClientSecret {
                tenant_id: "tenant1".into(),
                client_id: "app1".into(),
                client_secret: "s3cret".into(),
            },
            &server.uri(),
            "https://management.azure.com",
        )
        .unwrap();

        assert_eq!(creds.get_token().await.unwrap(), "sp-token");
        assert_eq!(creds.get_token().await.unwrap(), "sp-token");
    }

    /// Concurrent cache misses share a single token request
    #[tokio::test]
    async fn test_concurrent_callers_share_one_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"expires_in": 3599, "access_token": "sp-token"}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let creds = AzureCredentials::with_endpoints(
            TokenSource::ClientSecret {
                tenant_id: "tenant1".into(),
                client_id: "app1".into(),
                client_secret: "s3cret".into(),
            },
            &server.uri(),
            "https://management.azure.com",
        )
        .unwrap();

        let tokens = futures::future::join_all((0..8).map(|_| {
            let creds = creds.clone();
            async move { creds.get_token().await }
        }))
        .await;

        for token in tokens {
            assert_eq!(token.unwrap(), "sp-token");
        }
    }

    #[tokio::test]
    async fn test_rejected_secret_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let creds = AzureCredentials::with_endpoints(
            TokenSource::ClientSecret {
                tenant_id: "tenant1".into(),
                client_id: "app1".into(),
                client_secret: "wrong".into(),
            },
            &server.uri(),
            "https://management.azure.com",
        )
        .unwrap();

        let err = creds.get_token().await.unwrap_err();
        assert!(matches!(
            ArmError::from_anyhow(&err),
            Some(ArmError::Authentication(_))
        ));
    }
}

mod cancellation_tests {
    use super::*;

    /// Cancelling the query aborts an in-flight request
    #[tokio::test]
    async fn test_cancel_aborts_slow_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SERVERS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"value": []}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let clients = clients_for(&server);
        let ctx = QueryContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = clients.servers().list(&ctx).collect_all().await.unwrap_err();
        assert!(matches!(ArmError::from_anyhow(&err), Some(ArmError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
