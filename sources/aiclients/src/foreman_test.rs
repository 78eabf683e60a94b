use crate::foreman::{ForemanClient, HostUpdate, NewHost};
use crate::http::test_util::service_http;
use aiconfig::Service;
use aihttp::ErrorKind;
use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::json;

fn client(server: &Server, dryrun: bool) -> ForemanClient {
    ForemanClient::from_http(service_http(server, Service::Foreman, dryrun))
}

fn page(subtotal: usize, names: &[&str]) -> impl httptest::responders::Responder {
    let results: Vec<_> = names
        .iter()
        .enumerate()
        .map(|(i, name)| json!({"id": i + 1, "name": name}))
        .collect();
    json_encoded(json!({
        "total": 100,
        "subtotal": subtotal,
        "per_page": 2,
        "results": results,
    }))
}

fn expect_search(server: &Server, model: &str, query: &str, id: u64) {
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", format!("/api/{}", model)),
            request::query(url_decoded(contains(("search", query.to_string())))),
        ])
        .times(1)
        .respond_with(json_encoded(json!({
            "subtotal": 1,
            "results": [{"id": id}],
        }))),
    );
}

#[test]
fn paginated_search() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("search", "hostgroup ~ ai")))),
            request::query(url_decoded(contains(("page", "1")))),
            request::query(url_decoded(contains(("per_page", "2")))),
            request::headers(contains(("accept", "application/json,version=2"))),
        ])
        .times(1)
        .respond_with(page(3, &["foo", "bar"])),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("page", "2")))),
        ])
        .times(1)
        .respond_with(page(3, &["baz"])),
    );
    let results = client(&server, false)
        .with_per_page(2)
        .search_query("hosts", "hostgroup ~ ai")
        .unwrap();
    let names: Vec<&str> = results
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["foo", "bar", "baz"]);
}

#[test]
fn subtotal_growing_after_first_page() {
    let server = Server::run();
    for (number, subtotal, names) in [
        ("1", 2, vec!["foo", "bar"]),
        ("2", 3, vec!["baz"]),
        ("3", 3, vec![]),
    ] {
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/api/hosts"),
                request::query(url_decoded(contains(("page", number)))),
            ])
            .times(if number == "3" { 0 } else { 1 })
            .respond_with(page(subtotal, &names)),
        );
    }
    let results = client(&server, false)
        .with_per_page(2)
        .search_query("hosts", "hostgroup ~ ai")
        .unwrap();
    let names: Vec<&str> = results
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["foo", "bar", "baz"]);
}

#[test]
fn exact_multiple_of_page_size() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("page", "1")))),
        ])
        .times(1)
        .respond_with(page(4, &["a", "b"])),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("page", "2")))),
        ])
        .times(1)
        .respond_with(page(4, &["c", "d"])),
    );
    let results = client(&server, false)
        .with_per_page(2)
        .search_query("hosts", "")
        .unwrap();
    assert_eq!(results.len(), 4);
}

#[test]
fn full_first_page_is_confirmed() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("page", "1")))),
        ])
        .times(1)
        .respond_with(page(2, &["a", "b"])),
    );
    server.expect(
        Expectation::matching(all_of![
            request::method_path("GET", "/api/hosts"),
            request::query(url_decoded(contains(("page", "2")))),
        ])
        .times(1)
        .respond_with(page(2, &[])),
    );
    let results = client(&server, false)
        .with_per_page(2)
        .search_query("hosts", "")
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn empty_page_stops() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/hosts"))
            .times(1)
            .respond_with(page(10, &[])),
    );
    let results = client(&server, false).search_query("hosts", "x").unwrap();
    assert!(results.is_empty());
}

#[test]
fn hostgroup_resolved_by_label_and_cached() {
    let server = Server::run();
    expect_search(&server, "hostgroups", "label = \"ai/foo\"", 42);
    let client = client(&server, false);
    assert_eq!(client.hostgroup_id("ai/foo").unwrap(), 42);
    assert_eq!(client.hostgroup_id("ai/foo").unwrap(), 42);
}

#[test]
fn failed_lookups_are_not_cached() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/environments"))
            .times(2)
            .respond_with(json_encoded(json!({"subtotal": 0, "results": []}))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/users"))
            .times(1)
            .respond_with(json_encoded(json!({
                "subtotal": 2,
                "results": [{"id": 1}, {"id": 2}],
            }))),
    );
    let client = client(&server, false);
    for _ in 0..2 {
        assert_eq!(
            client.environment_id("nope").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
    assert_eq!(
        client.user_id("jdoe").unwrap_err().kind(),
        ErrorKind::InvalidInput
    );
}

fn new_host() -> NewHost {
    NewHost {
        fqdn: "foo.example.org".to_string(),
        environment: "production".to_string(),
        hostgroup: "ai/foo".to_string(),
        owner: Some("jdoe".to_string()),
        operatingsystem: Some("RedHat 9.3".to_string()),
        comment: Some("a comment".to_string()),
        ..Default::default()
    }
}

fn expect_new_host_lookups(server: &Server) {
    expect_search(server, "environments", "name = \"production\"", 1);
    expect_search(server, "hostgroups", "label = \"ai/foo\"", 2);
    expect_search(server, "users", "login = \"jdoe\"", 3);
    expect_search(server, "operatingsystems", "title = \"RedHat 9.3\"", 4);
}

#[test]
fn add_host() {
    let server = Server::run();
    expect_new_host_lookups(&server);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/api/hosts"),
            request::body(json_decoded(eq(json!({
                "host": {
                    "name": "foo.example.org",
                    "environment_id": 1,
                    "hostgroup_id": 2,
                    "owner_id": 3,
                    "owner_type": "User",
                    "operatingsystem_id": 4,
                    "comment": "a comment",
                    "managed": false,
                    "build": false,
                }
            })))),
        ])
        .times(1)
        .respond_with(status_code(201).body("{}")),
    );
    client(&server, false).add_host(&new_host()).unwrap();
}

#[test]
fn add_existing_host() {
    let server = Server::run();
    expect_new_host_lookups(&server);
    server.expect(
        Expectation::matching(request::method_path("POST", "/api/hosts"))
            .times(1)
            .respond_with(status_code(422).body("{\"error\": \"Name has already been taken\"}")),
    );
    let err = client(&server, false).add_host(&new_host()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[test]
fn add_host_dryrun() {
    let server = Server::run();
    expect_new_host_lookups(&server);
    client(&server, true).add_host(&new_host()).unwrap();
}

#[test]
fn delete_host() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("DELETE", "/api/hosts/foo.example.org"))
            .times(3)
            .respond_with(cycle![
                status_code(202),
                status_code(404),
                status_code(409).body("host is locked"),
            ]),
    );
    let client = client(&server, false);
    client.delete_host("foo.example.org").unwrap();
    assert_eq!(
        client.delete_host("foo.example.org").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    let err = client.delete_host("foo.example.org").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedResponse);
    assert!(err.to_string().contains("host is locked"));
}

#[test]
fn delete_host_dryrun() {
    let server = Server::run();
    client(&server, true).delete_host("foo.example.org").unwrap();
}

#[test]
fn get_host_expanded() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/hosts/foo.example.org"))
            .respond_with(json_encoded(json!({
                "name": "foo.example.org",
                "hostgroup_id": 7,
                "medium_id": 3,
            }))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/hostgroups/7"))
            .respond_with(json_encoded(json!({"id": 7, "title": "ai/foo"}))),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/media/3"))
            .respond_with(json_encoded(json!({"id": 3, "name": "RHEL mirror"}))),
    );
    let host = client(&server, false)
        .get_host("foo.example.org", &["hostgroup", "medium"])
        .unwrap();
    assert_eq!(host["hostgroup"]["title"], "ai/foo");
    assert_eq!(host["medium"]["name"], "RHEL mirror");
}

#[test]
fn get_missing_host() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/api/hosts/nope.example.org"))
            .respond_with(status_code(404)),
    );
    let err = client(&server, false)
        .get_host("nope.example.org", &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn add_parameter() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("POST", "/api/hosts/foo.example.org/parameters"),
            request::body(json_decoded(eq(json!({
                "parameter": {"name": "landb_responsible", "value": "ai-admins"}
            })))),
        ])
        .respond_with(status_code(201).body("{}")),
    );
    client(&server, false)
        .add_host_parameter("foo.example.org", "landb_responsible", "ai-admins")
        .unwrap();
}

#[test]
fn power() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", "/api/hosts/foo.example.org/power"),
            request::body(json_decoded(eq(json!({"power_action": "status"})))),
        ])
        .respond_with(json_encoded(json!({"power": "on"}))),
    );
    // Only the status read goes out in dry-run mode.
    let client = client(&server, true);
    assert_eq!(
        client.power_operation("foo.example.org", "status").unwrap(),
        Some(json!("on"))
    );
    assert_eq!(client.power_operation("foo.example.org", "cycle").unwrap(), None);
    assert_eq!(
        client
            .power_operation("foo.example.org", "explode")
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
}

#[test]
fn rename_and_update() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", "/api/hosts/old.example.org"),
            request::body(json_decoded(eq(json!({"host": {"name": "new.example.org"}})))),
        ])
        .respond_with(json_encoded(json!({"name": "new.example.org"}))),
    );
    expect_search(&server, "environments", "name = \"qa\"", 9);
    server.expect(
        Expectation::matching(all_of![
            request::method_path("PUT", "/api/hosts/new.example.org"),
            request::body(json_decoded(eq(json!({"host": {"environment_id": 9}})))),
        ])
        .respond_with(json_encoded(json!({}))),
    );
    let client = client(&server, false);
    client
        .rename_host("old.example.org", "new.example.org")
        .unwrap();
    client
        .update_host(
            "new.example.org",
            &HostUpdate {
                environment: Some("qa".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        client
            .update_host("new.example.org", &HostUpdate::default())
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidInput
    );
}
