//! Tests for the host module.
//!
//! This module covers:
//! - Mock collection: add, merge, conflicts, removal
//! - Routing and path parameters
//! - HostManager lifecycle against real listeners

use super::*;
use crate::mock::{Mock, MockPath};
use crate::scripting::RhaiEngine;
use hyper::Method;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn parse(payload: serde_json::Value) -> Mock {
    Mock::from_json(payload.to_string().as_bytes(), &RhaiEngine::new()).unwrap()
}

fn text_mock(path: &str, bodies: &[&str]) -> Mock {
    let responses: Vec<serde_json::Value> = bodies
        .iter()
        .map(|b| json!({"Body": {"Encoding": "raw", "Content": b}, "Code": 200}))
        .collect();
    parse(json!({
        "Name": "text",
        "Path": path,
        "Selector": "Sequence",
        "Responses": responses
    }))
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn local_manager() -> HostManager {
    HostManager::new(
        HostSettings {
            bind_address: "127.0.0.1".to_string(),
            shutdown_timeout: Duration::from_secs(2),
        },
        Arc::new(RhaiEngine::new()),
    )
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

// ============================================================================
// Mock collection
// ============================================================================

#[test]
fn test_identical_mocks_merge() {
    let host = Host::new(9000);
    let first = host.add_mock(text_mock("GET /a", &["x"])).unwrap();
    let second = host.add_mock(text_mock("GET /a", &["x"])).unwrap();
    let third = host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &third));
    assert_eq!(first.instances(), 3);
    assert_eq!(host.mock_count(), 1);
}

#[test]
fn test_merged_mock_needs_one_removal_per_registration() {
    let host = Host::new(9000);
    let id = host.add_mock(text_mock("GET /a", &["x"])).unwrap().id().to_string();
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    assert_eq!(
        host.remove_mock(&id, false).unwrap(),
        Removal::Decremented { remaining: 2 }
    );
    assert_eq!(
        host.remove_mock(&id, false).unwrap(),
        Removal::Decremented { remaining: 1 }
    );
    assert!(!host.is_empty());
    assert_eq!(host.remove_mock(&id, false).unwrap(), Removal::Evicted);
    assert!(host.is_empty());
}

#[test]
fn test_force_removal_ignores_instances() {
    let host = Host::new(9000);
    let id = host.add_mock(text_mock("GET /a", &["x"])).unwrap().id().to_string();
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    assert_eq!(host.remove_mock(&id, true).unwrap(), Removal::Evicted);
    assert!(host.is_empty());
    assert!(matches!(
        host.route(&Method::GET, "/a"),
        RouteMatch::NotFound
    ));
}

#[test]
fn test_conflicting_mock_leaves_original_untouched() {
    let host = Host::new(9000);
    let original = host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    let err = host.add_mock(text_mock("GET /a", &["y"])).unwrap_err();
    match err {
        HostError::MergeConflict {
            path, existing_id, ..
        } => {
            assert_eq!(path, "GET /a");
            assert_eq!(existing_id, original.id());
        }
        other => panic!("expected merge conflict, got {other:?}"),
    }

    let current = host
        .mock_by_path(&MockPath::new(Method::GET, "/a"))
        .unwrap();
    assert!(Arc::ptr_eq(&current, &original));
    assert_eq!(current.instances(), 1);
}

#[test]
fn test_same_resource_different_methods_coexist() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /a", &["get"])).unwrap();
    host.add_mock(text_mock("POST /a", &["post"])).unwrap();
    assert_eq!(host.mock_count(), 2);
}

#[test]
fn test_route_conflict_is_rejected() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /users/:id", &["x"])).unwrap();

    let err = host
        .add_mock(text_mock("GET /users/{id}", &["x"]))
        .unwrap_err();
    assert!(matches!(err, HostError::RouteConflict { .. }));
    assert_eq!(host.mock_count(), 1);
    assert!(matches!(
        host.route(&Method::GET, "/users/7"),
        RouteMatch::Found { .. }
    ));
}

#[test]
fn test_remove_unknown_mock() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();
    let err = host.remove_mock("nope", false).unwrap_err();
    assert!(matches!(err, HostError::MockNotFound(id) if id == "nope"));
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn test_route_captures_params() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /users/:id/files/*rest", &["x"]))
        .unwrap();

    match host.route(&Method::GET, "/users/42/files/a/b.txt") {
        RouteMatch::Found { params, .. } => {
            assert_eq!(params.get("id").map(String::as_str), Some("42"));
            assert_eq!(params.get("rest").map(String::as_str), Some("a/b.txt"));
        }
        _ => panic!("expected a route match"),
    }
}

#[test]
fn test_route_method_not_allowed_and_not_found() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    assert!(matches!(
        host.route(&Method::POST, "/a"),
        RouteMatch::MethodNotAllowed
    ));
    assert!(matches!(
        host.route(&Method::GET, "/b"),
        RouteMatch::NotFound
    ));
}

#[test]
fn test_snapshot_orders_mocks_by_path() {
    let host = Host::new(9000);
    host.add_mock(text_mock("POST /b", &["x"])).unwrap();
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();
    host.add_mock(text_mock("GET /b", &["x"])).unwrap();

    let snapshot = host.snapshot();
    let paths: Vec<&str> = snapshot.mocks.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(paths, vec!["GET /a", "GET /b", "POST /b"]);
    assert_eq!(snapshot.port, 9000);
    assert_eq!(snapshot.requests, 0);
}

#[test]
fn test_snapshot_serialization() {
    let host = Host::new(9000);
    host.add_mock(text_mock("GET /a", &["x"])).unwrap();

    let value = serde_json::to_value(host.snapshot()).unwrap();
    assert_eq!(value["Port"], 9000);
    assert_eq!(value["Requests"], 0);
    assert_eq!(value["Mocks"][0]["Path"], "GET /a");
    assert_eq!(value["Mocks"][0]["Instances"], 1);
    assert!(value["CreatedAt"].is_string());
}

#[test]
fn test_parse_query_string() {
    let query = parse_query_string("a=1&b=hello%20world&flag&&c=x%2Cy");
    assert_eq!(query.get("a").map(String::as_str), Some("1"));
    assert_eq!(query.get("b").map(String::as_str), Some("hello world"));
    assert_eq!(query.get("flag").map(String::as_str), Some(""));
    assert_eq!(query.get("c").map(String::as_str), Some("x,y"));
    assert_eq!(query.len(), 4);
}

// ============================================================================
// HostManager lifecycle
// ============================================================================

#[tokio::test]
async fn test_register_starts_host_and_serves_mock() {
    let manager = local_manager();
    let port = free_port();

    let registration = manager
        .register_mock(port, text_mock("GET /letters", &["A", "B", "C"]))
        .await
        .unwrap();
    assert_eq!(registration.host.port, port);
    assert_eq!(registration.mock.instances, 1);
    assert_eq!(manager.count(), 1);

    let client = client();
    let url = format!("http://127.0.0.1:{port}/letters");
    let mut bodies = Vec::new();
    for _ in 0..4 {
        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        bodies.push(resp.text().await.unwrap());
    }
    assert_eq!(bodies, vec!["B", "C", "A", "B"]);

    let resp = client
        .get(format!("http://127.0.0.1:{port}/missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    assert_eq!(resp.text().await.unwrap(), "404 page not found");

    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), 405);

    assert_eq!(manager.lookup_host(port).unwrap().requests, 6);
    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_last_removal_destroys_host_and_frees_port() {
    let manager = local_manager();
    let port = free_port();

    let registration = manager
        .register_mock(port, text_mock("GET /a", &["x"]))
        .await
        .unwrap();
    let id = registration.mock.id.clone();

    let resp = client()
        .get(format!("http://127.0.0.1:{port}/a"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let snapshot = manager.remove_mock(port, &id, false).await.unwrap();
    assert!(snapshot.mocks.is_empty());
    assert!(matches!(
        manager.lookup_host(port),
        Err(HostError::HostNotFound(p)) if p == port
    ));
    assert_eq!(manager.tracked_ports(), 0);
    assert!(tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .is_err());

    // A new registration starts an independent host
    let registration = manager
        .register_mock(port, text_mock("GET /a", &["x"]))
        .await
        .unwrap();
    assert_eq!(registration.host.requests, 0);
    assert_eq!(registration.mock.instances, 1);
    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_merged_registrations_keep_host_alive() {
    let manager = local_manager();
    let port = free_port();

    let mut id = String::new();
    for expected in 1..=3 {
        let registration = manager
            .register_mock(port, text_mock("GET /a", &["x"]))
            .await
            .unwrap();
        assert_eq!(registration.mock.instances, expected);
        id = registration.mock.id;
    }

    for _ in 0..2 {
        manager.remove_mock(port, &id, false).await.unwrap();
        assert!(manager.lookup_mock(port, &id).is_ok());
    }
    manager.remove_mock(port, &id, false).await.unwrap();
    assert!(manager.get_host(port).is_none());
}

#[tokio::test]
async fn test_failed_parse_creates_no_host() {
    let manager = local_manager();
    let port = free_port();

    let err = manager
        .register_json(port, br#"{"Name": "bad", "Path": "DELETE /a", "Selector": "Sequence"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Parse(_)));
    assert_eq!(manager.count(), 0);
}

#[tokio::test]
async fn test_rejected_first_mock_releases_port() {
    let manager = local_manager();
    let port = free_port();

    let err = manager
        .register_mock(port, text_mock("GET /files/*rest/tail", &["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::RouteConflict { .. }));
    assert_eq!(manager.count(), 0);
    assert_eq!(manager.tracked_ports(), 0);

    manager
        .register_mock(port, text_mock("GET /files", &["x"]))
        .await
        .unwrap();
    assert_eq!(manager.count(), 1);
    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_bind_failure_is_surfaced() {
    let manager = local_manager();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let err = manager
        .register_mock(port, text_mock("GET /a", &["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Bind(p, _) if p == port));
    assert_eq!(manager.count(), 0);
    assert_eq!(manager.tracked_ports(), 0);

    let err = manager
        .register_mock(0, text_mock("GET /a", &["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Bind(0, _)));
}

#[tokio::test]
async fn test_remove_from_unknown_host() {
    let manager = local_manager();
    let err = manager.remove_mock(1, "id", false).await.unwrap_err();
    assert!(matches!(err, HostError::HostNotFound(1)));
    assert_eq!(manager.tracked_ports(), 0);
}

#[tokio::test]
async fn test_hosts_are_listed_by_port() {
    let manager = local_manager();
    let mut ports = vec![free_port(), free_port()];
    for port in &ports {
        manager
            .register_mock(*port, text_mock("GET /a", &["x"]))
            .await
            .unwrap();
    }
    ports.sort();

    let listed: Vec<u16> = manager.list_hosts().iter().map(|h| h.port).collect();
    assert_eq!(listed, ports);

    let errors = manager.shutdown_all().await;
    assert!(errors.is_empty());
    assert_eq!(manager.count(), 0);
    assert_eq!(manager.tracked_ports(), 0);
}

#[tokio::test]
async fn test_delay_is_a_floor() {
    let manager = local_manager();
    let port = free_port();
    manager
        .register_json(
            port,
            json!({
                "Name": "slow",
                "Path": "GET /slow",
                "Selector": "Sequence",
                "Responses": [{"Body": {"Encoding": "raw", "Content": "late"}, "Code": 200, "Delay": "150ms"}]
            })
            .to_string()
            .as_bytes(),
        )
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let resp = client()
        .get(format!("http://127.0.0.1:{port}/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.text().await.unwrap(), "late");
    assert!(started.elapsed() >= Duration::from_millis(150));
    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_concurrent_registrations_share_one_host() {
    const REGISTRATIONS: usize = 8;
    let manager = local_manager();
    let port = free_port();

    let results = futures::future::join_all(
        (0..REGISTRATIONS).map(|_| manager.register_mock(port, text_mock("GET /a", &["x"]))),
    )
    .await;

    let ids: Vec<String> = results
        .into_iter()
        .map(|result| result.unwrap().mock.id)
        .collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(manager.count(), 1);
    assert_eq!(
        manager.lookup_mock(port, &ids[0]).unwrap().instances,
        REGISTRATIONS
    );
    manager.shutdown_all().await;
}

#[tokio::test]
async fn test_drain_timeout_is_reported() {
    let drain = Duration::from_millis(200);
    let manager = HostManager::new(
        HostSettings {
            bind_address: "127.0.0.1".to_string(),
            shutdown_timeout: drain,
        },
        Arc::new(RhaiEngine::new()),
    );
    let port = free_port();
    let slow = json!({
        "Name": "stuck",
        "Path": "GET /stuck",
        "Selector": "Sequence",
        "Responses": [{"Body": {"Encoding": "raw", "Content": "never"}, "Code": 200, "Delay": "3s"}]
    })
    .to_string();
    let registration = manager.register_json(port, slow.as_bytes()).await.unwrap();

    let in_flight = tokio::spawn(
        client()
            .get(format!("http://127.0.0.1:{port}/stuck"))
            .send(),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let err = manager
        .remove_mock(port, &registration.mock.id, true)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, HostError::ShutdownTimeout(p, d) if p == port && d == drain));
    assert!(elapsed >= drain);
    assert!(elapsed < Duration::from_secs(2));
    assert!(manager.get_host(port).is_none());
    assert!(in_flight.await.unwrap().is_err());

    // The port is free again once the stuck connection is aborted
    manager.register_json(port, slow.as_bytes()).await.unwrap();
    manager.shutdown_all().await;
}
