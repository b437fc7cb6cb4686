//! Route dispatch logic for the Admin API.

use crate::admin_api::handlers::{hosts, system};
use crate::admin_api::types::{error_response, get_base_url, not_found};
use crate::host::HostManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

const API_PREFIX: &str = "/api/v1/host";

/// Parsed route for host-specific endpoints
#[derive(Debug, PartialEq, Eq)]
enum HostRoute<'a> {
    /// POST/GET /api/v1/host/:port
    Root,
    /// GET/DELETE /api/v1/host/:port/mock/:id
    MockById(&'a str),
}

impl<'a> HostRoute<'a> {
    /// Parse route from path segments after `/api/v1/host/:port`
    fn parse(segments: &[&'a str]) -> Option<Self> {
        match segments {
            [] | [""] => Some(HostRoute::Root),
            ["mock", id] if !id.is_empty() => Some(HostRoute::MockById(id)),
            _ => None,
        }
    }
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    manager: Arc<HostManager>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|s| s.to_string());
    let base_url = get_base_url(&req);

    debug!("Admin API: {} {}", method, path);

    let response = route_by_path(&method, &path, query.as_deref(), req, &base_url, manager).await;
    Ok(response)
}

/// Route based on path
async fn route_by_path(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    base_url: &str,
    manager: Arc<HostManager>,
) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => return system::handle_root(base_url),
        (&Method::GET, "/health") => return system::handle_health(&manager),
        (&Method::GET, API_PREFIX) => return hosts::handle_list(&manager),
        _ => {}
    }

    if let Some(rest) = path
        .strip_prefix(API_PREFIX)
        .and_then(|rest| rest.strip_prefix('/'))
    {
        return route_host(method, rest, query, req, base_url, manager).await;
    }

    not_found()
}

/// Route host-specific requests
async fn route_host(
    method: &Method,
    path: &str,
    query: Option<&str>,
    req: Request<Incoming>,
    base_url: &str,
    manager: Arc<HostManager>,
) -> Response<Full<Bytes>> {
    let segments: Vec<&str> = path.split('/').collect();

    let port: u16 = match segments[0].parse() {
        Ok(p) => p,
        Err(_) => return error_response(StatusCode::BAD_REQUEST, "Invalid port number"),
    };

    let route = match HostRoute::parse(&segments[1..]) {
        Some(r) => r,
        None => return not_found(),
    };

    match (method, route) {
        (&Method::POST, HostRoute::Root) => hosts::handle_register(port, req, base_url, manager).await,
        (&Method::GET, HostRoute::Root) => hosts::handle_get(port, &manager),
        (&Method::GET, HostRoute::MockById(id)) => hosts::handle_get_mock(port, id, &manager),
        (&Method::DELETE, HostRoute::MockById(id)) => {
            hosts::handle_remove(port, id, query, manager).await
        }
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    }
}
