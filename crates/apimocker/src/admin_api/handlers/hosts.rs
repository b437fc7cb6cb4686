//! Host and mock handlers.

use crate::admin_api::types::*;
use crate::host::HostManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{info, warn};

/// POST /api/v1/host/:port - Register a mock, creating the host if needed
pub async fn handle_register(
    port: u16,
    req: Request<Incoming>,
    base_url: &str,
    manager: Arc<HostManager>,
) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e),
    };

    match manager.register_json(port, &body).await {
        Ok(registration) => {
            info!(
                port,
                mock_id = %registration.mock.id,
                instances = registration.mock.instances,
                "Mock registered"
            );
            let location = mock_location(base_url, port, &registration.mock.id);
            json_response_with_headers(
                StatusCode::CREATED,
                [("Location", location.as_str())],
                &registration.host,
            )
        }
        Err(e) => {
            warn!(port, "Mock registration rejected: {}", e);
            host_error_response(&e)
        }
    }
}

/// DELETE /api/v1/host/:port/mock/:id - Remove a mock
pub async fn handle_remove(
    port: u16,
    id: &str,
    query: Option<&str>,
    manager: Arc<HostManager>,
) -> Response<Full<Bytes>> {
    let params = RemoveQueryParams::parse(query);
    match manager.remove_mock(port, id, params.force).await {
        Ok(host) => json_response(StatusCode::OK, &host),
        Err(e) => host_error_response(&e),
    }
}

/// GET /api/v1/host/:port - Host snapshot
pub fn handle_get(port: u16, manager: &HostManager) -> Response<Full<Bytes>> {
    match manager.lookup_host(port) {
        Ok(host) => json_response(StatusCode::OK, &host),
        Err(e) => host_error_response(&e),
    }
}

/// GET /api/v1/host/:port/mock/:id - Mock snapshot
pub fn handle_get_mock(port: u16, id: &str, manager: &HostManager) -> Response<Full<Bytes>> {
    match manager.lookup_mock(port, id) {
        Ok(mock) => json_response(StatusCode::OK, &mock),
        Err(e) => host_error_response(&e),
    }
}

/// GET /api/v1/host - All hosts
pub fn handle_list(manager: &HostManager) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &manager.list_hosts())
}
