//! System handlers: root links and health.

use crate::admin_api::types::*;
use crate::host::HostManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET / - Root endpoint
pub fn handle_root(base_url: &str) -> Response<Full<Bytes>> {
    let body = RootResponse {
        links: RootLinks {
            hosts: Link {
                href: format!("{}/api/v1/host", base_url),
            },
            health: Link {
                href: format!("{}/health", base_url),
            },
        },
    };
    json_response(StatusCode::OK, &body)
}

/// GET /health - Health check
pub fn handle_health(manager: &HostManager) -> Response<Full<Bytes>> {
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        hosts: manager.count(),
    };
    json_response(StatusCode::OK, &body)
}
