//! Request handling for hosts.
//!
//! Routes an incoming request to the mock bound to its method and path,
//! runs the mock's selector and renders the chosen response.

use super::core::{Host, RouteMatch};
use crate::response::build_response;
use crate::mock::{render, Selection};
use crate::scripting::ScriptRequest;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Handle a request to a host
pub async fn handle_host_request(
    req: Request<Incoming>,
    host: Arc<Host>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    host.increment_request_count();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(parse_query_string).unwrap_or_default();

    debug!(
        port = host.port(),
        client = %client_addr,
        "{} {}", method, path
    );

    let (mock, path_params) = match host.route(&method, &path) {
        RouteMatch::Found { mock, params } => (mock, params),
        RouteMatch::MethodNotAllowed => {
            return Ok(build_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "405 method not allowed",
            ));
        }
        RouteMatch::NotFound => {
            return Ok(build_response(StatusCode::NOT_FOUND, "404 page not found"));
        }
    };

    let headers: HashMap<String, String> = req
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        })
        .collect();

    let body = match req.into_body().collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(e) => {
            debug!(port = host.port(), "Failed to read request body: {}", e);
            return Ok(build_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ));
        }
    };

    let script_request = ScriptRequest {
        method: method.to_string(),
        path,
        headers,
        body,
        query,
        path_params,
    };

    let selection = mock.select(&script_request);
    match &selection {
        Selection::Response { index, .. } => {
            debug!(port = host.port(), mock_id = mock.id(), index, "Response selected");
        }
        Selection::Fallback { status, body } if status.is_server_error() => {
            warn!(
                port = host.port(),
                mock_id = mock.id(),
                "Selection failed: {}",
                body
            );
        }
        Selection::Fallback { .. } => {}
    }

    Ok(render(selection, started).await)
}

/// Decode a raw query string into a map; repeated keys keep the last value
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).unwrap_or_default().into_owned();
            let value = urlencoding::decode(value).unwrap_or_default().into_owned();
            (key, value)
        })
        .collect()
}
