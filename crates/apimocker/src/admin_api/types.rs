//! Response types and helpers for the Admin API.

use crate::host::HostError;
use crate::response::build_response_with_headers;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

/// Link to an admin resource
#[derive(Debug, Serialize, Clone)]
pub struct Link {
    pub href: String,
}

/// Links advertised by the API root
#[derive(Debug, Serialize)]
pub struct RootLinks {
    pub hosts: Link,
    pub health: Link,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    #[serde(rename = "_links")]
    pub links: RootLinks,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub hosts: usize,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Query parameters for mock removal
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RemoveQueryParams {
    pub force: bool,
}

impl RemoveQueryParams {
    pub fn parse(query: Option<&str>) -> Self {
        let force = query
            .map(crate::host::parse_query_string)
            .and_then(|params| params.get("force").cloned())
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
        Self { force }
    }
}

/// Extract base URL from request headers for links
pub fn get_base_url(req: &Request<Incoming>) -> String {
    if let Some(host) = req.headers().get("host") {
        if let Ok(host_str) = host.to_str() {
            return format!("http://{}", host_str);
        }
    }
    "http://localhost:2525".to_string()
}

/// Location of a mock resource
pub fn mock_location(base_url: &str, port: u16, id: &str) -> String {
    format!("{}/api/v1/host/{}/mock/{}", base_url, port, id)
}

// =============================================================================
// Response helper functions
// =============================================================================

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    json_response_with_headers(status, std::iter::empty::<(&str, &str)>(), body)
}

/// Create a JSON response with extra headers
pub fn json_response_with_headers<T: Serialize>(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: &T,
) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    let mut response =
        build_response_with_headers(status, [("Content-Type", "application/json")], json);
    for (key, value) in headers {
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(key.as_ref().as_bytes()),
            hyper::header::HeaderValue::from_str(value.as_ref()),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

/// Create an error response
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

/// Map a host error onto its admin API status
pub fn host_error_status(err: &HostError) -> StatusCode {
    match err {
        HostError::Parse(_)
        | HostError::MergeConflict { .. }
        | HostError::RouteConflict { .. }
        | HostError::HostNotFound(_)
        | HostError::MockNotFound(_) => StatusCode::BAD_REQUEST,
        HostError::Bind(..) | HostError::ShutdownTimeout(..) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Create an error response for a host error
pub fn host_error_response(err: &HostError) -> Response<Full<Bytes>> {
    error_response(host_error_status(err), &err.to_string())
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
