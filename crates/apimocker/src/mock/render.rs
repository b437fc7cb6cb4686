//! Rendering of selected responses onto the wire.

use super::selection::Selection;
use super::types::MockResponse;
use crate::response::build_response;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderName, HeaderValue};
use hyper::Response;
use std::time::Instant;

/// Turn a selection into an HTTP response. `started` is when the request
/// was received.
pub async fn render(selection: Selection<'_>, started: Instant) -> Response<Full<Bytes>> {
    match selection {
        Selection::Response { response, .. } => render_response(response, started).await,
        Selection::Fallback { status, body } => build_response(status, body),
    }
}

/// Headers are applied in order (a repeated name replaces the earlier
/// value), then the status, then the body bytes verbatim.
///
/// The declared delay is a floor on total handling time: only the part not
/// already spent since `started` is slept, and only this request's task
/// waits.
pub async fn render_response(response: &MockResponse, started: Instant) -> Response<Full<Bytes>> {
    let mut rendered = build_response(response.code, response.body.content.clone());

    let headers = rendered.headers_mut();
    for header in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_str(&header.value),
        ) {
            headers.insert(name, value);
        }
    }

    let remaining = response.delay.duration().saturating_sub(started.elapsed());
    if !remaining.is_zero() {
        tokio::time::sleep(remaining).await;
    }

    rendered
}
