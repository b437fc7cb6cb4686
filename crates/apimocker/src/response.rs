//! Plain HTTP response construction shared by hosts and the admin API.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// Build an HTTP response with the given status and body.
///
/// Falls back to a bare response if the builder rejects its input.
pub fn build_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

/// Build an HTTP response with headers
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from("Internal Server Error"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_build_response() {
        let response = build_response(StatusCode::NOT_FOUND, "404 page not found");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().is_empty());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("404 page not found"));
    }

    #[test]
    fn test_invalid_header_falls_back() {
        let response =
            build_response_with_headers(StatusCode::OK, [("Bad Header", "x")], "ignored");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_headers_are_applied() {
        let response = build_response_with_headers(
            StatusCode::CREATED,
            [("Content-Type", "application/json"), ("X-Trace", "1")],
            "{}",
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["x-trace"], "1");
    }
}
