//! Type definitions for mocks.
//!
//! This module contains the wire format (what clients POST and what the
//! admin API returns) and the validated, decoded forms used at request time.

use base64::Engine as _;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::scripting::{CompiledScript, ScriptError, SelectorEngine};

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while parsing a mock payload. Nothing is registered when
/// any of these occur.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("Invalid mock JSON: {0}")]
    InvalidJson(String),
    #[error("Invalid Path field '{0}', expected format METHOD /resource, e.g. GET /example")]
    InvalidPath(String),
    #[error("Unsupported METHOD type {0}")]
    UnsupportedMethod(String),
    #[error("Selector must be Sequence, Random or a selector script")]
    MissingSelector,
    #[error("Invalid Selector script: {0}")]
    InvalidSelector(#[source] ScriptError),
    #[error("Response {index}: cannot decode {encoding} body: {reason}")]
    InvalidBody {
        index: usize,
        encoding: Encoding,
        reason: String,
    },
    #[error("Response {index}: invalid status code {code}")]
    InvalidStatusCode { index: usize, code: i64 },
    #[error("Response {index}: invalid header '{name}'")]
    InvalidHeader { index: usize, name: String },
}

// ============================================================================
// Wire format
// ============================================================================

/// Mock registration payload.
///
/// Field names are PascalCase on the wire; lowercase spellings are accepted
/// when reading.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MockSpec {
    #[serde(rename = "Name", alias = "name", default)]
    pub name: String,
    #[serde(rename = "Path", alias = "path")]
    pub path: String,
    #[serde(rename = "Selector", alias = "selector", default)]
    pub selector: String,
    #[serde(rename = "Responses", alias = "responses", default)]
    pub responses: Vec<ResponseSpec>,
}

/// One canned response in wire form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseSpec {
    #[serde(rename = "Body", alias = "body", default)]
    pub body: BodySpec,
    #[serde(
        rename = "Code",
        alias = "code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<i64>,
    #[serde(rename = "Headers", alias = "headers", default)]
    pub headers: Vec<HeaderSpec>,
    #[serde(rename = "Delay", alias = "delay", default)]
    pub delay: String,
}

/// Response body in wire form: an encoding tag plus string content.
///
/// A bare JSON string is accepted as raw content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "BodySpecRaw")]
pub struct BodySpec {
    #[serde(rename = "Encoding")]
    pub encoding: String,
    #[serde(rename = "Content")]
    pub content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BodySpecRaw {
    Text(String),
    Tagged {
        #[serde(rename = "Encoding", alias = "encoding", default)]
        encoding: String,
        #[serde(rename = "Content", alias = "content", default)]
        content: String,
    },
}

impl From<BodySpecRaw> for BodySpec {
    fn from(raw: BodySpecRaw) -> Self {
        match raw {
            BodySpecRaw::Text(content) => BodySpec {
                encoding: Encoding::Raw.as_str().to_string(),
                content,
            },
            BodySpecRaw::Tagged { encoding, content } => BodySpec { encoding, content },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeaderSpec {
    #[serde(rename = "Name", alias = "name")]
    pub name: String,
    #[serde(rename = "Value", alias = "value", default)]
    pub value: String,
}

/// Serialized view of a registered mock, as returned by the admin API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MockSnapshot {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Selector")]
    pub selector: String,
    #[serde(rename = "Responses")]
    pub responses: Vec<ResponseSpec>,
    #[serde(rename = "Instances")]
    pub instances: usize,
}

// ============================================================================
// Path
// ============================================================================

/// HTTP method plus resource path a mock is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockPath {
    pub method: Method,
    pub resource: String,
}

impl MockPath {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
        }
    }

    /// Router pattern for the resource.
    ///
    /// `:name` segments become `{name}` and `*name` segments become
    /// `{*name}`; patterns already written with braces are kept.
    pub fn route_pattern(&self) -> String {
        self.resource
            .split('/')
            .map(|segment| {
                if let Some(name) = segment.strip_prefix(':') {
                    format!("{{{name}}}")
                } else if let Some(name) = segment.strip_prefix('*') {
                    format!("{{*{name}}}")
                } else {
                    segment.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl FromStr for MockPath {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split(' ').collect();
        let [method, resource] = segments.as_slice() else {
            return Err(MockError::InvalidPath(s.to_string()));
        };
        if !resource.starts_with('/') {
            return Err(MockError::InvalidPath(s.to_string()));
        }

        let method = match method.to_uppercase().as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            other => return Err(MockError::UnsupportedMethod(other.to_string())),
        };

        Ok(MockPath::new(method, *resource))
    }
}

impl fmt::Display for MockPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.resource)
    }
}

// ============================================================================
// Selector
// ============================================================================

/// Strategy used to pick among a mock's responses
#[derive(Debug, Clone)]
pub enum Selector {
    /// Round-robin, advancing before each read
    Sequence,
    /// Uniformly random position
    Random,
    /// Index computed by a selector script
    Script(CompiledScript),
}

impl Selector {
    pub fn parse(raw: &str, engine: &dyn SelectorEngine) -> Result<Self, MockError> {
        match raw.trim().to_lowercase().as_str() {
            "" => Err(MockError::MissingSelector),
            "sequence" => Ok(Selector::Sequence),
            "random" => Ok(Selector::Random),
            _ => CompiledScript::compile(raw, engine)
                .map(Selector::Script)
                .map_err(MockError::InvalidSelector),
        }
    }

    /// Selector text as it participates in identity and serialization
    pub fn source(&self) -> &str {
        match self {
            Selector::Sequence => "Sequence",
            Selector::Random => "Random",
            Selector::Script(script) => script.source(),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// Body encoding tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Raw,
    Base64,
    Base32,
}

impl Encoding {
    /// Unknown tags fall back to raw
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "base64" => Encoding::Base64,
            "base32" => Encoding::Base32,
            _ => Encoding::Raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Base64 => "base64",
            Encoding::Base32 => "base32",
        }
    }

    fn decode(&self, content: &str) -> Result<Vec<u8>, String> {
        match self {
            Encoding::Raw => Ok(content.as_bytes().to_vec()),
            Encoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(content)
                .map_err(|e| e.to_string()),
            Encoding::Base32 => data_encoding::BASE32
                .decode(content.as_bytes())
                .map_err(|e| e.to_string()),
        }
    }

    fn encode(&self, content: &[u8]) -> String {
        match self {
            Encoding::Raw => String::from_utf8_lossy(content).into_owned(),
            Encoding::Base64 => base64::engine::general_purpose::STANDARD.encode(content),
            Encoding::Base32 => data_encoding::BASE32.encode(content),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub encoding: Encoding,
    pub content: Bytes,
}

impl Body {
    fn to_spec(&self) -> BodySpec {
        BodySpec {
            encoding: self.encoding.as_str().to_string(),
            content: self.encoding.encode(&self.content),
        }
    }
}

/// Minimum total handling time for a response
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Delay {
    value: String,
    duration: Duration,
}

impl Delay {
    /// Parse a duration string such as `250ms` or `1s`. Anything that does
    /// not parse means no delay.
    pub fn parse(value: &str) -> Self {
        let duration = humantime::parse_duration(value.trim()).unwrap_or(Duration::ZERO);
        Self {
            value: value.to_string(),
            duration,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// A canned response, immutable once parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub body: Body,
    pub code: StatusCode,
    pub headers: Vec<Header>,
    pub delay: Delay,
}

impl MockResponse {
    /// Validate and decode a wire response. `index` is the response's
    /// position, used in error messages.
    pub fn from_spec(index: usize, spec: &ResponseSpec) -> Result<Self, MockError> {
        let encoding = Encoding::parse(&spec.body.encoding);
        let content = encoding
            .decode(&spec.body.content)
            .map_err(|reason| MockError::InvalidBody {
                index,
                encoding,
                reason,
            })?;

        let raw_code = spec.code.unwrap_or(200);
        let code = u16::try_from(raw_code)
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .ok_or(MockError::InvalidStatusCode {
                index,
                code: raw_code,
            })?;

        let headers = spec
            .headers
            .iter()
            .map(|h| {
                let valid = hyper::header::HeaderName::from_bytes(h.name.as_bytes()).is_ok()
                    && hyper::header::HeaderValue::from_str(&h.value).is_ok();
                if valid {
                    Ok(Header {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                } else {
                    Err(MockError::InvalidHeader {
                        index,
                        name: h.name.clone(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            body: Body {
                encoding,
                content: Bytes::from(content),
            },
            code,
            headers,
            delay: Delay::parse(&spec.delay),
        })
    }

    /// Back to wire form: body re-encoded, delay as its original string
    pub fn to_spec(&self) -> ResponseSpec {
        ResponseSpec {
            body: self.body.to_spec(),
            code: Some(i64::from(self.code.as_u16())),
            headers: self
                .headers
                .iter()
                .map(|h| HeaderSpec {
                    name: h.name.clone(),
                    value: h.value.clone(),
                })
                .collect(),
            delay: self.delay.value().to_string(),
        }
    }
}
