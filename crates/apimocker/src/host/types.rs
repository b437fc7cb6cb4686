//! Type definitions for hosts: errors, snapshots and operation outcomes.

use crate::mock::{MockError, MockSnapshot};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Parse(#[from] MockError),
    #[error("Mock '{name}' wants to occupy {path} but mock {existing_id} already does and the two cannot merge")]
    MergeConflict {
        path: String,
        name: String,
        existing_id: String,
    },
    #[error("Route {pattern} cannot be added: {reason}")]
    RouteConflict { pattern: String, reason: String },
    #[error("A host does not exist on port {0}")]
    HostNotFound(u16),
    #[error("A mock does not exist with id {0}")]
    MockNotFound(String),
    #[error("Failed to bind port {0}: {1}")]
    Bind(u16, String),
    #[error("Host on port {0} did not drain within {1:?}")]
    ShutdownTimeout(u16, Duration),
}

/// Serialized view of a host; the listener itself is never serialized
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSnapshot {
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "Mocks")]
    pub mocks: Vec<MockSnapshot>,
    /// Requests served since the host started
    #[serde(rename = "Requests")]
    pub requests: u64,
    #[serde(rename = "CreatedAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub host: HostSnapshot,
    /// The mock now occupying the path (the existing one when merged)
    pub mock: MockSnapshot,
}

/// What removing a mock did to the host's collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Another registration still holds the mock
    Decremented { remaining: usize },
    /// The mock is gone and its route unbound
    Evicted,
}
