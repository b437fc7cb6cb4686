//! Core Mock struct and implementation.
//!
//! A mock is built once from its wire payload and is immutable afterwards,
//! except for two counters: the selection index (owned by the selection
//! engine) and the instance count (owned by the host that holds the mock).

use super::types::{MockError, MockPath, MockResponse, MockSnapshot, MockSpec, Selector};
use crate::scripting::SelectorEngine;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A registered mock: one method + path, a selector and its responses
#[derive(Debug)]
pub struct Mock {
    id: String,
    name: String,
    path: MockPath,
    selector: Selector,
    responses: Vec<MockResponse>,
    /// Last selected response position
    pub(super) index: AtomicUsize,
    /// Identical registrations currently sharing this mock
    instances: AtomicUsize,
}

impl Mock {
    /// Parse a mock from its JSON payload
    pub fn from_json(bytes: &[u8], engine: &dyn SelectorEngine) -> Result<Self, MockError> {
        let spec: MockSpec =
            serde_json::from_slice(bytes).map_err(|e| MockError::InvalidJson(e.to_string()))?;
        Self::from_spec(&spec, engine)
    }

    /// Validate a wire payload and build the mock, compiling its selector
    pub fn from_spec(spec: &MockSpec, engine: &dyn SelectorEngine) -> Result<Self, MockError> {
        let path: MockPath = spec.path.parse()?;
        let selector = Selector::parse(&spec.selector, engine)?;
        let responses = spec
            .responses
            .iter()
            .enumerate()
            .map(|(index, response)| MockResponse::from_spec(index, response))
            .collect::<Result<Vec<_>, _>>()?;

        let id = fingerprint(&spec.name, &path, &selector, &responses);

        Ok(Self {
            id,
            name: spec.name.clone(),
            path,
            selector,
            responses,
            index: AtomicUsize::new(0),
            instances: AtomicUsize::new(1),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &MockPath {
        &self.path
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn responses(&self) -> &[MockResponse] {
        &self.responses
    }

    pub fn instances(&self) -> usize {
        self.instances.load(Ordering::Acquire)
    }

    /// Record one more identical registration, returning the new count
    pub(crate) fn acquire_instance(&self) -> usize {
        self.instances.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one registration, returning the remaining count
    pub(crate) fn release_instance(&self) -> usize {
        let previous = self
            .instances
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or_else(|n| n);
        previous.saturating_sub(1)
    }

    /// Immutable view for the admin API
    pub fn snapshot(&self) -> MockSnapshot {
        MockSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.path.to_string(),
            selector: self.selector.source().to_string(),
            responses: self.responses.iter().map(MockResponse::to_spec).collect(),
            instances: self.instances(),
        }
    }
}

/// Content-derived identity.
///
/// Covers name, method, resource, selector text and, per response, the
/// decoded body, the status code truncated to a byte and every header.
/// Delays do not participate.
fn fingerprint(
    name: &str,
    path: &MockPath,
    selector: &Selector,
    responses: &[MockResponse],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(path.method.as_str().as_bytes());
    hasher.update(path.resource.as_bytes());
    hasher.update(selector.source().as_bytes());
    for response in responses {
        hasher.update(&response.body.content);
        hasher.update([response.code.as_u16() as u8]);
        for header in &response.headers {
            hasher.update(header.name.as_bytes());
            hasher.update(header.value.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}
