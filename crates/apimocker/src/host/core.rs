//! Core Host struct and implementation.
//!
//! A host owns one listening port, the mocks registered on it and the
//! routing table that maps request method + path onto those mocks.

use super::types::{HostError, HostSnapshot, Removal};
use crate::mock::{Mock, MockPath};
use hyper::Method;
use matchit::Router;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Outcome of routing a request against the host's mocks
pub enum RouteMatch {
    Found {
        mock: Arc<Mock>,
        params: HashMap<String, String>,
    },
    /// The path is bound, but only for other methods
    MethodNotAllowed,
    NotFound,
}

/// Mocks keyed by method + path, plus the per-method routers built from them
#[derive(Default)]
struct RouteTable {
    mocks: HashMap<MockPath, Arc<Mock>>,
    routers: HashMap<Method, Router<MockPath>>,
}

impl RouteTable {
    fn build_routers<'a>(
        paths: impl Iterator<Item = &'a MockPath>,
    ) -> Result<HashMap<Method, Router<MockPath>>, HostError> {
        let mut routers: HashMap<Method, Router<MockPath>> = HashMap::new();
        for path in paths {
            let pattern = path.route_pattern();
            routers
                .entry(path.method.clone())
                .or_default()
                .insert(pattern.clone(), path.clone())
                .map_err(|e| HostError::RouteConflict {
                    pattern,
                    reason: e.to_string(),
                })?;
        }
        Ok(routers)
    }
}

/// Running listener task and the channel that stops it
pub(super) struct ListenerHandle {
    pub shutdown_tx: oneshot::Sender<()>,
    pub task: JoinHandle<Result<(), HostError>>,
}

/// Runtime state of a host
pub struct Host {
    port: u16,
    routes: RwLock<RouteTable>,
    request_count: AtomicU64,
    created_at: chrono::DateTime<chrono::Utc>,
    listener: Mutex<Option<ListenerHandle>>,
}

impl Host {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            routes: RwLock::new(RouteTable::default()),
            request_count: AtomicU64::new(0),
            created_at: chrono::Utc::now(),
            listener: Mutex::new(None),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Add a mock, merging it into an identical mock already on its path.
    ///
    /// Returns the mock that now occupies the path. A different mock on the
    /// same path is a merge conflict and is left untouched.
    pub fn add_mock(&self, mock: Mock) -> Result<Arc<Mock>, HostError> {
        let mut routes = self.routes.write();

        if let Some(existing) = routes.mocks.get(mock.path()) {
            if existing.id() != mock.id() {
                return Err(HostError::MergeConflict {
                    path: mock.path().to_string(),
                    name: mock.name().to_string(),
                    existing_id: existing.id().to_string(),
                });
            }
            let instances = existing.acquire_instance();
            debug!(
                port = self.port,
                mock_id = existing.id(),
                instances,
                "Merged identical mock registration"
            );
            return Ok(Arc::clone(existing));
        }

        let routers = RouteTable::build_routers(
            routes
                .mocks
                .keys()
                .chain(std::iter::once(mock.path())),
        )?;

        let mock = Arc::new(mock);
        routes.mocks.insert(mock.path().clone(), Arc::clone(&mock));
        routes.routers = routers;

        info!(
            port = self.port,
            mock_id = mock.id(),
            path = %mock.path(),
            "Mock added"
        );
        Ok(mock)
    }

    /// Remove one registration of a mock, or all of them when `force` is set
    pub fn remove_mock(&self, id: &str, force: bool) -> Result<Removal, HostError> {
        let mut routes = self.routes.write();

        let mock = routes
            .mocks
            .values()
            .find(|m| m.id() == id)
            .cloned()
            .ok_or_else(|| HostError::MockNotFound(id.to_string()))?;

        if !force && mock.instances() > 1 {
            let remaining = mock.release_instance();
            debug!(port = self.port, mock_id = id, remaining, "Mock instance released");
            return Ok(Removal::Decremented { remaining });
        }

        routes.mocks.remove(mock.path());
        // Every remaining pattern was accepted before, so rebuilding cannot fail
        routes.routers = RouteTable::build_routers(routes.mocks.keys())?;

        info!(
            port = self.port,
            mock_id = id,
            path = %mock.path(),
            force,
            "Mock removed"
        );
        Ok(Removal::Evicted)
    }

    pub fn mock_by_id(&self, id: &str) -> Option<Arc<Mock>> {
        self.routes
            .read()
            .mocks
            .values()
            .find(|m| m.id() == id)
            .cloned()
    }

    pub fn mock_by_path(&self, path: &MockPath) -> Option<Arc<Mock>> {
        self.routes.read().mocks.get(path).cloned()
    }

    pub fn mock_count(&self) -> usize {
        self.routes.read().mocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mock_count() == 0
    }

    /// Find the mock serving `method` + `path`, with captured path parameters
    pub fn route(&self, method: &Method, path: &str) -> RouteMatch {
        let routes = self.routes.read();

        if let Some(router) = routes.routers.get(method) {
            if let Ok(matched) = router.at(path) {
                if let Some(mock) = routes.mocks.get(matched.value) {
                    let params = matched
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    return RouteMatch::Found {
                        mock: Arc::clone(mock),
                        params,
                    };
                }
            }
        }

        let bound_elsewhere = routes
            .routers
            .iter()
            .any(|(m, router)| m != method && router.at(path).is_ok());
        if bound_elsewhere {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }

    /// Immutable view for the admin API, mocks ordered by path
    pub fn snapshot(&self) -> HostSnapshot {
        let routes = self.routes.read();
        let mut mocks: Vec<&Arc<Mock>> = routes.mocks.values().collect();
        mocks.sort_by(|a, b| {
            (a.path().resource.as_str(), a.path().method.as_str())
                .cmp(&(b.path().resource.as_str(), b.path().method.as_str()))
        });

        HostSnapshot {
            port: self.port,
            mocks: mocks.into_iter().map(|m| m.snapshot()).collect(),
            requests: self.request_count(),
            created_at: self.created_at,
        }
    }

    pub fn increment_request_count(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.listener.lock().is_some()
    }

    pub(super) fn attach_listener(&self, handle: ListenerHandle) {
        *self.listener.lock() = Some(handle);
    }

    /// Stop accepting connections and wait for the listener task to drain.
    ///
    /// The drain bound is enforced by the listener task itself, so this
    /// always returns.
    pub async fn stop(&self) -> Result<(), HostError> {
        let handle = self.listener.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let _ = handle.shutdown_tx.send(());
        match handle.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(port = self.port, "Listener task failed: {}", e);
                Ok(())
            }
        }
    }
}
