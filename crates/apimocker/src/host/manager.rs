//! HostManager - lifecycle management for hosts.
//!
//! Hosts are created on demand by the first mock registered on a port and
//! destroyed when their last mock is removed. Structural operations on one
//! port are serialized by a per-port async lock; operations on different
//! ports never wait on each other, and snapshot queries only take the
//! registry read lock.

use super::core::{Host, ListenerHandle};
use super::handler::handle_host_request;
use super::types::{HostError, HostSnapshot, Registration, Removal};
use crate::mock::{Mock, MockSnapshot};
use crate::scripting::{RhaiEngine, SelectorEngine};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Default bound on draining a host's connections at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener settings shared by every host
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Interface host listeners bind to
    pub bind_address: String,
    pub shutdown_timeout: Duration,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Manages the lifecycle of every host
pub struct HostManager {
    /// Active hosts by port
    hosts: RwLock<HashMap<u16, Arc<Host>>>,
    /// Serializes register/remove per port
    port_locks: Mutex<HashMap<u16, Arc<AsyncMutex<()>>>>,
    settings: HostSettings,
    engine: Arc<dyn SelectorEngine>,
}

impl HostManager {
    pub fn new(settings: HostSettings, engine: Arc<dyn SelectorEngine>) -> Self {
        Self {
            hosts: RwLock::new(HashMap::new()),
            port_locks: Mutex::new(HashMap::new()),
            settings,
            engine,
        }
    }

    /// Engine used to compile selector scripts of registered mocks
    pub fn engine(&self) -> &dyn SelectorEngine {
        self.engine.as_ref()
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    /// Parse a JSON mock payload and register it on `port`
    pub async fn register_json(&self, port: u16, payload: &[u8]) -> Result<Registration, HostError> {
        let mock = Mock::from_json(payload, self.engine())?;
        self.register_mock(port, mock).await
    }

    /// Register a mock on `port`, starting a host there if none exists
    pub async fn register_mock(&self, port: u16, mock: Mock) -> Result<Registration, HostError> {
        if port == 0 {
            return Err(HostError::Bind(
                port,
                "a host needs an explicit port".to_string(),
            ));
        }

        let lock = self.port_lock(port);
        let _guard = lock.lock().await;

        let existing = self.hosts.read().get(&port).cloned();
        if let Some(host) = existing {
            let mock = host.add_mock(mock)?;
            return Ok(Registration {
                host: host.snapshot(),
                mock: mock.snapshot(),
            });
        }

        let host = match self.start_host(port).await {
            Ok(host) => host,
            Err(e) => {
                self.release_port_lock(port, &lock);
                return Err(e);
            }
        };
        match host.add_mock(mock) {
            Ok(mock) => {
                self.hosts.write().insert(port, Arc::clone(&host));
                info!(port, "Host created");
                Ok(Registration {
                    host: host.snapshot(),
                    mock: mock.snapshot(),
                })
            }
            Err(e) => {
                // Nothing was ever registered, so the host must not outlive the call
                if let Err(stop_err) = host.stop().await {
                    warn!(port, "Failed to stop rejected host: {}", stop_err);
                }
                self.release_port_lock(port, &lock);
                Err(e)
            }
        }
    }

    /// Remove a mock from the host on `port`; the host is stopped and
    /// forgotten once its last mock is gone.
    pub async fn remove_mock(
        &self,
        port: u16,
        id: &str,
        force: bool,
    ) -> Result<HostSnapshot, HostError> {
        // No lock entry means no host on the port
        let lock = self
            .port_locks
            .lock()
            .get(&port)
            .cloned()
            .ok_or(HostError::HostNotFound(port))?;
        let _guard = lock.lock().await;

        let Some(host) = self.get_host(port) else {
            self.release_port_lock(port, &lock);
            return Err(HostError::HostNotFound(port));
        };

        let removal = host.remove_mock(id, force)?;
        if removal == Removal::Evicted && host.is_empty() {
            let stopped = host.stop().await;
            self.hosts.write().remove(&port);
            self.release_port_lock(port, &lock);
            info!(port, "Host removed");
            stopped?;
        }

        Ok(host.snapshot())
    }

    pub fn lookup_host(&self, port: u16) -> Result<HostSnapshot, HostError> {
        self.get_host(port)
            .map(|host| host.snapshot())
            .ok_or(HostError::HostNotFound(port))
    }

    pub fn lookup_mock(&self, port: u16, id: &str) -> Result<MockSnapshot, HostError> {
        let host = self.get_host(port).ok_or(HostError::HostNotFound(port))?;
        host.mock_by_id(id)
            .map(|mock| mock.snapshot())
            .ok_or_else(|| HostError::MockNotFound(id.to_string()))
    }

    pub fn get_host(&self, port: u16) -> Option<Arc<Host>> {
        self.hosts.read().get(&port).cloned()
    }

    /// Snapshots of every host, ordered by port
    pub fn list_hosts(&self) -> Vec<HostSnapshot> {
        let mut hosts: Vec<Arc<Host>> = self.hosts.read().values().cloned().collect();
        hosts.sort_by_key(|host| host.port());
        hosts.iter().map(|host| host.snapshot()).collect()
    }

    pub fn count(&self) -> usize {
        self.hosts.read().len()
    }

    /// Stop every host. Returns the errors of hosts that did not drain in time.
    pub async fn shutdown_all(&self) -> Vec<HostError> {
        let ports: Vec<u16> = self.hosts.read().keys().copied().collect();

        let stops = ports.into_iter().map(|port| async move {
            let lock = self.port_lock(port);
            let _guard = lock.lock().await;
            let host = self.hosts.write().remove(&port);
            let stopped = match host {
                Some(host) => host.stop().await.err(),
                None => None,
            };
            self.release_port_lock(port, &lock);
            stopped
        });

        let errors: Vec<HostError> = futures::future::join_all(stops)
            .await
            .into_iter()
            .flatten()
            .collect();
        info!(failed = errors.len(), "All hosts stopped");
        errors
    }

    fn port_lock(&self, port: u16) -> Arc<AsyncMutex<()>> {
        let mut locks = self.port_locks.lock();
        Arc::clone(locks.entry(port).or_default())
    }

    /// Forget the lock of a port whose host is gone. Kept while another
    /// call still holds a clone, so queued callers stay serialized with
    /// whoever locks the port next.
    fn release_port_lock(&self, port: u16, lock: &Arc<AsyncMutex<()>>) {
        let mut locks = self.port_locks.lock();
        let tracked = locks.get(&port).is_some_and(|l| Arc::ptr_eq(l, lock));
        // One reference in the map, one held by the caller
        if tracked && Arc::strong_count(lock) == 2 {
            locks.remove(&port);
        }
    }

    #[cfg(test)]
    pub(super) fn tracked_ports(&self) -> usize {
        self.port_locks.lock().len()
    }

    /// Bind `port` and spawn its serving task
    async fn start_host(&self, port: u16) -> Result<Arc<Host>, HostError> {
        let bind_address = self.settings.bind_address.as_str();
        let listener = TcpListener::bind((bind_address, port))
            .await
            .map_err(|e| HostError::Bind(port, e.to_string()))?;
        info!("Host bound to {}:{}", bind_address, port);

        let host = Arc::new(Host::new(port));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(serve(
            listener,
            Arc::clone(&host),
            shutdown_rx,
            self.settings.shutdown_timeout,
        ));
        host.attach_listener(ListenerHandle { shutdown_tx, task });

        Ok(host)
    }
}

impl Default for HostManager {
    fn default() -> Self {
        Self::new(HostSettings::default(), Arc::new(RhaiEngine::new()))
    }
}

/// Accept loop of one host. Runs until `shutdown_rx` fires, then drains
/// open connections for at most `drain_timeout`.
async fn serve(
    listener: TcpListener,
    host: Arc<Host>,
    mut shutdown_rx: oneshot::Receiver<()>,
    drain_timeout: Duration,
) -> Result<(), HostError> {
    let port = host.port();
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        let io = TokioIo::new(stream);
                        let host = Arc::clone(&host);
                        let service = service_fn(move |req| {
                            let host = Arc::clone(&host);
                            async move { handle_host_request(req, host, addr).await }
                        });
                        let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                        connections.spawn(async move {
                            if let Err(e) = conn.await {
                                debug!("Connection error on port {}: {}", port, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on port {}: {}", port, e);
                    }
                }
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = &mut shutdown_rx => {
                info!("Host on port {} shutting down", port);
                break;
            }
        }
    }

    drop(listener);

    match tokio::time::timeout(drain_timeout, graceful.shutdown()).await {
        Ok(()) => {
            debug!(port, "Connections drained");
            Ok(())
        }
        Err(_) => {
            connections.abort_all();
            error!(port, timeout = ?drain_timeout, "Connections did not drain in time");
            Err(HostError::ShutdownTimeout(port, drain_timeout))
        }
    }
}
