//! Admin API server.

use crate::admin_api::router::route_request;
use crate::host::HostManager;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Admin API server
pub struct AdminApiServer {
    addr: SocketAddr,
    manager: Arc<HostManager>,
}

impl AdminApiServer {
    pub fn new(addr: SocketAddr, manager: Arc<HostManager>) -> Self {
        Self { addr, manager }
    }

    /// Run the admin API server until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Admin API listening on http://{}", listener.local_addr()?);
        Self::serve(listener, self.manager, shutdown).await
    }

    /// Serve the admin API on an already bound listener
    pub async fn serve(
        listener: TcpListener,
        manager: Arc<HostManager>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, _) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("Admin API accept error: {}", e);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);
                    let manager = Arc::clone(&manager);

                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let manager = Arc::clone(&manager);
                            async move { route_request(req, manager).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            debug!("Admin API connection error: {}", e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Admin API shutting down");
                    return Ok(());
                }
            }
        }
    }
}
