//! Admin REST API for host and mock management.
//!
//! This module provides a JSON API for:
//! - Registering mocks, which starts a host on first use of a port
//! - Removing mocks, which stops a host once it has none left
//! - Inspecting hosts and mocks
//! - Health checks
//!
//! The API listens on a configurable port (default: 2525).

mod handlers;
mod router;
mod server;
mod types;

pub use server::AdminApiServer;
