//! Hosts: one HTTP listener per port serving the mocks registered on it.
//!
//! ## Module Structure
//!
//! - `types`: errors, snapshots and operation outcomes
//! - `core`: the Host struct, its mock collection and routing table
//! - `handler`: request handling for host listeners
//! - `manager`: HostManager, creating and destroying hosts on demand

mod core;
mod handler;
mod manager;
mod types;

#[cfg(test)]
mod tests;

pub use self::core::{Host, RouteMatch};
pub use handler::{handle_host_request, parse_query_string};
pub use manager::{HostManager, HostSettings, DEFAULT_SHUTDOWN_TIMEOUT};
pub use types::{HostError, HostSnapshot, Registration, Removal};
