//! apimocker: a dynamic HTTP mock server.
//!
//! Mocks are registered at runtime through the admin API. The first mock
//! registered on a port starts a host listening there; removing the last
//! mock of a port stops its host again.

pub mod admin_api;
pub mod config;
pub mod host;
pub mod mock;
pub mod response;
pub mod scripting;
