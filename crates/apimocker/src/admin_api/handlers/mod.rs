//! Admin API request handlers.

pub mod hosts;
pub mod system;
