//! Mock definitions, response selection and rendering.
//!
//! This module provides:
//! - `Mock`: a validated rule binding one method + path to canned responses
//! - `Selector`: the strategy picking a response per request
//! - `Selection`: the outcome of running the selector for one request
//! - `render`: writing a selection onto an HTTP response
//!
//! ## Module Structure
//!
//! - `types`: wire format, decoded response model, errors
//! - `core`: the Mock struct, parsing and content identity
//! - `selection`: the per-mock selection state machine
//! - `render`: headers, status, delay floor and body

mod core;
mod render;
mod selection;
mod types;


pub use self::core::Mock;
pub use render::{render, render_response};
pub use selection::{index_from_value, Selection, SelectionFault};
pub use types::{
    Body, BodySpec, Delay, Encoding, Header, HeaderSpec, MockError, MockPath, MockResponse,
    MockSnapshot, MockSpec, ResponseSpec, Selector,
};
