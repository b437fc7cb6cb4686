//! Response selection for mocks.
//!
//! Every request that reaches a mock goes through [`Mock::select`] exactly
//! once. The selection index is advanced atomically so concurrent requests
//! to the same mock never skip or repeat a position.

use super::core::Mock;
use super::types::{MockResponse, Selector};
use crate::scripting::{ScriptError, ScriptRequest};
use hyper::StatusCode;
use rand::Rng;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::Ordering;

/// Outcome of a selection
#[derive(Debug)]
pub enum Selection<'a> {
    /// A canned response at `index`
    Response {
        index: usize,
        response: &'a MockResponse,
    },
    /// A synthetic response produced without consulting the responses
    Fallback { status: StatusCode, body: String },
}

/// Why a selector script could not pick a response
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionFault {
    Script(ScriptError),
    NotAnIndex(Value),
    OutOfRange { index: i64, len: usize },
}

impl fmt::Display for SelectionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionFault::Script(e) => {
                write!(f, "Error evaluating selection expression: {e}")
            }
            SelectionFault::NotAnIndex(value) => {
                write!(f, "Incorrect output from selection expression: {value} is not an integer")
            }
            SelectionFault::OutOfRange { index, len } => write!(
                f,
                "Incorrect output from selection expression: {index} is outside 0..{len}"
            ),
        }
    }
}

impl Mock {
    /// Pick the response for this request
    pub fn select(&self, request: &ScriptRequest) -> Selection<'_> {
        let responses = self.responses();
        let len = responses.len();
        if len == 0 {
            return Selection::Fallback {
                status: StatusCode::NOT_FOUND,
                body: "Not Found".to_string(),
            };
        }

        let index = match self.selector() {
            Selector::Sequence => self.advance_sequence(len),
            Selector::Random => {
                let index = rand::thread_rng().gen_range(0..len);
                self.index.store(index, Ordering::Release);
                index
            }
            Selector::Script(script) => {
                let picked = script
                    .evaluate(request)
                    .map_err(SelectionFault::Script)
                    .and_then(|value| index_from_value(&value, len));
                match picked {
                    Ok(index) => {
                        self.index.store(index, Ordering::Release);
                        index
                    }
                    Err(fault) => {
                        return Selection::Fallback {
                            status: StatusCode::INTERNAL_SERVER_ERROR,
                            body: fault.to_string(),
                        }
                    }
                }
            }
        };

        Selection::Response {
            index,
            response: &responses[index],
        }
    }

    /// Position most recently served
    pub fn current_index(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    /// Increment then wrap, so `[A, B, C]` serves `B, C, A, B, ...`
    fn advance_sequence(&self, len: usize) -> usize {
        let previous = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        (previous + 1) % len
    }
}

/// Interpret a script result as a response position in `0..len`.
///
/// Integers, integral floats and numeric strings are accepted.
pub fn index_from_value(value: &Value, len: usize) -> Result<usize, SelectionFault> {
    let index = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| SelectionFault::NotAnIndex(value.clone()))?;

    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or(SelectionFault::OutOfRange { index, len })
}
