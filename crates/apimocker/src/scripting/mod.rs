//! Selector scripting for mocks.
//!
//! A mock whose selector is neither `Sequence` nor `Random` carries an
//! expression that picks the response index for each request. The
//! evaluator is pluggable: anything implementing [`SelectorEngine`] can
//! compile selector source into a [`CompiledSelector`]. The default
//! implementation is [`RhaiEngine`].

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

mod rhai_engine;
pub use rhai_engine::{RhaiEngine, DEFAULT_MAX_OPERATIONS};

/// Errors raised while compiling or running a selector script
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Failed to compile selector script: {0}")]
    Compile(String),
    #[error("Selector script execution error: {0}")]
    Runtime(String),
}

/// Request context passed to selector scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    /// Raw request body, lossily decoded as UTF-8
    pub body: String,
    /// Query parameters parsed from the URL
    pub query: HashMap<String, String>,
    /// Path parameters captured by the mock's route (e.g. `/users/:id`)
    pub path_params: HashMap<String, String>,
}

impl ScriptRequest {
    /// The request body parsed as JSON, if it is valid JSON
    pub fn json_body(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_str(&self.body).ok()
    }
}

/// A compiled selector program, ready to run against requests
pub trait CompiledSelector: Send + Sync {
    /// Run the program. The returned value is interpreted by the
    /// selection engine as a response index.
    fn evaluate(&self, request: &ScriptRequest) -> Result<Value, ScriptError>;
}

/// Expression evaluator used to compile selector scripts
pub trait SelectorEngine: Send + Sync {
    /// Short engine name, used in logs
    fn name(&self) -> &'static str;

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledSelector>, ScriptError>;
}

/// Selector source together with its compiled program
#[derive(Clone)]
pub struct CompiledScript {
    source: String,
    program: Arc<dyn CompiledSelector>,
}

impl CompiledScript {
    pub fn compile(source: &str, engine: &dyn SelectorEngine) -> Result<Self, ScriptError> {
        let program = engine.compile(source)?;
        Ok(Self {
            source: source.to_string(),
            program,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, request: &ScriptRequest) -> Result<Value, ScriptError> {
        self.program.evaluate(request)
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
