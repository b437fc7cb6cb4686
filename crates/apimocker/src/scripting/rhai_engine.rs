use rhai::{Dynamic, Engine, Map, Scope, AST};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{CompiledSelector, ScriptError, ScriptRequest, SelectorEngine};

/// Default operation budget for a single selector evaluation
pub const DEFAULT_MAX_OPERATIONS: u64 = 100_000;

/// Rhai-backed selector engine.
///
/// Scripts see a single `request` variable:
///
/// ```text
/// request.method   "GET" / "POST"
/// request.path     "/users/42"
/// request.body     raw body string
/// request.json     body parsed as JSON (unit when not JSON)
/// request.params   path parameters, e.g. request.params.id
/// request.query    query parameters
/// request.headers  request headers (lowercase names)
/// ```
///
/// The value of the last expression is the selected response index.
#[derive(Clone)]
pub struct RhaiEngine {
    engine: Arc<Engine>,
}

impl RhaiEngine {
    pub fn new() -> Self {
        Self::with_max_operations(DEFAULT_MAX_OPERATIONS)
    }

    pub fn with_max_operations(max_operations: u64) -> Self {
        Self {
            engine: Arc::new(Self::create_engine(max_operations)),
        }
    }

    fn create_engine(max_operations: u64) -> Engine {
        let mut engine = Engine::new();

        // Selector scripts must not loop forever or print to the server's stdout
        engine.set_max_operations(max_operations);
        // Unknown identifiers are compile errors so a misspelled builtin is never taken as a script
        engine.set_strict_variables(true);
        engine.set_max_expr_depths(64, 32);
        engine.set_max_string_size(64 * 1024);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});

        engine
    }
}

impl Default for RhaiEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectorEngine for RhaiEngine {
    fn name(&self) -> &'static str {
        "rhai"
    }

    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledSelector>, ScriptError> {
        if source.trim().is_empty() {
            return Err(ScriptError::Compile("script is empty".to_string()));
        }
        let mut scope = Scope::new();
        scope.push("request", Map::new());
        let ast = self
            .engine
            .compile_with_scope(&scope, source)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        Ok(Arc::new(RhaiSelector {
            engine: Arc::clone(&self.engine),
            ast: Arc::new(ast),
        }))
    }
}

struct RhaiSelector {
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl CompiledSelector for RhaiSelector {
    fn evaluate(&self, request: &ScriptRequest) -> Result<Value, ScriptError> {
        let mut scope = Scope::new();
        scope.push("request", request_to_map(request));

        let result: Dynamic = self
            .engine
            .eval_ast_with_scope(&mut scope, self.ast.as_ref())
            .map_err(|e| ScriptError::Runtime(e.to_string()))?;

        Ok(dynamic_to_json(result))
    }
}

fn request_to_map(request: &ScriptRequest) -> Map {
    let mut request_map = Map::new();
    request_map.insert("method".into(), Dynamic::from(request.method.clone()));
    request_map.insert("path".into(), Dynamic::from(request.path.clone()));
    request_map.insert("body".into(), Dynamic::from(request.body.clone()));
    request_map.insert(
        "json".into(),
        request
            .json_body()
            .map(json_to_dynamic)
            .unwrap_or(Dynamic::UNIT),
    );
    request_map.insert(
        "params".into(),
        Dynamic::from(string_map(&request.path_params)),
    );
    request_map.insert("query".into(), Dynamic::from(string_map(&request.query)));
    request_map.insert("headers".into(), Dynamic::from(string_map(&request.headers)));
    request_map
}

fn string_map(values: &HashMap<String, String>) -> Map {
    let mut map = Map::new();
    for (k, v) in values {
        map.insert(k.clone().into(), Dynamic::from(v.clone()));
    }
    map
}

pub(super) fn json_to_dynamic(value: Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        Value::String(s) => Dynamic::from(s),
        Value::Array(arr) => {
            let vec: Vec<Dynamic> = arr.into_iter().map(json_to_dynamic).collect();
            Dynamic::from(vec)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

pub(super) fn dynamic_to_json(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::Number(i.into())
    } else if let Ok(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if let Some(s) = value.clone().try_cast::<String>() {
        Value::String(s)
    } else if let Some(arr) = value.clone().try_cast::<Vec<Dynamic>>() {
        Value::Array(arr.into_iter().map(dynamic_to_json).collect())
    } else if let Some(map) = value.clone().try_cast::<Map>() {
        let mut obj = serde_json::Map::new();
        for (k, v) in map {
            obj.insert(k.to_string(), dynamic_to_json(v));
        }
        Value::Object(obj)
    } else {
        Value::String(format!("{value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(method: &str, body: &str) -> ScriptRequest {
        ScriptRequest {
            method: method.to_string(),
            path: "/users/42".to_string(),
            body: body.to_string(),
            path_params: HashMap::from([("id".to_string(), "42".to_string())]),
            query: HashMap::from([("page".to_string(), "2".to_string())]),
            headers: HashMap::from([("x-variant".to_string(), "b".to_string())]),
        }
    }

    fn eval(source: &str, request: &ScriptRequest) -> Result<Value, ScriptError> {
        RhaiEngine::new().compile(source)?.evaluate(request)
    }

    #[test]
    fn test_constant_index() {
        assert_eq!(eval("1", &request("GET", "")).unwrap(), json!(1));
    }

    #[test]
    fn test_branch_on_method_and_body() {
        let script = r#"if request.method == "POST" && request.body == "second" { 1 } else { 0 }"#;
        assert_eq!(eval(script, &request("POST", "second")).unwrap(), json!(1));
        assert_eq!(eval(script, &request("POST", "first")).unwrap(), json!(0));
        assert_eq!(eval(script, &request("GET", "second")).unwrap(), json!(0));
    }

    #[test]
    fn test_params_query_and_headers_are_visible() {
        let req = request("GET", "");
        assert_eq!(eval("request.params.id", &req).unwrap(), json!("42"));
        assert_eq!(eval("request.query.page.parse_int()", &req).unwrap(), json!(2));
        assert_eq!(
            eval(r#"if request.headers["x-variant"] == "b" { 1 } else { 0 }"#, &req).unwrap(),
            json!(1)
        );
    }

    #[test]
    fn test_json_body_is_exposed() {
        let req = request("POST", r#"{"tier": 2}"#);
        assert_eq!(eval("request.json.tier", &req).unwrap(), json!(2));

        let req = request("POST", "not json");
        assert_eq!(eval("request.json", &req).unwrap(), Value::Null);
    }

    #[test]
    fn test_compile_errors() {
        let engine = RhaiEngine::new();
        assert!(matches!(
            engine.compile("if {").err(),
            Some(ScriptError::Compile(_))
        ));
        assert!(matches!(
            engine.compile("   ").err(),
            Some(ScriptError::Compile(_))
        ));
    }

    #[test]
    fn test_undeclared_variables_fail_to_compile() {
        let engine = RhaiEngine::new();
        assert!(matches!(
            engine.compile("Sequense").err(),
            Some(ScriptError::Compile(_))
        ));
        assert!(matches!(
            engine.compile(r#"requst.method == "GET""#).err(),
            Some(ScriptError::Compile(_))
        ));
        assert!(engine
            .compile(r#"let n = 1; if request.method == "GET" { n } else { 0 }"#)
            .is_ok());
    }

    #[test]
    fn test_runtime_error() {
        let err = eval(r#"throw "selector failed""#, &request("GET", "")).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_operation_budget_stops_runaway_scripts() {
        let engine = RhaiEngine::with_max_operations(1_000);
        let program = engine.compile("let x = 0; loop { x += 1; }").unwrap();
        let err = program.evaluate(&request("GET", "")).unwrap_err();
        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_dynamic_to_json() {
        assert_eq!(dynamic_to_json(Dynamic::from(3_i64)), json!(3));
        assert_eq!(dynamic_to_json(Dynamic::from(1.5_f64)), json!(1.5));
        assert_eq!(
            dynamic_to_json(Dynamic::from("two".to_string())),
            json!("two")
        );
        assert_eq!(dynamic_to_json(Dynamic::UNIT), Value::Null);
    }
}
