//! Named scripts invoked from rule expressions with `::name(arg)`
//!
//! A script is Rhai source registered under a name. When the source defines
//! a function with that name, the function is called with the argument.
//! Otherwise the whole script is evaluated with the argument bound to
//! `argument`.
//!
//! ```text
//! name:   double
//! source: fn double(x) { x * 2 }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rhai::{Dynamic, Engine, Scope, AST};
use tracing::{debug, error};

use crate::error::{RuleError, RuleResult};

/// Invokes named scripts
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Run script `name` with `argument`, returning its stringified result
    async fn invoke(&self, name: &str, argument: &str) -> RuleResult<String>;
}

/// [`ScriptEngine`] backed by Rhai
pub struct RhaiScriptEngine {
    engine: Engine,
    scripts: DashMap<String, Arc<AST>>,
}

impl RhaiScriptEngine {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(),
            scripts: DashMap::new(),
        }
    }

    /// Compile and register `source` under `name`, replacing any previous script
    pub fn register(&self, name: &str, source: &str) -> RuleResult<()> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| RuleError::Script {
                name: name.to_string(),
                message: format!("failed to compile script: {e}"),
            })?;
        self.scripts.insert(name.to_string(), Arc::new(ast));
        debug!(script = name, "Registered script");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    fn run(&self, name: &str, ast: &AST, argument: &str) -> RuleResult<Dynamic> {
        let script_error = |e: Box<rhai::EvalAltResult>| RuleError::Script {
            name: name.to_string(),
            message: e.to_string(),
        };

        let defines_function = ast.iter_functions().any(|f| f.name == name);
        let mut scope = Scope::new();

        if !defines_function {
            scope.push_dynamic("argument", self.argument_value(argument));
            return self
                .engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
                .map_err(script_error);
        }

        if argument.is_empty() {
            self.engine
                .call_fn::<Dynamic>(&mut scope, ast, name, ())
                .map_err(script_error)
        } else {
            let value = self.argument_value(argument);
            self.engine
                .call_fn::<Dynamic>(&mut scope, ast, name, (value,))
                .map_err(script_error)
        }
    }

    /// Arguments are Rhai expressions; anything that does not parse is passed as text
    fn argument_value(&self, argument: &str) -> Dynamic {
        if argument.is_empty() {
            return Dynamic::UNIT;
        }
        self.engine
            .eval_expression::<Dynamic>(argument)
            .unwrap_or_else(|_| Dynamic::from(argument.to_string()))
    }
}

impl Default for RhaiScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptEngine for RhaiScriptEngine {
    async fn invoke(&self, name: &str, argument: &str) -> RuleResult<String> {
        let Some(ast) = self.scripts.get(name).map(|entry| Arc::clone(entry.value())) else {
            error!(script = name, "Script not found");
            return Ok(String::new());
        };

        let result = self.run(name, &ast, argument)?;
        debug!(script = name, argument, result = %result, "Script invoked");

        Ok(if result.is_unit() {
            String::new()
        } else {
            result.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_function_with_argument() {
        let engine = RhaiScriptEngine::new();
        engine.register("double", "fn double(x) { x * 2 }").unwrap();
        assert_eq!(engine.invoke("double", "21").await.unwrap(), "42");
        assert_eq!(engine.invoke("double", "20 + 1").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_invoke_without_argument() {
        let engine = RhaiScriptEngine::new();
        engine.register("answer", "fn answer() { 42 }").unwrap();
        assert_eq!(engine.invoke("answer", "").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_unparseable_argument_is_text() {
        let engine = RhaiScriptEngine::new();
        engine
            .register("greet", r#"fn greet(who) { "hello " + who }"#)
            .unwrap();
        assert_eq!(
            engine.invoke("greet", "IoT Zoo").await.unwrap(),
            "hello IoT Zoo"
        );
    }

    #[tokio::test]
    async fn test_script_body_uses_argument() {
        let engine = RhaiScriptEngine::new();
        engine.register("inc", "argument + 1").unwrap();
        assert_eq!(engine.invoke("inc", "41").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn test_unknown_script_yields_empty() {
        let engine = RhaiScriptEngine::new();
        assert_eq!(engine.invoke("missing", "1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unit_result_is_empty() {
        let engine = RhaiScriptEngine::new();
        engine.register("noop", "fn noop(x) { }").unwrap();
        assert_eq!(engine.invoke("noop", "1").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_errors() {
        let engine = RhaiScriptEngine::new();
        assert!(matches!(
            engine.register("broken", "fn broken( {"),
            Err(RuleError::Script { .. })
        ));

        engine.register("fail", r#"fn fail(x) { throw "boom" }"#).unwrap();
        assert!(matches!(
            engine.invoke("fail", "1").await,
            Err(RuleError::Script { .. })
        ));
    }
}
