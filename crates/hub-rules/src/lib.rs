//! Rule evaluation for the IoT hub
//!
//! This crate decides whether a rule matches an inbound payload and what the
//! rule publishes when it does. Expressions and payload templates may refer to
//! the inbound payload (`input`), to other topics (`Read('topic')`, bare topic
//! names), to JSON fields (`$['field']`) and to named scripts (`::name(arg)`).
//! Resolved text is scored by a [`ScalarEvaluator`]; the default one runs the
//! expression through SQLite.
//!
//! # Example
//!
//! ```ignore
//! use hub_rules::{RhaiScriptEngine, RuleEngine};
//!
//! let engine = RuleEngine::with_sqlite(cache, known_topics, Arc::new(RhaiScriptEngine::new()))?;
//! let rule = Rule::new("garden", "button", "lamp").with_expression("input > 5");
//! assert!(engine.evaluate(&rule, "7").await?.matches);
//! ```

mod calculator;
mod conditions;
mod engine;
mod error;
mod evaluator;
mod jsonpath;
pub mod marker;
mod payload;
mod rhai_engine;
mod scripts;
mod text;
mod variables;

pub use calculator::{ScalarEvaluator, SqliteCalculator};
pub use conditions::ConditionObject;
pub use engine::RuleEngine;
pub use error::{RuleError, RuleResult};
pub use evaluator::{ExpressionEvaluator, NO_EXPRESSION_PROTOCOL};
pub use payload::PayloadResolver;
pub use rhai_engine::{RhaiScriptEngine, ScriptEngine};
pub use scripts::ScriptResolver;
pub use variables::VariableResolver;
