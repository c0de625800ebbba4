//! Scalar evaluator backed by an in-memory SQLite connection
//!
//! Arithmetic, relational and boolean expressions are evaluated as
//! `select <expression>`, so `1 + 1`, `'A' == 'A'` and `7 > 5 and 1 == 1`
//! all work with SQLite semantics. Trigonometric functions take degrees.

use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use hub_core::Scalar;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::trace;

use crate::error::{RuleError, RuleResult};

/// Evaluates fully resolved arithmetic/boolean text
#[async_trait]
pub trait ScalarEvaluator: Send + Sync {
    async fn evaluate(&self, expression: &str) -> RuleResult<Scalar>;
}

/// [`ScalarEvaluator`] running expressions through SQLite
pub struct SqliteCalculator {
    conn: Mutex<Connection>,
}

impl SqliteCalculator {
    pub fn new() -> RuleResult<Self> {
        let conn = Connection::open_in_memory()?;
        register_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Evaluate synchronously
    pub fn calculate(&self, expression: &str) -> RuleResult<Scalar> {
        let prepared = prepare(expression);
        if prepared.is_empty() {
            return Ok(Scalar::Null);
        }

        let conn = self.conn.lock().map_err(|_| RuleError::Calculation {
            expression: prepared.clone(),
            message: "calculator connection poisoned".to_string(),
        })?;

        let value: Value = conn
            .query_row(&format!("select {}", prepared), [], |row| row.get(0))
            .map_err(|e| RuleError::Calculation {
                expression: prepared.clone(),
                message: e.to_string(),
            })?;

        let scalar = match value {
            Value::Null => Scalar::Null,
            Value::Integer(i) => Scalar::Integer(i),
            Value::Real(r) => Scalar::Real(r),
            Value::Text(s) => Scalar::Text(s),
            Value::Blob(b) => Scalar::Text(String::from_utf8_lossy(&b).into_owned()),
        };
        trace!(expression = %prepared, result = %scalar, "Calculated");
        Ok(scalar)
    }
}

#[async_trait]
impl ScalarEvaluator for SqliteCalculator {
    async fn evaluate(&self, expression: &str) -> RuleResult<Scalar> {
        self.calculate(expression)
    }
}

/// Normalize rule syntax into a SQLite expression
fn prepare(expression: &str) -> String {
    static CALC: OnceLock<Regex> = OnceLock::new();
    let calc = CALC.get_or_init(|| Regex::new(r"(?i)calc").expect("valid calc regex"));

    let text = expression.replace("&&", " and ").replace("||", " or ");
    let text = calc.replace_all(&text, "");
    text.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("sin", 1, flags, |ctx| {
        Ok(round(ctx.get::<f64>(0)?.to_radians().sin()))
    })?;
    conn.create_scalar_function("cos", 1, flags, |ctx| {
        Ok(round(ctx.get::<f64>(0)?.to_radians().cos()))
    })?;
    conn.create_scalar_function("tan", 1, flags, |ctx| {
        Ok(round(ctx.get::<f64>(0)?.to_radians().tan()))
    })?;
    conn.create_scalar_function("sqrt", 1, flags, |ctx| Ok(ctx.get::<f64>(0)?.sqrt()))?;
    conn.create_scalar_function("power", 2, flags, |ctx| {
        Ok(ctx.get::<f64>(0)?.powf(ctx.get::<f64>(1)?))
    })?;
    Ok(())
}

/// Drop floating point noise so `sin(90)` is exactly 1 and `cos(90)` is 0
fn round(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}
