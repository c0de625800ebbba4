//! Script call substitution (`::name(arg)`)

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::RuleResult;
use crate::marker;
use crate::rhai_engine::ScriptEngine;

/// Replaces script calls with their results
#[derive(Clone)]
pub struct ScriptResolver {
    engine: Arc<dyn ScriptEngine>,
}

impl ScriptResolver {
    pub fn new(engine: Arc<dyn ScriptEngine>) -> Self {
        Self { engine }
    }

    /// Invoke every script call in `text` and splice in its result
    ///
    /// The number of calls is fixed before the first substitution, so a
    /// script returning `::` does not trigger further invocations.
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(&self, text: &str) -> RuleResult<String> {
        let count = marker::script_marker_count(text);
        let mut text = text.to_string();
        let mut offset = 0;

        for _ in 0..count {
            let Some(call) = marker::find_script_call(&text, offset) else {
                break;
            };

            let result = self.engine.invoke(&call.name, &call.argument).await?;
            debug!(script = %call.name, argument = %call.argument, result = %result, "Resolved script call");

            text.replace_range(call.span.clone(), &result);
            offset = call.span.start + result.len();
        }

        Ok(text)
    }
}
