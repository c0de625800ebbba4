//! Target payload resolution
//!
//! A rule's target payload template is turned into the outbound payload in
//! a fixed order:
//!
//! 1. `input` (any case) becomes the inbound payload
//! 2. read markers, bare topic names, then script calls are substituted
//! 3. a `$[...]` JSON path is replaced by its first match in the inbound payload
//! 4. text that looks like a calculation is replaced by its scalar value
//! 5. backslash escapes are resolved
//!
//! Steps 3 and 4 fall back to the text as typed when they fail.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::calculator::ScalarEvaluator;
use crate::error::RuleResult;
use crate::jsonpath;
use crate::scripts::ScriptResolver;
use crate::text::{looks_like_calculation, replace_input_ignore_case, unescape};
use crate::variables::VariableResolver;

/// Computes outbound payloads from rule templates
#[derive(Clone)]
pub struct PayloadResolver {
    variables: VariableResolver,
    scripts: ScriptResolver,
    calculator: Arc<dyn ScalarEvaluator>,
}

impl PayloadResolver {
    pub fn new(
        variables: VariableResolver,
        scripts: ScriptResolver,
        calculator: Arc<dyn ScalarEvaluator>,
    ) -> Self {
        Self {
            variables,
            scripts,
            calculator,
        }
    }

    /// Resolve `template` for the inbound `payload`
    ///
    /// `None` stays `None` and an empty template stays empty.
    #[instrument(skip(self, payload), level = "debug")]
    pub async fn resolve(&self, template: Option<&str>, payload: &str) -> RuleResult<Option<String>> {
        let Some(template) = template else {
            return Ok(None);
        };
        if template.is_empty() {
            return Ok(Some(String::new()));
        }

        let text = replace_input_ignore_case(template, payload);
        let text = self.variables.resolve(&text).await;
        let mut text = self.scripts.resolve(&text).await?;

        if text.contains(jsonpath::JSON_PATH_MARKER) {
            text = substitute_json_path(&text, payload);
        }

        if looks_like_calculation(&text) {
            match self.calculator.evaluate(&text).await {
                Ok(value) => text = value.to_string(),
                Err(e) => debug!(payload = %text, error = %e, "Payload kept as typed"),
            }
        }

        Ok(Some(unescape(&text)))
    }
}

fn substitute_json_path(text: &str, payload: &str) -> String {
    let Some(span) = jsonpath::json_path_span(text) else {
        return text.to_string();
    };
    match jsonpath::first_match(&text[span.clone()], payload) {
        Some(value) => {
            let mut resolved = text.to_string();
            resolved.replace_range(span, &jsonpath::value_to_text(&value));
            resolved
        }
        None => text.to_string(),
    }
}
