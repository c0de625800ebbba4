//! Variable resolution against the recent-value cache and known topics
//!
//! Two forms are understood:
//!
//! - Read markers, `Read('topic')` or `ReadFromMemory(topic)`, optionally
//!   indexed with `['key']` to pick a field out of a JSON payload.
//! - Bare topic names in plain arithmetic, `heatmap/index + 1`, used only
//!   when the text carries no markers and is not a JSON object.
//!
//! Values come from the cache first and fall back to the persisted last
//! payload of a known topic. Unresolvable names leave the text untouched.

use std::sync::Arc;

use hub_registries::KnownTopicStore;
use hub_topic_cache::SharedRecentValueCache;
use tracing::{debug, instrument, warn};

use crate::jsonpath;
use crate::marker::{self, CALC_MARKER, READ_MARKERS, SCRIPT_MARKER};
use crate::text::contains_ignore_case;

/// Substitutes variables with their last known payloads
#[derive(Clone)]
pub struct VariableResolver {
    cache: SharedRecentValueCache,
    known_topics: Arc<dyn KnownTopicStore>,
}

impl VariableResolver {
    pub fn new(cache: SharedRecentValueCache, known_topics: Arc<dyn KnownTopicStore>) -> Self {
        Self {
            cache,
            known_topics,
        }
    }

    /// Rewrite `text` with every resolvable variable replaced by its value
    #[instrument(skip(self), level = "debug")]
    pub async fn resolve(&self, text: &str) -> String {
        if uses_bare_names(text) {
            self.resolve_bare_names(text).await
        } else {
            self.resolve_read_markers(text).await
        }
    }

    /// Last known payload of `name`, matched by topic or fully-qualified topic
    pub async fn lookup(&self, name: &str) -> Option<String> {
        if let Some(payload) = self.cache.lookup(name) {
            return Some(payload);
        }

        match self.known_topics.get_by_name(None, name).await {
            Ok(known) => known.and_then(|topic| topic.last_payload),
            Err(e) => {
                warn!(topic = name, error = %e, "Known topic lookup failed");
                None
            }
        }
    }

    async fn resolve_bare_names(&self, text: &str) -> String {
        let mut resolved = Vec::new();

        for token in text.split(' ').filter(|t| !t.is_empty()) {
            if !token.starts_with(|c: char| c.is_alphabetic()) {
                resolved.push(token.to_string());
                continue;
            }
            match self.lookup(token).await {
                Some(value) => resolved.push(value),
                None => {
                    debug!(token, "Unresolved variable");
                    return text.to_string();
                }
            }
        }

        resolved.join(" ")
    }

    async fn resolve_read_markers(&self, text: &str) -> String {
        let count = marker::read_markers(text).len();
        let mut text = text.to_string();
        let mut offset = 0;

        for _ in 0..count {
            let Some(read) = marker::find_read_marker(&text, offset) else {
                break;
            };

            let value = match self.lookup(&read.topic).await {
                Some(payload) => match &read.indexer {
                    Some(key) => jsonpath::index(&payload, key).map(|v| jsonpath::value_to_text(&v)),
                    None => Some(payload),
                },
                None => None,
            };

            match value {
                Some(value) => {
                    text.replace_range(read.span.clone(), &value);
                    offset = read.span.start + value.len();
                }
                None => {
                    debug!(topic = %read.topic, indexer = ?read.indexer, "Unresolved read marker");
                    offset = read.span.start + 1;
                }
            }
        }

        text
    }
}

/// Plain text without markers, where whitespace separated tokens may be topic names
fn uses_bare_names(text: &str) -> bool {
    !text.trim_start().starts_with('{')
        && !READ_MARKERS.iter().any(|m| contains_ignore_case(text, m))
        && !contains_ignore_case(text, CALC_MARKER)
        && !text.contains(SCRIPT_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{KnownTopic, TopicEntry};
    use hub_registries::KnownTopicRegistry;
    use hub_topic_cache::RecentValueCache;

    fn resolver_with(entries: &[(&str, &str)], known: &[KnownTopic]) -> VariableResolver {
        let cache = Arc::new(RecentValueCache::new(16));
        for (topic, payload) in entries {
            cache.put(TopicEntry::new("iotzoo", "test", *topic, *payload));
        }
        let registry = KnownTopicRegistry::in_memory();
        for topic in known {
            registry.insert(topic.clone());
        }
        VariableResolver::new(cache, Arc::new(registry))
    }

    #[tokio::test]
    async fn test_bare_names() {
        let resolver = resolver_with(&[("VARIABLE1", "1"), ("heatmap/index", "4")], &[]);
        assert_eq!(resolver.resolve("VARIABLE1 + 1").await, "1 + 1");
        assert_eq!(resolver.resolve("heatmap/index + 1;").await, "4 + 1;");
    }

    #[tokio::test]
    async fn test_bare_name_missing_keeps_text() {
        let resolver = resolver_with(&[("VARIABLE1", "1")], &[]);
        assert_eq!(resolver.resolve("VARIABLE1 + UNKNOWN").await, "VARIABLE1 + UNKNOWN");
        assert_eq!(resolver.resolve("7 > 5").await, "7 > 5");
    }

    #[tokio::test]
    async fn test_read_markers() {
        let resolver = resolver_with(&[("Button1State", "1"), ("Button2State", "0")], &[]);
        assert_eq!(
            resolver
                .resolve("7 > 5 && Read('Button1State') == 1 && ReadFromMemory(Button2State) == 0")
                .await,
            "7 > 5 && 1 == 1 && 0 == 0"
        );
    }

    #[tokio::test]
    async fn test_read_marker_missing_is_left_intact() {
        let resolver = resolver_with(&[("b", "2")], &[]);
        assert_eq!(
            resolver.resolve("Read('a') + Read('b')").await,
            "Read('a') + 2"
        );
    }

    #[tokio::test]
    async fn test_full_qualified_lookup() {
        let resolver = resolver_with(&[("counter", "9")], &[]);
        assert_eq!(resolver.resolve("Read('iotzoo/test/counter')").await, "9");
    }

    #[tokio::test]
    async fn test_known_topic_fallback_with_indexer() {
        let colors = KnownTopic::new("IOTZOO", "COLORS")
            .with_last_payload(r##"[{"Red": "#F22A27"}, {"Green": "#27F25E"}]"##);
        let resolver = resolver_with(&[], &[colors]);

        assert_eq!(resolver.resolve("Read('IOTZOO/COLORS')['Green']").await, "#27F25E");
        assert_eq!(resolver.resolve("Read('COLORS')['Blue']").await, "Read('COLORS')['Blue']");
    }

    #[tokio::test]
    async fn test_cache_wins_over_known_topic() {
        let stale = KnownTopic::new("test", "temperature").with_last_payload("10");
        let resolver = resolver_with(&[("temperature", "21")], &[stale]);
        assert_eq!(resolver.resolve("Read('temperature')").await, "21");
    }

    #[tokio::test]
    async fn test_json_object_text_is_not_tokenized() {
        let resolver = resolver_with(&[("clear", "true")], &[]);
        let template = "{'text': 'hello', 'clear': false}";
        assert_eq!(resolver.resolve(template).await, template);
    }
}
