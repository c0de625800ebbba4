//! Target payload resolution

use std::sync::Arc;

use hub_core::{KnownTopic, Rule, TopicEntry};
use hub_registries::KnownTopicRegistry;
use hub_rules::{RhaiScriptEngine, RuleEngine};
use hub_topic_cache::RecentValueCache;

fn engine_with(cache_entries: &[(&str, &str)], known: &[KnownTopic]) -> RuleEngine {
    let cache = Arc::new(RecentValueCache::new(32));
    for (topic, payload) in cache_entries {
        cache.put(TopicEntry::new("iotzoo", "test", *topic, *payload));
    }
    let known_topics = KnownTopicRegistry::in_memory();
    for topic in known {
        known_topics.insert(topic.clone());
    }
    let scripts = RhaiScriptEngine::new();
    scripts
        .register("celsius", "fn celsius(f) { (f - 32) * 5 / 9 }")
        .unwrap();
    RuleEngine::with_sqlite(cache, Arc::new(known_topics), Arc::new(scripts)).unwrap()
}

async fn resolve(engine: &RuleEngine, template: &str, payload: &str) -> String {
    engine
        .payloads()
        .resolve(Some(template), payload)
        .await
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn test_none_and_empty_templates() {
    let engine = engine_with(&[], &[]);
    assert_eq!(engine.payloads().resolve(None, "1").await.unwrap(), None);
    assert_eq!(resolve(&engine, "", "1").await, "");
}

#[tokio::test]
async fn test_plain_text_is_unchanged() {
    let engine = engine_with(&[], &[]);
    assert_eq!(resolve(&engine, "ON", "1").await, "ON");
    assert_eq!(resolve(&engine, "#27F25E", "1").await, "#27F25E");
}

#[tokio::test]
async fn test_calculations() {
    let engine = engine_with(&[], &[]);
    assert_eq!(resolve(&engine, "Calc(input + 10);", "200").await, "210");
    assert_eq!(resolve(&engine, "input + 1;", "200").await, "201");
    assert_eq!(resolve(&engine, "calc(input - 1);", "159").await, "158");
    assert_eq!(resolve(&engine, "INPUT * 2", "21").await, "42");
}

#[tokio::test]
async fn test_rule_target_payload() {
    let engine = engine_with(&[], &[]);
    let rule = Rule::new("test", "t", "target").with_target_payload("Calc(input + 10);");
    assert_eq!(
        engine.target_payload(&rule, "200").await.unwrap().as_deref(),
        Some("210")
    );
}

#[tokio::test]
async fn test_calculation_with_variables() {
    let engine = engine_with(&[("heatmap/index", "4")], &[]);
    assert_eq!(
        resolve(&engine, "Calc(Read('heatmap/index') + 1);", "").await,
        "5"
    );
    assert_eq!(resolve(&engine, "heatmap/index + 1;", "").await, "5");
}

#[tokio::test]
async fn test_text_template_with_input() {
    let engine = engine_with(&[], &[]);
    let template = "{'text': 'Boiler: input °C ', 'clear': false, 'x':0, 'y': 1}";
    assert_eq!(
        resolve(&engine, template, "29.8").await,
        "{'text': 'Boiler: 29.8 °C ', 'clear': false, 'x':0, 'y': 1}"
    );
}

#[tokio::test]
async fn test_read_raw_payload() {
    let colors = r##"[{"red":"#F22A27"}, {"blue": "#5C27F2"}, {"green": "#27F25E"}]"##;
    let engine = engine_with(&[("colors", colors)], &[]);
    assert_eq!(resolve(&engine, "ReadFromMemory('colors')", "").await, colors);
    assert_eq!(resolve(&engine, "ReadFromMemory(\"colors\")", "").await, colors);
}

#[tokio::test]
async fn test_read_with_indexer() {
    let colors = r##"[{"red":"#F22A27"}, {"blue": "#5C27F2"}, {"green": "#27F25E"}]"##;
    let engine = engine_with(&[("colors", colors)], &[]);
    assert_eq!(resolve(&engine, "Read('colors')['green']", "").await, "#27F25E");
}

#[tokio::test]
async fn test_read_with_indexer_of_object_value() {
    let colors = r#"[{"red":{"r":255,"g":0,"b":0}},{"green":{"r":0,"g":255,"b":0}}]"#;
    let engine = engine_with(&[("colors", colors)], &[]);
    assert_eq!(
        resolve(&engine, "ReadFromMemory('colors')['green']", "").await,
        "{\n  \"r\": 0,\n  \"g\": 255,\n  \"b\": 0\n}"
    );
}

#[tokio::test]
async fn test_read_from_known_topic() {
    let colors = KnownTopic::new("IOTZOO", "COLORS")
        .with_last_payload(r##"[{"Red":"#F22A27"}, {"Green": "#27F25E"}]"##);
    let engine = engine_with(&[], &[colors]);
    assert_eq!(
        resolve(&engine, "Read('IOTZOO/COLORS')['Green']", "").await,
        "#27F25E"
    );
}

#[tokio::test]
async fn test_json_path_from_inbound_payload() {
    let engine = engine_with(&[], &[]);
    let payload = r#"{"DateTime":"14.10.2024 16:30:45","Time":"16:30:45","TimeShort":"16:30"}"#;
    assert_eq!(resolve(&engine, "$['TimeShort']", payload).await, "16:30");
}

#[tokio::test]
async fn test_malformed_calculation_is_kept() {
    let engine = engine_with(&[], &[]);
    let template = r#"[{ "degrees": 90, "rpm": 10, "id": 31}, { "degrees": -136, "rpm": 16, "id": 41} ]"#;
    assert_eq!(resolve(&engine, template, "").await, template);
}

#[tokio::test]
async fn test_escapes_are_resolved() {
    let engine = engine_with(&[], &[]);
    assert_eq!(resolve(&engine, r"line 1\nline 2", "").await, "line 1\nline 2");
}

#[tokio::test]
async fn test_script_in_payload() {
    let engine = engine_with(&[], &[]);
    assert_eq!(resolve(&engine, "::celsius(input)", "212").await, "100");
}
