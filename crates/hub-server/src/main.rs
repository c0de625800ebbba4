//! IoT Hub Server
//!
//! Main entry point: loads the configuration, opens the registries, connects
//! to the MQTT broker and routes every received message through the rules.

mod mqtt;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hub_config::{HubConfig, DERIVED_RULE_ID_PREFIX};
use hub_event_bus::MessageBus;
use hub_registries::Registries;
use hub_router::{MessageRouter, RouterService, RouterStores};
use hub_rules::{RhaiScriptEngine, RuleEngine};
use hub_topic_cache::RecentValueCache;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config directory
const CONFIG_DIR_ENV: &str = "IOT_HUB_CONFIG";

/// How often buffered topic history is written to storage
const HISTORY_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

fn config_dir() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_DIR_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Add configured known topics and rules to the registries
///
/// Stored known topics win over configured ones. Configured rules replace
/// their stored definition but keep the last evaluation. Stored rules with a
/// derived id that is no longer configured are removed.
fn seed_registries(registries: &Registries, config: &HubConfig) -> (usize, usize) {
    let mut topics = 0;
    for known_topic in config.known_topics() {
        if registries
            .known_topics
            .get(&known_topic.project_name, &known_topic.topic)
            .is_none()
        {
            registries.known_topics.insert(known_topic);
            topics += 1;
        }
    }

    let configured = config.rules();
    let stale: Vec<String> = registries
        .rules
        .iter()
        .filter(|stored| stored.id.starts_with(DERIVED_RULE_ID_PREFIX))
        .filter(|stored| !configured.iter().any(|rule| rule.id == stored.id))
        .map(|stored| stored.id.clone())
        .collect();
    for id in stale {
        info!(rule_id = %id, "Removing rule no longer in configuration");
        registries.rules.remove(&id);
    }

    let mut rules = 0;
    for mut rule in configured {
        if let Some(stored) = registries.rules.get(&rule.id) {
            rule.last_trigger_date_time = stored.last_trigger_date_time;
            rule.expression_evaluation_result = stored.expression_evaluation_result;
            rule.expression_evaluation_protocol = stored.expression_evaluation_protocol.clone();
        }
        registries.rules.insert(rule);
        rules += 1;
    }

    (topics, rules)
}

fn script_engine(config: &HubConfig) -> Result<RhaiScriptEngine> {
    let scripts = RhaiScriptEngine::new();
    for script in &config.scripts {
        scripts
            .register(&script.name, &script.source)
            .with_context(|| format!("failed to compile script '{}'", script.name))?;
    }
    Ok(scripts)
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let config_dir = config_dir();
    info!(config_dir = %config_dir.display(), "Starting IoT hub");

    let config = Arc::new(
        HubConfig::load(&config_dir)
            .with_context(|| format!("failed to load configuration from {}", config_dir.display()))?,
    );

    let registries = Registries::new(&config.storage.path, config.storage.history_per_topic);
    registries
        .load_all()
        .await
        .context("failed to load registries")?;
    let (topics, rules) = seed_registries(&registries, &config);
    info!(known_topics = topics, rules, "Seeded registries from configuration");

    let cache = Arc::new(RecentValueCache::new(config.cache.capacity));
    let engine = RuleEngine::with_sqlite(
        cache.clone(),
        registries.known_topics.clone(),
        Arc::new(script_engine(&config)?),
    )
    .context("failed to create rule engine")?;

    let bus = Arc::new(MessageBus::new());
    let (client, event_loop) = mqtt::connect(&config.broker);
    let publisher = mqtt::MqttPublisher::new(client.clone());

    let router = MessageRouter::new(
        config.namespace.clone(),
        cache,
        RouterStores::from(&registries),
        engine,
        Arc::new(publisher.clone()),
    )
    .with_broker_host(config.broker.host.clone());

    let service = RouterService::new(bus.clone(), Arc::new(router));
    service.start().await;

    let known_topics = registries.known_topics.clone();
    let history_flush = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HISTORY_FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = known_topics.flush_history().await {
                warn!(error = %e, "Failed to write topic history");
            }
        }
    });

    let transport = tokio::spawn(mqtt::run_event_loop(
        event_loop,
        client.clone(),
        publisher,
        bus,
        config.clone(),
    ));

    info!(
        namespace = %config.namespace,
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        "IoT hub is running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    service.stop();
    let _ = client.disconnect().await;
    transport.abort();
    history_flush.abort();
    registries
        .persist_all()
        .await
        .context("failed to persist registries")?;

    Ok(())
}
