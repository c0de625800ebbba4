//! Microcontroller Registry
//!
//! Tracks microcontrollers that registered themselves, keyed by MAC address.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::KnownMicrocontroller;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};
use crate::store::{MicrocontrollerStore, StoreError, StoreResult};

/// Storage key for the microcontroller registry
pub const STORAGE_KEY: &str = "hub.microcontrollers";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MicrocontrollerRegistryData {
    pub microcontrollers: Vec<KnownMicrocontroller>,
}

impl Storable for MicrocontrollerRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Microcontroller Registry
pub struct MicrocontrollerRegistry {
    storage: Option<Arc<Storage>>,
    by_mac: DashMap<String, Arc<KnownMicrocontroller>>,
}

impl MicrocontrollerRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage: Some(storage),
            by_mac: DashMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            storage: None,
            by_mac: DashMap::new(),
        }
    }

    pub async fn load(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if let Some(data) = storage.load::<MicrocontrollerRegistryData>().await? {
            info!(
                "Loading {} microcontrollers from storage",
                data.microcontrollers.len()
            );
            for mc in data.microcontrollers {
                self.by_mac.insert(mc.mac_address.clone(), Arc::new(mc));
            }
        }
        Ok(())
    }

    pub async fn persist(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let mut microcontrollers: Vec<KnownMicrocontroller> =
            self.by_mac.iter().map(|r| (**r.value()).clone()).collect();
        microcontrollers.sort_by(|a, b| a.mac_address.cmp(&b.mac_address));
        storage
            .save(&MicrocontrollerRegistryData { microcontrollers })
            .await?;
        debug!("Saved {} microcontrollers to storage", self.by_mac.len());
        Ok(())
    }

    pub fn get(&self, mac_address: &str) -> Option<Arc<KnownMicrocontroller>> {
        self.by_mac.get(mac_address).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.by_mac.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mac.is_empty()
    }
}

#[async_trait]
impl MicrocontrollerStore for MicrocontrollerRegistry {
    async fn get_by_mac(&self, mac_address: &str) -> StoreResult<Option<KnownMicrocontroller>> {
        Ok(self.get(mac_address).map(|mc| (*mc).clone()))
    }

    async fn save(&self, microcontroller: &KnownMicrocontroller) -> StoreResult<()> {
        if microcontroller.mac_address.is_empty() {
            return Err(StoreError::Invalid {
                entity: "microcontroller",
                reason: "MAC address cannot be empty".to_string(),
            });
        }
        self.by_mac.insert(
            microcontroller.mac_address.clone(),
            Arc::new(microcontroller.clone()),
        );
        self.persist().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get() {
        let registry = MicrocontrollerRegistry::in_memory();
        let mut mc = KnownMicrocontroller::new("AA:BB:CC");
        mc.project_name = "garden".to_string();
        registry.save(&mc).await.unwrap();

        let found = registry.get_by_mac("AA:BB:CC").await.unwrap().unwrap();
        assert_eq!(found.project_name, "garden");
        assert!(registry.get_by_mac("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_rejects_empty_mac() {
        let registry = MicrocontrollerRegistry::in_memory();
        let result = registry.save(&KnownMicrocontroller::new("")).await;
        assert!(result.is_err());
    }
}
