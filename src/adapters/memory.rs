//! In-memory fleet registry.

use crate::domain::encoder::{ConnectionState, DeviceSnapshot, Encoder, EncoderId};
use crate::ports::registry::EncoderRegistry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    encoder: Encoder,
    connection: ConnectionState,
    latest: Option<DeviceSnapshot>,
}

/// Registry backed by a map behind an async lock. Durable storage is out of
/// scope for the daemon; state is rebuilt from config and discovery on boot.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<EncoderId, Entry>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EncoderRegistry for MemoryRegistry {
    async fn add(&self, encoder: Encoder) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut entries = self.entries.write().await;
        entries.insert(
            encoder.id,
            Entry {
                encoder,
                connection: ConnectionState::Unknown,
                latest: None,
            },
        );
        Ok(())
    }

    async fn get(&self, id: EncoderId) -> Result<Option<Encoder>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).map(|e| e.encoder.clone()))
    }

    async fn list(&self) -> Result<Vec<Encoder>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().await;
        let mut encoders: Vec<Encoder> = entries.values().map(|e| e.encoder.clone()).collect();
        encoders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(encoders)
    }

    async fn remove(&self, id: EncoderId) -> Result<bool, Box<dyn Error + Send + Sync>> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&id).is_some())
    }

    async fn set_connection_state(
        &self,
        id: EncoderId,
        state: ConnectionState,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or("unknown encoder id")?;
        entry.connection = state;
        Ok(())
    }

    async fn connection_state(
        &self,
        id: EncoderId,
    ) -> Result<ConnectionState, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&id)
            .map(|e| e.connection)
            .unwrap_or(ConnectionState::Unknown))
    }

    async fn record_snapshot(
        &self,
        id: EncoderId,
        snapshot: DeviceSnapshot,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id).ok_or("unknown encoder id")?;
        entry.latest = Some(snapshot);
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        id: EncoderId,
    ) -> Result<Option<DeviceSnapshot>, Box<dyn Error + Send + Sync>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&id).and_then(|e| e.latest.clone()))
    }
}
