use crate::domain::encoder::{ConnectionState, DeviceSnapshot, Encoder, EncoderId};
use async_trait::async_trait;
use std::error::Error;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EncoderRegistry: Send + Sync {
    /// Register an encoder
    async fn add(&self, encoder: Encoder) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Look up one encoder
    async fn get(&self, id: EncoderId) -> Result<Option<Encoder>, Box<dyn Error + Send + Sync>>;

    /// All registered encoders
    async fn list(&self) -> Result<Vec<Encoder>, Box<dyn Error + Send + Sync>>;

    /// Remove an encoder. Returns whether it was present.
    async fn remove(&self, id: EncoderId) -> Result<bool, Box<dyn Error + Send + Sync>>;

    async fn set_connection_state(
        &self,
        id: EncoderId,
        state: ConnectionState,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// `Unknown` for encoders never polled
    async fn connection_state(
        &self,
        id: EncoderId,
    ) -> Result<ConnectionState, Box<dyn Error + Send + Sync>>;

    /// Store the latest poll observation
    async fn record_snapshot(
        &self,
        id: EncoderId,
        snapshot: DeviceSnapshot,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    async fn latest_snapshot(
        &self,
        id: EncoderId,
    ) -> Result<Option<DeviceSnapshot>, Box<dyn Error + Send + Sync>>;
}
