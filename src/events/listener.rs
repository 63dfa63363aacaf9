use super::hub::EventHub;
use crate::application::remediation::RemediationService;
use crate::ports::device::DeviceFactory;
use crate::ports::registry::EncoderRegistry;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Bridge error events from the hub to the remediation service.
pub fn start<C, R>(
    hub: Arc<EventHub>,
    remediation: Arc<RemediationService<C, R>>,
    cancel: CancellationToken,
) where
    C: DeviceFactory + 'static,
    R: EncoderRegistry + 'static,
{
    let mut rx = hub.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => remediation.handle(event).await,
                    // Skip what we missed; the next events still matter
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "remediation listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });
}
