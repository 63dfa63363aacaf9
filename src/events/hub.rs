use super::DeviceEvent;
use tokio::sync::broadcast;

#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        // Slow subscribers lag and skip, publishers never block
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Returns the subscriber count reached; an event with no subscribers is
    /// dropped, which is fine for the monitor's fire-and-forget publishing.
    pub fn publish(&self, event: DeviceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}
