use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for LISTEN/NOTIFY. Channels are named (`bookings`,
/// `artifacts`); payloads are JSON envelopes. Slow subscribers lag and drop —
/// artifacts stay regenerable from the bookings they describe, so a dropped
/// notification loses nothing durable.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a channel. Creates the channel if needed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let sender = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a payload. No-op if nobody is listening.
    pub fn send(&self, channel: &str, payload: &str) {
        if let Some(sender) = self.channels.get(channel) {
            let _ = sender.send(payload.to_string());
        }
    }
}
