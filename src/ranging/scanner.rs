use std::sync::{Arc, Mutex};
use tokio::{sync::mpsc, time::Instant};

use crate::{
    error::{EngineError, EngineResult},
    models::{BeaconId, RangingScope, ReadingEvent},
};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Radio-side collaborator that delivers readings for one scope until told
/// to stop. It may deliver nothing at all, or the same beacon many times a
/// second.
pub trait BeaconScanner: Send {
    fn start_ranging(&mut self, scope: &RangingScope) -> EngineResult<mpsc::Receiver<ReadingEvent>>;

    fn stop_ranging(&mut self, scope: &RangingScope);
}

/// Scanner whose readings are pushed by hand through a [`ScannerFeed`].
pub struct ChannelScanner {
    feed: ScannerFeed,
    capacity: usize,
}

impl ChannelScanner {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            feed: ScannerFeed::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn feed(&self) -> ScannerFeed {
        self.feed.clone()
    }
}

impl Default for ChannelScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BeaconScanner for ChannelScanner {
    fn start_ranging(&mut self, _scope: &RangingScope) -> EngineResult<mpsc::Receiver<ReadingEvent>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.feed.replace(Some(tx));
        Ok(rx)
    }

    fn stop_ranging(&mut self, _scope: &RangingScope) {
        self.feed.replace(None);
    }
}

/// Cloneable handle that injects readings into a [`ChannelScanner`].
#[derive(Clone, Default)]
pub struct ScannerFeed {
    tx: Arc<Mutex<Option<mpsc::Sender<ReadingEvent>>>>,
}

impl ScannerFeed {
    fn replace(&self, tx: Option<mpsc::Sender<ReadingEvent>>) {
        let mut guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = tx;
    }

    fn sender(&self) -> Option<mpsc::Sender<ReadingEvent>> {
        match self.tx.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.sender().is_some()
    }

    /// Stamps the reading with the current time and queues it. Returns
    /// `false` when nothing is ranging or the queue is full.
    pub fn push(&self, beacon: BeaconId, rssi: i32) -> bool {
        self.push_event(ReadingEvent::new(beacon, rssi, Instant::now()))
    }

    pub fn push_event(&self, event: ReadingEvent) -> bool {
        self.sender()
            .map(|tx| tx.try_send(event).is_ok())
            .unwrap_or(false)
    }

    pub async fn send(&self, event: ReadingEvent) -> EngineResult<()> {
        let tx = self
            .sender()
            .ok_or_else(|| EngineError::Scanner("scanner is not ranging".into()))?;
        tx.send(event)
            .await
            .map_err(|_| EngineError::Scanner("reading receiver dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> RangingScope {
        "AAAAAAAA-BBBB-CCCC-DDDD-EEEEEEEEEEEE".parse().unwrap()
    }

    #[tokio::test]
    async fn feed_delivers_only_while_ranging() {
        let mut scanner = ChannelScanner::new();
        let feed = scanner.feed();
        assert!(!feed.push(BeaconId::new(1, 1), -60));

        let mut rx = scanner.start_ranging(&scope()).unwrap();
        assert!(feed.is_active());
        assert!(feed.push(BeaconId::new(1, 1), -60));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.beacon, BeaconId::new(1, 1));
        assert_eq!(event.rssi, -60);

        scanner.stop_ranging(&scope());
        assert!(!feed.is_active());
        assert!(rx.recv().await.is_none());
        assert!(feed.send(event).await.is_err());
    }
}
