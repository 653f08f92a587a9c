use dashmap::DashMap;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::models::snapshot::Snapshot;
use crate::utils::error::AppResult;

/// Anything that can assemble a snapshot on demand
pub trait SnapshotSource: Send + Sync + 'static {
    fn collect(&self) -> Snapshot;
}

/// The subscriber's channel is gone
#[derive(Debug, Error)]
#[error("subscriber disconnected")]
pub struct Disconnected;

/// A sink that accepts serialized snapshots
pub trait Subscriber: Send + Sync {
    fn deliver(&self, message: Arc<str>) -> Result<(), Disconnected>;
}

/// Subscriber that keeps only the newest message.
///
/// Delivery overwrites whatever the reader has not picked up yet, so a slow
/// reader skips snapshots instead of queueing them.
pub struct LatestOnly {
    tx: watch::Sender<Option<Arc<str>>>,
}

/// Reader half of a [`LatestOnly`] subscriber
pub type SnapshotReceiver = watch::Receiver<Option<Arc<str>>>;

impl LatestOnly {
    pub fn channel() -> (Arc<Self>, SnapshotReceiver) {
        let (tx, rx) = watch::channel(None);
        (Arc::new(Self { tx }), rx)
    }
}

impl Subscriber for LatestOnly {
    fn deliver(&self, message: Arc<str>) -> Result<(), Disconnected> {
        self.tx.send(Some(message)).map_err(|_| Disconnected)
    }
}

/// Holds the current serialized snapshot and fans it out to subscribers
pub struct BroadcastHub {
    source: Arc<dyn SnapshotSource>,
    interval: Duration,
    subscribers: DashMap<Uuid, Arc<dyn Subscriber>>,
    latest: RwLock<Option<Arc<str>>>,
    ticks: AtomicU64,
}

impl BroadcastHub {
    pub fn new(source: Arc<dyn SnapshotSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            subscribers: DashMap::new(),
            latest: RwLock::new(None),
            ticks: AtomicU64::new(0),
        }
    }

    /// Register a subscriber and hand it the current snapshot right away.
    ///
    /// Builds a snapshot first if none has been broadcast yet. Returns `None`
    /// if the subscriber is already gone.
    pub fn join(&self, subscriber: Arc<dyn Subscriber>) -> Option<Uuid> {
        let message = match self.latest() {
            Some(message) => message,
            None => match self.render(&self.source.collect()) {
                Ok(message) => message,
                Err(e) => {
                    error!("Cannot serialize snapshot for new subscriber: {}", e);
                    return None;
                }
            },
        };

        if subscriber.deliver(message).is_err() {
            return None;
        }
        let id = Uuid::new_v4();
        self.subscribers.insert(id, subscriber);
        info!("Subscriber {} joined ({} connected)", id, self.subscribers.len());
        Some(id)
    }

    pub fn leave(&self, id: &Uuid) {
        if self.subscribers.remove(id).is_some() {
            info!("Subscriber {} left ({} connected)", id, self.subscribers.len());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Last serialized snapshot, if any
    pub fn latest(&self) -> Option<Arc<str>> {
        self.latest.read().clone()
    }

    /// Snapshots broadcast so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Serialize once and push to every subscriber; drop the ones that fail.
    ///
    /// Returns how many subscribers received it.
    pub fn publish(&self, snapshot: &Snapshot) -> AppResult<usize> {
        let message = self.render(snapshot)?;
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let mut gone = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().deliver(message.clone()).is_err() {
                gone.push(*entry.key());
            }
        }
        for id in &gone {
            debug!("Dropping disconnected subscriber {}", id);
            self.subscribers.remove(id);
        }
        Ok(self.subscribers.len())
    }

    /// Collect a fresh snapshot and publish it
    #[cfg(test)]
    pub fn refresh(&self) -> AppResult<usize> {
        let snapshot = self.source.collect();
        self.publish(&snapshot)
    }

    /// Broadcast on a fixed cadence until the task is aborted
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Broadcasting snapshots every {:?}", self.interval);

            loop {
                ticker.tick().await;
                let source = self.source.clone();
                let snapshot = match tokio::task::spawn_blocking(move || source.collect()).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        error!("Snapshot collection task failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = self.publish(&snapshot) {
                    warn!("Broadcast skipped: {}", e);
                }
            }
        })
    }

    fn render(&self, snapshot: &Snapshot) -> AppResult<Arc<str>> {
        let message: Arc<str> = serde_json::to_string(snapshot)?.into();
        *self.latest.write() = Some(message.clone());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    impl SnapshotSource for CountingSource {
        fn collect(&self) -> Snapshot {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let mut snapshot = Snapshot::empty();
            snapshot.timestamp = n as i64;
            snapshot
        }
    }

    fn hub() -> (Arc<BroadcastHub>, Arc<CountingSource>) {
        let source = Arc::new(CountingSource::default());
        let hub = Arc::new(BroadcastHub::new(source.clone(), Duration::from_millis(20)));
        (hub, source)
    }

    fn timestamp_of(message: &str) -> i64 {
        let value: serde_json::Value = serde_json::from_str(message).unwrap();
        value["timestamp"].as_i64().unwrap()
    }

    #[test]
    fn new_subscriber_gets_current_snapshot_immediately() {
        let (hub, source) = hub();
        hub.refresh().unwrap();

        let (subscriber, rx) = LatestOnly::channel();
        assert!(hub.join(subscriber).is_some());

        let received = rx.borrow().clone().expect("snapshot on join");
        assert_eq!(Some(received), hub.latest());
        // Served from the broadcast cache, not a new collection
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_before_first_tick_builds_a_snapshot() {
        let (hub, source) = hub();
        let (subscriber, rx) = LatestOnly::channel();
        hub.join(subscriber);
        assert!(rx.borrow().is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn publish_reaches_every_subscriber_and_drops_closed_ones() {
        let (hub, _) = hub();
        let (alive, alive_rx) = LatestOnly::channel();
        let (closed, closed_rx) = LatestOnly::channel();
        hub.join(alive);
        hub.join(closed);
        assert_eq!(hub.subscriber_count(), 2);

        drop(closed_rx);
        let delivered = hub.refresh().unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(timestamp_of(&alive_rx.borrow().clone().unwrap()), 1);
    }

    #[test]
    fn slow_subscriber_only_sees_the_newest_snapshot() {
        let (hub, _) = hub();
        let (subscriber, mut rx) = LatestOnly::channel();
        hub.join(subscriber);
        rx.borrow_and_update();

        for _ in 0..5 {
            hub.refresh().unwrap();
        }
        assert!(rx.has_changed().unwrap());
        let newest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(timestamp_of(&newest), 5);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn leave_removes_subscriber() {
        let (hub, _) = hub();
        let (subscriber, _rx) = LatestOnly::channel();
        let id = hub.join(subscriber).unwrap();
        hub.leave(&id);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn spawned_task_broadcasts_in_tick_order() {
        let (hub, _) = hub();
        let (subscriber, mut rx) = LatestOnly::channel();
        hub.join(subscriber);
        rx.borrow_and_update();

        let task = hub.clone().spawn();
        let mut seen = Vec::new();
        while seen.len() < 3 {
            tokio::time::timeout(Duration::from_secs(2), rx.changed())
                .await
                .expect("tick within deadline")
                .unwrap();
            seen.push(timestamp_of(&rx.borrow_and_update().clone().unwrap()));
        }
        task.abort();

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert!(hub.ticks() >= 3);
    }
}
