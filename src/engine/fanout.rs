use crate::protocol::{ListSnapshot, Notification};
use crate::store::{EntityKey, Store};
use crate::types::GameListId;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

struct ListChannel {
    sender: broadcast::Sender<ListSnapshot>,
    sequence: u64,
}

/// Broadcast side of the engine: per-list snapshots, achiever notifications
/// and raw change keys.
#[derive(Clone)]
pub(crate) struct Fanout {
    channels: Arc<RwLock<HashMap<GameListId, ListChannel>>>,
    notifications: broadcast::Sender<Notification>,
    changes: broadcast::Sender<EntityKey>,
    snapshot_capacity: usize,
}

impl Fanout {
    pub fn new(snapshot_capacity: usize, notification_capacity: usize) -> Self {
        let (notifications, _rx) = broadcast::channel(notification_capacity);
        let (changes, _rx) = broadcast::channel(notification_capacity);
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            notifications,
            changes,
            snapshot_capacity,
        }
    }

    pub async fn subscribe(&self, list: GameListId) -> broadcast::Receiver<ListSnapshot> {
        let mut channels = self.channels.write().await;
        channels
            .entry(list)
            .or_insert_with(|| ListChannel {
                sender: broadcast::channel(self.snapshot_capacity).0,
                sequence: 0,
            })
            .sender
            .subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<EntityKey> {
        self.changes.subscribe()
    }

    /// Sequence of the last snapshot published for a list
    pub async fn sequence(&self, list: GameListId) -> u64 {
        self.channels
            .read()
            .await
            .get(&list)
            .map_or(0, |channel| channel.sequence)
    }

    pub fn notify(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            tracing::debug!("Notification: {:?}", notification);
            // Ignore send errors (no receivers connected is fine)
            let _ = self.notifications.send(notification);
        }
    }

    /// Drain the store's changes and publish snapshots of the lists they touch
    pub async fn publish(&self, store: &mut Store) {
        let keys = store.take_changes();
        if keys.is_empty() {
            return;
        }

        let mut lists = BTreeSet::new();
        let mut everywhere = false;
        for key in &keys {
            match store.change_scope(key) {
                Some(list) => {
                    lists.insert(list);
                }
                None if *key != EntityKey::ReferenceData => everywhere = true,
                None => {}
            }
        }

        self.send_changes(keys);
        let mut channels = self.channels.write().await;
        for (list, channel) in channels.iter_mut() {
            if everywhere || lists.contains(list) {
                Self::send_snapshot(store, *list, channel);
            }
        }
    }

    /// Publish a fresh snapshot to every subscribed list, e.g. after a
    /// session reset
    pub async fn publish_all(&self, store: &mut Store) {
        self.send_changes(store.take_changes());
        let mut channels = self.channels.write().await;
        for (list, channel) in channels.iter_mut() {
            Self::send_snapshot(store, *list, channel);
        }
    }

    fn send_changes(&self, keys: Vec<EntityKey>) {
        for key in keys {
            let _ = self.changes.send(key);
        }
    }

    fn send_snapshot(store: &Store, list: GameListId, channel: &mut ListChannel) {
        channel.sequence += 1;
        let snapshot = store.list_snapshot(list, channel.sequence);
        let _ = channel.sender.send(snapshot);
    }
}
