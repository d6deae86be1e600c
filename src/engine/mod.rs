//! Serializes every mutation touching one game list through its own queue.
//!
//! Each list gets an unbounded queue and a worker task holding the list's
//! `EventRouter`. Responses and events for the list are applied in arrival
//! order under the store's write lock; after each job the worker publishes
//! the snapshots of every list whose records changed.

mod coalesce;
mod fanout;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::ingest::ResponseIngestor;
use crate::protocol::*;
use crate::router::EventRouter;
use crate::store::{EntityKey, Store};
use crate::types::*;
use coalesce::coalesce_votes;
use fanout::Fanout;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};

enum Job {
    Response(ResponseAction),
    Event(RealtimeEvent),
    /// Completes once every job queued before it was applied
    Flush(oneshot::Sender<()>),
}

impl Job {
    fn is_vote(&self) -> bool {
        matches!(
            self,
            Job::Response(ResponseAction::VoteSubmitted { .. })
                | Job::Event(RealtimeEvent::UserVoteProof(_))
        )
    }

    /// Proof whose stats this job overwrites without other effects.
    /// Votes seen by an achiever carry a notification and are kept.
    fn vote_key(&self, store: &Store, list: GameListId) -> Option<ProofId> {
        match self {
            Job::Response(ResponseAction::VoteSubmitted { proof, .. }) => Some(proof.id),
            Job::Event(RealtimeEvent::UserVoteProof(payload))
                if !store.is_local_achiever(list, &payload.proof) =>
            {
                Some(payload.proof.id)
            }
            _ => None,
        }
    }
}

/// Shared synchronization engine
#[derive(Clone)]
pub struct SyncEngine {
    pub store: Arc<RwLock<Store>>,
    queues: Arc<Mutex<HashMap<GameListId, mpsc::UnboundedSender<Job>>>>,
    fanout: Fanout,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::new())),
            queues: Arc::new(Mutex::new(HashMap::new())),
            fanout: Fanout::new(config.snapshot_capacity, config.notification_capacity),
            config,
        }
    }

    /// Load the authoritative `/users/me` snapshot, replacing the whole cache
    ///
    /// The queue lock is held throughout, so jobs dispatched meanwhile are
    /// applied on top of the new snapshot.
    pub async fn bootstrap(&self, me: MeResponse) {
        let queues = self.queues.lock().await;
        drain(&queues).await;

        let mut store = self.store.write().await;
        ResponseIngestor::new(&mut store).bootstrap(me);
        self.fanout.publish_all(&mut store).await;
    }

    /// Stop every list worker and drop the session's state.
    /// Jobs dispatched while this runs go to fresh workers after the reset.
    pub async fn logout(&self) {
        let mut queues = self.queues.lock().await;
        drain(&queues).await;
        queues.clear();

        let mut store = self.store.write().await;
        store.clear();
        self.fanout.publish_all(&mut store).await;
        tracing::info!("Session cleared");
    }

    pub async fn dispatch_response(&self, action: ResponseAction) {
        let list = action.game_list_id();
        self.enqueue(list, Job::Response(action)).await;
    }

    pub async fn dispatch_event(&self, game_list_id: GameListId, event: RealtimeEvent) {
        self.enqueue(game_list_id, Job::Event(event)).await;
    }

    /// Decode and queue an event received on a `gamelist_{id}` channel.
    /// Malformed payloads are rejected and leave the cache untouched.
    pub async fn dispatch_raw_event(
        &self,
        channel: &str,
        name: &str,
        payload: &str,
    ) -> SyncResult<()> {
        let decoded = parse_channel(channel)
            .and_then(|list| RealtimeEvent::decode(name, payload).map(|event| (list, event)));
        match decoded {
            Ok((list, event)) => {
                self.dispatch_event(list, event).await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Rejected {} on {}: {}", name, channel, e);
                Err(e)
            }
        }
    }

    /// Read-only listings go straight to the store, outside any list queue
    pub async fn load_game_list_modes(&self, modes: Vec<GameListMode>) {
        let mut store = self.store.write().await;
        ResponseIngestor::new(&mut store).on_modes_listed(modes);
        self.fanout.publish(&mut store).await;
    }

    pub async fn load_challenge_categories(&self, categories: Vec<ChallengeCategory>) {
        let mut store = self.store.write().await;
        ResponseIngestor::new(&mut store).on_categories_listed(categories);
        self.fanout.publish(&mut store).await;
    }

    /// Wait until everything queued so far for a list has been applied
    pub async fn flush(&self, game_list_id: GameListId) {
        let (done, waiter) = oneshot::channel();
        self.enqueue(game_list_id, Job::Flush(done)).await;
        let _ = waiter.await;
    }

    pub async fn flush_all(&self) {
        let lists: Vec<GameListId> = self.queues.lock().await.keys().copied().collect();
        futures::future::join_all(lists.into_iter().map(|list| self.flush(list))).await;
    }

    pub async fn subscribe(&self, game_list_id: GameListId) -> broadcast::Receiver<ListSnapshot> {
        self.fanout.subscribe(game_list_id).await
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.fanout.subscribe_notifications()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<EntityKey> {
        self.fanout.subscribe_changes()
    }

    /// Current view of one list, stamped with its last published sequence
    pub async fn snapshot(&self, game_list_id: GameListId) -> ListSnapshot {
        let store = self.store.read().await;
        let sequence = self.fanout.sequence(game_list_id).await;
        store.list_snapshot(game_list_id, sequence)
    }

    pub async fn game_lists(&self) -> Vec<GameList> {
        self.store.read().await.game_lists()
    }

    async fn enqueue(&self, list: GameListId, job: Job) {
        let mut queues = self.queues.lock().await;
        let sender = queues
            .entry(list)
            .or_insert_with(|| self.spawn_worker(list));
        if let Err(mpsc::error::SendError(job)) = sender.send(job) {
            tracing::warn!("Worker for list {} stopped, restarting", list);
            let sender = self.spawn_worker(list);
            let _ = sender.send(job);
            queues.insert(list, sender);
        }
    }

    fn spawn_worker(&self, list: GameListId) -> mpsc::UnboundedSender<Job> {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = ListWorker {
            router: EventRouter::new(list),
            store: self.store.clone(),
            fanout: self.fanout.clone(),
            coalesce_threshold: self.config.coalesce_threshold,
        };
        tracing::debug!("Starting worker for list {}", list);
        tokio::spawn(worker.run(rx));
        tx
    }
}

/// Wait until every worker behind these queues has applied its backlog
async fn drain(queues: &HashMap<GameListId, mpsc::UnboundedSender<Job>>) {
    let waiters: Vec<_> = queues
        .values()
        .filter_map(|sender| {
            let (done, waiter) = oneshot::channel();
            sender.send(Job::Flush(done)).ok().map(|_| waiter)
        })
        .collect();
    futures::future::join_all(waiters).await;
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

struct ListWorker {
    router: EventRouter,
    store: Arc<RwLock<Store>>,
    fanout: Fanout,
    coalesce_threshold: usize,
}

impl ListWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(job) = rx.try_recv() {
                batch.push(job);
            }
            self.apply_batch(batch).await;
        }
        tracing::debug!("Worker for list {} stopped", self.router.game_list_id());
    }

    async fn apply_batch(&self, batch: Vec<Job>) {
        if batch.len() < self.coalesce_threshold {
            for job in batch {
                self.apply(job).await;
            }
            return;
        }

        // Votes are coalesced run by run, once the jobs before them applied
        let mut votes = Vec::new();
        for job in batch {
            if job.is_vote() {
                votes.push(job);
                continue;
            }
            self.apply_votes(std::mem::take(&mut votes)).await;
            self.apply(job).await;
        }
        self.apply_votes(votes).await;
    }

    async fn apply_votes(&self, votes: Vec<Job>) {
        if votes.is_empty() {
            return;
        }
        let list = self.router.game_list_id();
        let received = votes.len();
        let votes = {
            let store = self.store.read().await;
            coalesce_votes(votes, |job| job.vote_key(&store, list))
        };
        if votes.len() < received {
            tracing::debug!(
                "List {}: coalesced {} vote updates into {}",
                list,
                received,
                votes.len()
            );
        }
        for job in votes {
            self.apply(job).await;
        }
    }

    async fn apply(&self, job: Job) {
        match job {
            Job::Flush(done) => {
                let _ = done.send(());
            }
            Job::Response(action) => {
                let mut store = self.store.write().await;
                ResponseIngestor::new(&mut store).apply(action);
                self.fanout.publish(&mut store).await;
            }
            Job::Event(event) => {
                let mut store = self.store.write().await;
                let notifications = self.router.apply(&mut store, event);
                self.fanout.publish(&mut store).await;
                drop(store);
                self.fanout.notify(notifications);
            }
        }
    }
}
