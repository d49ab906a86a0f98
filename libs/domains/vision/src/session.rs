//! Ephemeral session store.
//!
//! Sessions map a caller-supplied id to the image of an analysis so a later
//! ranking request can refer to it. Entries expire after a fixed TTL (enforced
//! lazily on read and eagerly by a periodic sweep) and the store never holds
//! more than `max_entries`, evicting in insertion order.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::models::{ImagePayload, Session};

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_MAX_SESSIONS: usize = 500;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Store limits
#[derive(Debug, Clone, Copy)]
pub struct SessionStoreConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub sweep_interval: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_SESSION_TTL,
            max_entries: DEFAULT_MAX_SESSIONS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Session persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace the session stored under `id`
    async fn create(&self, id: String, image: ImagePayload) -> Session;

    /// Live session for `id`; expired entries read as absent
    async fn get(&self, id: &str) -> Option<Session>;

    /// Remove a session, reporting whether it was present
    async fn end(&self, id: &str) -> bool;

    /// Remove every expired session, returning how many were dropped
    async fn sweep(&self) -> usize;

    /// Number of entries physically held
    async fn len(&self) -> usize;
}

#[derive(Debug)]
struct Entry {
    session: Session,
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<String, Entry>,
    /// Insertion sequence -> id, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl Entries {
    fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.by_id.remove(id)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, id) = self.order.pop_first()?;
        self.by_id.remove(&id);
        Some(id)
    }
}

/// In-process session store guarded by a single lock
#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    entries: Arc<RwLock<Entries>>,
    config: SessionStoreConfig,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

impl InMemorySessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Entries::default())),
            config: SessionStoreConfig {
                max_entries: config.max_entries.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> SessionStoreConfig {
        self.config
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.inserted_at) >= self.config.ttl
    }

    /// Run [`SessionStore::sweep`] every `sweep_interval` until shutdown is signalled.
    pub fn spawn_sweeper(&self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = self.clone();
        let period = store.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep().await;
                        if removed > 0 {
                            debug!(removed, "Swept expired sessions");
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("Session sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, id: String, image: ImagePayload) -> Session {
        let mut entries = self.entries.write().await;

        if entries.remove(&id).is_none() && entries.by_id.len() >= self.config.max_entries {
            if let Some(evicted) = entries.evict_oldest() {
                info!(session_id = %evicted, "Evicted oldest session at capacity");
            }
        }

        let session = Session {
            id: id.clone(),
            image,
            created_at: Utc::now(),
        };
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.order.insert(seq, id.clone());
        entries.by_id.insert(
            id,
            Entry {
                session: session.clone(),
                inserted_at: Instant::now(),
                seq,
            },
        );

        debug!(session_id = %session.id, "Created session");
        session
    }

    async fn get(&self, id: &str) -> Option<Session> {
        let entries = self.entries.read().await;
        let entry = entries.by_id.get(id)?;
        if self.is_expired(entry, Instant::now()) {
            return None;
        }
        Some(entry.session.clone())
    }

    async fn end(&self, id: &str) -> bool {
        let existed = self.entries.write().await.remove(id).is_some();
        debug!(session_id = %id, existed, "Ended session");
        existed
    }

    async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let expired: Vec<String> = entries
            .by_id
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            entries.remove(id);
        }
        expired.len()
    }

    async fn len(&self) -> usize {
        self.entries.read().await.by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl_secs: u64, max_entries: usize) -> InMemorySessionStore {
        InMemorySessionStore::new(SessionStoreConfig {
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
            sweep_interval: Duration::from_secs(10),
        })
    }

    fn image(tag: &str) -> ImagePayload {
        ImagePayload::new(format!("data:image/png;base64,{tag}"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_then_get_returns_payload() {
        let store = store(60, 10);
        store.create("s1".to_string(), image("AAA")).await;

        let session = store.get("s1").await.unwrap();
        assert_eq!(session.id, "s1");
        assert_eq!(session.image, image("AAA"));
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_reads_as_absent_before_sweep() {
        let store = store(60, 10);
        store.create("s1".to_string(), image("AAA")).await;

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("s1").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(store.get("s1").await.is_none());
        assert_eq!(store.len().await, 1, "not physically removed yet");

        assert_eq!(store.sweep().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_first_inserted() {
        let store = store(600, 3);
        for id in ["a", "b", "c"] {
            store.create(id.to_string(), image(id)).await;
        }
        // Reads do not refresh insertion order.
        assert!(store.get("a").await.is_some());

        store.create("d".to_string(), image("d")).await;
        assert_eq!(store.len().await, 3);
        assert!(store.get("a").await.is_none());
        for id in ["b", "c", "d"] {
            assert!(store.get(id).await.is_some(), "{id} should survive");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_skips_already_ended_sessions() {
        let store = store(600, 2);
        store.create("a".to_string(), image("a")).await;
        store.create("b".to_string(), image("b")).await;
        assert!(store.end("a").await);

        store.create("c".to_string(), image("c")).await;
        store.create("d".to_string(), image("d")).await;
        assert!(store.get("b").await.is_none());
        assert!(store.get("c").await.is_some());
        assert!(store.get("d").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_replaces_without_eviction() {
        let store = store(600, 2);
        store.create("a".to_string(), image("one")).await;
        store.create("b".to_string(), image("b")).await;
        store.create("a".to_string(), image("two")).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("a").await.unwrap().image, image("two"));
        assert!(store.get("b").await.is_some());

        // "a" moved to the newest slot, so "b" goes first now.
        store.create("c".to_string(), image("c")).await;
        assert!(store.get("b").await.is_none());
        assert!(store.get("a").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_restarts_ttl() {
        let store = store(60, 10);
        store.create("a".to_string(), image("one")).await;
        tokio::time::advance(Duration::from_secs(50)).await;
        store.create("a".to_string(), image("two")).await;
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_end_reports_prior_existence() {
        let store = InMemorySessionStore::default();
        store.create("s1".to_string(), image("AAA")).await;
        assert!(store.end("s1").await);
        assert!(!store.end("s1").await);
        assert!(!store.end("never").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_removes_without_reads() {
        let store = store(5, 10);
        let (tx, rx) = broadcast::channel(1);
        let handle = store.spawn_sweeper(rx);

        store.create("s1".to_string(), image("AAA")).await;
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(store.len().await, 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creates_respect_capacity() {
        let store = store(600, 16);
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(format!("s{i}"), image("x")).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
