//! TTL-governed UDP session table
//!
//! Maps a peer's address string to its live session state. Every lookup
//! counts as activity and refreshes the entry; a periodic sweep evicts
//! entries idle beyond the configured TTL and closes their backend
//! sockets. One lock guards the whole table, including the full sweep
//! scan.

use crate::protocol::Protocol;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Live session state shared with the datagram forwarding path.
#[derive(Debug, Clone)]
pub struct Session {
    /// The protocol matched by this session's first datagram
    pub protocol: Arc<Protocol>,
    /// Outbound socket to this session's backend
    pub backend: Arc<UdpSocket>,
}

/// A session plus the backend-reader task serving it.
///
/// Dropping the entry aborts the reader. The abort unblocks the task's
/// pending read and releases its socket handle, so the backend socket
/// closes once the entry is gone. A failed close cannot surface here;
/// eviction always completes.
#[derive(Debug)]
pub struct SessionEntry {
    session: Session,
    reader: JoinHandle<()>,
}

impl SessionEntry {
    /// Bundle a session with its backend-reader task.
    pub fn new(session: Session, reader: JoinHandle<()>) -> Self {
        SessionEntry { session, reader }
    }
}

impl Drop for SessionEntry {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// A stored entry plus its activity timestamp.
#[derive(Debug)]
struct Slot {
    entry: SessionEntry,
    last_access: Instant,
}

/// Concurrent TTL map keyed by peer address.
#[derive(Debug)]
pub struct SessionTable {
    slots: Mutex<HashMap<String, Slot>>,
    max_ttl: Duration,
}

impl SessionTable {
    /// Create a table whose entries expire after `max_ttl` of inactivity.
    pub fn new(max_ttl: Duration) -> Self {
        SessionTable {
            slots: Mutex::new(HashMap::new()),
            max_ttl,
        }
    }

    /// Insert a session if the key is absent; the first writer for a key
    /// wins. The entry's activity timestamp is refreshed either way.
    ///
    /// Returns `false` when an entry already existed. The rejected entry
    /// is dropped, which aborts its reader task and closes its backend
    /// socket rather than leaking it.
    pub async fn put(&self, key: &str, entry: SessionEntry) -> bool {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        match slots.get_mut(key) {
            Some(slot) => {
                slot.last_access = now;
                false
            }
            None => {
                slots.insert(
                    key.to_string(),
                    Slot {
                        entry,
                        last_access: now,
                    },
                );
                true
            }
        }
    }

    /// Look up a session and refresh its activity timestamp.
    pub async fn get(&self, key: &str) -> Option<Session> {
        let mut slots = self.slots.lock().await;
        slots.get_mut(key).map(|slot| {
            slot.last_access = Instant::now();
            slot.entry.session.clone()
        })
    }

    /// Whether a session exists for `key`. An inspection counts as
    /// activity, so this refreshes the timestamp too.
    pub async fn has(&self, key: &str) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(key) {
            Some(slot) => {
                slot.last_access = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Whether the table holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Scan the whole table once, evicting every entry idle beyond the
    /// TTL. Returns the number of evicted sessions. The lock is held for
    /// the full scan.
    pub async fn sweep_once(&self) -> usize {
        let mut slots = self.slots.lock().await;
        let now = Instant::now();
        let before = slots.len();
        slots.retain(|key, slot| {
            let expired = now.duration_since(slot.last_access) > self.max_ttl;
            if expired {
                debug!(addr = %key, "Session expired, closing backend");
            }
            !expired
        });
        before - slots.len()
    }

    /// Start the background sweep, ticking every `period` until the
    /// shutdown channel fires or closes.
    pub fn spawn_sweep(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: broadcast::Receiver<bool>,
    ) -> JoinHandle<()> {
        let table = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = table.sweep_once().await;
                        if evicted > 0 {
                            debug!(evicted, "Session sweep evicted idle sessions");
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("Session sweep stopped");
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;
    use tokio::time::advance;

    async fn test_entry() -> (SessionEntry, Weak<UdpSocket>) {
        let backend = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let weak = Arc::downgrade(&backend);

        let session = Session {
            protocol: Arc::new(Protocol::ssh("127.0.0.1:22")),
            backend: backend.clone(),
        };
        let reader_socket = backend.clone();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            loop {
                if reader_socket.recv_from(&mut buf).await.is_err() {
                    break;
                }
            }
        });

        (SessionEntry::new(session, reader), weak)
    }

    /// Let aborted reader tasks run to completion so their socket
    /// references drop.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_put_get_has_roundtrip() {
        let table = SessionTable::new(Duration::from_secs(60));
        let (entry, _weak) = test_entry().await;
        let backend = entry.session.backend.clone();

        assert!(table.put("1.2.3.4:5000", entry).await);
        assert!(table.has("1.2.3.4:5000").await);

        let session = table.get("1.2.3.4:5000").await.unwrap();
        assert!(Arc::ptr_eq(&session.backend, &backend));
        assert_eq!(session.protocol.name(), "SSH");

        assert!(!table.has("1.2.3.4:5001").await);
        assert!(table.get("1.2.3.4:5001").await.is_none());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_put_does_not_overwrite() {
        let table = SessionTable::new(Duration::from_secs(60));
        let (first, _w1) = test_entry().await;
        let first_backend = first.session.backend.clone();
        let (second, second_weak) = test_entry().await;

        assert!(table.put("k", first).await);
        assert!(!table.put("k", second).await);
        settle().await;

        // first writer wins; the loser's backend socket is closed
        let session = table.get("k").await.unwrap();
        assert!(Arc::ptr_eq(&session.backend, &first_backend));
        assert!(second_weak.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_refresh_last_access() {
        let table = SessionTable::new(Duration::from_secs(5));
        let (entry, _weak) = test_entry().await;
        table.put("k", entry).await;

        // keep touching the entry just inside the TTL; it must survive
        for _ in 0..3 {
            advance(Duration::from_secs(4)).await;
            assert!(table.has("k").await);
            assert_eq!(table.sweep_once().await, 0);
        }

        advance(Duration::from_secs(4)).await;
        assert!(table.get("k").await.is_some());
        advance(Duration::from_secs(4)).await;
        assert_eq!(table.sweep_once().await, 0);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_entries() {
        let table = SessionTable::new(Duration::from_secs(5));
        let (entry, weak) = test_entry().await;
        table.put("k", entry).await;

        advance(Duration::from_secs(6)).await;
        assert_eq!(table.sweep_once().await, 1);
        assert!(table.is_empty().await);

        // the evicted entry's backend socket is observably closed
        settle().await;
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_fresh_entries() {
        let table = SessionTable::new(Duration::from_secs(5));
        let (entry, _weak) = test_entry().await;
        table.put("k", entry).await;

        advance(Duration::from_secs(3)).await;
        assert_eq!(table.sweep_once().await, 0);
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_sweep_evicts_in_background() {
        let table = Arc::new(SessionTable::new(Duration::from_secs(5)));
        let (shutdown_tx, _) = broadcast::channel(1);
        let sweep = table
            .clone()
            .spawn_sweep(Duration::from_secs(1), shutdown_tx.subscribe());

        let (entry, _weak) = test_entry().await;
        table.put("k", entry).await;

        // paused clock: advancing past TTL + one tick drives the sweep
        advance(Duration::from_secs(7)).await;
        settle().await;
        assert!(table.is_empty().await);

        drop(shutdown_tx);
        let _ = sweep.await;
    }

    #[tokio::test]
    async fn test_spawn_sweep_stops_on_shutdown() {
        let table = Arc::new(SessionTable::new(Duration::from_secs(5)));
        let (shutdown_tx, _) = broadcast::channel(1);
        let sweep = table
            .clone()
            .spawn_sweep(Duration::from_secs(1), shutdown_tx.subscribe());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), sweep)
            .await
            .expect("sweep did not stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_once_on_empty_table() {
        let table = SessionTable::new(Duration::from_secs(5));
        assert_eq!(table.sweep_once().await, 0);
        assert!(table.is_empty().await);
    }
}
