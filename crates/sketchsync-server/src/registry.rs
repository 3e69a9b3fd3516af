//! Live connections and ordered fan-out.
//!
//! Every broadcast runs inside the registry lock and only enqueues onto
//! per-connection queues, so all connections see broadcasts in one global
//! order and a slow reader never stalls the others. A connection whose queue
//! is full is evicted; it can reconnect and resync through the handshake.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Identifier for one accepted connection.
pub type ConnId = Uuid;

/// Sending side of a connection's outbound queue. One item may hold several
/// newline-separated lines (the handshake snapshot).
pub type Outbound = mpsc::Sender<Arc<str>>;

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("connection {0} is already registered")]
    Duplicate(ConnId),
    #[error("connection {0} closed before the handshake was queued")]
    Closed(ConnId),
}

/// Set of connections that receive broadcasts.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: Mutex<HashMap<ConnId, Outbound>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnId, Outbound>> {
        self.conns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the handshake produced by `snapshot` and start delivering
    /// broadcasts to `tx`, in one step.
    ///
    /// No broadcast can run between taking the snapshot and registering, so
    /// every edit reaches the new connection exactly once: either inside the
    /// snapshot or as a later broadcast. Returns the number of snapshot lines.
    pub fn register<F>(&self, id: ConnId, tx: Outbound, snapshot: F) -> Result<usize, RegisterError>
    where
        F: FnOnce() -> Vec<String>,
    {
        let mut conns = self.lock();
        if conns.contains_key(&id) {
            return Err(RegisterError::Duplicate(id));
        }

        let lines = snapshot();
        let count = lines.len();
        if count > 0 {
            tx.try_send(Arc::from(lines.join("\n")))
                .map_err(|_| RegisterError::Closed(id))?;
        }
        conns.insert(id, tx);
        Ok(count)
    }

    /// Stop delivering to `id`. Returns whether it was registered.
    pub fn deregister(&self, id: ConnId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Run `apply` and deliver the line it returns to every connection,
    /// without letting any other broadcast or registration in between.
    ///
    /// `apply` runs under the registry lock: it must be short and must not
    /// block or touch the registry.
    pub fn publish<F>(&self, apply: F) -> Option<Arc<str>>
    where
        F: FnOnce() -> Option<String>,
    {
        let mut conns = self.lock();
        let line: Arc<str> = Arc::from(apply()?);
        Self::fan_out(&mut conns, &line);
        Some(line)
    }

    /// Deliver `line` to every registered connection.
    pub fn broadcast(&self, line: &str) {
        self.publish(|| Some(line.to_owned()));
    }

    fn fan_out(conns: &mut HashMap<ConnId, Outbound>, line: &Arc<str>) {
        conns.retain(|id, tx| match tx.try_send(Arc::clone(line)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %id, "Outbound queue full, evicting slow connection");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn = %id, "Outbound queue closed, dropping connection");
                false
            }
        });
    }

    pub fn is_registered(&self, id: ConnId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchsync_core::{SceneReplica, SceneStore, decode};
    use std::thread;

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(item) = rx.try_recv() {
            lines.extend(item.split('\n').map(str::to_owned));
        }
        lines
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), tx_a, Vec::new).unwrap();
        registry.register(Uuid::new_v4(), tx_b, Vec::new).unwrap();

        registry.broadcast("delete 1");
        registry.broadcast("delete 2");

        assert_eq!(drain(&mut rx_a), vec!["delete 1", "delete 2"]);
        assert_eq!(drain(&mut rx_b), vec!["delete 1", "delete 2"]);
    }

    #[test]
    fn test_register_queues_snapshot_first() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        let count = registry
            .register(id, tx, || vec!["add segment 1 0 0 1 1 0".into(), "add segment 2 0 0 2 2 0".into()])
            .unwrap();
        assert_eq!(count, 2);
        assert!(registry.is_registered(id));
        assert_eq!(drain(&mut rx), vec!["add segment 1 0 0 1 1 0", "add segment 2 0 0 2 2 0"]);
    }

    #[test]
    fn test_duplicate_and_closed_registration() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(id, tx.clone(), Vec::new).unwrap();
        assert!(matches!(
            registry.register(id, tx, Vec::new),
            Err(RegisterError::Duplicate(_))
        ));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let other = Uuid::new_v4();
        assert!(matches!(
            registry.register(other, tx, || vec!["delete 1".into()]),
            Err(RegisterError::Closed(_))
        ));
        assert!(!registry.is_registered(other));
    }

    #[test]
    fn test_slow_connection_is_evicted() {
        let registry = ConnectionRegistry::new();
        let slow = Uuid::new_v4();
        let fast = Uuid::new_v4();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        registry.register(slow, slow_tx, Vec::new).unwrap();
        registry.register(fast, fast_tx, Vec::new).unwrap();

        registry.broadcast("delete 1");
        registry.broadcast("delete 2");

        assert!(!registry.is_registered(slow));
        assert!(registry.is_registered(fast));
        assert_eq!(drain(&mut fast_rx), vec!["delete 1", "delete 2"]);
        // The slow connection keeps what was queued, then sees its queue close.
        assert_eq!(slow_rx.try_recv().as_deref(), Ok("delete 1"));
        assert!(matches!(
            slow_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_closed_connection_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx, Vec::new).unwrap();
        drop(rx);
        registry.broadcast("delete 1");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_publish_skips_when_apply_declines() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(Uuid::new_v4(), tx, Vec::new).unwrap();
        assert!(registry.publish(|| None).is_none());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_concurrent_broadcasts_are_totally_ordered() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut receivers = Vec::new();
        for _ in 0..4 {
            let (tx, rx) = mpsc::channel(4096);
            registry.register(Uuid::new_v4(), tx, Vec::new).unwrap();
            receivers.push(rx);
        }

        let senders: Vec<_> = (0..4)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..200 {
                        registry.broadcast(&format!("move {} {} 0", t + 1, i));
                    }
                })
            })
            .collect();
        for s in senders {
            s.join().unwrap();
        }

        let streams: Vec<Vec<String>> = receivers.iter_mut().map(drain).collect();
        assert_eq!(streams[0].len(), 800);
        for stream in &streams[1..] {
            assert_eq!(stream, &streams[0]);
        }
    }

    #[test]
    fn test_handshake_exactly_once_under_concurrent_edits() {
        let registry = Arc::new(ConnectionRegistry::new());
        let scene = Arc::new(SceneStore::new());
        let id = scene.insert(decode("add rectangle 0 0 10 10 0").to_shape().unwrap());

        let editor = {
            let registry = Arc::clone(&registry);
            let scene = Arc::clone(&scene);
            thread::spawn(move || {
                for _ in 0..500 {
                    registry.publish(|| scene.apply(decode(&format!("move {} 1 0", id))).map(|c| c.encode()));
                }
            })
        };

        let mut joiners = Vec::new();
        for _ in 0..20 {
            let (tx, rx) = mpsc::channel(4096);
            let snapshot = || {
                scene
                    .snapshot()
                    .iter()
                    .map(|(id, shape)| shape.encode(Some(*id)))
                    .collect()
            };
            registry.register(Uuid::new_v4(), tx, snapshot).unwrap();
            joiners.push(rx);
            thread::yield_now();
        }
        editor.join().unwrap();

        let expected = SceneReplica::new();
        for (id, shape) in scene.snapshot() {
            expected.apply_line(&shape.encode(Some(id)));
        }
        for mut rx in joiners {
            let replica = SceneReplica::new();
            for line in drain(&mut rx) {
                replica.apply_line(&line);
            }
            assert_eq!(replica.snapshot(), expected.snapshot());
        }
    }
}
