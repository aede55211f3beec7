//! Registry of live connections keyed by routing key.
//!
//! One identity may hold several concurrent connections (multiple tabs or
//! devices). Entries are removed as soon as their last connection leaves.

use std::sync::Arc;

use dashmap::DashMap;

use super::connection::{Connection, Frame};

/// Result of fanning a frame out to every connection under one key.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub skipped_closed: usize,
    pub failed: usize,
}

/// Shared registry of all gateway connections.
///
/// Uses `DashMap` for shard-level concurrency. Callers only ever see cloned
/// snapshots of an entry, never a live view into the map.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Vec<Arc<Connection>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Append a connection under `key`, creating the entry if needed.
    pub fn register(&self, key: &str, connection: Arc<Connection>) {
        self.sessions
            .entry(key.to_string())
            .or_default()
            .push(connection);
    }

    /// Remove a connection from `key`. Returns whether anything was removed;
    /// unknown keys or connections are a no-op.
    pub fn deregister(&self, key: &str, connection: &Connection) -> bool {
        let removed = match self.sessions.get_mut(key) {
            Some(mut conns) => match conns.iter().position(|c| c.id == connection.id) {
                Some(pos) => {
                    conns.remove(pos);
                    true
                }
                None => false,
            },
            None => false,
        };
        // Re-checked under the shard lock so a concurrent register is never lost.
        self.sessions.remove_if(key, |_, conns| conns.is_empty());
        removed
    }

    /// Snapshot of the connections currently under `key`, in registration order.
    pub fn lookup(&self, key: &str) -> Vec<Arc<Connection>> {
        self.sessions
            .get(key)
            .map(|conns| conns.value().clone())
            .unwrap_or_default()
    }

    /// Send `frame` to every open connection under `key`.
    ///
    /// Best effort: closed or saturated recipients are logged and skipped and
    /// never affect delivery to the others.
    pub fn broadcast_to(&self, key: &str, frame: &Frame) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for conn in self.lookup(key) {
            if !conn.is_open() {
                tracing::warn!(conn_id = %conn.id, identity = %key, "session closed, skipping delivery");
                report.skipped_closed += 1;
                continue;
            }
            match conn.send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(conn_id = %conn.id, identity = %key, error = %e, "failed to deliver frame");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Snapshot of every routing key with at least one connection.
    pub fn keys(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of distinct routing keys.
    pub fn identity_count(&self) -> usize {
        self.sessions.len()
    }

    /// Total number of registered connections across all keys.
    pub fn connection_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }
}
