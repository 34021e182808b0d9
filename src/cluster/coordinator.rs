//! Coordinator Cluster (C5): single-writer-with-best-effort-replication.

use std::path::Path;
use std::sync::Mutex;

use log::warn;

use crate::error::{Result, StoreError};

use super::{open_nodes, Node};

/// A cluster that picks one coordinator per operation (the first node in
/// the fixed ordering that is currently up) and replicates writes to the
/// remaining up nodes best-effort. A single cluster-wide lock serializes
/// every operation, including the replication fan-out.
pub struct CoordinatorCluster {
    nodes: Vec<Node>,
    lock: Mutex<()>,
}

impl CoordinatorCluster {
    /// Open one node per id under `base_dir`, in the given order. That
    /// order is the coordinator-selection order for the cluster's lifetime.
    pub fn open(base_dir: impl AsRef<Path>, node_ids: &[&str]) -> Result<Self> {
        Ok(CoordinatorCluster {
            nodes: open_nodes(base_dir, node_ids)?,
            lock: Mutex::new(()),
        })
    }

    /// The id of the node that would currently serve as coordinator.
    pub fn coordinator_id(&self) -> Result<String> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.coordinator()?.id().to_string())
    }

    fn coordinator(&self) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.is_up())
            .ok_or(StoreError::NoAvailableNode)
    }

    /// Apply on the coordinator, then best-effort replicate to the other up
    /// nodes in order. A peer failure is logged and swallowed: it will
    /// diverge from the coordinator until an operator intervenes.
    fn write(&self, apply: impl Fn(&crate::Store) -> Result<()>) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let coordinator = self.coordinator()?;
        let coordinator_id = coordinator.id().to_string();
        let coordinator_store = coordinator
            .store_handle()
            .ok_or(StoreError::NoAvailableNode)?;
        apply(&coordinator_store)?;

        for node in self.nodes.iter().filter(|n| n.is_up() && n.id() != coordinator_id) {
            if let Some(store) = node.store_handle() {
                if let Err(e) = apply(&store) {
                    warn!("replication to node {} failed: {}", node.id(), e);
                }
            }
        }
        Ok(())
    }

    /// `set(k, v)` on the coordinator, replicated best-effort.
    pub fn set(&self, key: String, value: String) -> Result<()> {
        self.write(|store| store.set(key.clone(), value.clone()))
    }

    /// `delete(k)` on the coordinator, replicated best-effort. Returns
    /// whether the key existed on the coordinator.
    pub fn delete(&self, key: String) -> Result<bool> {
        let _guard = self.lock.lock().unwrap();
        let coordinator = self.coordinator()?;
        let coordinator_id = coordinator.id().to_string();
        let coordinator_store = coordinator
            .store_handle()
            .ok_or(StoreError::NoAvailableNode)?;
        let existed = coordinator_store.delete(&key)?;

        for node in self.nodes.iter().filter(|n| n.is_up() && n.id() != coordinator_id) {
            if let Some(store) = node.store_handle() {
                if let Err(e) = store.delete(&key) {
                    warn!("replication to node {} failed: {}", node.id(), e);
                }
            }
        }
        Ok(existed)
    }

    /// `bulk_set(items)` on the coordinator, replicated best-effort.
    pub fn bulk_set(&self, items: Vec<(String, String)>) -> Result<()> {
        self.write(|store| store.bulk_set(items.clone()))
    }

    /// `get(k)` served from the coordinator only.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        let coordinator = self.coordinator()?;
        let store = coordinator
            .store_handle()
            .ok_or(StoreError::NoAvailableNode)?;
        store.get(key)
    }

    /// Stop node `id` (crash-like termination of its store).
    pub fn mark_down(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        self.find(id)?.mark_down();
        Ok(())
    }

    /// Restart node `id` against its existing journal; recovery replays it.
    pub fn mark_up(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        self.find(id)?.mark_up()
    }

    fn find(&self, id: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id() == id)
            .ok_or_else(|| StoreError::StringError(format!("no such node: {}", id)))
    }
}
