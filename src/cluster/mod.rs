//! Replication layer: two independent ways to fan an operation out across a
//! fixed set of `durakv` nodes, each backed by its own [`crate::Store`] and
//! journal file.
//!
//! [`coordinator::CoordinatorCluster`] picks a single writer per operation
//! and replicates best-effort. [`quorum::QuorumCluster`] requires a majority
//! of nodes to agree, with no distinguished coordinator. Both variants run
//! every node in-process — a deliberate simplification over spawning one OS
//! process per node, since neither cluster's observable failover/divergence
//! behavior depends on process boundaries.

pub mod coordinator;
pub mod quorum;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::Result;
use crate::store::Store;

pub use coordinator::CoordinatorCluster;
pub use quorum::QuorumCluster;

/// One cluster member: a durable store plus an up/down flag. `mark_down`
/// closes the store, simulating a crash-like process stop; `mark_up`
/// reopens it against the same journal, so recovery replays the log exactly
/// as a restarted process would.
pub struct Node {
    id: String,
    path: PathBuf,
    store: Mutex<Option<Store>>,
    up: AtomicBool,
}

impl Node {
    fn open(id: impl Into<String>, path: PathBuf) -> Result<Node> {
        let store = Store::open(&path)?;
        Ok(Node {
            id: id.into(),
            path,
            store: Mutex::new(Some(store)),
            up: AtomicBool::new(true),
        })
    }

    /// The node's id in the cluster's fixed ordering.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this node is currently reachable.
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    fn store_handle(&self) -> Option<Store> {
        if !self.is_up() {
            return None;
        }
        self.store.lock().unwrap().clone()
    }

    fn mark_down(&self) {
        if let Some(store) = self.store.lock().unwrap().take() {
            let _ = store.close();
        }
        self.up.store(false, Ordering::SeqCst);
    }

    fn mark_up(&self) -> Result<()> {
        let store = Store::open(&self.path)?;
        *self.store.lock().unwrap() = Some(store);
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Open one [`Node`] per id in `node_ids`, under `base_dir/<id>/data.log`,
/// preserving the caller's ordering — this ordering is the "fixed node-id
/// ordering" both cluster variants use for coordinator selection.
pub fn open_nodes(base_dir: impl AsRef<Path>, node_ids: &[&str]) -> Result<Vec<Node>> {
    let base_dir = base_dir.as_ref();
    node_ids
        .iter()
        .map(|id| Node::open(*id, base_dir.join(id).join("data.log")))
        .collect()
}

/// `⌊N/2⌋ + 1`.
pub fn quorum_size(n: usize) -> usize {
    n / 2 + 1
}
