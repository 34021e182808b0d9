//! Quorum Cluster (C6): majority read/write with no distinguished
//! coordinator.

use std::path::Path;
use std::sync::Mutex;

use log::warn;

use crate::error::{Result, StoreError};

use super::{open_nodes, quorum_size, Node};

/// A sentinel standing in for "not found" when voting over observed read
/// values — the spec requires voting over value-or-absence, not just value.
const NOT_FOUND_SENTINEL: &str = "\0__not_found__";

/// A cluster with no coordinator: every write is applied to a majority of
/// up nodes, and every read is served by taking the majority value across
/// up nodes' responses.
pub struct QuorumCluster {
    nodes: Vec<Node>,
    lock: Mutex<()>,
}

impl QuorumCluster {
    /// Open one node per id under `base_dir`.
    pub fn open(base_dir: impl AsRef<Path>, node_ids: &[&str]) -> Result<Self> {
        Ok(QuorumCluster {
            nodes: open_nodes(base_dir, node_ids)?,
            lock: Mutex::new(()),
        })
    }

    fn quorum(&self) -> usize {
        quorum_size(self.nodes.len())
    }

    fn up_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_up()).collect()
    }

    /// Apply `apply` to every up node, stopping as soon as a majority have
    /// succeeded. Fails immediately with `InsufficientNodes` if fewer than
    /// quorum nodes are up before starting, or `QuorumUnreached` if every
    /// up node was tried and a majority never succeeded.
    fn write(&self, apply: impl Fn(&crate::Store) -> Result<()>) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let quorum = self.quorum();
        let up = self.up_nodes();
        if up.len() < quorum {
            return Err(StoreError::InsufficientNodes {
                need: quorum,
                have: up.len(),
            });
        }

        let mut successes = 0;
        for node in &up {
            if successes >= quorum {
                break;
            }
            match node.store_handle() {
                Some(store) => match apply(&store) {
                    Ok(()) => successes += 1,
                    Err(e) => warn!("write to node {} failed: {}", node.id(), e),
                },
                None => warn!("node {} went down mid-operation", node.id()),
            }
        }

        if successes >= quorum {
            Ok(())
        } else {
            Err(StoreError::QuorumUnreached {
                need: quorum,
                got: successes,
            })
        }
    }

    /// `set(k, v)`.
    pub fn set(&self, key: String, value: String) -> Result<()> {
        self.write(|store| store.set(key.clone(), value.clone()))
    }

    /// `bulk_set(items)`.
    pub fn bulk_set(&self, items: Vec<(String, String)>) -> Result<()> {
        self.write(|store| store.bulk_set(items.clone()))
    }

    /// `delete(k)`: returns `true` if any contacted node reported the key
    /// existed.
    pub fn delete(&self, key: String) -> Result<bool> {
        let _guard = self.lock.lock().unwrap();
        let quorum = self.quorum();
        let up = self.up_nodes();
        if up.len() < quorum {
            return Err(StoreError::InsufficientNodes {
                need: quorum,
                have: up.len(),
            });
        }

        let mut successes = 0;
        let mut any_existed = false;
        for node in &up {
            if successes >= quorum {
                break;
            }
            match node.store_handle() {
                Some(store) => match store.delete(&key) {
                    Ok(existed) => {
                        successes += 1;
                        any_existed |= existed;
                    }
                    Err(e) => warn!("delete on node {} failed: {}", node.id(), e),
                },
                None => warn!("node {} went down mid-operation", node.id()),
            }
        }

        if successes >= quorum {
            Ok(any_existed)
        } else {
            Err(StoreError::QuorumUnreached {
                need: quorum,
                got: successes,
            })
        }
    }

    /// `get(k)`: query every up node, and take the majority value over the
    /// observed results (including "not found"), breaking ties by
    /// first-seen order. Fails with `InsufficientNodes` if fewer than
    /// quorum nodes are up, or `QuorumUnreached` if fewer than quorum
    /// responded successfully.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        let quorum = self.quorum();
        let up = self.up_nodes();
        if up.len() < quorum {
            return Err(StoreError::InsufficientNodes {
                need: quorum,
                have: up.len(),
            });
        }

        let mut votes: Vec<String> = Vec::new();
        for node in &up {
            match node.store_handle() {
                Some(store) => match store.get(key) {
                    Ok(value) => votes.push(value.unwrap_or_else(|| NOT_FOUND_SENTINEL.to_string())),
                    Err(e) => warn!("read from node {} failed: {}", node.id(), e),
                },
                None => warn!("node {} went down mid-operation", node.id()),
            }
        }

        if votes.len() < quorum {
            return Err(StoreError::QuorumUnreached {
                need: quorum,
                got: votes.len(),
            });
        }

        Ok(majority_vote(votes).filter(|v| v != NOT_FOUND_SENTINEL))
    }

    /// Stop node `id`.
    pub fn mark_down(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        self.find(id)?.mark_down();
        Ok(())
    }

    /// Restart node `id` against its existing journal.
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

/// First-seen-tie-break majority vote: the value with the most occurrences,
/// ties resolved in favor of whichever value was observed first.
fn majority_vote(votes: Vec<String>) -> Option<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for v in votes {
        if !counts.contains_key(&v) {
            order.push(v.clone());
        }
        *counts.entry(v).or_insert(0) += 1;
    }

    let mut best: Option<(String, usize)> = None;
    for v in order {
        let count = counts[&v];
        let is_better = match &best {
            None => true,
            Some((_, best_count)) => count > *best_count,
        };
        if is_better {
            best = Some((v, count));
        }
    }
    best.map(|(v, _)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let cluster = QuorumCluster::open(dir.path(), &["n1", "n2", "n3"]).unwrap();
        cluster.set("k".to_string(), "v".to_string()).unwrap();
        assert_eq!(cluster.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn one_node_down_still_succeeds() {
        let dir = tempdir().unwrap();
        let cluster = QuorumCluster::open(dir.path(), &["n1", "n2", "n3"]).unwrap();
        cluster.mark_down("n1").unwrap();
        cluster.set("k2".to_string(), "v2".to_string()).unwrap();
        assert_eq!(cluster.get("k2").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn two_nodes_down_fails_with_insufficient_nodes() {
        let dir = tempdir().unwrap();
        let cluster = QuorumCluster::open(dir.path(), &["n1", "n2", "n3"]).unwrap();
        cluster.mark_down("n1").unwrap();
        cluster.mark_down("n2").unwrap();

        match cluster.set("k3".to_string(), "v3".to_string()) {
            Err(StoreError::InsufficientNodes { need: 2, have: 1 }) => {}
            other => panic!("expected InsufficientNodes, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn delete_true_if_any_node_had_the_key() {
        let dir = tempdir().unwrap();
        let cluster = QuorumCluster::open(dir.path(), &["n1", "n2", "n3"]).unwrap();
        cluster.set("k".to_string(), "v".to_string()).unwrap();
        assert!(cluster.delete("k".to_string()).unwrap());
    }

    #[test]
    fn majority_vote_prefers_first_seen_on_tie() {
        let votes = vec!["a".to_string(), "b".to_string()];
        assert_eq!(majority_vote(votes), Some("a".to_string()));
    }

    #[test]
    fn majority_vote_picks_most_common() {
        let votes = vec!["a".to_string(), "b".to_string(), "b".to_string()];
        assert_eq!(majority_vote(votes), Some("b".to_string()));
    }

    #[test]
    fn get_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let cluster = QuorumCluster::open(dir.path(), &["n1", "n2", "n3"]).unwrap();
        assert_eq!(cluster.get("nope").unwrap(), None);
    }
}
