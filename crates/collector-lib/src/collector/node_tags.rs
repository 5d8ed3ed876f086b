//! Process-wide node enrichment tags
//!
//! Node collection writes each node's tags here every tick; pod inventory
//! reads them to tag container specs with their owning node. Writers are
//! never serialized: the last write for a node wins, and a reader that runs
//! before the first write sees the bare `node=<name>` fallback.

use crate::models::{NodeDescriptor, Tag};
use dashmap::DashMap;
use tracing::debug;

/// Concurrent mapping of node name to enrichment tags
#[derive(Debug, Default)]
pub struct NodeTagCache {
    entries: DashMap<String, Vec<Tag>>,
}

impl NodeTagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the tags for a node, replacing any earlier entry
    pub fn insert(&self, node: impl Into<String>, tags: Vec<Tag>) {
        let node = node.into();
        debug!(node = %node, tags = tags.len(), "Caching node tags");
        self.entries.insert(node, tags);
    }

    /// Store the tags derived from a node descriptor
    pub fn insert_node(&self, node: &NodeDescriptor) {
        self.insert(node.name.clone(), node.tags());
    }

    pub fn get(&self, node: &str) -> Option<Vec<Tag>> {
        self.entries.get(node).map(|entry| entry.value().clone())
    }

    /// Cached tags for a node, or a bare node-name tag if none are cached yet
    pub fn tags_for(&self, node: &str) -> Vec<Tag> {
        self.get(node)
            .unwrap_or_else(|| vec![Tag::new("node", node)])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
