//! Scene graph holding imported objects.
//!
//! The scene is a flat list of object nodes, each owning the
//! [`FileSource`] that feeds it, plus an optional selection used by
//! [`ImportMode::ReplaceSelected`](crate::ImportMode::ReplaceSelected).

use crate::models::{DataCollection, PipelineStatus, TimePoint};
use crate::pipeline::FileSource;
use crate::{Error, Result};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Unique identifier of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Generates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to a scene node.
pub type NodeRef = Arc<ObjectNode>;

/// A scene object whose data comes from a file.
#[derive(Debug)]
pub struct ObjectNode {
    id: NodeId,
    name: String,
    source: FileSource,
}

impl ObjectNode {
    /// Creates a node around a source.
    #[must_use]
    pub fn new(name: impl Into<String>, source: FileSource) -> NodeRef {
        Arc::new(Self {
            id: NodeId::new(),
            name: name.into(),
            source,
        })
    }

    /// Node identifier.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Display name, usually the file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The source feeding this node.
    #[must_use]
    pub const fn source(&self) -> &FileSource {
        &self.source
    }

    /// Blocks until the node's data for `time` is available.
    ///
    /// Returns `Ok(false)` if the wait was canceled.
    ///
    /// # Errors
    ///
    /// With `signal_error`, returns [`Error::ImportFailed`] carrying the
    /// status message if the data was produced with an error status.
    pub fn wait(&self, time: TimePoint, signal_error: bool) -> Result<bool> {
        let reason = format!("Waiting for '{}'", self.name);
        if !self.source.wait_until_ready(time, &reason) {
            return Ok(false);
        }
        if signal_error {
            if let PipelineStatus::Error(message) = self.source.status() {
                return Err(Error::ImportFailed(message));
            }
        }
        Ok(true)
    }

    /// Current data for `time`, without waiting.
    #[must_use]
    pub fn evaluate(&self, time: TimePoint) -> DataCollection {
        self.source.evaluate(time)
    }
}

/// The set of objects in a dataset.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: RwLock<Vec<NodeRef>>,
    selected: RwLock<Option<NodeId>>,
}

impl Scene {
    /// Creates an empty scene.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and selects it.
    pub fn add(&self, node: NodeRef) {
        let id = node.id();
        self.nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(node);
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
        tracing::debug!(node = %id, "Node added to scene");
    }

    /// Removes a node, canceling its load. Returns the removed node.
    pub fn remove(&self, id: NodeId) -> Option<NodeRef> {
        let removed = {
            let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
            let index = nodes.iter().position(|n| n.id() == id)?;
            nodes.remove(index)
        };
        let mut selected = self.selected.write().unwrap_or_else(PoisonError::into_inner);
        if *selected == Some(id) {
            *selected = None;
        }
        removed.source().cancel_load();
        tracing::debug!(node = %id, "Node removed from scene");
        Some(removed)
    }

    /// Removes every node.
    pub fn clear(&self) {
        let removed =
            std::mem::take(&mut *self.nodes.write().unwrap_or_else(PoisonError::into_inner));
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = None;
        for node in &removed {
            node.source().cancel_load();
        }
    }

    /// Returns true if the scene contains the node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Looks up a node.
    #[must_use]
    pub fn find(&self, id: NodeId) -> Option<NodeRef> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|n| n.id() == id)
            .cloned()
    }

    /// All nodes, in insertion order.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if the scene has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The selected node, if it is still in the scene.
    #[must_use]
    pub fn selected_node(&self) -> Option<NodeRef> {
        let id = (*self.selected.read().unwrap_or_else(PoisonError::into_inner))?;
        self.find(id)
    }

    /// Selects a node; unknown ids clear the selection.
    pub fn select(&self, id: Option<NodeId>) {
        let id = id.filter(|id| self.contains(*id));
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataSet;
    use crate::pipeline::FileSource;

    fn node(dataset: &DataSet, name: &str) -> NodeRef {
        ObjectNode::new(name, FileSource::new(dataset.source_context()))
    }

    #[test]
    fn test_add_selects_node() {
        let dataset = DataSet::new().unwrap();
        let scene = Scene::new();
        let a = node(&dataset, "a");
        let b = node(&dataset, "b");
        scene.add(Arc::clone(&a));
        scene.add(Arc::clone(&b));
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.selected_node().unwrap().id(), b.id());
    }

    #[test]
    fn test_remove_clears_selection() {
        let dataset = DataSet::new().unwrap();
        let scene = Scene::new();
        let a = node(&dataset, "a");
        scene.add(Arc::clone(&a));
        assert!(scene.remove(a.id()).is_some());
        assert!(scene.selected_node().is_none());
        assert!(scene.is_empty());
        assert!(scene.remove(a.id()).is_none());
    }

    #[test]
    fn test_unloaded_node_wait_succeeds() {
        let dataset = DataSet::new().unwrap();
        let a = node(&dataset, "a");
        assert!(a.wait(0, true).unwrap());
        assert_eq!(a.evaluate(0).particle_count(), 0);
    }

    #[test]
    fn test_select_unknown_clears() {
        let dataset = DataSet::new().unwrap();
        let scene = Scene::new();
        scene.add(node(&dataset, "a"));
        scene.select(Some(NodeId::new()));
        assert!(scene.selected_node().is_none());
    }
}
