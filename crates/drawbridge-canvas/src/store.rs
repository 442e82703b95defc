//! Canvas state store.

use chrono::{DateTime, Utc};
use serde_json::Value;

use drawbridge_core::DrawableElement;

/// The canonical ordered sequence of elements.
///
/// Order is insertion/replacement order. Ids are not deduplicated on append.
#[derive(Debug, Clone)]
pub struct CanvasStore {
    elements: Vec<DrawableElement>,
    revision: u64,
    last_updated: DateTime<Utc>,
}

impl Default for CanvasStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasStore {
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            revision: 0,
            last_updated: Utc::now(),
        }
    }

    /// Seed a store from already-validated elements (e.g. a persisted snapshot).
    pub fn with_elements(elements: Vec<DrawableElement>) -> Self {
        Self {
            elements,
            ..Self::new()
        }
    }

    /// Copy of the current sequence.
    pub fn snapshot(&self) -> Vec<DrawableElement> {
        self.elements.clone()
    }

    /// Replace the whole canvas with the well-formed subset of `incoming`.
    ///
    /// Returns the elements that were stored.
    pub fn replace_all(&mut self, incoming: Vec<Value>) -> &[DrawableElement] {
        self.elements = DrawableElement::filter_valid(incoming);
        self.touch();
        &self.elements
    }

    /// Append the well-formed subset of `incoming`.
    ///
    /// Returns the newly appended elements.
    pub fn append(&mut self, incoming: Vec<Value>) -> &[DrawableElement] {
        let start = self.elements.len();
        self.elements.extend(DrawableElement::filter_valid(incoming));
        self.touch();
        &self.elements[start..]
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.touch();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    fn touch(&mut self) {
        self.revision += 1;
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn el(id: &str) -> Value {
        json!({"id": id, "type": "rectangle", "x": 1, "y": 2})
    }

    fn ids(store: &CanvasStore) -> Vec<String> {
        store.snapshot().iter().map(|e| e.id().to_string()).collect()
    }

    #[test]
    fn test_replace_all_round_trip() {
        let mut store = CanvasStore::new();
        let batch = vec![el("a"), el("b"), el("c")];
        store.replace_all(batch.clone());
        let snapshot: Vec<Value> = store
            .snapshot()
            .into_iter()
            .map(Value::from)
            .collect();
        assert_eq!(snapshot, batch);
    }

    #[test]
    fn test_replace_all_drops_malformed_in_order() {
        let mut store = CanvasStore::new();
        store.replace_all(vec![el("a"), json!({"id": "bad"}), el("b"), json!(7), el("c")]);
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace_all_overwrites_previous() {
        let mut store = CanvasStore::new();
        store.replace_all(vec![el("a"), el("b")]);
        store.replace_all(vec![el("z")]);
        assert_eq!(ids(&store), vec!["z"]);
    }

    #[test]
    fn test_append_concatenates() {
        let mut store = CanvasStore::new();
        let added = store.append(vec![el("a"), el("b")]).len();
        assert_eq!(added, 2);
        let added: Vec<_> = store
            .append(vec![el("c"), json!({"type": "text"})])
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(added, vec!["c"]);
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_append_keeps_duplicate_ids() {
        let mut store = CanvasStore::new();
        store.append(vec![el("x")]);
        store.append(vec![el("x")]);
        assert_eq!(ids(&store), vec!["x", "x"]);
    }

    #[test]
    fn test_clear_always_empties() {
        let mut store = CanvasStore::new();
        store.clear();
        assert!(store.is_empty());
        store.append(vec![el("a")]);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.revision(), 3);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut store = CanvasStore::new();
        store.append(vec![el("a")]);
        let snapshot = store.snapshot();
        store.clear();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(store.len(), 0);
    }
}
