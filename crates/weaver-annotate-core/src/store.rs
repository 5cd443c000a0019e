//! The annotation list and its marker index.

use std::collections::HashMap;

use crate::types::{
    AnnotationRecord, ContainerId, MarkerId, ModifyRecord, Properties, RecordId, StructuralId,
};

/// Ordered annotation records plus the reverse index from rendered markers.
///
/// Records keep insertion order, which is the order they are serialized and
/// replayed in. Each record gets a [`RecordId`] that stays stable while other
/// records come and go. Markers are indexed by the [`MarkerId`] stamped on
/// the marker element, so the index never keeps a DOM node alive.
#[derive(Clone, Debug, Default)]
pub struct AnnotationStore {
    records: Vec<(RecordId, AnnotationRecord)>,
    markers: HashMap<MarkerId, RecordId>,
    next_record: u64,
    next_marker: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record and return its id.
    pub fn push(&mut self, record: AnnotationRecord) -> RecordId {
        let id = RecordId(self.next_record);
        self.next_record += 1;
        self.records.push((id, record));
        id
    }

    pub fn get(&self, id: RecordId) -> Option<&AnnotationRecord> {
        self.records
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, r)| r)
    }

    /// Remove a record along with every marker bound to it.
    pub fn remove(&mut self, id: RecordId) -> Option<AnnotationRecord> {
        let index = self.records.iter().position(|(rid, _)| *rid == id)?;
        self.markers.retain(|_, rid| *rid != id);
        Some(self.records.remove(index).1)
    }

    pub fn records(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.iter().map(|(_, r)| r)
    }

    /// Records with their ids, in list order.
    pub fn entries(&self) -> impl Iterator<Item = (RecordId, &AnnotationRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    /// Snapshot of the list for serialization.
    pub fn to_list(&self) -> Vec<AnnotationRecord> {
        self.records().cloned().collect()
    }

    /// Replace the whole list. Marker bindings are dropped.
    pub fn replace_all(&mut self, list: impl IntoIterator<Item = AnnotationRecord>) {
        self.clear();
        for record in list {
            self.push(record);
        }
    }

    /// Drop every record and marker binding.
    pub fn clear(&mut self) {
        self.records.clear();
        self.markers.clear();
    }

    /// Allocate a fresh marker id.
    pub fn next_marker_id(&mut self) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        id
    }

    pub fn bind_marker(&mut self, marker: MarkerId, record: RecordId) {
        self.markers.insert(marker, record);
    }

    pub fn record_for_marker(&self, marker: MarkerId) -> Option<RecordId> {
        self.markers.get(&marker).copied()
    }

    pub fn unbind_marker(&mut self, marker: MarkerId) -> Option<RecordId> {
        self.markers.remove(&marker)
    }

    /// Remove all marker bindings, returning the ids that were bound.
    pub fn clear_markers(&mut self) -> Vec<MarkerId> {
        let mut ids: Vec<_> = self.markers.drain().map(|(m, _)| m).collect();
        ids.sort();
        ids
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    fn modify_record_mut(&mut self, node: &str) -> Option<&mut ModifyRecord> {
        self.records.iter_mut().find_map(|(_, r)| match r {
            AnnotationRecord::Modify(m) if m.node == node => Some(m),
            _ => None,
        })
    }

    /// Set the properties of the modify record for `node`, creating it if
    /// the list has none.
    pub fn upsert_modify(&mut self, node: StructuralId, context: ContainerId, properties: Properties) {
        if let Some(record) = self.modify_record_mut(&node) {
            record.properties = properties;
            return;
        }
        self.push(AnnotationRecord::modify(node, context, properties));
    }

    /// Record the deletion of a structural element.
    ///
    /// A pending modify record for the same node is dropped; a second delete
    /// of the same node is not recorded twice.
    pub fn record_delete(&mut self, node: StructuralId, context: ContainerId) {
        if let Some(index) = self.records.iter().position(|(_, r)| r.is_modify_of(&node)) {
            self.records.remove(index);
        }
        if !self.records.iter().any(|(_, r)| r.is_delete_of(&node)) {
            self.push(AnnotationRecord::delete(node, context));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnnotationRange;
    use serde_json::json;

    fn range(start: usize, end: usize) -> AnnotationRecord {
        AnnotationRecord::Range(AnnotationRange {
            context: "p1".into(),
            start,
            end,
            text: String::new(),
            kind: Some("hi".into()),
            properties: None,
        })
    }

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_delete_replaces_pending_modify() {
        let mut store = AnnotationStore::new();
        store.push(range(0, 2));
        store.upsert_modify("n1".into(), "p1".into(), props(json!({ "ref": "a" })));
        store.upsert_modify("n1".into(), "p1".into(), props(json!({ "ref": "b" })));
        assert_eq!(store.len(), 2);

        store.record_delete("n1".into(), "p1".into());
        store.record_delete("n1".into(), "p1".into());

        let nodes: Vec<&str> = store
            .records()
            .filter_map(|r| r.structural_node())
            .map(|n| n.as_str())
            .collect();
        assert_eq!(nodes, vec!["n1"]);
        assert!(store.records().any(|r| r.is_delete_of("n1")));
        assert!(!store.records().any(|r| r.is_modify_of("n1")));
    }

    #[test]
    fn test_upsert_modify_updates_in_place() {
        let mut store = AnnotationStore::new();
        store.upsert_modify("n1".into(), "p1".into(), props(json!({ "ref": "a" })));
        store.push(range(0, 1));
        store.upsert_modify("n1".into(), "p1".into(), props(json!({ "ref": "b" })));

        let list = serde_json::to_value(store.to_list()).unwrap();
        assert_eq!(list[0], json!({ "type": "modify", "node": "n1", "context": "p1", "properties": { "ref": "b" } }));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_marker_index_follows_records() {
        let mut store = AnnotationStore::new();
        let first = store.push(range(0, 1));
        let second = store.push(range(2, 3));
        let m1 = store.next_marker_id();
        let m2 = store.next_marker_id();
        store.bind_marker(m1, first);
        store.bind_marker(m2, second);

        assert_eq!(store.record_for_marker(m2), Some(second));
        store.remove(second);
        assert_eq!(store.record_for_marker(m2), None);
        assert_eq!(store.marker_count(), 1);

        assert_eq!(store.clear_markers(), vec![m1]);
        assert_eq!(store.len(), 1);
        assert_ne!(m1, store.next_marker_id());
    }
}
