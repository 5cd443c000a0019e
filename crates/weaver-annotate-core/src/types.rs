//! Serializable annotation records and identifiers.
//!
//! These are the units exchanged with the outside world: the annotation list
//! is a JSON array of [`AnnotationRecord`]s, and every rendered marker carries
//! an [`AnnotationData`] object in its `data-annotation` attribute.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifier of an anchor container in the logical document (the value of
/// its container attribute, e.g. `data-tei`).
pub type ContainerId = SmolStr;

/// Stable identifier of a pre-rendered structural element.
pub type StructuralId = SmolStr;

/// Free-form annotation properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// A position measured in characters from the start of a container's
/// counted text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicalPosition {
    pub container: ContainerId,
    pub offset: usize,
}

impl LogicalPosition {
    pub fn new(container: impl Into<ContainerId>, offset: usize) -> Self {
        Self {
            container: container.into(),
            offset,
        }
    }
}

/// A user annotation over a span of text inside one container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRange {
    pub context: ContainerId,
    pub start: usize,
    pub end: usize,
    pub text: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl AnnotationRange {
    /// Data serialized onto the marker element for this range.
    pub fn data(&self) -> AnnotationData {
        AnnotationData {
            kind: self.kind.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteTag {
    #[default]
    #[serde(rename = "delete")]
    Delete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyTag {
    #[default]
    #[serde(rename = "modify")]
    Modify,
}

/// Marks a pre-rendered structural element for removal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteRecord {
    #[serde(rename = "type")]
    pub tag: DeleteTag,
    pub node: StructuralId,
    pub context: ContainerId,
}

/// In-place property update of a pre-rendered structural element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifyRecord {
    #[serde(rename = "type")]
    pub tag: ModifyTag,
    pub node: StructuralId,
    pub context: ContainerId,
    #[serde(default)]
    pub properties: Properties,
}

/// One entry of the annotation list.
///
/// Delete and modify records are recognised by their `type` tag and a `node`
/// field; everything else is a range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationRecord {
    Delete(DeleteRecord),
    Modify(ModifyRecord),
    Range(AnnotationRange),
}

impl AnnotationRecord {
    pub fn delete(node: impl Into<StructuralId>, context: impl Into<ContainerId>) -> Self {
        AnnotationRecord::Delete(DeleteRecord {
            tag: DeleteTag::Delete,
            node: node.into(),
            context: context.into(),
        })
    }

    pub fn modify(
        node: impl Into<StructuralId>,
        context: impl Into<ContainerId>,
        properties: Properties,
    ) -> Self {
        AnnotationRecord::Modify(ModifyRecord {
            tag: ModifyTag::Modify,
            node: node.into(),
            context: context.into(),
            properties,
        })
    }

    pub fn as_range(&self) -> Option<&AnnotationRange> {
        match self {
            AnnotationRecord::Range(range) => Some(range),
            _ => None,
        }
    }

    /// Structural node targeted by a delete or modify record.
    pub fn structural_node(&self) -> Option<&StructuralId> {
        match self {
            AnnotationRecord::Delete(r) => Some(&r.node),
            AnnotationRecord::Modify(r) => Some(&r.node),
            AnnotationRecord::Range(_) => None,
        }
    }

    pub fn is_delete_of(&self, node: &str) -> bool {
        matches!(self, AnnotationRecord::Delete(r) if r.node == node)
    }

    pub fn is_modify_of(&self, node: &str) -> bool {
        matches!(self, AnnotationRecord::Modify(r) if r.node == node)
    }
}

impl From<AnnotationRange> for AnnotationRecord {
    fn from(range: AnnotationRange) -> Self {
        AnnotationRecord::Range(range)
    }
}

/// The `{ type, properties }` object stored in a marker's `data-annotation`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationData {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

impl AnnotationData {
    /// Parse span data. Absent or malformed JSON means no data.
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        match serde_json::from_str(raw) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(target: "weaver::annotate", error = %e, "ignoring malformed annotation data");
                None
            }
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of strings and JSON maps always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Look up a property by name.
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.as_ref()?.get(key)
    }
}

/// Identifier stamped on a rendered marker element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

impl MarkerId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok().map(MarkerId)
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal identity of a record in the store. Not serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_list_deserializes_by_shape() {
        let list: Vec<AnnotationRecord> = serde_json::from_value(json!([
            { "context": "p1", "start": 4, "end": 9, "text": "quick", "type": "hi" },
            { "type": "delete", "node": "n7", "context": "p1" },
            { "type": "modify", "node": "n8", "context": "p2", "properties": { "ref": "x" } },
        ]))
        .unwrap();

        assert!(matches!(&list[0], AnnotationRecord::Range(r) if r.kind.as_deref() == Some("hi")));
        assert!(list[1].is_delete_of("n7"));
        assert!(list[2].is_modify_of("n8"));
    }

    #[test]
    fn test_range_with_delete_type_but_no_node_stays_a_range() {
        let record: AnnotationRecord = serde_json::from_value(json!({
            "context": "p1", "start": 0, "end": 1, "text": "a", "type": "delete"
        }))
        .unwrap();
        assert!(record.as_range().is_some());
    }

    #[test]
    fn test_range_serialization_omits_missing_fields() {
        let range = AnnotationRange {
            context: "p1".into(),
            start: 1,
            end: 3,
            text: "bc".into(),
            kind: None,
            properties: None,
        };
        let value = serde_json::to_value(AnnotationRecord::from(range)).unwrap();
        assert_eq!(value, json!({ "context": "p1", "start": 1, "end": 3, "text": "bc" }));
    }

    #[test]
    fn test_annotation_data_parse() {
        let data = AnnotationData::parse(Some(r#"{"type":"person","properties":{"ref":"p-1"}}"#))
            .unwrap();
        assert_eq!(data.kind.as_deref(), Some("person"));
        assert_eq!(data.property("ref"), Some(&json!("p-1")));

        assert!(AnnotationData::parse(None).is_none());
        assert!(AnnotationData::parse(Some("{not json")).is_none());
        assert_eq!(AnnotationData::default().to_json(), "{}");
    }
}
