//! Inbound commands and outbound notifications.
//!
//! The annotator never talks to an editing UI directly. Hosts feed it
//! [`Command`]s and drain [`AnnotationEvent`]s after each call.

use crate::dom::DomRange;
use crate::types::{AnnotationData, AnnotationRecord, Properties};

/// Notification produced by the annotator.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationEvent<N> {
    SelectionChanged {
        has_content: bool,
        range: Option<DomRange<N>>,
    },
    /// Fired after every list mutation with the full current list.
    AnnotationsChanged {
        kind: Option<String>,
        text: Option<String>,
        ranges: Vec<AnnotationRecord>,
    },
    /// The host should fill `container` with details about the annotation.
    DetailRequested {
        kind: Option<String>,
        key: Option<serde_json::Value>,
        container: N,
        marker: N,
    },
    /// The host should open an editor for the annotation.
    EditRequested { data: AnnotationData, marker: N },
}

impl<N> AnnotationEvent<N> {
    /// DOM event name used by the browser surface.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationEvent::SelectionChanged { .. } => "pb-selection-changed",
            AnnotationEvent::AnnotationsChanged { .. } => "pb-annotations-changed",
            AnnotationEvent::DetailRequested { .. } => "pb-annotation-detail",
            AnnotationEvent::EditRequested { .. } => "pb-annotation-edit",
        }
    }
}

/// Payload of an "add annotation" request.
#[derive(Clone, Debug, PartialEq)]
pub struct AddAnnotation<N> {
    /// Explicit range; the current selection is used when absent.
    pub range: Option<DomRange<N>>,
    pub kind: Option<String>,
    pub properties: Option<Properties>,
}

impl<N> Default for AddAnnotation<N> {
    fn default() -> Self {
        Self {
            range: None,
            kind: None,
            properties: None,
        }
    }
}

impl<N> AddAnnotation<N> {
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, range: DomRange<N>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = Some(properties);
        self
    }
}

/// Request from the host.
#[derive(Clone, Debug, PartialEq)]
pub enum Command<N> {
    /// Forget every annotation, marker and the current selection.
    Refresh,
    AddAnnotation(AddAnnotation<N>),
    EditAnnotation { marker: N, properties: Properties },
}

/// DOM event names the browser surface listens for.
pub const REFRESH_EVENT: &str = "pb-refresh";
pub const ADD_ANNOTATION_EVENT: &str = "pb-add-annotation";
pub const EDIT_ANNOTATION_EVENT: &str = "pb-edit-annotation";
