//! weaver-annotate-core: text annotation overlay logic without browser
//! dependencies.
//!
//! This crate provides:
//! - `DomTree` trait for DOM access, with `MemoryDom` as an in-memory tree
//! - `OffsetMapper` - conversion between DOM points and logical offsets
//! - `SelectionTracker` - debounced selection notices over a `Scheduler`
//! - `Annotator<D, L>` - annotation list, rendering, markers, popups and
//!   search, generic over the tree and a `LayoutPlatform`

pub mod annotator;
pub mod config;
pub mod dom;
pub mod error;
pub mod events;
pub mod layout;
pub mod markers;
pub mod memory;
pub mod offset_map;
pub mod search;
pub mod selection;
pub mod store;
pub mod types;

pub use annotator::Annotator;
pub use config::AnnotatorConfig;
pub use dom::{DomPoint, DomRange, DomTree, NodeKind};
pub use error::{AnnotateError, Result};
pub use events::{
    ADD_ANNOTATION_EVENT, AddAnnotation, AnnotationEvent, Command, EDIT_ANNOTATION_EVENT,
    REFRESH_EVENT,
};
pub use layout::{GridLayout, LayoutPlatform, Rect};
pub use markers::{MarkerBar, Popup, PopupAction};
pub use memory::{MemoryDom, NodeHandle};
pub use offset_map::{BoundaryPolicy, OffsetMapper, SkipRule};
pub use search::SearchMatch;
pub use selection::{
    LiveSelection, ManualScheduler, Scheduler, SelectionNotice, SelectionTracker, TimerToken,
    TrackerInput, TrackerOutput, TrackerState,
};
pub use smol_str::SmolStr;
pub use store::AnnotationStore;
pub use types::{
    AnnotationData, AnnotationRange, AnnotationRecord, ContainerId, DeleteRecord, LogicalPosition,
    MarkerId, ModifyRecord, Properties, RecordId, StructuralId,
};
