//! Error types for annotation operations.

use miette::Diagnostic;

use crate::types::ContainerId;

/// Result alias used throughout the annotation crates.
pub type Result<T, E = AnnotateError> = std::result::Result<T, E>;

/// Main error type for annotation operations.
#[derive(thiserror::Error, Debug, Diagnostic)]
pub enum AnnotateError {
    /// Annotation creation was requested without a current or supplied range.
    #[error("no active selection to annotate")]
    #[diagnostic(
        code(annotate::no_selection),
        help("select some text first or pass an explicit range")
    )]
    NoSelection,

    /// A DOM position is not inside any anchor container.
    #[error("node is not inside an anchor container")]
    #[diagnostic(code(annotate::not_in_container))]
    NotInContainer,

    /// The container referenced by a logical position is not rendered.
    #[error("no container `{0}` in the current view")]
    #[diagnostic(code(annotate::container_not_found))]
    ContainerNotFound(ContainerId),

    /// A logical offset exceeds the counted text of its container.
    #[error("offset {offset} exceeds the text of container `{container}`")]
    #[diagnostic(code(annotate::offset_out_of_range))]
    OffsetOutOfRange { container: ContainerId, offset: usize },

    /// Range boundaries that cannot be wrapped without splitting markup.
    #[error("range boundaries do not share a parent element")]
    #[diagnostic(code(annotate::partial_selection))]
    PartialSelection,

    /// The element is neither a rendered marker nor a structural element.
    #[error("element is not a rendered annotation")]
    #[diagnostic(code(annotate::not_an_annotation))]
    NotAnAnnotation,

    /// A browser/platform call failed.
    #[error("platform error: {0}")]
    #[diagnostic(code(annotate::platform))]
    Platform(String),

    /// Search tokens produced an invalid expression.
    #[error(transparent)]
    Pattern(#[from] regex::Error),

    /// Serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Markup could not be parsed into a tree
    #[error(transparent)]
    Markup(#[from] roxmltree::Error),
}

impl From<&str> for AnnotateError {
    fn from(s: &str) -> Self {
        AnnotateError::Platform(s.to_string())
    }
}

impl From<String> for AnnotateError {
    fn from(s: String) -> Self {
        AnnotateError::Platform(s)
    }
}
