//! Error types for Sluice.

use thiserror::Error;

/// Result type alias using Sluice's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Sluice operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Two owning schema entries share the same element id.
    #[error("duplicate element id '{0}' in schema")]
    DuplicateId(String),

    /// A schema reference names an element that owns no entry anywhere.
    #[error("reference to unknown element id '{0}'")]
    UnknownRef(String),

    /// An element was used where its kind is not allowed, or a reference
    /// resolved to an element of a different kind.
    #[error("element '{id}' is a {actual}, expected {expected}")]
    KindMismatch {
        /// Element id.
        id: String,
        /// What the schema position requires.
        expected: String,
        /// What the element actually is.
        actual: String,
    },

    /// A chosen pad does not exist on the element.
    #[error("element '{element}' has no pad '{pad}'")]
    PadNotFound {
        /// Element id.
        element: String,
        /// The missing pad.
        pad: String,
    },

    /// Source and sink pads of an edge carry different buffer types.
    #[error("buffer type mismatch on edge {edge}: source produces {source_ty}, sink accepts {sink}")]
    PadTypeMismatch {
        /// Edge identity.
        edge: String,
        /// Buffer type produced by the source pad.
        source_ty: String,
        /// Buffer type accepted by the sink pad.
        sink: String,
    },

    /// A NAL unit is too short or its declared length overruns the frame.
    #[error("invalid NAL unit: {0}")]
    InvalidNal(String),

    /// A fragmentation unit arrived without a start fragment, or a frame
    /// boundary was crossed before the end fragment.
    #[error("malformed fragmentation unit: {0}")]
    MalformedFu(String),

    /// The hvcC decoder configuration record failed to parse.
    #[error("invalid decoder configuration record: {0}")]
    InvalidConfigRecord(String),

    /// A network send or socket operation failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Element-specific processing error.
    #[error("element error: {0}")]
    Element(String),
}
