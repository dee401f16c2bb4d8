//! Pad references for element inputs and outputs.
//!
//! A pad is a named, typed attachment point on an element: output pads
//! expose a buffer stream, input pads expose a handler. Most elements only
//! have the default pad in each direction; elements with several pads name
//! the extras with [`PadRef::Custom`].

use std::fmt;

/// Identifies one pad on an element.
///
/// Unique per element per direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PadRef {
    /// The element's default input pad.
    InputDefault,
    /// The element's default output pad.
    OutputDefault,
    /// A named pad, for elements with more than one per direction.
    Custom(String),
}

impl PadRef {
    /// Create a custom pad reference.
    pub fn custom(id: impl Into<String>) -> Self {
        Self::Custom(id.into())
    }

    /// Check whether this is a custom (named) pad.
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InputDefault => f.write_str("in"),
            Self::OutputDefault => f.write_str("out"),
            Self::Custom(id) => f.write_str(id),
        }
    }
}
