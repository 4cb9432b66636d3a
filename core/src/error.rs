//! Misuse errors surfaced by the component model.
//!
//! These all indicate a defect in the calling code and are never produced
//! by ordinary data flow. A validator or setter declining a value is not an
//! error; it is reported through the `bool` returned by `set`.

use alloc::string::String;
use thiserror::Error;

/// Errors raised for incorrect use of the component model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An attribute was registered twice on the same instance.
    #[error("attribute {0:?} has already been added")]
    AttributeAlreadyAdded(String),

    /// An attribute was read or written without being registered first.
    #[error("attribute {0:?} has not been added")]
    AttributeNotFound(String),

    /// An event type was published twice on the same target.
    #[error("event {0:?} has already been published")]
    DuplicateEventDefinition(String),

    /// A method was called that no prototype in the factory chain defines.
    #[error("no method {0:?} on this instance or its factory chain")]
    MethodNotFound(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
