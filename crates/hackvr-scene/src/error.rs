//! Scene command errors.
//!
//! All of these are optimistic-regime errors: the offending command instance
//! is dropped (never partially applied) and the stream continues. Callers log
//! them and move on.

use std::fmt;

/// Why a scene command was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneError {
    /// A referenced object, geometry, or intent does not exist.
    MissingEntity(&'static str),
    /// Create targeting an identifier that already exists.
    DuplicateCreate,
    /// A reserved identifier used where it is not allowed (e.g. creating or
    /// destroying `$global`).
    ForbiddenIdentifier,
    /// A geometry operation that does not fit the geometry's variant.
    VariantMismatch,
    /// An implementation limit was exceeded.
    LimitExceeded(&'static str),
    /// Selector expansion exceeded the soft cap.
    SelectorOverCap,
    /// A negative transition or blend duration.
    InvalidDuration,
    /// A reparent that would make an object its own ancestor.
    CycleRejected,
    /// `$global` may not be reparented.
    UnreparentableRoot,
    /// An unknown object or text property name.
    UnknownProperty,
    /// A property value that does not parse for its property.
    BadPropertyValue,
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::MissingEntity(kind) => write!(f, "missing {kind}"),
            SceneError::DuplicateCreate => write!(f, "duplicate create"),
            SceneError::ForbiddenIdentifier => write!(f, "forbidden identifier"),
            SceneError::VariantMismatch => write!(f, "geometry variant mismatch"),
            SceneError::LimitExceeded(what) => write!(f, "{what} limit exceeded"),
            SceneError::SelectorOverCap => write!(f, "selector expansion over cap"),
            SceneError::InvalidDuration => write!(f, "negative duration"),
            SceneError::CycleRejected => write!(f, "reparent would form a cycle"),
            SceneError::UnreparentableRoot => write!(f, "$global cannot be reparented"),
            SceneError::UnknownProperty => write!(f, "unknown property"),
            SceneError::BadPropertyValue => write!(f, "bad property value"),
        }
    }
}

impl std::error::Error for SceneError {}
