//! Errors shared by every omnivec crate.
//!
//! Every failure in the block and operator layer is local and synchronous: the
//! offending call returns an [`Error`] and nothing is retried. [`Error::kind`]
//! groups the variants into the coarse categories the host engine reacts to
//! (abort the fragment, spill, report a driver bug).

use thiserror::Error;

/// Result alias used throughout omnivec.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by blocks, vectors, pages and operators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A caller passed an argument that violates the contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A position, region or index range falls outside its container.
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// A required argument was absent.
    #[error("{0} is null")]
    NullArgument(&'static str),

    /// The call is not allowed in the current lifecycle state.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A memory reservation or native allocation could not be satisfied.
    #[error(
        "memory exhausted in context '{context}': requested {requested} bytes, \
         reserved {reserved} of {limit} bytes"
    )]
    ResourceExhausted {
        /// Name of the memory context that rejected the reservation.
        context: String,
        /// Bytes requested.
        requested: usize,
        /// Bytes already reserved when the request was made.
        reserved: usize,
        /// Limit of the rejecting context.
        limit: usize,
    },

    /// A vector was accessed after its buffer was released.
    #[error("{0} used after release")]
    UseAfterRelease(&'static str),

    /// The operation is not supported by this block or runtime.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// Coarse error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Contract violation by the caller (bad position, offset, length, shape).
    InvalidArgument,
    /// A null input where a value is required.
    NullArgument,
    /// Call made in the wrong lifecycle state.
    IllegalState,
    /// Memory budget or native allocator exhausted.
    ResourceExhaustion,
    /// Access to a released vector.
    UseAfterRelease,
    /// The operation is not implemented for this type.
    Unsupported,
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) | Error::OutOfRange(_) => ErrorKind::InvalidArgument,
            Error::NullArgument(_) => ErrorKind::NullArgument,
            Error::IllegalState(_) => ErrorKind::IllegalState,
            Error::ResourceExhausted { .. } => ErrorKind::ResourceExhaustion,
            Error::UseAfterRelease(_) => ErrorKind::UseAfterRelease,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Shorthand for [`Error::OutOfRange`].
    pub fn out_of_range(msg: impl Into<String>) -> Self {
        Error::OutOfRange(msg.into())
    }

    /// Shorthand for [`Error::IllegalState`].
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    /// Shorthand for [`Error::Unsupported`].
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }
}

/// Fails with [`Error::OutOfRange`] unless `position < position_count`.
pub fn check_readable_position(position: usize, position_count: usize) -> Result<()> {
    if position >= position_count {
        return Err(Error::out_of_range(format!(
            "position {position} is not valid for {position_count} positions"
        )));
    }
    Ok(())
}

/// Fails with [`Error::OutOfRange`] unless `[offset, offset + length)` lies
/// within `[0, position_count)`.
pub fn check_valid_region(position_count: usize, offset: usize, length: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= position_count => Ok(()),
        _ => Err(Error::out_of_range(format!(
            "invalid region: offset {offset}, length {length} for {position_count} positions"
        ))),
    }
}

/// Fails with [`Error::OutOfRange`] unless `[offset, offset + length)` lies
/// within an array of `array_len` elements.
pub fn check_array_range(array_len: usize, offset: usize, length: usize) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= array_len => Ok(()),
        _ => Err(Error::out_of_range(format!(
            "invalid array range: offset {offset}, length {length} for array of {array_len}"
        ))),
    }
}
