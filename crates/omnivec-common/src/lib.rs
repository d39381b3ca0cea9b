//! # omnivec-common
//!
//! Shared foundation for omnivec: the error taxonomy, column types and
//! values, hash collection aliases, and native memory accounting.
//!
//! ## Modules
//!
//! - [`error`] - [`Error`], [`ErrorKind`] and the crate-wide [`Result`]
//! - [`types`] - [`DataType`](types::DataType) and [`Value`](types::Value)
//! - [`memory`] - [`MemoryContext`](memory::MemoryContext) and
//!   [`VecAllocator`](memory::VecAllocator)
//! - [`collections`] - FxHash map alias

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collections;
pub mod error;
pub mod memory;
pub mod types;

pub use error::{Error, ErrorKind, Result};
