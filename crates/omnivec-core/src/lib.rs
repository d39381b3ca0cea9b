//! # omnivec-core
//!
//! Off-heap columnar data and the vectorized operator protocol.
//!
//! Column data lives in native vectors charged to a
//! [`MemoryContext`](omnivec_common::memory::MemoryContext). Blocks are
//! immutable, position-addressed views over one vector; a page is a set of
//! equally long blocks. Operators consume and produce pages, and hand the
//! heavy lifting to a native runtime behind a trait boundary.
//!
//! ## Modules
//!
//! - [`vector`] - Native vectors with explicit ownership and release
//! - [`block`] - Typed blocks over vectors, plus builders
//! - [`page`] - Pages and their conversion to runtime batches
//! - [`filter`] - Bloom filter over column values
//! - [`runtime`] - The native operator boundary and the aggregation runtime
//! - [`operator`] - The push-style operator protocol
//! - [`config`] / [`context`] - Execution configuration and task state

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod config;
pub mod context;
pub mod filter;
pub mod operator;
pub mod page;
pub mod runtime;
pub mod vector;

// Re-export commonly used types
pub use block::{Block, BlockBuilder, VectorBlockBuilder};
pub use config::{ConfigError, ExecutionConfig};
pub use context::{OperatorContext, TaskContext};
pub use operator::{AggregationOperatorFactory, Operator, OperatorFactory};
pub use page::Page;
pub use runtime::{NativeOperator, NativeOperatorFactory, VecBatch};
pub use vector::{AnyVector, NativeVector};
