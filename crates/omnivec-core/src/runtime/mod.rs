//! The native operator boundary.
//!
//! Operators hand whole columns to a native runtime as a [`VecBatch`] and get
//! batches back. Everything the runtime computes sits behind the
//! [`NativeOperatorFactory`] / [`NativeOperator`] traits, so a foreign runtime
//! can be plugged in without touching the operator layer. Errors crossing the
//! boundary are already in the [`Error`](omnivec_common::Error) taxonomy.
//!
//! [`aggregation`] is the in-process reference runtime for global
//! aggregations.

pub mod aggregation;

use std::fmt;

use omnivec_common::Result;
use omnivec_common::memory::VecAllocator;

use crate::vector::AnyVector;

pub use aggregation::{
    AggregationDescriptor, AggregationStep, FunctionType, NativeAggregationFactory,
    NativeAggregationOperator,
};

/// Columns exchanged with a native operator. Ownership of every vector moves
/// with the batch.
#[derive(Debug)]
pub struct VecBatch {
    vectors: Vec<AnyVector>,
    row_count: usize,
}

impl VecBatch {
    /// Creates a batch of `row_count` rows.
    #[must_use]
    pub fn new(vectors: Vec<AnyVector>, row_count: usize) -> Self {
        Self { vectors, row_count }
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Number of columns.
    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.vectors.len()
    }

    /// The columns.
    #[must_use]
    pub fn vectors(&self) -> &[AnyVector] {
        &self.vectors
    }

    /// Takes the columns out of the batch.
    #[must_use]
    pub fn into_vectors(self) -> Vec<AnyVector> {
        self.vectors
    }

    /// Closes every vector, returning the first error.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for vector in &mut self.vectors {
            if let Err(e) = vector.close() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// An operator instance inside the native runtime.
pub trait NativeOperator: fmt::Debug + Send {
    /// Consumes one batch.
    fn add_input(&mut self, batch: VecBatch) -> Result<()>;

    /// Returns the next ready batch, if any.
    fn get_output(&mut self) -> Result<Option<VecBatch>>;

    /// Releases runtime resources. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Creates native operators bound to one plan node.
pub trait NativeOperatorFactory: fmt::Debug + Send + Sync {
    /// Creates an operator whose output vectors are charged to `allocator`.
    fn create_operator(&self, allocator: &VecAllocator) -> Result<Box<dyn NativeOperator>>;
}
