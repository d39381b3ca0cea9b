//! Typed columnar blocks over native vectors.
//!
//! A block is one column of a [`Page`](crate::page::Page): a window of
//! `position_count` values in a native vector plus an optional null mask.
//!
//! | Block | Vector | Encoding |
//! |-------|--------|----------|
//! | [`ByteArrayBlock`] | [`ByteVec`](crate::vector::ByteVec) | `BYTE_ARRAY` |
//! | [`IntArrayBlock`] | [`IntVec`](crate::vector::IntVec) | `INT_ARRAY` |
//! | [`LongArrayBlock`] | [`LongVec`](crate::vector::LongVec) | `LONG_ARRAY` |
//! | [`DoubleArrayBlock`] | [`DoubleVec`](crate::vector::DoubleVec) | `LONG_ARRAY` |
//! | [`VariableWidthBlock`] | [`VarcharVec`](crate::vector::VarcharVec) | `VARIABLE_WIDTH` |
//!
//! [`get_region`](Block::get_region) returns a view that borrows the parent's
//! vector; every `copy_*` method allocates a fresh vector that the new block
//! owns.

mod builder;
mod typed;

use std::fmt;

use omnivec_common::Result;
use omnivec_common::types::{DataType, Value};

pub use builder::{BlockBuilder, VectorBlockBuilder};
pub use typed::{
    BlockElement, ByteArrayBlock, DoubleArrayBlock, IntArrayBlock, LongArrayBlock, TypedBlock,
    VariableWidthBlock,
};

use crate::filter::BloomFilter;
use crate::vector::AnyVector;

/// Independently accounted parts of a block, for memory bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockPart {
    /// The native vector's allocation.
    Values,
    /// The null mask.
    NullMask,
    /// The block struct itself.
    Instance,
}

/// The uniform block contract.
///
/// Positions are `0..position_count()`; anything else fails with
/// [`Error::OutOfRange`](omnivec_common::Error::OutOfRange).
pub trait Block: fmt::Debug + fmt::Display + Send + Sync {
    /// Column type.
    fn data_type(&self) -> DataType;

    /// Number of logical rows.
    fn position_count(&self) -> usize;

    /// Stable encoding name used for serialization dispatch.
    fn encoding_name(&self) -> &'static str;

    /// Returns whether `position` is null.
    fn is_null(&self, position: usize) -> Result<bool>;

    /// Returns `false` only if no position can be null.
    fn may_have_null(&self) -> bool;

    /// Reads `position` as a [`Value`] (`Value::Null` for null positions).
    fn get(&self, position: usize) -> Result<Value>;

    /// Reads a TINYINT. `sub_offset` must be zero.
    fn get_byte(&self, position: usize, sub_offset: usize) -> Result<i8>;

    /// Reads an INTEGER. `sub_offset` must be zero.
    fn get_int(&self, position: usize, sub_offset: usize) -> Result<i32>;

    /// Reads a BIGINT. `sub_offset` must be zero.
    fn get_long(&self, position: usize, sub_offset: usize) -> Result<i64>;

    /// Reads a DOUBLE. `sub_offset` must be zero.
    fn get_double(&self, position: usize, sub_offset: usize) -> Result<f64>;

    /// Byte length of the variable-width value at `position`.
    fn get_slice_length(&self, position: usize) -> Result<usize>;

    /// Bytes `[offset, offset + length)` of the variable-width value at `position`.
    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Result<&[u8]>;

    /// Appends `position` to `builder` as one complete entry.
    fn write_position_to(&self, position: usize, builder: &mut dyn BlockBuilder) -> Result<()>;

    /// A fresh one-row block holding `position`.
    fn get_single_value_block(&self, position: usize) -> Result<Box<dyn Block>>;

    /// Gathers `positions[offset..offset + length]` into a fresh block.
    fn copy_positions(
        &self,
        positions: &[usize],
        offset: usize,
        length: usize,
    ) -> Result<Box<dyn Block>>;

    /// A view over `[offset, offset + length)` sharing this block's vector.
    fn get_region(&self, offset: usize, length: usize) -> Result<Box<dyn Block>>;

    /// A fresh, compacted copy of `[offset, offset + length)`.
    fn copy_region(&self, offset: usize, length: usize) -> Result<Box<dyn Block>>;

    /// In place, `valid[i] &= bloom.test(value_i)` for every position.
    fn filter_bloom(&self, bloom: &BloomFilter, valid: &mut [bool]) -> Result<()>;

    /// Writes the `positions[..position_count]` entries whose value satisfies
    /// `predicate` to the front of `matched` and returns how many there were.
    fn filter(
        &self,
        positions: &[usize],
        position_count: usize,
        matched: &mut [usize],
        predicate: &dyn Fn(&Value) -> bool,
    ) -> Result<usize>;

    /// Logical size of all positions.
    fn size_in_bytes(&self) -> u64;

    /// Bytes retained by this block, including the shared vector allocation.
    fn retained_size_in_bytes(&self) -> u64;

    /// Logical size of `[position, position + length)`.
    fn region_size_in_bytes(&self, position: usize, length: usize) -> Result<u64>;

    /// Logical size of the positions flagged in `selected`.
    fn positions_size_in_bytes(&self, selected: &[bool]) -> Result<u64>;

    /// Size of one value for statistics; zero for nulls.
    fn estimated_data_size_for_stats(&self, position: usize) -> Result<u64>;

    /// Reports each independently accounted part and its size.
    fn retained_bytes_for_each_part(&self, consumer: &mut dyn FnMut(BlockPart, u64));

    /// Enables or disables release of the vector on [`close`](Self::close).
    fn set_closable(&mut self, closable: bool);

    /// Whether this block is backed by a native vector.
    fn is_extension_block(&self) -> bool {
        true
    }

    /// Releases the vector if this block owns it.
    fn close(&mut self) -> Result<()>;

    /// Hands the underlying vector to the native side.
    fn into_vector(self: Box<Self>) -> Result<AnyVector>;
}

/// Wraps a vector returned by the native side into a block of its type.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`](omnivec_common::Error::InvalidArgument)
/// if the vector is smaller than `position_count`.
pub fn block_from_vector(vector: AnyVector, position_count: usize) -> Result<Box<dyn Block>> {
    Ok(match vector {
        AnyVector::Byte(v) => Box::new(ByteArrayBlock::from_vector(position_count, v)?),
        AnyVector::Int(v) => Box::new(IntArrayBlock::from_vector(position_count, v)?),
        AnyVector::Long(v) => Box::new(LongArrayBlock::from_vector(position_count, v)?),
        AnyVector::Double(v) => Box::new(DoubleArrayBlock::from_vector(position_count, v)?),
        AnyVector::VarChar(v) => Box::new(VariableWidthBlock::from_vector(position_count, v)?),
    })
}

/// Builds a fresh block of `data_type` from values, nulls included.
pub fn block_from_values(
    allocator: &omnivec_common::memory::VecAllocator,
    data_type: DataType,
    values: &[Value],
) -> Result<Box<dyn Block>> {
    let vector = AnyVector::from_values(allocator, data_type, values)?;
    block_from_vector(vector, values.len())
}
