//! The native vector runtime.
//!
//! A vector is a natively allocated typed array plus a parallel null-marker
//! array, charged to the [`VecAllocator`] it was created with. Blocks wrap
//! vectors; operators hand them across the native boundary as [`AnyVector`].
//!
//! - [`FixedWidthVec`] - one generic vector for every fixed-width type
//!   ([`ByteVec`], [`IntVec`], [`LongVec`], [`DoubleVec`])
//! - [`VarcharVec`] - variable-width strings (offsets + data)
//!
//! # Ownership
//!
//! `slice` produces a [`Ownership::Borrowed`] view that shares the parent's
//! storage. Only the [`Ownership::Owned`] handle releases it on `close`; after
//! that, any access through any handle fails with
//! [`Error::UseAfterRelease`](omnivec_common::Error::UseAfterRelease). The
//! memory returns to the allocator once the last handle is dropped.

mod fixed;
mod storage;
mod varchar;

use std::fmt;

use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};

pub use fixed::{ByteVec, DoubleVec, FixedWidthVec, IntVec, LongVec, NativeType};
pub use storage::{NOT_NULL_MARKER, NULL_MARKER, Ownership};
pub use varchar::VarcharVec;

/// The capability contract of a native vector.
///
/// Positions are relative to the vector's own window: position 0 of a slice
/// is position `from` of its parent.
pub trait NativeVector: fmt::Debug + Send + Sync + Sized + 'static {
    /// The element type handed out by [`get`](Self::get).
    type Item: Clone + Default + fmt::Debug + Send + Sync;

    /// Column type stored in this vector.
    const DATA_TYPE: DataType;

    /// Name used in error messages.
    const NAME: &'static str;

    /// Bytes of per-position bookkeeping (null marker, offsets) on top of the
    /// value itself.
    const POSITION_OVERHEAD: u64;

    /// Allocates a vector holding `values`, none of them null.
    fn from_values(allocator: &VecAllocator, values: &[Self::Item]) -> Result<Self>;

    /// Number of positions in this vector's window.
    fn size(&self) -> usize;

    /// Offset of this window within the underlying storage.
    fn offset(&self) -> usize;

    /// The allocator this vector's storage is charged to.
    fn allocator(&self) -> &VecAllocator;

    /// Reads the value at `position` (the stored value even when null).
    fn get(&self, position: usize) -> Result<Self::Item>;

    /// Returns whether `position` is marked null.
    fn is_null(&self, position: usize) -> Result<bool>;

    /// Returns whether any position in the window is null.
    fn has_null_value(&self) -> Result<bool>;

    /// Copies the window's null markers.
    fn raw_value_nulls(&self) -> Result<Vec<u8>>;

    /// Copies `nulls[offset..offset + length]` into positions starting at `start`.
    fn set_nulls(&mut self, start: usize, nulls: &[u8], offset: usize, length: usize)
    -> Result<()>;

    /// Zero-copy view over `[from, to)`.
    fn slice(&self, from: usize, to: usize) -> Result<Self>;

    /// Gathers `positions[offset..offset + length]` into a new owned vector.
    fn copy_positions(&self, positions: &[usize], offset: usize, length: usize) -> Result<Self>;

    /// Copies `[offset, offset + length)` into a new owned vector.
    fn copy_region(&self, offset: usize, length: usize) -> Result<Self>;

    /// Bytes allocated for the underlying storage.
    fn capacity_in_bytes(&self) -> usize;

    /// Logical size of `[offset, offset + length)`, bookkeeping included.
    fn region_size_in_bytes(&self, offset: usize, length: usize) -> Result<u64>;

    /// Logical size of the value at `position`, bookkeeping excluded.
    fn value_size_in_bytes(&self, position: usize) -> Result<u64>;

    /// Whether this handle releases the storage.
    fn ownership(&self) -> Ownership;

    /// Shorthand for `ownership() == Ownership::Owned`.
    fn is_owner(&self) -> bool {
        self.ownership() == Ownership::Owned
    }

    /// Whether `close` releases the storage.
    fn is_closable(&self) -> bool;

    /// Enables or disables release on `close`.
    fn set_closable(&mut self, closable: bool);

    /// Fails if the storage was released or this handle closed.
    fn check_live(&self) -> Result<()>;

    /// Closes this handle, releasing the storage if owned and closable.
    fn close(&mut self) -> Result<()>;

    /// Wraps this vector into the tagged union.
    fn into_any(self) -> AnyVector;

    /// Converts an element to a [`Value`].
    fn item_to_value(item: Self::Item) -> Value;

    /// Converts a non-null [`Value`] of the matching type to an element.
    fn item_from_value(value: &Value) -> Option<Self::Item>;
}

/// A vector of any supported type, as exchanged with native operators.
#[derive(Debug)]
pub enum AnyVector {
    /// TINYINT values.
    Byte(ByteVec),
    /// INTEGER values.
    Int(IntVec),
    /// BIGINT values.
    Long(LongVec),
    /// DOUBLE values.
    Double(DoubleVec),
    /// VARCHAR values.
    VarChar(VarcharVec),
}

macro_rules! with_vector {
    ($any:expr, $v:ident => $body:expr) => {
        match $any {
            AnyVector::Byte($v) => $body,
            AnyVector::Int($v) => $body,
            AnyVector::Long($v) => $body,
            AnyVector::Double($v) => $body,
            AnyVector::VarChar($v) => $body,
        }
    };
}

impl AnyVector {
    /// Returns the column type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            AnyVector::Byte(_) => DataType::Byte,
            AnyVector::Int(_) => DataType::Int,
            AnyVector::Long(_) => DataType::Long,
            AnyVector::Double(_) => DataType::Double,
            AnyVector::VarChar(_) => DataType::VarChar,
        }
    }

    /// Number of positions.
    #[must_use]
    pub fn size(&self) -> usize {
        with_vector!(self, v => v.size())
    }

    /// Reads `position` as a [`Value`], `Value::Null` for null positions.
    pub fn get_value(&self, position: usize) -> Result<Value> {
        with_vector!(self, v => read_value(v, position))
    }

    /// Returns whether `position` is null.
    pub fn is_null(&self, position: usize) -> Result<bool> {
        with_vector!(self, v => v.is_null(position))
    }

    /// Bytes allocated for the underlying storage.
    #[must_use]
    pub fn capacity_in_bytes(&self) -> usize {
        with_vector!(self, v => v.capacity_in_bytes())
    }

    /// Whether this handle owns its storage.
    #[must_use]
    pub fn ownership(&self) -> Ownership {
        with_vector!(self, v => v.ownership())
    }

    /// Closes the vector.
    pub fn close(&mut self) -> Result<()> {
        with_vector!(self, v => v.close())
    }

    /// Allocates a vector of `data_type` holding `values` (nulls allowed).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a value does not match
    /// `data_type`, or [`Error::ResourceExhausted`] if allocation fails.
    pub fn from_values(
        allocator: &VecAllocator,
        data_type: DataType,
        values: &[Value],
    ) -> Result<AnyVector> {
        Ok(match data_type {
            DataType::Byte => AnyVector::Byte(build_vector(allocator, values)?),
            DataType::Int => AnyVector::Int(build_vector(allocator, values)?),
            DataType::Long => AnyVector::Long(build_vector(allocator, values)?),
            DataType::Double => AnyVector::Double(build_vector(allocator, values)?),
            DataType::VarChar => AnyVector::VarChar(build_vector(allocator, values)?),
        })
    }
}

fn read_value<V: NativeVector>(vector: &V, position: usize) -> Result<Value> {
    if vector.is_null(position)? {
        return Ok(Value::Null);
    }
    vector.get(position).map(V::item_to_value)
}

/// Builds a vector from values of its type, marking `Value::Null` entries null.
pub(crate) fn build_vector<V: NativeVector>(allocator: &VecAllocator, values: &[Value]) -> Result<V> {
    let mut items = Vec::with_capacity(values.len());
    let mut nulls: Option<Vec<u8>> = None;
    for (i, value) in values.iter().enumerate() {
        if value.is_null() {
            nulls.get_or_insert_with(|| vec![NOT_NULL_MARKER; values.len()])[i] = NULL_MARKER;
            items.push(V::Item::default());
            continue;
        }
        let item = V::item_from_value(value).ok_or_else(|| {
            Error::invalid_argument(format!(
                "{} cannot hold a {} value",
                V::NAME,
                value.type_name()
            ))
        })?;
        items.push(item);
    }

    let mut vector = V::from_values(allocator, &items)?;
    if let Some(nulls) = nulls {
        vector.set_nulls(0, &nulls, 0, nulls.len())?;
    }
    Ok(vector)
}

/// Fails with [`Error::OutOfRange`] unless every selected position is below `size`.
pub(crate) fn check_positions(
    positions: &[usize],
    offset: usize,
    length: usize,
    size: usize,
) -> Result<()> {
    omnivec_common::error::check_array_range(positions.len(), offset, length)?;
    if let Some(bad) = positions[offset..offset + length].iter().find(|p| **p >= size) {
        return Err(Error::out_of_range(format!(
            "position {bad} is not valid for {size} positions"
        )));
    }
    Ok(())
}
