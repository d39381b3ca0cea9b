//! Fixed-width vectors: one generic implementation for every primitive type.

use std::sync::Arc;

use omnivec_common::error::{check_array_range, check_valid_region};
use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};

use super::storage::{NULL_MARKER, NativeBuffer, Ownership, Pod, SharedStorage};
use super::{AnyVector, NativeVector, check_positions};

/// Primitive element types storable in a [`FixedWidthVec`].
///
/// Sealed: implemented for `i8`, `i32`, `i64` and `f64`.
pub trait NativeType: Pod + Default + std::fmt::Debug {
    /// Column type of vectors of this element.
    const DATA_TYPE: DataType;
    /// Vector name used in errors.
    const NAME: &'static str;

    /// Converts to a [`Value`].
    fn to_value(self) -> Value;
    /// Converts from a [`Value`] of the matching type.
    fn from_value(value: &Value) -> Option<Self>;
    /// Wraps a vector of this type into [`AnyVector`].
    fn wrap(vector: FixedWidthVec<Self>) -> AnyVector;
}

impl NativeType for i8 {
    const DATA_TYPE: DataType = DataType::Byte;
    const NAME: &'static str = "ByteVec";

    fn to_value(self) -> Value {
        Value::Byte(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_byte()
    }

    fn wrap(vector: FixedWidthVec<Self>) -> AnyVector {
        AnyVector::Byte(vector)
    }
}

impl NativeType for i32 {
    const DATA_TYPE: DataType = DataType::Int;
    const NAME: &'static str = "IntVec";

    fn to_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn wrap(vector: FixedWidthVec<Self>) -> AnyVector {
        AnyVector::Int(vector)
    }
}

impl NativeType for i64 {
    const DATA_TYPE: DataType = DataType::Long;
    const NAME: &'static str = "LongVec";

    fn to_value(self) -> Value {
        Value::Long(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_long()
    }

    fn wrap(vector: FixedWidthVec<Self>) -> AnyVector {
        AnyVector::Long(vector)
    }
}

impl NativeType for f64 {
    const DATA_TYPE: DataType = DataType::Double;
    const NAME: &'static str = "DoubleVec";

    fn to_value(self) -> Value {
        Value::Double(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_double()
    }

    fn wrap(vector: FixedWidthVec<Self>) -> AnyVector {
        AnyVector::Double(vector)
    }
}

/// TINYINT vector.
pub type ByteVec = FixedWidthVec<i8>;
/// INTEGER vector.
pub type IntVec = FixedWidthVec<i32>;
/// BIGINT vector.
pub type LongVec = FixedWidthVec<i64>;
/// DOUBLE vector.
pub type DoubleVec = FixedWidthVec<f64>;

#[derive(Debug)]
struct FixedBuffers<T: Pod> {
    values: NativeBuffer<T>,
    nulls: NativeBuffer<u8>,
}

impl<T: Pod> FixedBuffers<T> {
    fn allocate(allocator: &VecAllocator, len: usize) -> Result<Self> {
        Ok(Self {
            values: NativeBuffer::allocate(allocator, len)?,
            nulls: NativeBuffer::allocate(allocator, len)?,
        })
    }
}

/// A native vector of fixed-width values.
#[derive(Debug)]
pub struct FixedWidthVec<T: NativeType> {
    /// `None` once this handle has been closed.
    storage: Option<Arc<SharedStorage<FixedBuffers<T>>>>,
    allocator: VecAllocator,
    offset: usize,
    size: usize,
    ownership: Ownership,
    closable: bool,
}

impl<T: NativeType> FixedWidthVec<T> {
    /// Allocates a zeroed, non-null vector of `size` positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the allocation is rejected.
    pub fn allocate(allocator: &VecAllocator, size: usize) -> Result<Self> {
        let buffers = FixedBuffers::allocate(allocator, size)?;
        Ok(Self::owned(allocator, buffers, size))
    }

    fn owned(allocator: &VecAllocator, buffers: FixedBuffers<T>, size: usize) -> Self {
        Self {
            storage: Some(Arc::new(SharedStorage::new(buffers))),
            allocator: allocator.clone(),
            offset: 0,
            size,
            ownership: Ownership::Owned,
            closable: true,
        }
    }

    fn buffers(&self) -> Result<&FixedBuffers<T>> {
        self.storage
            .as_ref()
            .ok_or(Error::UseAfterRelease(T::NAME))?
            .buffers(T::NAME)
    }

    fn buffers_mut(&mut self) -> Result<&mut FixedBuffers<T>> {
        let storage = self
            .storage
            .as_mut()
            .ok_or(Error::UseAfterRelease(T::NAME))?;
        let storage = Arc::get_mut(storage).ok_or_else(|| {
            Error::illegal_state(format!("{} storage is shared with a view", T::NAME))
        })?;
        Ok(storage.buffers_mut())
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position >= self.size {
            return Err(Error::out_of_range(format!(
                "{} position {position} is not valid for size {}",
                T::NAME,
                self.size
            )));
        }
        Ok(())
    }

    /// Returns the window's values.
    pub fn values(&self) -> Result<&[T]> {
        let buffers = self.buffers()?;
        Ok(&buffers.values.as_slice()[self.offset..self.offset + self.size])
    }

    /// Writes `value` at `position`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::IllegalState`] if the storage is shared with a view.
    pub fn put(&mut self, position: usize, value: T) -> Result<()> {
        self.check_position(position)?;
        let offset = self.offset;
        self.buffers_mut()?.values.as_mut_slice()[offset + position] = value;
        Ok(())
    }

    /// Writes `values` starting at `position`.
    pub fn put_slice(&mut self, position: usize, values: &[T]) -> Result<()> {
        check_valid_region(self.size, position, values.len())?;
        let start = self.offset + position;
        self.buffers_mut()?.values.as_mut_slice()[start..start + values.len()]
            .copy_from_slice(values);
        Ok(())
    }

    /// Marks `position` null.
    pub fn set_null(&mut self, position: usize) -> Result<()> {
        self.check_position(position)?;
        let offset = self.offset;
        self.buffers_mut()?.nulls.as_mut_slice()[offset + position] = NULL_MARKER;
        Ok(())
    }

    fn window_nulls(&self) -> Result<&[u8]> {
        let buffers = self.buffers()?;
        Ok(&buffers.nulls.as_slice()[self.offset..self.offset + self.size])
    }
}

impl<T: NativeType> NativeVector for FixedWidthVec<T> {
    type Item = T;

    const DATA_TYPE: DataType = T::DATA_TYPE;
    const NAME: &'static str = T::NAME;
    const POSITION_OVERHEAD: u64 = 1;

    fn from_values(allocator: &VecAllocator, values: &[T]) -> Result<Self> {
        let mut buffers = FixedBuffers::allocate(allocator, values.len())?;
        buffers.values.as_mut_slice().copy_from_slice(values);
        Ok(Self::owned(allocator, buffers, values.len()))
    }

    fn size(&self) -> usize {
        self.size
    }

    fn offset(&self) -> usize {
        self.offset
    }

    fn allocator(&self) -> &VecAllocator {
        &self.allocator
    }

    fn get(&self, position: usize) -> Result<T> {
        self.check_position(position)?;
        Ok(self.buffers()?.values.as_slice()[self.offset + position])
    }

    fn is_null(&self, position: usize) -> Result<bool> {
        self.check_position(position)?;
        Ok(self.buffers()?.nulls.as_slice()[self.offset + position] == NULL_MARKER)
    }

    fn has_null_value(&self) -> Result<bool> {
        Ok(self.window_nulls()?.contains(&NULL_MARKER))
    }

    fn raw_value_nulls(&self) -> Result<Vec<u8>> {
        Ok(self.window_nulls()?.to_vec())
    }

    fn set_nulls(&mut self, start: usize, nulls: &[u8], offset: usize, length: usize) -> Result<()> {
        check_array_range(nulls.len(), offset, length)?;
        check_valid_region(self.size, start, length)?;
        let begin = self.offset + start;
        self.buffers_mut()?.nulls.as_mut_slice()[begin..begin + length]
            .copy_from_slice(&nulls[offset..offset + length]);
        Ok(())
    }

    fn slice(&self, from: usize, to: usize) -> Result<Self> {
        if from > to {
            return Err(Error::out_of_range(format!(
                "{} slice start {from} is after end {to}",
                T::NAME
            )));
        }
        check_valid_region(self.size, from, to - from)?;
        self.buffers()?;
        Ok(Self {
            storage: self.storage.clone(),
            allocator: self.allocator.clone(),
            offset: self.offset + from,
            size: to - from,
            ownership: Ownership::Borrowed,
            closable: false,
        })
    }

    fn copy_positions(&self, positions: &[usize], offset: usize, length: usize) -> Result<Self> {
        check_positions(positions, offset, length, self.size)?;
        let source = self.buffers()?;
        let mut buffers = FixedBuffers::allocate(&self.allocator, length)?;
        let values = source.values.as_slice();
        let nulls = source.nulls.as_slice();
        for (i, position) in positions[offset..offset + length].iter().enumerate() {
            buffers.values.as_mut_slice()[i] = values[self.offset + position];
            buffers.nulls.as_mut_slice()[i] = nulls[self.offset + position];
        }
        Ok(Self::owned(&self.allocator, buffers, length))
    }

    fn copy_region(&self, offset: usize, length: usize) -> Result<Self> {
        check_valid_region(self.size, offset, length)?;
        let source = self.buffers()?;
        let start = self.offset + offset;
        let mut buffers = FixedBuffers::allocate(&self.allocator, length)?;
        buffers
            .values
            .as_mut_slice()
            .copy_from_slice(&source.values.as_slice()[start..start + length]);
        buffers
            .nulls
            .as_mut_slice()
            .copy_from_slice(&source.nulls.as_slice()[start..start + length]);
        Ok(Self::owned(&self.allocator, buffers, length))
    }

    fn capacity_in_bytes(&self) -> usize {
        self.buffers()
            .map_or(0, |b| b.values.size_in_bytes() + b.nulls.size_in_bytes())
    }

    fn region_size_in_bytes(&self, offset: usize, length: usize) -> Result<u64> {
        check_valid_region(self.size, offset, length)?;
        Ok((std::mem::size_of::<T>() as u64 + Self::POSITION_OVERHEAD) * length as u64)
    }

    fn value_size_in_bytes(&self, position: usize) -> Result<u64> {
        self.check_position(position)?;
        Ok(std::mem::size_of::<T>() as u64)
    }

    fn ownership(&self) -> Ownership {
        self.ownership
    }

    fn is_closable(&self) -> bool {
        self.closable
    }

    fn set_closable(&mut self, closable: bool) {
        self.closable = closable;
    }

    fn check_live(&self) -> Result<()> {
        self.buffers().map(|_| ())
    }

    fn close(&mut self) -> Result<()> {
        let storage = self.storage.take().ok_or(Error::UseAfterRelease(T::NAME))?;
        if self.ownership == Ownership::Owned && self.closable {
            storage.release(T::NAME)?;
        }
        Ok(())
    }

    fn into_any(self) -> AnyVector {
        T::wrap(self)
    }

    fn item_to_value(item: T) -> Value {
        item.to_value()
    }

    fn item_from_value(value: &Value) -> Option<T> {
        T::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnivec_common::memory::MemoryContext;

    fn allocator() -> (Arc<omnivec_common::memory::MemoryContext>, VecAllocator) {
        let ctx = MemoryContext::root("test", None);
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        (ctx, allocator)
    }

    #[test]
    fn test_get_put() {
        let (_, allocator) = allocator();
        let mut vec = LongVec::allocate(&allocator, 3).unwrap();
        vec.put(0, 10).unwrap();
        vec.put_slice(1, &[20, 30]).unwrap();
        assert_eq!(vec.values().unwrap(), &[10, 20, 30]);
        assert!(vec.put(3, 1).is_err());
        assert!(!vec.has_null_value().unwrap());
    }

    #[test]
    fn test_nulls() {
        let (_, allocator) = allocator();
        let mut vec = IntVec::from_values(&allocator, &[1, 2, 3, 4]).unwrap();
        vec.set_nulls(1, &[0, 1, 1], 1, 2).unwrap();
        assert_eq!(vec.raw_value_nulls().unwrap(), vec![0, 1, 1, 0]);
        assert!(vec.is_null(2).unwrap());
        vec.set_null(3).unwrap();
        assert!(vec.is_null(3).unwrap());
        assert!(vec.has_null_value().unwrap());
    }

    #[test]
    fn test_slice_shares_storage() {
        let (ctx, allocator) = allocator();
        let vec = LongVec::from_values(&allocator, &[1, 2, 3, 4]).unwrap();
        let reserved = ctx.reserved_bytes();

        let view = vec.slice(1, 3).unwrap();
        assert_eq!(ctx.reserved_bytes(), reserved);
        assert_eq!(view.size(), 2);
        assert_eq!(view.offset(), 1);
        assert_eq!(view.get(0).unwrap(), 2);
        assert_eq!(view.ownership(), Ownership::Borrowed);
        assert_eq!(view.capacity_in_bytes(), vec.capacity_in_bytes());

        let nested = view.slice(1, 2).unwrap();
        assert_eq!(nested.get(0).unwrap(), 3);
        assert!(vec.slice(3, 2).is_err());
        assert!(vec.slice(2, 5).is_err());
    }

    #[test]
    fn test_put_into_shared_storage_fails() {
        let (_, allocator) = allocator();
        let mut vec = LongVec::from_values(&allocator, &[1, 2]).unwrap();
        let view = vec.slice(0, 1).unwrap();
        assert!(matches!(vec.put(0, 9), Err(Error::IllegalState(_))));
        drop(view);
        vec.put(0, 9).unwrap();
        assert_eq!(vec.get(0).unwrap(), 9);
    }

    #[test]
    fn test_copy_positions_is_independent() {
        let (ctx, allocator) = allocator();
        let mut vec = ByteVec::from_values(&allocator, &[1, 0, 1]).unwrap();
        vec.set_null(1).unwrap();

        let mut copy = vec.copy_positions(&[2, 1, 2], 0, 3).unwrap();
        assert_eq!(copy.values().unwrap(), &[1, 0, 1]);
        assert_eq!(copy.raw_value_nulls().unwrap(), vec![0, 1, 0]);
        assert_eq!(copy.ownership(), Ownership::Owned);

        copy.close().unwrap();
        assert_eq!(vec.get(0).unwrap(), 1);
        drop(copy);
        assert_eq!(ctx.reserved_bytes(), vec.capacity_in_bytes());

        assert!(vec.copy_positions(&[0, 1], 1, 2).is_err());
        assert!(vec.copy_positions(&[5], 0, 1).is_err());
    }

    #[test]
    fn test_copy_region() {
        let (_, allocator) = allocator();
        let vec = DoubleVec::from_values(&allocator, &[1.5, 2.5, 3.5]).unwrap();
        let view = vec.slice(1, 3).unwrap();
        let copy = view.copy_region(1, 1).unwrap();
        assert_eq!(copy.values().unwrap(), &[3.5]);
        assert_eq!(copy.offset(), 0);
        assert!(view.copy_region(1, 2).is_err());
    }

    #[test]
    fn test_close_releases_for_every_handle() {
        let (ctx, allocator) = allocator();
        let mut vec = LongVec::from_values(&allocator, &[1, 2, 3]).unwrap();
        let view = vec.slice(0, 2).unwrap();

        vec.close().unwrap();
        assert_eq!(view.get(0), Err(Error::UseAfterRelease("LongVec")));
        assert_eq!(vec.get(0), Err(Error::UseAfterRelease("LongVec")));
        assert_eq!(vec.close(), Err(Error::UseAfterRelease("LongVec")));

        // The view still pins the memory until it is dropped.
        assert!(ctx.reserved_bytes() > 0);
        drop(view);
        assert_eq!(ctx.reserved_bytes(), 0);
    }

    #[test]
    fn test_closing_view_leaves_owner_alive() {
        let (_, allocator) = allocator();
        let vec = LongVec::from_values(&allocator, &[1, 2, 3]).unwrap();
        let mut view = vec.slice(1, 2).unwrap();
        view.close().unwrap();
        assert_eq!(vec.get(1).unwrap(), 2);
        assert!(view.check_live().is_err());
    }

    #[test]
    fn test_non_closable_owner_does_not_release() {
        let (_, allocator) = allocator();
        let mut vec = LongVec::from_values(&allocator, &[1, 2]).unwrap();
        let view = vec.slice(0, 2).unwrap();
        vec.set_closable(false);
        vec.close().unwrap();
        assert_eq!(view.get(1).unwrap(), 2);
    }

    #[test]
    fn test_sizes() {
        let (_, allocator) = allocator();
        let vec = IntVec::from_values(&allocator, &[1, 2, 3]).unwrap();
        assert_eq!(vec.region_size_in_bytes(0, 3).unwrap(), 15);
        assert_eq!(vec.value_size_in_bytes(1).unwrap(), 4);
        assert_eq!(vec.capacity_in_bytes(), 12 + 3);
    }

    #[test]
    fn test_allocation_limit() {
        let ctx = MemoryContext::root("tight", Some(8));
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        let err = LongVec::allocate(&allocator, 4).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
        assert_eq!(ctx.reserved_bytes(), 0);
    }
}
