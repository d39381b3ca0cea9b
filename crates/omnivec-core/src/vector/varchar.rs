//! Variable-width string vector.

use std::sync::Arc;

use arcstr::ArcStr;
use omnivec_common::error::{check_array_range, check_valid_region};
use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};

use super::storage::{NULL_MARKER, NativeBuffer, Ownership, SharedStorage};
use super::{AnyVector, NativeVector, check_positions};

const NAME: &str = "VarcharVec";

/// `offsets` has one more entry than there are positions; value `i` is
/// `data[offsets[i]..offsets[i + 1]]`.
#[derive(Debug)]
struct VarcharBuffers {
    offsets: NativeBuffer<i32>,
    data: NativeBuffer<u8>,
    nulls: NativeBuffer<u8>,
}

impl VarcharBuffers {
    fn build<'a>(
        allocator: &VecAllocator,
        len: usize,
        values: impl Iterator<Item = (&'a [u8], u8)> + Clone,
    ) -> Result<Self> {
        let total: usize = values.clone().map(|(bytes, _)| bytes.len()).sum();
        if i32::try_from(total).is_err() {
            return Err(Error::invalid_argument(format!(
                "{NAME} data of {total} bytes exceeds the offset range"
            )));
        }

        let mut buffers = Self {
            offsets: NativeBuffer::allocate(allocator, len + 1)?,
            data: NativeBuffer::allocate(allocator, total)?,
            nulls: NativeBuffer::allocate(allocator, len)?,
        };
        let mut end = 0usize;
        for (i, (bytes, null)) in values.enumerate() {
            buffers.data.as_mut_slice()[end..end + bytes.len()].copy_from_slice(bytes);
            end += bytes.len();
            // Fits: `total` was checked against i32::MAX above.
            buffers.offsets.as_mut_slice()[i + 1] = end as i32;
            buffers.nulls.as_mut_slice()[i] = null;
        }
        Ok(buffers)
    }

    fn value_range(&self, index: usize) -> (usize, usize) {
        let offsets = self.offsets.as_slice();
        (offsets[index] as usize, offsets[index + 1] as usize)
    }

    fn bytes(&self, index: usize) -> &[u8] {
        let (start, end) = self.value_range(index);
        &self.data.as_slice()[start..end]
    }
}

/// A native vector of UTF-8 strings.
#[derive(Debug)]
pub struct VarcharVec {
    storage: Option<Arc<SharedStorage<VarcharBuffers>>>,
    allocator: VecAllocator,
    offset: usize,
    size: usize,
    ownership: Ownership,
    closable: bool,
}

impl VarcharVec {
    fn owned(allocator: &VecAllocator, buffers: VarcharBuffers, size: usize) -> Self {
        Self {
            storage: Some(Arc::new(SharedStorage::new(buffers))),
            allocator: allocator.clone(),
            offset: 0,
            size,
            ownership: Ownership::Owned,
            closable: true,
        }
    }

    fn buffers(&self) -> Result<&VarcharBuffers> {
        self.storage
            .as_ref()
            .ok_or(Error::UseAfterRelease(NAME))?
            .buffers(NAME)
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position >= self.size {
            return Err(Error::out_of_range(format!(
                "{NAME} position {position} is not valid for size {}",
                self.size
            )));
        }
        Ok(())
    }

    /// Returns the raw bytes at `position`.
    pub fn get_bytes(&self, position: usize) -> Result<&[u8]> {
        self.check_position(position)?;
        Ok(self.buffers()?.bytes(self.offset + position))
    }

    /// Returns the string at `position` without copying.
    pub fn get_str(&self, position: usize) -> Result<&str> {
        let bytes = self.get_bytes(position)?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::illegal_state(format!("{NAME} holds invalid UTF-8: {e}")))
    }

    /// Number of data bytes used by `[offset, offset + length)`.
    fn data_bytes(&self, offset: usize, length: usize) -> Result<u64> {
        let buffers = self.buffers()?;
        let offsets = buffers.offsets.as_slice();
        let start = self.offset + offset;
        Ok((offsets[start + length] - offsets[start]) as u64)
    }
}

impl NativeVector for VarcharVec {
    type Item = ArcStr;

    const DATA_TYPE: DataType = DataType::VarChar;
    const NAME: &'static str = NAME;
    /// Null marker plus one `i32` offset.
    const POSITION_OVERHEAD: u64 = 5;

    fn from_values(allocator: &VecAllocator, values: &[ArcStr]) -> Result<Self> {
        let buffers = VarcharBuffers::build(
            allocator,
            values.len(),
            values.iter().map(|s| (s.as_bytes(), 0)),
        )?;
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

    fn get(&self, position: usize) -> Result<ArcStr> {
        self.get_str(position).map(ArcStr::from)
    }

    fn is_null(&self, position: usize) -> Result<bool> {
        self.check_position(position)?;
        Ok(self.buffers()?.nulls.as_slice()[self.offset + position] == NULL_MARKER)
    }

    fn has_null_value(&self) -> Result<bool> {
        let nulls = self.buffers()?.nulls.as_slice();
        Ok(nulls[self.offset..self.offset + self.size].contains(&NULL_MARKER))
    }

    fn raw_value_nulls(&self) -> Result<Vec<u8>> {
        let nulls = self.buffers()?.nulls.as_slice();
        Ok(nulls[self.offset..self.offset + self.size].to_vec())
    }

    fn set_nulls(&mut self, start: usize, nulls: &[u8], offset: usize, length: usize) -> Result<()> {
        check_array_range(nulls.len(), offset, length)?;
        check_valid_region(self.size, start, length)?;
        let begin = self.offset + start;
        let storage = self.storage.as_mut().ok_or(Error::UseAfterRelease(NAME))?;
        let storage = Arc::get_mut(storage).ok_or_else(|| {
            Error::illegal_state(format!("{NAME} storage is shared with a view"))
        })?;
        storage.buffers_mut().nulls.as_mut_slice()[begin..begin + length]
            .copy_from_slice(&nulls[offset..offset + length]);
        Ok(())
    }

    fn slice(&self, from: usize, to: usize) -> Result<Self> {
        if from > to {
            return Err(Error::out_of_range(format!(
                "{NAME} slice start {from} is after end {to}"
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
        let nulls = source.nulls.as_slice();
        let base = self.offset;
        let buffers = VarcharBuffers::build(
            &self.allocator,
            length,
            positions[offset..offset + length]
                .iter()
                .map(|p| (source.bytes(base + p), nulls[base + p])),
        )?;
        Ok(Self::owned(&self.allocator, buffers, length))
    }

    fn copy_region(&self, offset: usize, length: usize) -> Result<Self> {
        check_valid_region(self.size, offset, length)?;
        let source = self.buffers()?;
        let nulls = source.nulls.as_slice();
        let start = self.offset + offset;
        let buffers = VarcharBuffers::build(
            &self.allocator,
            length,
            (start..start + length).map(|i| (source.bytes(i), nulls[i])),
        )?;
        Ok(Self::owned(&self.allocator, buffers, length))
    }

    fn capacity_in_bytes(&self) -> usize {
        self.buffers().map_or(0, |b| {
            b.offsets.size_in_bytes() + b.data.size_in_bytes() + b.nulls.size_in_bytes()
        })
    }

    fn region_size_in_bytes(&self, offset: usize, length: usize) -> Result<u64> {
        check_valid_region(self.size, offset, length)?;
        Ok(self.data_bytes(offset, length)? + Self::POSITION_OVERHEAD * length as u64)
    }

    fn value_size_in_bytes(&self, position: usize) -> Result<u64> {
        Ok(self.get_bytes(position)?.len() as u64)
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
        let storage = self.storage.take().ok_or(Error::UseAfterRelease(NAME))?;
        if self.ownership == Ownership::Owned && self.closable {
            storage.release(NAME)?;
        }
        Ok(())
    }

    fn into_any(self) -> AnyVector {
        AnyVector::VarChar(self)
    }

    fn item_to_value(item: ArcStr) -> Value {
        Value::VarChar(item)
    }

    fn item_from_value(value: &Value) -> Option<ArcStr> {
        match value {
            Value::VarChar(s) => Some(s.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnivec_common::memory::MemoryContext;

    fn strings(values: &[&str]) -> Vec<ArcStr> {
        values.iter().map(|s| ArcStr::from(*s)).collect()
    }

    #[test]
    fn test_get_and_sizes() {
        let allocator = VecAllocator::new(MemoryContext::root("test", None));
        let vec = VarcharVec::from_values(&allocator, &strings(&["ab", "", "xyz"])).unwrap();
        assert_eq!(vec.get_str(0).unwrap(), "ab");
        assert_eq!(vec.get(1).unwrap().as_str(), "");
        assert_eq!(vec.get_bytes(2).unwrap(), b"xyz");
        assert_eq!(vec.value_size_in_bytes(2).unwrap(), 3);
        assert_eq!(vec.region_size_in_bytes(0, 3).unwrap(), 5 + 15);
        assert_eq!(vec.region_size_in_bytes(1, 1).unwrap(), 5);
        assert!(vec.get(3).is_err());
    }

    #[test]
    fn test_slice_and_copy() {
        let allocator = VecAllocator::new(MemoryContext::root("test", None));
        let mut vec = VarcharVec::from_values(&allocator, &strings(&["a", "bb", "ccc", "dddd"])).unwrap();
        vec.set_nulls(1, &[1], 0, 1).unwrap();

        let view = vec.slice(1, 4).unwrap();
        assert!(view.is_null(0).unwrap());
        assert_eq!(view.get_str(1).unwrap(), "ccc");
        assert_eq!(view.ownership(), Ownership::Borrowed);

        let region = view.copy_region(1, 2).unwrap();
        assert_eq!(region.get_str(0).unwrap(), "ccc");
        assert_eq!(region.get_str(1).unwrap(), "dddd");
        assert!(!region.has_null_value().unwrap());

        let picked = vec.copy_positions(&[3, 1, 0], 0, 3).unwrap();
        assert_eq!(picked.get_str(0).unwrap(), "dddd");
        assert_eq!(picked.raw_value_nulls().unwrap(), vec![0, 1, 0]);
        assert_eq!(picked.get_str(2).unwrap(), "a");
    }

    #[test]
    fn test_close_invalidates_views() {
        let ctx = MemoryContext::root("test", None);
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        let mut vec = VarcharVec::from_values(&allocator, &strings(&["a", "b"])).unwrap();
        let view = vec.slice(0, 1).unwrap();
        vec.close().unwrap();
        assert_eq!(view.get(0), Err(Error::UseAfterRelease("VarcharVec")));
        assert_eq!(view.capacity_in_bytes(), 0);
        drop(view);
        assert_eq!(ctx.reserved_bytes(), 0);
    }

    #[test]
    fn test_empty_vector() {
        let allocator = VecAllocator::new(MemoryContext::root("test", None));
        let vec = VarcharVec::from_values(&allocator, &[]).unwrap();
        assert_eq!(vec.size(), 0);
        assert!(!vec.has_null_value().unwrap());
        assert_eq!(vec.region_size_in_bytes(0, 0).unwrap(), 0);
    }
}
