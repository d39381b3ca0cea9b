//! The one generic block implementation behind every column type.

use std::fmt;
use std::sync::Arc;

use omnivec_common::error::{check_array_range, check_readable_position, check_valid_region};
use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};

use super::{Block, BlockBuilder, BlockPart};
use crate::filter::BloomFilter;
use crate::vector::{
    AnyVector, ByteVec, DoubleVec, IntVec, LongVec, NULL_MARKER, NativeVector, VarcharVec,
};

/// Per-type parts of a block: names and how a value is written to a builder.
pub trait BlockElement: NativeVector {
    /// Stable encoding name.
    const ENCODING_NAME: &'static str;
    /// Name used by `Display`.
    const BLOCK_NAME: &'static str;

    /// Writes one non-null value into the builder's open entry.
    fn write_item(item: &Self::Item, builder: &mut dyn BlockBuilder) -> Result<()>;

    /// Raw bytes of a variable-width value.
    fn bytes_at(&self, _position: usize) -> Result<&[u8]> {
        Err(Error::unsupported(format!(
            "{} has no variable-width slices",
            Self::BLOCK_NAME
        )))
    }
}

macro_rules! fixed_block_element {
    ($vec:ty, $encoding:literal, $name:literal, $write:ident) => {
        impl BlockElement for $vec {
            const ENCODING_NAME: &'static str = $encoding;
            const BLOCK_NAME: &'static str = $name;

            fn write_item(item: &Self::Item, builder: &mut dyn BlockBuilder) -> Result<()> {
                builder.$write(*item)
            }
        }
    };
}

fixed_block_element!(ByteVec, "BYTE_ARRAY", "ByteArrayBlock", write_byte);
fixed_block_element!(IntVec, "INT_ARRAY", "IntArrayBlock", write_int);
fixed_block_element!(LongVec, "LONG_ARRAY", "LongArrayBlock", write_long);
// Double blocks share the long array encoding.
fixed_block_element!(DoubleVec, "LONG_ARRAY", "DoubleArrayBlock", write_double);

impl BlockElement for VarcharVec {
    const ENCODING_NAME: &'static str = "VARIABLE_WIDTH";
    const BLOCK_NAME: &'static str = "VariableWidthBlock";

    fn write_item(item: &Self::Item, builder: &mut dyn BlockBuilder) -> Result<()> {
        builder.write_bytes(item.as_bytes())
    }

    fn bytes_at(&self, position: usize) -> Result<&[u8]> {
        self.get_bytes(position)
    }
}

/// TINYINT block.
pub type ByteArrayBlock = TypedBlock<ByteVec>;
/// INTEGER block.
pub type IntArrayBlock = TypedBlock<IntVec>;
/// BIGINT block.
pub type LongArrayBlock = TypedBlock<LongVec>;
/// DOUBLE block.
pub type DoubleArrayBlock = TypedBlock<DoubleVec>;
/// VARCHAR block.
pub type VariableWidthBlock = TypedBlock<VarcharVec>;

/// A block over a window of a native vector.
///
/// Position `i` of the block is position `i` of `values`; the null mask, when
/// present, is shared between a block and its views and indexed by
/// `i + array_offset`.
#[derive(Debug)]
pub struct TypedBlock<V: BlockElement> {
    values: V,
    array_offset: usize,
    position_count: usize,
    value_is_null: Option<Arc<[u8]>>,
    size_in_bytes: u64,
    retained_size_in_bytes: u64,
}

impl<V: BlockElement> TypedBlock<V> {
    const INSTANCE_SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Copies `values[array_offset..array_offset + position_count]` into a
    /// freshly allocated vector.
    ///
    /// Lengths are validated before anything is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `values` or `value_is_null` are
    /// too short, or [`Error::ResourceExhausted`] if allocation fails.
    pub fn from_values(
        allocator: &VecAllocator,
        array_offset: usize,
        position_count: usize,
        value_is_null: Option<&[u8]>,
        values: &[V::Item],
    ) -> Result<Self> {
        if values.len() < array_offset || values.len() - array_offset < position_count {
            return Err(Error::invalid_argument(
                "values length is less than positionCount",
            ));
        }
        if let Some(nulls) = value_is_null
            && (nulls.len() < array_offset || nulls.len() - array_offset < position_count)
        {
            return Err(Error::invalid_argument(
                "isNull length is less than positionCount",
            ));
        }

        let window = array_offset..array_offset + position_count;
        let mut vector = V::from_values(allocator, &values[window.clone()])?;
        let mask: Option<Arc<[u8]>> = value_is_null.map(|nulls| Arc::from(&nulls[window]));
        if let Some(mask) = &mask {
            vector.set_nulls(0, mask, 0, position_count)?;
        }
        Self::assemble(vector, 0, position_count, mask)
    }

    /// Wraps a vector of exactly `position_count` positions, taking its null
    /// markers when it has any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the vector size differs.
    pub fn from_vector(position_count: usize, values: V) -> Result<Self> {
        if values.size() != position_count {
            return Err(Error::invalid_argument(format!(
                "{} of size {} cannot back {position_count} positions",
                V::NAME,
                values.size()
            )));
        }
        let mask = if values.has_null_value()? {
            Some(Arc::from(values.raw_value_nulls()?))
        } else {
            None
        };
        Self::assemble(values, 0, position_count, mask)
    }

    fn assemble(
        values: V,
        array_offset: usize,
        position_count: usize,
        value_is_null: Option<Arc<[u8]>>,
    ) -> Result<Self> {
        let size_in_bytes = values.region_size_in_bytes(0, position_count)?;
        let mask_bytes = value_is_null.as_ref().map_or(0, |m| m.len() as u64);
        let retained_size_in_bytes =
            Self::INSTANCE_SIZE + mask_bytes + values.capacity_in_bytes() as u64;
        Ok(Self {
            values,
            array_offset,
            position_count,
            value_is_null,
            size_in_bytes,
            retained_size_in_bytes,
        })
    }

    /// The backing vector.
    #[must_use]
    pub fn values(&self) -> &V {
        &self.values
    }

    /// Offset of position 0 within the null mask.
    #[must_use]
    pub fn array_offset(&self) -> usize {
        self.array_offset
    }

    /// The null mask window of this block, if it has one.
    #[must_use]
    pub fn value_is_null(&self) -> Option<&[u8]> {
        self.value_is_null
            .as_deref()
            .map(|m| &m[self.array_offset..self.array_offset + self.position_count])
    }

    fn null_at(&self, position: usize) -> bool {
        self.value_is_null
            .as_ref()
            .is_some_and(|m| m[position + self.array_offset] == NULL_MARKER)
    }

    fn read_typed<T>(
        &self,
        position: usize,
        sub_offset: usize,
        expected: DataType,
        read: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<T> {
        check_readable_position(position, self.position_count)?;
        if sub_offset != 0 {
            return Err(Error::invalid_argument(format!(
                "sub-offset must be zero, got {sub_offset}"
            )));
        }
        if V::DATA_TYPE != expected {
            return Err(Error::unsupported(format!(
                "reading {expected} from {}",
                V::BLOCK_NAME
            )));
        }
        let value = V::item_to_value(self.values.get(position)?);
        read(&value).ok_or_else(|| {
            Error::illegal_state(format!("{} returned a {}", V::NAME, value.type_name()))
        })
    }

    fn boxed(self) -> Box<dyn Block> {
        Box::new(self)
    }
}

impl<V: BlockElement> Block for TypedBlock<V> {
    fn data_type(&self) -> DataType {
        V::DATA_TYPE
    }

    fn position_count(&self) -> usize {
        self.position_count
    }

    fn encoding_name(&self) -> &'static str {
        V::ENCODING_NAME
    }

    fn is_null(&self, position: usize) -> Result<bool> {
        check_readable_position(position, self.position_count)?;
        self.values.check_live()?;
        Ok(self.null_at(position))
    }

    fn may_have_null(&self) -> bool {
        self.value_is_null.is_some()
    }

    fn get(&self, position: usize) -> Result<Value> {
        if self.is_null(position)? {
            return Ok(Value::Null);
        }
        self.values.get(position).map(V::item_to_value)
    }

    fn get_byte(&self, position: usize, sub_offset: usize) -> Result<i8> {
        self.read_typed(position, sub_offset, DataType::Byte, Value::as_byte)
    }

    fn get_int(&self, position: usize, sub_offset: usize) -> Result<i32> {
        self.read_typed(position, sub_offset, DataType::Int, Value::as_int)
    }

    fn get_long(&self, position: usize, sub_offset: usize) -> Result<i64> {
        self.read_typed(position, sub_offset, DataType::Long, Value::as_long)
    }

    fn get_double(&self, position: usize, sub_offset: usize) -> Result<f64> {
        self.read_typed(position, sub_offset, DataType::Double, Value::as_double)
    }

    fn get_slice_length(&self, position: usize) -> Result<usize> {
        check_readable_position(position, self.position_count)?;
        Ok(self.values.bytes_at(position)?.len())
    }

    fn get_slice(&self, position: usize, offset: usize, length: usize) -> Result<&[u8]> {
        check_readable_position(position, self.position_count)?;
        let bytes = self.values.bytes_at(position)?;
        check_array_range(bytes.len(), offset, length)?;
        Ok(&bytes[offset..offset + length])
    }

    fn write_position_to(&self, position: usize, builder: &mut dyn BlockBuilder) -> Result<()> {
        if self.is_null(position)? {
            return builder.append_null();
        }
        V::write_item(&self.values.get(position)?, builder)?;
        builder.close_entry()
    }

    fn get_single_value_block(&self, position: usize) -> Result<Box<dyn Block>> {
        check_readable_position(position, self.position_count)?;
        self.copy_region(position, 1)
    }

    fn copy_positions(
        &self,
        positions: &[usize],
        offset: usize,
        length: usize,
    ) -> Result<Box<dyn Block>> {
        check_array_range(positions.len(), offset, length)?;
        let selected = &positions[offset..offset + length];
        for &position in selected {
            check_readable_position(position, self.position_count)?;
        }
        let values = self.values.copy_positions(selected, 0, length)?;
        let mask = self.value_is_null.as_ref().map(|m| {
            selected
                .iter()
                .map(|p| m[p + self.array_offset])
                .collect::<Arc<[u8]>>()
        });
        Ok(Self::assemble(values, 0, length, mask)?.boxed())
    }

    fn get_region(&self, offset: usize, length: usize) -> Result<Box<dyn Block>> {
        check_valid_region(self.position_count, offset, length)?;
        let values = self.values.slice(offset, offset + length)?;
        Ok(Self::assemble(
            values,
            self.array_offset + offset,
            length,
            self.value_is_null.clone(),
        )?
        .boxed())
    }

    fn copy_region(&self, offset: usize, length: usize) -> Result<Box<dyn Block>> {
        check_valid_region(self.position_count, offset, length)?;
        let values = self.values.copy_region(offset, length)?;
        let start = self.array_offset + offset;
        let mask = self
            .value_is_null
            .as_ref()
            .map(|m| Arc::from(&m[start..start + length]));
        Ok(Self::assemble(values, 0, length, mask)?.boxed())
    }

    fn filter_bloom(&self, bloom: &BloomFilter, valid: &mut [bool]) -> Result<()> {
        if valid.len() < self.position_count {
            return Err(Error::invalid_argument(format!(
                "validity array of {} is shorter than {} positions",
                valid.len(),
                self.position_count
            )));
        }
        for (position, flag) in valid[..self.position_count].iter_mut().enumerate() {
            if *flag {
                *flag = bloom.test(&self.get(position)?);
            }
        }
        Ok(())
    }

    fn filter(
        &self,
        positions: &[usize],
        position_count: usize,
        matched: &mut [usize],
        predicate: &dyn Fn(&Value) -> bool,
    ) -> Result<usize> {
        if positions.len() < position_count || matched.len() < position_count {
            return Err(Error::invalid_argument(format!(
                "positions ({}) and matched ({}) must hold {position_count} entries",
                positions.len(),
                matched.len()
            )));
        }
        let mut match_count = 0;
        for &position in &positions[..position_count] {
            if predicate(&self.get(position)?) {
                matched[match_count] = position;
                match_count += 1;
            }
        }
        Ok(match_count)
    }

    fn size_in_bytes(&self) -> u64 {
        self.size_in_bytes
    }

    fn retained_size_in_bytes(&self) -> u64 {
        self.retained_size_in_bytes
    }

    fn region_size_in_bytes(&self, position: usize, length: usize) -> Result<u64> {
        check_valid_region(self.position_count, position, length)?;
        self.values.region_size_in_bytes(position, length)
    }

    fn positions_size_in_bytes(&self, selected: &[bool]) -> Result<u64> {
        if selected.len() > self.position_count {
            return Err(Error::invalid_argument(format!(
                "selection of {} exceeds {} positions",
                selected.len(),
                self.position_count
            )));
        }
        let mut size = 0;
        for (position, _) in selected.iter().enumerate().filter(|(_, s)| **s) {
            size += self.values.value_size_in_bytes(position)? + V::POSITION_OVERHEAD;
        }
        Ok(size)
    }

    fn estimated_data_size_for_stats(&self, position: usize) -> Result<u64> {
        if self.is_null(position)? {
            return Ok(0);
        }
        self.values.value_size_in_bytes(position)
    }

    fn retained_bytes_for_each_part(&self, consumer: &mut dyn FnMut(BlockPart, u64)) {
        consumer(BlockPart::Values, self.values.capacity_in_bytes() as u64);
        if let Some(mask) = &self.value_is_null {
            consumer(BlockPart::NullMask, mask.len() as u64);
        }
        consumer(BlockPart::Instance, Self::INSTANCE_SIZE);
    }

    fn set_closable(&mut self, closable: bool) {
        self.values.set_closable(closable);
    }

    fn close(&mut self) -> Result<()> {
        self.values.close()
    }

    fn into_vector(self: Box<Self>) -> Result<AnyVector> {
        let this = *self;
        this.values.check_live()?;
        Ok(this.values.into_any())
    }
}

impl<V: BlockElement> fmt::Display for TypedBlock<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{positionCount={}}}", V::BLOCK_NAME, self.position_count)
    }
}
