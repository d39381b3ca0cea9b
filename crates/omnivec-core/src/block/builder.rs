//! Row-by-row block construction.

use arcstr::ArcStr;
use omnivec_common::memory::VecAllocator;
use omnivec_common::types::{DataType, Value};
use omnivec_common::{Error, Result};

use super::{Block, block_from_values};

/// Accumulates values one entry at a time.
///
/// An entry is either a value followed by [`close_entry`](Self::close_entry),
/// or a single [`append_null`](Self::append_null), which completes the entry
/// on its own.
pub trait BlockBuilder {
    /// Writes a TINYINT into the open entry.
    fn write_byte(&mut self, value: i8) -> Result<()>;
    /// Writes an INTEGER into the open entry.
    fn write_int(&mut self, value: i32) -> Result<()>;
    /// Writes a BIGINT into the open entry.
    fn write_long(&mut self, value: i64) -> Result<()>;
    /// Writes a DOUBLE into the open entry.
    fn write_double(&mut self, value: f64) -> Result<()>;
    /// Appends bytes to the open variable-width entry.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Appends a null entry.
    fn append_null(&mut self) -> Result<()>;
    /// Completes the open entry.
    fn close_entry(&mut self) -> Result<()>;
    /// Number of completed entries.
    fn position_count(&self) -> usize;
}

#[derive(Debug)]
enum Pending {
    Value(Value),
    Bytes(Vec<u8>),
}

/// A [`BlockBuilder`] that materializes a vector-backed block of one type.
#[derive(Debug)]
pub struct VectorBlockBuilder {
    data_type: DataType,
    allocator: VecAllocator,
    values: Vec<Value>,
    pending: Option<Pending>,
}

impl VectorBlockBuilder {
    /// Creates a builder for `data_type` allocating through `allocator`.
    #[must_use]
    pub fn new(data_type: DataType, allocator: &VecAllocator) -> Self {
        Self::with_capacity(data_type, allocator, 0)
    }

    /// Creates a builder expecting about `capacity` entries.
    #[must_use]
    pub fn with_capacity(data_type: DataType, allocator: &VecAllocator, capacity: usize) -> Self {
        Self {
            data_type,
            allocator: allocator.clone(),
            values: Vec::with_capacity(capacity),
            pending: None,
        }
    }

    /// Returns the column type being built.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    fn write_value(&mut self, value: Value) -> Result<()> {
        if value.data_type() != Some(self.data_type) {
            return Err(Error::illegal_state(format!(
                "cannot write a {} into a {} builder",
                value.type_name(),
                self.data_type
            )));
        }
        if self.pending.is_some() {
            return Err(Error::illegal_state("entry already holds a value"));
        }
        self.pending = Some(Pending::Value(value));
        Ok(())
    }

    /// Builds the block. Fails if an entry is still open.
    pub fn build(self) -> Result<Box<dyn Block>> {
        if self.pending.is_some() {
            return Err(Error::illegal_state("cannot build with an open entry"));
        }
        block_from_values(&self.allocator, self.data_type, &self.values)
    }
}

impl BlockBuilder for VectorBlockBuilder {
    fn write_byte(&mut self, value: i8) -> Result<()> {
        self.write_value(Value::Byte(value))
    }

    fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_value(Value::Int(value))
    }

    fn write_long(&mut self, value: i64) -> Result<()> {
        self.write_value(Value::Long(value))
    }

    fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_value(Value::Double(value))
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data_type != DataType::VarChar {
            return Err(Error::illegal_state(format!(
                "cannot write bytes into a {} builder",
                self.data_type
            )));
        }
        match &mut self.pending {
            Some(Pending::Bytes(buf)) => buf.extend_from_slice(bytes),
            Some(Pending::Value(_)) => {
                return Err(Error::illegal_state("entry already holds a value"));
            }
            None => self.pending = Some(Pending::Bytes(bytes.to_vec())),
        }
        Ok(())
    }

    fn append_null(&mut self) -> Result<()> {
        if self.pending.is_some() {
            return Err(Error::illegal_state("cannot append null to an open entry"));
        }
        self.values.push(Value::Null);
        Ok(())
    }

    fn close_entry(&mut self) -> Result<()> {
        let value = match self.pending.take() {
            None => return Err(Error::illegal_state("no entry to close")),
            Some(Pending::Value(value)) => value,
            Some(Pending::Bytes(bytes)) => {
                let s = String::from_utf8(bytes)
                    .map_err(|e| Error::invalid_argument(format!("entry is not UTF-8: {e}")))?;
                Value::VarChar(ArcStr::from(s))
            }
        };
        self.values.push(value);
        Ok(())
    }

    fn position_count(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnivec_common::memory::MemoryContext;

    fn allocator() -> VecAllocator {
        VecAllocator::new(MemoryContext::root("test", None))
    }

    #[test]
    fn test_build_long_block() {
        let mut builder = VectorBlockBuilder::new(DataType::Long, &allocator());
        builder.write_long(7).unwrap();
        builder.close_entry().unwrap();
        builder.append_null().unwrap();
        builder.write_long(-1).unwrap();
        builder.close_entry().unwrap();
        assert_eq!(builder.position_count(), 3);

        let block = builder.build().unwrap();
        assert_eq!(block.position_count(), 3);
        assert_eq!(block.get_long(0, 0).unwrap(), 7);
        assert!(block.is_null(1).unwrap());
        assert_eq!(block.get(2).unwrap(), Value::Long(-1));
    }

    #[test]
    fn test_bytes_are_concatenated() {
        let mut builder = VectorBlockBuilder::new(DataType::VarChar, &allocator());
        builder.write_bytes(b"he").unwrap();
        builder.write_bytes(b"llo").unwrap();
        builder.close_entry().unwrap();
        let block = builder.build().unwrap();
        assert_eq!(block.get(0).unwrap(), Value::from("hello"));
    }

    #[test]
    fn test_entry_protocol_errors() {
        let mut builder = VectorBlockBuilder::new(DataType::Int, &allocator());
        assert!(matches!(builder.close_entry(), Err(Error::IllegalState(_))));
        assert!(matches!(builder.write_long(1), Err(Error::IllegalState(_))));
        assert!(matches!(builder.write_bytes(b"x"), Err(Error::IllegalState(_))));

        builder.write_int(1).unwrap();
        assert!(builder.write_int(2).is_err());
        assert!(builder.append_null().is_err());
        builder.close_entry().unwrap();

        builder.write_int(3).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_empty_build() {
        let builder = VectorBlockBuilder::new(DataType::Double, &allocator());
        let block = builder.build().unwrap();
        assert_eq!(block.position_count(), 0);
        assert!(!block.may_have_null());
    }
}
