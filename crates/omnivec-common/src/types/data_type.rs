//! SQL column types supported by the vector runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The type of the values stored in a vector or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 8-bit signed integer, also used for boolean and mask columns.
    Byte,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 64-bit IEEE float.
    Double,
    /// Variable-width UTF-8 string.
    VarChar,
}

impl DataType {
    /// Width in bytes of one value, or `None` for variable-width types.
    #[must_use]
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Byte => Some(1),
            DataType::Int => Some(4),
            DataType::Long | DataType::Double => Some(8),
            DataType::VarChar => None,
        }
    }

    /// Returns `true` for integer types.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(self, DataType::Byte | DataType::Int | DataType::Long)
    }

    /// Returns `true` for types that can be summed or averaged.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, DataType::VarChar)
    }

    /// Returns the SQL name of this type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            DataType::Byte => "TINYINT",
            DataType::Int => "INTEGER",
            DataType::Long => "BIGINT",
            DataType::Double => "DOUBLE",
            DataType::VarChar => "VARCHAR",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
