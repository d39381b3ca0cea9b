//! Column types and the dynamic scalar [`Value`].

mod data_type;
mod value;

pub use data_type::DataType;
pub use value::Value;
