//! Native memory allocation and accounting.
//!
//! - [`MemoryContext`] - hierarchical, thread-safe byte accounting with limits
//! - [`VecAllocator`] - allocates native buffers charged to a context
//! - [`RawAllocation`] - an owned native buffer, released on drop

mod allocator;
mod context;

pub use allocator::{RawAllocation, VecAllocator};
pub use context::MemoryContext;
