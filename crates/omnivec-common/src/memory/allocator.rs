//! Native (off-heap) allocations charged to a memory context.
//!
//! [`VecAllocator`] is the handle vectors allocate through. Every
//! [`RawAllocation`] it hands out has reserved its exact byte size in the
//! allocator's [`MemoryContext`] first, and gives it back when dropped.

// Raw allocations require unsafe code for memory management
#![allow(unsafe_code)]

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use arcstr::ArcStr;

use super::MemoryContext;
use crate::error::{Error, Result};

/// Allocates native buffers and attributes them to a memory context.
///
/// Cheap to clone; clones share the same context and tag.
#[derive(Clone)]
pub struct VecAllocator {
    context: Arc<MemoryContext>,
    tag: ArcStr,
}

impl VecAllocator {
    /// Creates an allocator charging `context`, tagged with the context name.
    #[must_use]
    pub fn new(context: Arc<MemoryContext>) -> Self {
        let tag = ArcStr::from(context.name());
        Self { context, tag }
    }

    /// Creates an allocator with an explicit tag for per-tag accounting.
    #[must_use]
    pub fn with_tag(context: Arc<MemoryContext>, tag: impl Into<ArcStr>) -> Self {
        Self {
            context,
            tag: tag.into(),
        }
    }

    /// Creates an allocator over a new child context of this allocator's context.
    #[must_use]
    pub fn new_child(&self, name: impl Into<ArcStr>, limit: Option<usize>) -> Self {
        let name = name.into();
        let context = self.context.new_child(name.clone(), limit);
        Self { context, tag: name }
    }

    /// Returns the memory context this allocator charges.
    #[must_use]
    pub fn context(&self) -> &Arc<MemoryContext> {
        &self.context
    }

    /// Returns the accounting tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns `true` if both allocators charge the same context.
    #[must_use]
    pub fn same_context(&self, other: &VecAllocator) -> bool {
        Arc::ptr_eq(&self.context, &other.context)
    }

    /// Allocates `layout.size()` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if the memory context rejects the
    /// reservation or the system allocator returns null.
    pub fn allocate(&self, layout: Layout) -> Result<RawAllocation> {
        if layout.size() == 0 {
            return Ok(RawAllocation {
                ptr: dangling(layout.align()),
                layout,
                allocator: self.clone(),
            });
        }

        self.context.try_reserve(layout.size(), &self.tag)?;

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            self.context.free(layout.size(), &self.tag);
            return Err(Error::ResourceExhausted {
                context: self.context.name().to_string(),
                requested: layout.size(),
                reserved: self.context.reserved_bytes(),
                limit: self.context.limit().unwrap_or(usize::MAX),
            });
        };

        Ok(RawAllocation {
            ptr,
            layout,
            allocator: self.clone(),
        })
    }

    /// Allocates a zeroed array of `len` values of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the array size overflows, or
    /// [`Error::ResourceExhausted`] if the allocation is rejected.
    pub fn allocate_array<T>(&self, len: usize) -> Result<RawAllocation> {
        let layout = Layout::array::<T>(len)
            .map_err(|_| Error::invalid_argument(format!("array of {len} elements is too large")))?;
        self.allocate(layout)
    }
}

impl fmt::Debug for VecAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecAllocator")
            .field("context", &self.context.name())
            .field("tag", &self.tag)
            .field("reserved", &self.context.reserved_bytes())
            .finish()
    }
}

fn dangling(align: usize) -> NonNull<u8> {
    // A non-null, well-aligned address that is never dereferenced for a
    // zero-sized layout.
    NonNull::new(std::ptr::without_provenance_mut(align)).unwrap_or(NonNull::dangling())
}

/// An owned, zero-initialized native buffer.
///
/// Freed (and un-reserved) on drop.
pub struct RawAllocation {
    ptr: NonNull<u8>,
    layout: Layout,
    allocator: VecAllocator,
}

impl RawAllocation {
    /// Returns the base pointer.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Returns the base pointer for writing.
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Size of the buffer in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Returns the allocator that owns the reservation.
    #[must_use]
    pub fn allocator(&self) -> &VecAllocator {
        &self.allocator
    }
}

impl Drop for RawAllocation {
    fn drop(&mut self) {
        if self.layout.size() == 0 {
            return;
        }
        // SAFETY: We allocated this memory with the same layout
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
        self.allocator
            .context
            .free(self.layout.size(), &self.allocator.tag);
    }
}

impl fmt::Debug for RawAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAllocation")
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish_non_exhaustive()
    }
}

// SAFETY: RawAllocation uniquely owns its buffer; shared access is read-only
// and writes require `&mut self`.
unsafe impl Send for RawAllocation {}
unsafe impl Sync for RawAllocation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_accounted() {
        let ctx = MemoryContext::root("task", None);
        let allocator = VecAllocator::new(Arc::clone(&ctx));

        let buffer = allocator.allocate_array::<i64>(16).unwrap();
        assert_eq!(buffer.size(), 128);
        assert_eq!(ctx.reserved_bytes(), 128);

        drop(buffer);
        assert_eq!(ctx.reserved_bytes(), 0);
        assert_eq!(ctx.peak_bytes(), 128);
    }

    #[test]
    fn test_allocation_is_zeroed() {
        let ctx = MemoryContext::root("task", None);
        let allocator = VecAllocator::new(ctx);
        let buffer = allocator.allocate_array::<u8>(32).unwrap();
        // SAFETY: the buffer holds 32 initialized bytes
        let bytes = unsafe { std::slice::from_raw_parts(buffer.as_ptr(), 32) };
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_zero_sized_allocation() {
        let ctx = MemoryContext::root("task", Some(0));
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        let buffer = allocator.allocate_array::<i32>(0).unwrap();
        assert_eq!(buffer.size(), 0);
        assert_eq!(ctx.reserved_bytes(), 0);
    }

    #[test]
    fn test_limit_surfaces_resource_exhausted() {
        let ctx = MemoryContext::root("task", Some(100));
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        let err = allocator.allocate_array::<i64>(20).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { requested: 160, .. }));
        assert_eq!(ctx.reserved_bytes(), 0);
    }

    #[test]
    fn test_child_allocator() {
        let ctx = MemoryContext::root("task", None);
        let allocator = VecAllocator::new(Arc::clone(&ctx));
        let child = allocator.new_child("operator-1", Some(64));
        assert_eq!(child.tag(), "operator-1");
        assert!(!child.same_context(&allocator));

        let buffer = child.allocate_array::<i64>(8).unwrap();
        assert_eq!(child.context().reserved_bytes(), 64);
        assert_eq!(ctx.reserved_bytes(), 64);
        assert!(child.allocate_array::<u8>(1).is_err());
        drop(buffer);
        assert_eq!(ctx.reserved_bytes(), 0);
    }
}
