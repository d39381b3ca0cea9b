//! Typed native buffers and the shared storage behind vectors and their views.

// Native buffers require unsafe code for typed access
#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use omnivec_common::memory::{RawAllocation, VecAllocator};
use omnivec_common::{Error, Result};

/// Marker stored in a null buffer for a null position.
pub const NULL_MARKER: u8 = 1;

/// Marker stored in a null buffer for a non-null position.
pub const NOT_NULL_MARKER: u8 = 0;

/// Element types whose all-zero bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must be plain-old-data: `Copy`, no padding, and valid when
/// zero-initialized.
pub unsafe trait Pod: Copy + Send + Sync + 'static {}

// SAFETY: primitive numeric types are valid for any bit pattern.
unsafe impl Pod for u8 {}
unsafe impl Pod for i8 {}
unsafe impl Pod for i32 {}
unsafe impl Pod for i64 {}
unsafe impl Pod for f64 {}

/// A fixed-length array of `T` in native memory.
#[derive(Debug)]
pub(crate) struct NativeBuffer<T: Pod> {
    raw: RawAllocation,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> NativeBuffer<T> {
    /// Allocates a zeroed buffer of `len` elements.
    pub(crate) fn allocate(allocator: &VecAllocator, len: usize) -> Result<Self> {
        let raw = allocator.allocate_array::<T>(len)?;
        Ok(Self {
            raw,
            len,
            _marker: PhantomData,
        })
    }

    pub(crate) fn as_slice(&self) -> &[T] {
        // SAFETY: the allocation holds `len` zero-initialized or written
        // elements of `T`, aligned by `Layout::array::<T>`.
        unsafe { std::slice::from_raw_parts(self.raw.as_ptr().cast::<T>(), self.len) }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.raw.as_mut_ptr().cast::<T>(), self.len) }
    }

    pub(crate) fn size_in_bytes(&self) -> usize {
        self.raw.size()
    }
}

/// Storage shared between an owning vector and its slices.
///
/// The owner flips `released` on close; every handle checks it before
/// touching the buffers. Memory itself goes back to the allocator when the
/// last handle drops its reference.
#[derive(Debug)]
pub(crate) struct SharedStorage<B> {
    buffers: B,
    released: AtomicBool,
}

impl<B> SharedStorage<B> {
    pub(crate) fn new(buffers: B) -> Self {
        Self {
            buffers,
            released: AtomicBool::new(false),
        }
    }

    pub(crate) fn buffers(&self, what: &'static str) -> Result<&B> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::UseAfterRelease(what));
        }
        Ok(&self.buffers)
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut B {
        &mut self.buffers
    }

    /// Marks the storage released. Fails if it already was.
    pub(crate) fn release(&self, what: &'static str) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Err(Error::UseAfterRelease(what));
        }
        Ok(())
    }
}

/// Whether a vector handle is responsible for releasing its storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The handle releases the storage on close.
    Owned,
    /// A view over storage owned by another handle.
    Borrowed,
}
