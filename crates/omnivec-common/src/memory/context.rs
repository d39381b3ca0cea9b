//! Hierarchical memory accounting.
//!
//! A [`MemoryContext`] tracks how many bytes of native memory are attributed to
//! it. Contexts form a tree (task -> operator): a reservation in a child is also
//! charged to every ancestor, and a limit anywhere on the path rejects it. This
//! is what the host's admission control reads, so reservations must match the
//! real allocation sizes exactly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arcstr::ArcStr;
use parking_lot::Mutex;

use crate::collections::{FxMap, fx_map};
use crate::error::{Error, Result};

/// Thread-safe memory accounting node.
#[derive(Debug)]
pub struct MemoryContext {
    /// Name used in errors and logs.
    name: ArcStr,
    /// Maximum bytes this context may hold (None for unlimited).
    limit: Option<usize>,
    /// Bytes currently reserved.
    reserved: AtomicUsize,
    /// High-water mark of `reserved`.
    peak: AtomicUsize,
    /// Parent context charged alongside this one.
    parent: Option<Arc<MemoryContext>>,
    /// Per-tag usage, when tracking is enabled.
    by_tag: Option<Mutex<FxMap<ArcStr, usize>>>,
}

impl MemoryContext {
    /// Creates a root context.
    #[must_use]
    pub fn root(name: impl Into<ArcStr>, limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            limit,
            reserved: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent: None,
            by_tag: None,
        })
    }

    /// Creates a root context that also records usage per allocation tag.
    #[must_use]
    pub fn root_with_tag_tracking(name: impl Into<ArcStr>, limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            limit,
            reserved: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent: None,
            by_tag: Some(Mutex::new(fx_map())),
        })
    }

    /// Creates a child context whose reservations are also charged to `self`.
    #[must_use]
    pub fn new_child(self: &Arc<Self>, name: impl Into<ArcStr>, limit: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            limit,
            reserved: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            parent: Some(Arc::clone(self)),
            by_tag: self.by_tag.as_ref().map(|_| Mutex::new(fx_map())),
        })
    }

    /// Returns the context name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the limit of this context.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Returns the parent context.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<MemoryContext>> {
        self.parent.as_ref()
    }

    /// Bytes currently reserved in this context (including children).
    #[must_use]
    pub fn reserved_bytes(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Highest value `reserved_bytes` has reached.
    #[must_use]
    pub fn peak_bytes(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of usage by tag, or `None` when tracking is off.
    #[must_use]
    pub fn usage_by_tag(&self) -> Option<Vec<(ArcStr, usize)>> {
        self.by_tag.as_ref().map(|tags| {
            let mut usage: Vec<_> = tags
                .lock()
                .iter()
                .filter(|(_, bytes)| **bytes > 0)
                .map(|(tag, bytes)| (tag.clone(), *bytes))
                .collect();
            usage.sort_by(|a, b| a.0.cmp(&b.0));
            usage
        })
    }

    /// Reserves `bytes` in this context and all ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceExhausted`] if any context on the path would
    /// exceed its limit. Nothing stays reserved on failure.
    pub fn try_reserve(&self, bytes: usize, tag: &ArcStr) -> Result<()> {
        if bytes == 0 {
            return Ok(());
        }
        let new_total = self.reserve_local(bytes)?;
        if let Some(parent) = &self.parent
            && let Err(e) = parent.try_reserve(bytes, tag)
        {
            self.reserved.fetch_sub(bytes, Ordering::AcqRel);
            return Err(e);
        }
        self.peak.fetch_max(new_total, Ordering::Relaxed);
        if let Some(tags) = &self.by_tag {
            *tags.lock().entry(tag.clone()).or_insert(0) += bytes;
        }
        Ok(())
    }

    /// Returns `bytes` to this context and all ancestors.
    pub fn free(&self, bytes: usize, tag: &ArcStr) {
        if bytes == 0 {
            return;
        }
        let previous = self.reserved.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(
            previous >= bytes,
            "context '{}' freed {bytes} bytes with only {previous} reserved",
            self.name
        );
        if let Some(tags) = &self.by_tag
            && let Some(used) = tags.lock().get_mut(tag)
        {
            *used = used.saturating_sub(bytes);
        }
        if let Some(parent) = &self.parent {
            parent.free(bytes, tag);
        }
    }

    /// Reserves in this context only and returns the new total.
    fn reserve_local(&self, bytes: usize) -> Result<usize> {
        let mut current = self.reserved.load(Ordering::Relaxed);
        loop {
            let new_total = current.saturating_add(bytes);
            if let Some(limit) = self.limit
                && new_total > limit
            {
                tracing::warn!(
                    context = %self.name,
                    requested = bytes,
                    reserved = current,
                    limit,
                    "memory reservation rejected"
                );
                return Err(Error::ResourceExhausted {
                    context: self.name.to_string(),
                    requested: bytes,
                    reserved: current,
                    limit,
                });
            }
            match self.reserved.compare_exchange_weak(
                current,
                new_total,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(new_total),
                Err(actual) => current = actual,
            }
        }
    }
}
