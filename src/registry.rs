//! Most-recent-result slot.
//!
//! Every transform publishes a [`ResultDescriptor`] for the buffer it
//! produced. The registry keeps exactly one: each publish overwrites the
//! previous descriptor and bumps a generation counter, so a reader holding
//! an older descriptor can tell it is no longer current.

use crate::arena::RawHandle;

/// Location and size of a produced buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResultDescriptor {
    /// Handle owning the buffer.
    pub handle: RawHandle,
    /// Address of the first byte.
    pub address: usize,
    /// Size in bytes.
    pub size: usize,
    /// Publish counter value at the time this descriptor was written.
    pub generation: u64,
}

/// Single-slot registry of the latest transform output.
#[derive(Debug, Default)]
pub struct ResultRegistry {
    slot: Option<ResultDescriptor>,
    generation: u64,
}

impl ResultRegistry {
    /// Empty registry.
    pub const fn new() -> Self {
        Self {
            slot: None,
            generation: 0,
        }
    }

    /// Overwrite the slot with a new descriptor.
    pub fn publish(&mut self, handle: RawHandle, address: usize, size: usize) -> ResultDescriptor {
        self.generation += 1;
        let descriptor = ResultDescriptor {
            handle,
            address,
            size,
            generation: self.generation,
        };
        if let Some(previous) = self.slot.replace(descriptor) {
            log::trace!(
                "result {} replaced unread result {}",
                descriptor.generation,
                previous.generation
            );
        }
        descriptor
    }

    /// The current descriptor, if any.
    #[inline]
    pub fn last(&self) -> Option<ResultDescriptor> {
        self.slot
    }

    /// Address of the latest result, or 0 when the slot is empty.
    #[inline]
    pub fn last_result_pointer(&self) -> usize {
        self.slot.map_or(0, |d| d.address)
    }

    /// Byte size of the latest result, or 0 when the slot is empty.
    #[inline]
    pub fn last_result_size(&self) -> usize {
        self.slot.map_or(0, |d| d.size)
    }

    /// Number of descriptors published so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `descriptor` is still the one in the slot.
    #[inline]
    pub fn is_current(&self, descriptor: &ResultDescriptor) -> bool {
        self.slot.as_ref() == Some(descriptor)
    }

    /// Empty the slot and return what it held.
    pub fn take(&mut self) -> Option<ResultDescriptor> {
        self.slot.take()
    }

    /// Empty the slot if it names `handle`.
    ///
    /// Called when a buffer is released so the slot never points at freed
    /// memory.
    pub fn forget(&mut self, handle: RawHandle) -> bool {
        if self.slot.is_some_and(|d| d.handle == handle) {
            self.slot = None;
            true
        } else {
            false
        }
    }
}
