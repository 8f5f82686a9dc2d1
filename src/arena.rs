//! Generational arena backing the buffer allocator.
//!
//! Buffers live in slots addressed by a [`RawHandle`]: slot index, slot
//! generation and arena id packed into a `u64`. Releasing a slot bumps its
//! generation, so a stale handle no longer matches; a handle minted by a
//! different arena carries the wrong arena id. Both are rejected instead of
//! touching memory the caller no longer owns.
//!
//! Typed wrappers ([`PixelHandle`], [`WeightHandle`]) are neither `Copy` nor
//! `Clone`, and release consumes them, so double release does not compile.
//! Only the boundary layer rebuilds typed handles from raw integers.

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU16, Ordering};

use crate::error::{EngineError, HandleFault};

static NEXT_ARENA_ID: AtomicU16 = AtomicU16::new(1);

/// Allocate a fresh, non-zero arena id.
fn next_arena_id() -> u16 {
    loop {
        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 {
            return id;
        }
    }
}

// ---------------------------------------------------------------------------
// RawHandle
// ---------------------------------------------------------------------------

/// Untyped handle as it crosses the host boundary.
///
/// Layout: bits 0..32 slot index, 32..48 slot generation, 48..64 arena id.
/// Arena ids start at 1, so `0` is never a valid handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(u64);

impl RawHandle {
    /// The null handle. Never issued.
    pub const NULL: Self = Self(0);

    const fn pack(arena: u16, generation: u16, index: u32) -> Self {
        Self(((arena as u64) << 48) | ((generation as u64) << 32) | index as u64)
    }

    /// Reinterpret an integer received from the host.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Integer form handed to the host.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    #[inline]
    const fn arena(self) -> u16 {
        (self.0 >> 48) as u16
    }

    #[inline]
    const fn generation(self) -> u16 {
        (self.0 >> 32) as u16
    }

    #[inline]
    const fn index(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RawHandle(arena={}, slot={}, gen={})",
            self.arena(),
            self.index(),
            self.generation()
        )
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Typed handles
// ---------------------------------------------------------------------------

/// Owned handle to a slot in an [`Arena<T>`].
///
/// Not `Clone`: whoever holds the value owns the buffer.
pub struct Handle<T> {
    raw: RawHandle,
    _owns: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    const fn new(raw: RawHandle) -> Self {
        Self {
            raw,
            _owns: PhantomData,
        }
    }

    /// Rebuild a handle from a raw value received from the host.
    ///
    /// Nothing is validated here; lookups and release check the slot.
    #[inline]
    pub const fn from_raw(raw: RawHandle) -> Self {
        Self::new(raw)
    }

    /// The raw value, without giving up ownership.
    #[inline]
    pub const fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Give up the typed handle, e.g. to pass ownership to the host.
    #[inline]
    pub const fn into_raw(self) -> RawHandle {
        self.raw
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:?})", self.raw)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

/// Handle to a [`PixelBuffer`](crate::PixelBuffer).
pub type PixelHandle = Handle<crate::PixelBuffer>;

/// Handle to a [`WeightBuffer`](crate::WeightBuffer).
pub type WeightHandle = Handle<crate::WeightBuffer>;

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

struct Slot<T> {
    generation: u16,
    value: Option<T>,
}

/// Slot storage with generation-checked handles and a free list.
pub struct Arena<T> {
    id: u16,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena with a process-unique id.
    pub fn new() -> Self {
        Self {
            id: next_arena_id(),
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of occupied slots.
    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    /// Store `value` and return its owning handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Allocation`] if the slot table cannot grow.
    pub fn insert(&mut self, value: T) -> Result<Handle<T>, EngineError> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    EngineError::Allocation {
                        bytes: core::mem::size_of::<Slot<T>>(),
                    }
                })?;
                self.slots
                    .try_reserve(1)
                    .map_err(|_| EngineError::Allocation {
                        bytes: core::mem::size_of::<Slot<T>>(),
                    })?;
                self.slots.push(Slot {
                    generation: 0,
                    value: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;
        Ok(Handle::new(RawHandle::pack(self.id, slot.generation, index)))
    }

    /// Borrow the value behind `raw`.
    pub fn get(&self, raw: RawHandle) -> Result<&T, EngineError> {
        let index = self.locate(raw)?;
        self.slots[index]
            .value
            .as_ref()
            .ok_or(EngineError::InvalidHandle {
                handle: raw,
                fault: HandleFault::Released,
            })
    }

    /// Mutably borrow the value behind `raw`.
    pub fn get_mut(&mut self, raw: RawHandle) -> Result<&mut T, EngineError> {
        let index = self.locate(raw)?;
        self.slots[index]
            .value
            .as_mut()
            .ok_or(EngineError::InvalidHandle {
                handle: raw,
                fault: HandleFault::Released,
            })
    }

    /// Remove the value behind `raw` and return it.
    ///
    /// The slot's generation is bumped, so every copy of the raw handle is
    /// now stale. A slot whose generation would wrap is retired instead of
    /// being reused.
    pub fn remove(&mut self, raw: RawHandle) -> Result<T, EngineError> {
        let index = self.locate(raw)?;
        let slot = &mut self.slots[index];
        let value = slot.value.take().ok_or(EngineError::InvalidHandle {
            handle: raw,
            fault: HandleFault::Released,
        })?;
        self.live -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(raw.index());
            }
            None => slot.generation = u16::MAX,
        }
        Ok(value)
    }

    fn locate(&self, raw: RawHandle) -> Result<usize, EngineError> {
        let fault = |fault| EngineError::InvalidHandle { handle: raw, fault };
        if raw.arena() != self.id {
            return Err(fault(HandleFault::Foreign));
        }
        let index = raw.index() as usize;
        let slot = self.slots.get(index).ok_or(fault(HandleFault::Unknown))?;
        if slot.generation != raw.generation() {
            return Err(fault(if slot.generation > raw.generation() {
                HandleFault::Released
            } else {
                HandleFault::Unknown
            }));
        }
        Ok(index)
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Arena(id={}, live={}, slots={})",
            self.id,
            self.live,
            self.slots.len()
        )
    }
}
