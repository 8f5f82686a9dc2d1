//! Host boundary: one process-wide engine behind a mutex.
//!
//! Handles cross the boundary as `u64` and dimensions as `i32`, the shapes a
//! managed host can pass. Raw addresses appear only here, so the host can
//! copy bytes in and out of linear memory; nothing in this crate
//! dereferences them.
//!
//! Typical host sequence:
//!
//! ```
//! use pixbuf_engine::boundary;
//!
//! let input = boundary::allocate_pixels(2, 1)?;
//! boundary::write_pixels(input, &[255, 0, 0, 255, 0, 255, 0, 255])?;
//! boundary::grayscale(input, 2, 1)?;
//! let size = boundary::last_result_size();
//! let output = boundary::last_result_handle();
//! let bytes = boundary::read_pixels(output)?;
//! assert_eq!(bytes.len(), size);
//! boundary::release_pixels(input)?;
//! boundary::release_pixels(output)?;
//! # Ok::<(), pixbuf_engine::EngineError>(())
//! ```
//!
//! Each call holds the lock for its whole duration, so a descriptor read
//! after a call always belongs to exactly one transform. Reading it before
//! the next call is still the caller's job.

use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::vec::Vec;

use crate::arena::{PixelHandle, RawHandle, WeightHandle};
use crate::engine::Engine;
use crate::error::EngineError;

static ENGINE: LazyLock<Mutex<Engine>> = LazyLock::new(|| Mutex::new(Engine::new()));

fn engine() -> MutexGuard<'static, Engine> {
    ENGINE.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dimensions(width: i32, height: i32) -> Result<(u32, u32), EngineError> {
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(EngineError::InvalidDimensions {
            width: width.into(),
            height: height.into(),
        }),
    }
}

fn kernel_len(len: i32) -> Result<usize, EngineError> {
    usize::try_from(len).map_err(|_| EngineError::MalformedKernel { len: len.into() })
}

fn pixel(handle: u64) -> PixelHandle {
    PixelHandle::from_raw(RawHandle::from_bits(handle))
}

fn weight(handle: u64) -> WeightHandle {
    WeightHandle::from_raw(RawHandle::from_bits(handle))
}

// ---------------------------------------------------------------------------
// Allocator
// ---------------------------------------------------------------------------

/// Allocate a `width × height` RGBA8 buffer.
pub fn allocate_pixels(width: i32, height: i32) -> Result<u64, EngineError> {
    let (w, h) = dimensions(width, height)?;
    Ok(engine().allocate_pixels(w, h)?.into_raw().to_bits())
}

/// Allocate `len` kernel weights.
pub fn allocate_weights(len: i32) -> Result<u64, EngineError> {
    let len = kernel_len(len)?;
    Ok(engine().allocate_weights(len)?.into_raw().to_bits())
}

/// Release a pixel buffer, including transform outputs.
pub fn release_pixels(handle: u64) -> Result<(), EngineError> {
    engine().release_pixels_raw(RawHandle::from_bits(handle))
}

/// Release a weight buffer.
pub fn release_weights(handle: u64) -> Result<(), EngineError> {
    engine().release_weights_raw(RawHandle::from_bits(handle))
}

/// Address of a pixel buffer's first byte.
pub fn pixels_pointer(handle: u64) -> Result<usize, EngineError> {
    Ok(engine().pixels(&pixel(handle))?.address())
}

/// Address of a weight buffer's first element.
pub fn weights_pointer(handle: u64) -> Result<usize, EngineError> {
    Ok(engine().weights(&weight(handle))?.address())
}

/// Copy `bytes` into the start of a pixel buffer.
pub fn write_pixels(handle: u64, bytes: &[u8]) -> Result<(), EngineError> {
    let mut engine = engine();
    let buf = engine.pixels_mut(&pixel(handle))?;
    let actual = buf.len();
    let dst = buf
        .as_bytes_mut()
        .get_mut(..bytes.len())
        .ok_or(EngineError::DimensionMismatch {
            expected: bytes.len(),
            actual,
        })?;
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Copy `weights` into the start of a weight buffer.
pub fn write_weights(handle: u64, weights: &[f64]) -> Result<(), EngineError> {
    let mut engine = engine();
    let buf = engine.weights_mut(&weight(handle))?;
    let available = buf.len();
    let dst = buf
        .as_mut_slice()
        .get_mut(..weights.len())
        .ok_or(EngineError::KernelTooShort {
            len: weights.len(),
            available,
        })?;
    dst.copy_from_slice(weights);
    Ok(())
}

/// Copy a pixel buffer out.
pub fn read_pixels(handle: u64) -> Result<Vec<u8>, EngineError> {
    Ok(engine().pixels(&pixel(handle))?.as_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

fn run(
    op: impl FnOnce(&mut Engine) -> Result<PixelHandle, EngineError>,
) -> Result<(), EngineError> {
    // Ownership of the output moves to whoever reads the descriptor.
    op(&mut *engine()).map(|_output| ())
}

/// Grayscale with the reference luminance weights.
pub fn grayscale(input: u64, width: i32, height: i32) -> Result<(), EngineError> {
    let (w, h) = dimensions(width, height)?;
    run(|e| e.grayscale(&pixel(input), w, h))
}

/// Channel inversion.
pub fn invert(input: u64, width: i32, height: i32) -> Result<(), EngineError> {
    let (w, h) = dimensions(width, height)?;
    run(|e| e.invert(&pixel(input), w, h))
}

/// Red channel replicated into R, G and B.
pub fn replicate_red(input: u64, width: i32, height: i32) -> Result<(), EngineError> {
    let (w, h) = dimensions(width, height)?;
    run(|e| e.replicate_red(&pixel(input), w, h))
}

/// Weighted neighborhood convolution.
pub fn convolve(
    input: u64,
    width: i32,
    height: i32,
    weights: u64,
    weight_len: i32,
) -> Result<(), EngineError> {
    let len = kernel_len(weight_len)?;
    let (w, h) = dimensions(width, height)?;
    run(|e| e.convolve(&pixel(input), w, h, &weight(weights), len))
}

/// Center-tap convolution.
pub fn convolve_center_tap(
    input: u64,
    width: i32,
    height: i32,
    weights: u64,
    weight_len: i32,
) -> Result<(), EngineError> {
    let len = kernel_len(weight_len)?;
    let (w, h) = dimensions(width, height)?;
    run(|e| e.convolve_center_tap(&pixel(input), w, h, &weight(weights), len))
}

// ---------------------------------------------------------------------------
// Result registry
// ---------------------------------------------------------------------------

/// Address of the most recent output, or 0.
pub fn last_result_pointer() -> usize {
    engine().last_result_pointer()
}

/// Byte size of the most recent output, or 0.
pub fn last_result_size() -> usize {
    engine().last_result_size()
}

/// Handle of the most recent output, or 0.
pub fn last_result_handle() -> u64 {
    engine()
        .last_result()
        .map_or(RawHandle::NULL, |d| d.handle)
        .to_bits()
}

/// Publish counter of the most recent output, or 0 when the slot is empty.
pub fn last_result_generation() -> u64 {
    engine().last_result().map_or(0, |d| d.generation)
}
