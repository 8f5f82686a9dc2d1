//! Owned pixel and weight storage.
//!
//! [`PixelBuffer`] holds tightly packed RGBA8 rows; [`WeightBuffer`] holds the
//! `f64` weights of a flattened square kernel. Both are allocated fallibly:
//! a failed reservation surfaces as [`EngineError::Allocation`] instead of
//! aborting the process.

use alloc::vec::Vec;
use core::fmt;

use imgref::{ImgRef, ImgVec};
use rgb::Rgba;

use crate::error::EngineError;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Channel offsets within one RGBA8 pixel.
pub mod channel {
    use rgb::Rgba;

    /// Red.
    pub const R: usize = 0;
    /// Green.
    pub const G: usize = 1;
    /// Blue.
    pub const B: usize = 2;
    /// Alpha.
    pub const A: usize = 3;

    /// Read one pixel from its 4 bytes.
    #[inline]
    pub fn load(px: &[u8]) -> Rgba<u8> {
        Rgba::new(px[R], px[G], px[B], px[A])
    }

    /// Write one pixel into its 4 bytes.
    #[inline]
    pub fn store(dst: &mut [u8], px: &Rgba<u8>) {
        dst[R] = px.r;
        dst[G] = px.g;
        dst[B] = px.b;
        dst[A] = px.a;
    }
}

/// Byte length of a `width × height` RGBA8 image, or `None` on overflow.
#[inline]
pub const fn rgba_len(width: u32, height: u32) -> Option<usize> {
    match (width as usize).checked_mul(height as usize) {
        Some(pixels) => pixels.checked_mul(BYTES_PER_PIXEL),
        None => None,
    }
}

/// Reserve exactly `len` zeroed elements without aborting on failure.
fn try_zeroed<T: Copy + Default>(len: usize) -> Result<Vec<T>, EngineError> {
    let bytes = len.saturating_mul(core::mem::size_of::<T>());
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| EngineError::Allocation { bytes })?;
    data.resize(len, T::default());
    Ok(data)
}

// ---------------------------------------------------------------------------
// PixelBuffer
// ---------------------------------------------------------------------------

/// Owned RGBA8 pixel buffer of exactly `width * height * 4` bytes.
///
/// Rows are tightly packed, top to bottom, channels interleaved R, G, B, A.
#[non_exhaustive]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidDimensions`] if the byte length overflows,
    /// [`EngineError::Allocation`] if the memory cannot be reserved.
    pub fn try_new(width: u32, height: u32) -> Result<Self, EngineError> {
        let len = rgba_len(width, height).ok_or(EngineError::InvalidDimensions {
            width: width.into(),
            height: height.into(),
        })?;
        Ok(Self {
            data: try_zeroed(len)?,
            width,
            height,
        })
    }

    /// Copy a typed image into a new buffer.
    pub fn from_imgref(img: ImgRef<'_, Rgba<u8>>) -> Result<Self, EngineError> {
        let mut buf = Self::try_new(img.width() as u32, img.height() as u32)?;
        for (dst, px) in buf
            .data
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(img.rows().flatten())
        {
            channel::store(dst, px);
        }
        Ok(buf)
    }

    /// Copy into a typed image.
    pub fn to_imgvec(&self) -> ImgVec<Rgba<u8>> {
        let pixels = self
            .data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(channel::load)
            .collect();
        ImgVec::new(pixels, self.width as usize, self.height as usize)
    }

    /// Image width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte length (`width * height * 4`).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All pixel bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// All pixel bytes, mutably.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Address of the first byte, for the host boundary.
    #[inline]
    pub fn address(&self) -> usize {
        self.data.as_ptr() as usize
    }

    /// The leading `width × height` image of this buffer, as bytes.
    ///
    /// Transforms take their dimensions from the caller, which may declare a
    /// smaller image than the buffer was allocated for.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DimensionMismatch`] if the declared image does
    /// not fit.
    pub fn declared(&self, width: u32, height: u32) -> Result<&[u8], EngineError> {
        let expected = rgba_len(width, height).ok_or(EngineError::InvalidDimensions {
            width: width.into(),
            height: height.into(),
        })?;
        self.data
            .get(..expected)
            .ok_or(EngineError::DimensionMismatch {
                expected,
                actual: self.data.len(),
            })
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelBuffer({}x{}, RGBA8)", self.width, self.height)
    }
}

impl From<ImgVec<Rgba<u8>>> for PixelBuffer {
    fn from(img: ImgVec<Rgba<u8>>) -> Self {
        let width = img.width() as u32;
        let height = img.height() as u32;
        let mut data = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for px in img.rows().flatten() {
            data.extend_from_slice(&[px.r, px.g, px.b, px.a]);
        }
        Self {
            data,
            width,
            height,
        }
    }
}

// ---------------------------------------------------------------------------
// WeightBuffer
// ---------------------------------------------------------------------------

/// Owned kernel weights, host-endian `f64`.
#[non_exhaustive]
pub struct WeightBuffer {
    data: Vec<f64>,
}

impl WeightBuffer {
    /// Allocate `len` zeroed weights.
    ///
    /// # Errors
    ///
    /// [`EngineError::Allocation`] if the memory cannot be reserved.
    pub fn try_new(len: usize) -> Result<Self, EngineError> {
        Ok(Self {
            data: try_zeroed(len)?,
        })
    }

    /// Copy weights from a slice.
    pub fn from_slice(weights: &[f64]) -> Result<Self, EngineError> {
        let mut buf = Self::try_new(weights.len())?;
        buf.data.copy_from_slice(weights);
        Ok(buf)
    }

    /// Number of weights.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no weights.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The weights.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The weights, mutably.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Address of the first weight, for the host boundary.
    #[inline]
    pub fn address(&self) -> usize {
        self.data.as_ptr() as usize
    }
}

impl fmt::Debug for WeightBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeightBuffer({} weights)", self.data.len())
    }
}
