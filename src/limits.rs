//! Resource limits for buffer allocation.
//!
//! [`ResourceLimits`] caps what the allocator will hand out. [`LimitExceeded`]
//! is returned when a check fails. Checks run before any memory is reserved.

use crate::buffer::BYTES_PER_PIXEL;

/// Resource limits for allocation.
///
/// All fields are optional; `None` means no limit for that resource. The
/// engine checks pixel buffers against the dimension, pixel and memory
/// limits, and weight buffers against the kernel and memory limits.
///
/// # Example
///
/// ```
/// use pixbuf_engine::ResourceLimits;
///
/// let limits = ResourceLimits::none()
///     .with_max_pixels(16_000_000)
///     .with_max_memory(64 * 1024 * 1024);
/// assert!(limits.has_any());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Maximum total pixels (width × height).
    pub max_pixels: Option<u64>,
    /// Maximum size of a single allocation in bytes.
    pub max_memory_bytes: Option<u64>,
    /// Maximum image width in pixels.
    pub max_width: Option<u32>,
    /// Maximum image height in pixels.
    pub max_height: Option<u32>,
    /// Maximum number of kernel weights.
    pub max_kernel_len: Option<u64>,
}

impl ResourceLimits {
    /// No limits (all fields `None`).
    pub const fn none() -> Self {
        Self {
            max_pixels: None,
            max_memory_bytes: None,
            max_width: None,
            max_height: None,
            max_kernel_len: None,
        }
    }

    /// Set maximum total pixels.
    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = Some(max);
        self
    }

    /// Set maximum size of a single allocation in bytes.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Set maximum image width in pixels.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Set maximum image height in pixels.
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Set maximum number of kernel weights.
    pub fn with_max_kernel_len(mut self, len: u64) -> Self {
        self.max_kernel_len = Some(len);
        self
    }

    /// Whether any limits are set.
    pub fn has_any(&self) -> bool {
        self.max_pixels.is_some()
            || self.max_memory_bytes.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
            || self.max_kernel_len.is_some()
    }

    // --- Validation methods ---

    /// Check a `width × height` RGBA8 buffer: width, height, pixel count,
    /// then its byte size against `max_memory_bytes`.
    pub fn check_pixel_buffer(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_width.filter(|&max| width > max) {
            return Err(LimitExceeded::Width { actual: width, max });
        }
        if let Some(max) = self.max_height.filter(|&max| height > max) {
            return Err(LimitExceeded::Height {
                actual: height,
                max,
            });
        }
        let pixels = u64::from(width) * u64::from(height);
        if let Some(max) = exceeded(self.max_pixels, pixels) {
            return Err(LimitExceeded::Pixels {
                actual: pixels,
                max,
            });
        }
        self.check_memory(pixels.saturating_mul(BYTES_PER_PIXEL as u64))
    }

    /// Check a buffer of `len` weights: count first, then byte size.
    pub fn check_weight_buffer(&self, len: usize) -> Result<(), LimitExceeded> {
        let len = len as u64;
        if let Some(max) = exceeded(self.max_kernel_len, len) {
            return Err(LimitExceeded::KernelLength { actual: len, max });
        }
        self.check_memory(len.saturating_mul(core::mem::size_of::<f64>() as u64))
    }

    fn check_memory(&self, bytes: u64) -> Result<(), LimitExceeded> {
        match exceeded(self.max_memory_bytes, bytes) {
            Some(max) => Err(LimitExceeded::Memory { actual: bytes, max }),
            None => Ok(()),
        }
    }
}

/// The limit, if `actual` is over it.
#[inline]
fn exceeded(limit: Option<u64>, actual: u64) -> Option<u64> {
    limit.filter(|&max| actual > max)
}

/// A resource limit was exceeded.
///
/// Each variant carries the actual value and the limit that was exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitExceeded {
    /// Image width exceeded `max_width`.
    Width {
        /// Actual width.
        actual: u32,
        /// Maximum allowed.
        max: u32,
    },
    /// Image height exceeded `max_height`.
    Height {
        /// Actual height.
        actual: u32,
        /// Maximum allowed.
        max: u32,
    },
    /// Pixel count exceeded `max_pixels`.
    Pixels {
        /// Actual pixel count.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
    /// Allocation size exceeded `max_memory_bytes`.
    Memory {
        /// Requested bytes.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
    /// Weight count exceeded `max_kernel_len`.
    KernelLength {
        /// Requested weights.
        actual: u64,
        /// Maximum allowed.
        max: u64,
    },
}

impl core::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Width { actual, max } => write!(f, "width {actual} exceeds limit {max}"),
            Self::Height { actual, max } => write!(f, "height {actual} exceeds limit {max}"),
            Self::Pixels { actual, max } => {
                write!(f, "pixel count {actual} exceeds limit {max}")
            }
            Self::Memory { actual, max } => {
                write!(f, "allocation of {actual} bytes exceeds limit {max}")
            }
            Self::KernelLength { actual, max } => {
                write!(f, "kernel length {actual} exceeds limit {max}")
            }
        }
    }
}

impl core::error::Error for LimitExceeded {}
