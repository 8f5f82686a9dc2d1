//! Square-kernel 2D convolution over RGBA8 images.
//!
//! For every output pixel the kernel window is centered on the pixel, each
//! in-bounds tap contributes `source * weight` to four independent channel
//! sums, and out-of-bounds taps are skipped (no padding, no edge
//! replication). Sums are truncated to integers and reduced to a byte by an
//! [`Overflow`] policy, then alpha is lifted by `bias`:
//! `a + bias * (255 - a)`.
//!
//! Two sampling modes exist. [`KernelSampling::Neighborhood`] is the real
//! weighted filter. [`KernelSampling::CenterTap`] reproduces the historical
//! export: weights are never read and every in-bounds tap adds the center
//! pixel, so each channel becomes `(center * taps_in_bounds) & 255`.

use enough::Stop;

use crate::buffer::{BYTES_PER_PIXEL, channel};
use crate::error::EngineError;
use crate::kernel::Kernel;

/// How a channel sum outside `[0, 255]` becomes a byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Overflow {
    /// Keep the low 8 bits (`value & 255`). Negative sums wrap too.
    #[default]
    Wrap,
    /// Clamp to `[0, 255]`.
    Saturate,
}

impl Overflow {
    /// Reduce a channel sum to a byte. The sum is truncated toward zero first.
    #[inline]
    pub fn apply(self, sum: f64) -> u8 {
        let v = sum as i64;
        match self {
            Self::Wrap => (v & 255) as u8,
            Self::Saturate => v.clamp(0, 255) as u8,
        }
    }
}

/// Which source pixel a kernel tap reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelSampling {
    /// Tap `(cy, cx)` reads the shifted neighbor and multiplies by its weight.
    #[default]
    Neighborhood,
    /// Every in-bounds tap reads the center pixel with weight 1.
    CenterTap,
}

/// Convolution settings.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct ConvolveOptions {
    /// Tap sampling mode.
    pub sampling: KernelSampling,
    /// Channel overflow policy.
    pub overflow: Overflow,
    /// Opacity floor applied to alpha after overflow handling. 0 disables it.
    pub bias: f64,
}

impl ConvolveOptions {
    /// Weighted neighborhood, wrapping overflow, no bias.
    pub const fn new() -> Self {
        Self {
            sampling: KernelSampling::Neighborhood,
            overflow: Overflow::Wrap,
            bias: 0.0,
        }
    }

    /// Settings matching the historical export: center tap, wrap, no bias.
    pub const fn center_tap() -> Self {
        Self {
            sampling: KernelSampling::CenterTap,
            overflow: Overflow::Wrap,
            bias: 0.0,
        }
    }

    /// Set the sampling mode.
    pub fn with_sampling(mut self, sampling: KernelSampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: Overflow) -> Self {
        self.overflow = overflow;
        self
    }

    /// Set the alpha bias.
    pub fn with_bias(mut self, bias: f64) -> Self {
        self.bias = bias;
        self
    }
}

/// Convolve `src` (a `width × height` RGBA8 image) into `dst`.
///
/// `stop` is checked once per output row.
///
/// # Errors
///
/// Returns [`EngineError::Stopped`] if `stop` fires; `dst` is then
/// partially written.
pub fn convolve(
    src: &[u8],
    dst: &mut [u8],
    width: u32,
    height: u32,
    kernel: &Kernel<'_>,
    options: &ConvolveOptions,
    stop: &dyn Stop,
) -> Result<(), EngineError> {
    let (w, h) = (width as usize, height as usize);
    debug_assert_eq!(src.len(), w * h * BYTES_PER_PIXEL);
    debug_assert_eq!(dst.len(), src.len());
    if w == 0 {
        return Ok(());
    }

    let side = kernel.side();
    let half = kernel.half_extent() as isize;
    let row_bytes = w * BYTES_PER_PIXEL;

    for (y, out_row) in dst.chunks_exact_mut(row_bytes).enumerate().take(h) {
        stop.check()?;
        for (x, out) in out_row.chunks_exact_mut(BYTES_PER_PIXEL).enumerate() {
            let center = (y * w + x) * BYTES_PER_PIXEL;
            let mut sums = [0.0f64; BYTES_PER_PIXEL];
            for cy in 0..side {
                let sy = y as isize + cy as isize - half;
                if sy < 0 || sy >= h as isize {
                    continue;
                }
                for cx in 0..side {
                    let sx = x as isize + cx as isize - half;
                    if sx < 0 || sx >= w as isize {
                        continue;
                    }
                    let (offset, weight) = match options.sampling {
                        KernelSampling::Neighborhood => (
                            (sy as usize * w + sx as usize) * BYTES_PER_PIXEL,
                            kernel.weight(cy, cx),
                        ),
                        KernelSampling::CenterTap => (center, 1.0),
                    };
                    let px = &src[offset..offset + BYTES_PER_PIXEL];
                    for (sum, &v) in sums.iter_mut().zip(px) {
                        *sum += v as f64 * weight;
                    }
                }
            }

            for (o, &sum) in out.iter_mut().zip(&sums) {
                *o = options.overflow.apply(sum);
            }
            let a = out[channel::A] as f64;
            out[channel::A] = (a + options.bias * (255.0 - a)) as u8;
        }
    }
    Ok(())
}
