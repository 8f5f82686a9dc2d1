//! Square kernel view over a flat weight slice.

use crate::error::EngineError;

/// A flattened square kernel of side `isqrt(len)`.
///
/// Weights past `side * side` are ignored.
#[derive(Clone, Copy, Debug)]
pub struct Kernel<'a> {
    weights: &'a [f64],
    side: usize,
}

impl<'a> Kernel<'a> {
    /// Interpret the first `len` entries of `weights` as a square kernel.
    ///
    /// # Errors
    ///
    /// [`EngineError::MalformedKernel`] if `len` gives a zero side,
    /// [`EngineError::KernelTooShort`] if `weights` holds fewer than `len`.
    pub fn new(weights: &'a [f64], len: usize) -> Result<Self, EngineError> {
        let side = side_for_len(len).ok_or(EngineError::MalformedKernel {
            len: len as i64,
        })?;
        if len > weights.len() {
            return Err(EngineError::KernelTooShort {
                len,
                available: weights.len(),
            });
        }
        Ok(Self {
            weights: &weights[..side * side],
            side,
        })
    }

    /// Kernel side length.
    #[inline]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Kernel radius, `side / 2`.
    #[inline]
    pub fn half_extent(&self) -> usize {
        self.side / 2
    }

    /// Weight at row `cy`, column `cx`.
    #[inline]
    pub fn weight(&self, cy: usize, cx: usize) -> f64 {
        self.weights[cy * self.side + cx]
    }

    /// The `side * side` weights in use.
    #[inline]
    pub fn weights(&self) -> &'a [f64] {
        self.weights
    }
}

/// Side of the square kernel formed by `len` weights, `None` if zero.
#[inline]
pub fn side_for_len(len: usize) -> Option<usize> {
    let side = len.isqrt();
    (side > 0).then_some(side)
}
