//! Ready-made kernels.

use alloc::vec::Vec;

/// Cross-shaped sharpen kernel of side `2 * radius + 1`.
///
/// The center weighs 5, the middle of each outer edge weighs -1, every
/// other tap is 0. Returns `None` for radius 0, or when the kernel size
/// overflows or cannot be allocated.
pub fn sharpen(radius: usize) -> Option<Vec<f64>> {
    if radius == 0 {
        return None;
    }
    let side = radius.checked_mul(2)?.checked_add(1)?;
    let mut weights = filled(side.checked_mul(side)?, 0.0)?;
    weights[radius] = -1.0;
    weights[radius * side] = -1.0;
    weights[side * (radius + 1) - 1] = -1.0;
    weights[side * (side - 1) + radius] = -1.0;
    weights[side * radius + radius] = 5.0;
    Some(weights)
}

/// `n` weights of `1 / n`. Returns `None` for `n == 0` or when `n` weights
/// cannot be allocated.
///
/// The engine uses the leading `isqrt(n)²` of them, so pass a perfect square
/// for a true box blur.
pub fn box_blur(n: usize) -> Option<Vec<f64>> {
    if n == 0 {
        return None;
    }
    filled(n, 1.0 / n as f64)
}

fn filled(len: usize, value: f64) -> Option<Vec<f64>> {
    let mut weights = Vec::new();
    weights.try_reserve_exact(len).ok()?;
    weights.resize(len, value);
    Some(weights)
}
