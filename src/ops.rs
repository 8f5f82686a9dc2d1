//! Per-pixel color transforms.
//!
//! Each transform reads an RGBA8 byte slice and writes a same-sized output
//! slice. Alpha is copied through unchanged.

use rgb::Rgba;

use crate::buffer::{BYTES_PER_PIXEL, channel};

/// Luminance coefficients in basis points (1/10000).
///
/// Integer weights keep the arithmetic exact: `v = (wr*R + wg*G + wb*B) /
/// 10000`, truncated, saturated at 255. No gamma handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LuminanceWeights {
    /// Red weight.
    pub r: u32,
    /// Green weight.
    pub g: u32,
    /// Blue weight.
    pub b: u32,
}

impl LuminanceWeights {
    /// Denominator of the basis-point weights.
    pub const SCALE: u32 = 10_000;

    /// 0.2126 / 0.7152 / 0.2722.
    ///
    /// The weights sum to 1.2, so bright pixels saturate at 255 and a second
    /// pass brightens gray pixels further.
    pub const REFERENCE: Self = Self {
        r: 2126,
        g: 7152,
        b: 2722,
    };

    /// BT.709 luma, 0.2126 / 0.7152 / 0.0722. Sums to exactly 1.
    pub const BT709: Self = Self {
        r: 2126,
        g: 7152,
        b: 722,
    };

    /// Luminance of one pixel.
    #[inline]
    pub fn luma(&self, r: u8, g: u8, b: u8) -> u8 {
        let v = (self.r * r as u32 + self.g * g as u32 + self.b * b as u32) / Self::SCALE;
        v.min(255) as u8
    }

    /// Whether `luma(v, v, v) == v` for every `v`.
    pub fn is_normalized(&self) -> bool {
        self.r + self.g + self.b == Self::SCALE
    }
}

impl Default for LuminanceWeights {
    fn default() -> Self {
        Self::REFERENCE
    }
}

/// Apply `f` to every pixel of `src`, writing to `dst`.
///
/// Both slices must have the same length, a multiple of 4.
fn map_pixels(src: &[u8], dst: &mut [u8], f: impl Fn(Rgba<u8>) -> Rgba<u8>) {
    debug_assert_eq!(src.len(), dst.len());
    for (s, d) in src
        .chunks_exact(BYTES_PER_PIXEL)
        .zip(dst.chunks_exact_mut(BYTES_PER_PIXEL))
    {
        channel::store(d, &f(channel::load(s)));
    }
}

/// Write the luminance of each pixel into its R, G and B channels.
pub fn grayscale(src: &[u8], dst: &mut [u8], weights: LuminanceWeights) {
    map_pixels(src, dst, |px| {
        let v = weights.luma(px.r, px.g, px.b);
        Rgba::new(v, v, v, px.a)
    });
}

/// Replace each color channel with `255 - channel`.
pub fn invert(src: &[u8], dst: &mut [u8]) {
    map_pixels(src, dst, |px| Rgba::new(!px.r, !px.g, !px.b, px.a));
}

/// Copy the red channel into R, G and B.
///
/// This is what the historical `invert` export actually computed.
pub fn replicate_red(src: &[u8], dst: &mut [u8]) {
    map_pixels(src, dst, |px| Rgba::new(px.r, px.r, px.r, px.a));
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    const QUAD: [u8; 16] = [
        255, 0, 0, 255, //
        0, 255, 0, 255, //
        0, 0, 255, 255, //
        255, 255, 255, 0,
    ];

    fn run(f: impl Fn(&[u8], &mut [u8]), src: &[u8]) -> Vec<u8> {
        let mut dst = vec![0u8; src.len()];
        f(src, &mut dst);
        dst
    }

    #[test]
    fn grayscale_reference_scenario() {
        let out = run(|s, d| grayscale(s, d, LuminanceWeights::REFERENCE), &QUAD);
        let lumas: Vec<u8> = out.chunks_exact(4).map(|p| p[0]).collect();
        assert_eq!(lumas, [54, 182, 69, 255]);
        for px in out.chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
        let alphas: Vec<u8> = out.chunks_exact(4).map(|p| p[3]).collect();
        assert_eq!(alphas, [255, 255, 255, 0]);
    }

    #[test]
    fn grayscale_preserves_alpha() {
        let src: Vec<u8> = (0..=255u8).flat_map(|v| [v, 255 - v, v / 2, v]).collect();
        let out = run(|s, d| grayscale(s, d, LuminanceWeights::REFERENCE), &src);
        for (i, o) in src.chunks_exact(4).zip(out.chunks_exact(4)) {
            assert_eq!(i[3], o[3]);
        }
    }

    #[test]
    fn grayscale_bt709_is_idempotent() {
        let src: Vec<u8> = (0..=255u8)
            .flat_map(|v| [v, v.wrapping_mul(3), v.wrapping_mul(7), 200])
            .collect();
        let once = run(|s, d| grayscale(s, d, LuminanceWeights::BT709), &src);
        let twice = run(|s, d| grayscale(s, d, LuminanceWeights::BT709), &once);
        assert_eq!(once, twice);
        assert!(LuminanceWeights::BT709.is_normalized());
    }

    #[test]
    fn grayscale_reference_is_not_normalized() {
        assert!(!LuminanceWeights::REFERENCE.is_normalized());
        // 100 * 1.2 = 120: a second pass brightens.
        assert_eq!(LuminanceWeights::REFERENCE.luma(100, 100, 100), 120);
        // Fixed points are 0 and saturated white.
        assert_eq!(LuminanceWeights::REFERENCE.luma(0, 0, 0), 0);
        assert_eq!(LuminanceWeights::REFERENCE.luma(255, 255, 255), 255);
    }

    #[test]
    fn invert_flips_color_channels() {
        let out = run(invert, &QUAD);
        assert_eq!(
            out,
            [
                0, 255, 255, 255, //
                255, 0, 255, 255, //
                255, 255, 0, 255, //
                0, 0, 0, 0,
            ]
        );
        assert_eq!(run(invert, &out), QUAD);
    }

    #[test]
    fn replicate_red_copies_red() {
        let src = [10, 20, 30, 40, 200, 0, 0, 7];
        assert_eq!(run(replicate_red, &src), [10, 10, 10, 40, 200, 200, 200, 7]);
    }
}
