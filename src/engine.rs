//! The engine: allocator, result registry and transforms in one place.
//!
//! Every transform follows the same protocol: validate the input, allocate a
//! fresh output buffer of the same size, compute into it, publish its
//! descriptor, and hand the owned output handle back to the caller.

use enough::{Stop, Unstoppable};

use crate::arena::{Arena, PixelHandle, RawHandle, WeightHandle};
use crate::buffer::{PixelBuffer, WeightBuffer};
use crate::convolve::{self, ConvolveOptions};
use crate::error::EngineError;
use crate::kernel::{self, Kernel};
use crate::limits::ResourceLimits;
use crate::ops::{self, LuminanceWeights};
use crate::registry::{ResultDescriptor, ResultRegistry};

/// Buffer allocator plus transform operations.
///
/// All mutating calls take `&mut self`, so calls on one engine are strictly
/// sequential.
#[derive(Debug, Default)]
pub struct Engine {
    pixels: Arena<PixelBuffer>,
    weights: Arena<WeightBuffer>,
    registry: ResultRegistry,
    limits: ResourceLimits,
}

impl Engine {
    /// Engine with no resource limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply resource limits to future allocations.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Current resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    // --- Allocator ---

    /// Allocate a zero-filled `width × height` RGBA8 buffer.
    pub fn allocate_pixels(&mut self, width: u32, height: u32) -> Result<PixelHandle, EngineError> {
        self.limits.check_pixel_buffer(width, height)?;
        let buf = PixelBuffer::try_new(width, height).inspect_err(|e| {
            log::warn!("pixel allocation {width}x{height} failed: {e}");
        })?;
        let handle = self.pixels.insert(buf)?;
        log::debug!("allocated {width}x{height} pixel buffer {}", handle.raw());
        Ok(handle)
    }

    /// Allocate `len` zeroed kernel weights.
    pub fn allocate_weights(&mut self, len: usize) -> Result<WeightHandle, EngineError> {
        self.limits.check_weight_buffer(len)?;
        let buf = WeightBuffer::try_new(len).inspect_err(|e| {
            log::warn!("weight allocation of {len} failed: {e}");
        })?;
        let handle = self.weights.insert(buf)?;
        log::debug!("allocated {len} weights {}", handle.raw());
        Ok(handle)
    }

    /// Release a pixel buffer. Clears the result slot if it named this buffer.
    pub fn release_pixels(&mut self, handle: PixelHandle) -> Result<(), EngineError> {
        self.release_pixels_raw(handle.into_raw())
    }

    pub(crate) fn release_pixels_raw(&mut self, raw: RawHandle) -> Result<(), EngineError> {
        self.pixels.remove(raw).inspect_err(|e| {
            log::warn!("rejected pixel release: {e}");
        })?;
        if self.registry.forget(raw) {
            log::trace!("released buffer {raw} was the current result");
        }
        log::trace!("released pixel buffer {raw}");
        Ok(())
    }

    /// Release a weight buffer.
    pub fn release_weights(&mut self, handle: WeightHandle) -> Result<(), EngineError> {
        self.release_weights_raw(handle.into_raw())
    }

    pub(crate) fn release_weights_raw(&mut self, raw: RawHandle) -> Result<(), EngineError> {
        self.weights.remove(raw).inspect_err(|e| {
            log::warn!("rejected weight release: {e}");
        })?;
        log::trace!("released weight buffer {raw}");
        Ok(())
    }

    /// Borrow a pixel buffer.
    pub fn pixels(&self, handle: &PixelHandle) -> Result<&PixelBuffer, EngineError> {
        self.pixels.get(handle.raw())
    }

    /// Mutably borrow a pixel buffer.
    pub fn pixels_mut(&mut self, handle: &PixelHandle) -> Result<&mut PixelBuffer, EngineError> {
        self.pixels.get_mut(handle.raw())
    }

    /// Borrow a weight buffer.
    pub fn weights(&self, handle: &WeightHandle) -> Result<&WeightBuffer, EngineError> {
        self.weights.get(handle.raw())
    }

    /// Mutably borrow a weight buffer.
    pub fn weights_mut(&mut self, handle: &WeightHandle) -> Result<&mut WeightBuffer, EngineError> {
        self.weights.get_mut(handle.raw())
    }

    /// Number of pixel buffers not yet released.
    pub fn live_pixel_buffers(&self) -> usize {
        self.pixels.live()
    }

    /// Number of weight buffers not yet released.
    pub fn live_weight_buffers(&self) -> usize {
        self.weights.live()
    }

    // --- Result registry ---

    /// The result registry.
    pub fn registry(&self) -> &ResultRegistry {
        &self.registry
    }

    /// Descriptor of the most recent output.
    pub fn last_result(&self) -> Option<ResultDescriptor> {
        self.registry.last()
    }

    /// Address of the most recent output, or 0.
    pub fn last_result_pointer(&self) -> usize {
        self.registry.last_result_pointer()
    }

    /// Byte size of the most recent output, or 0.
    pub fn last_result_size(&self) -> usize {
        self.registry.last_result_size()
    }

    /// Take the most recent output descriptor, leaving the slot empty.
    pub fn take_last_result(&mut self) -> Option<ResultDescriptor> {
        self.registry.take()
    }

    // --- Transforms ---

    /// Grayscale with [`LuminanceWeights::REFERENCE`].
    pub fn grayscale(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
    ) -> Result<PixelHandle, EngineError> {
        self.grayscale_with(input, width, height, LuminanceWeights::REFERENCE)
    }

    /// Grayscale with the given luminance weights.
    pub fn grayscale_with(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        weights: LuminanceWeights,
    ) -> Result<PixelHandle, EngineError> {
        self.transform(input, width, height, |src, dst| {
            ops::grayscale(src, dst, weights);
            Ok(())
        })
    }

    /// Channel inversion, `255 - c` on R, G and B.
    pub fn invert(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
    ) -> Result<PixelHandle, EngineError> {
        self.transform(input, width, height, |src, dst| {
            ops::invert(src, dst);
            Ok(())
        })
    }

    /// Red channel copied into R, G and B.
    pub fn replicate_red(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
    ) -> Result<PixelHandle, EngineError> {
        self.transform(input, width, height, |src, dst| {
            ops::replicate_red(src, dst);
            Ok(())
        })
    }

    /// Weighted neighborhood convolution with default options.
    pub fn convolve(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        weights: &WeightHandle,
        weight_len: usize,
    ) -> Result<PixelHandle, EngineError> {
        self.convolve_with(
            input,
            width,
            height,
            weights,
            weight_len,
            &ConvolveOptions::new(),
            &Unstoppable,
        )
    }

    /// Center-tap convolution, matching the historical export.
    pub fn convolve_center_tap(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        weights: &WeightHandle,
        weight_len: usize,
    ) -> Result<PixelHandle, EngineError> {
        self.convolve_with(
            input,
            width,
            height,
            weights,
            weight_len,
            &ConvolveOptions::center_tap(),
            &Unstoppable,
        )
    }

    /// Convolution with explicit options and a stop token.
    ///
    /// The kernel length is validated before anything is allocated. On
    /// cancellation the partial output is released and nothing is published.
    #[allow(clippy::too_many_arguments)]
    pub fn convolve_with(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        weights: &WeightHandle,
        weight_len: usize,
        options: &ConvolveOptions,
        stop: &dyn Stop,
    ) -> Result<PixelHandle, EngineError> {
        if kernel::side_for_len(weight_len).is_none() {
            return Err(EngineError::MalformedKernel {
                len: weight_len as i64,
            });
        }
        let weights_raw = weights.raw();
        Kernel::new(self.weights.get(weights_raw)?.as_slice(), weight_len)?;
        self.transform_with(input, width, height, |engine, src_raw, mut out| {
            let src = engine.pixels.get(src_raw)?.declared(width, height)?;
            let kernel = Kernel::new(engine.weights.get(weights_raw)?.as_slice(), weight_len)?;
            convolve::convolve(src, out.as_bytes_mut(), width, height, &kernel, options, stop)?;
            Ok(out)
        })
    }

    /// Validate, allocate, compute and publish for a slice-to-slice transform.
    fn transform(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        f: impl FnOnce(&[u8], &mut [u8]) -> Result<(), EngineError>,
    ) -> Result<PixelHandle, EngineError> {
        self.transform_with(input, width, height, |engine, src_raw, mut out| {
            let src = engine.pixels.get(src_raw)?.declared(width, height)?;
            f(src, out.as_bytes_mut())?;
            Ok(out)
        })
    }

    fn transform_with(
        &mut self,
        input: &PixelHandle,
        width: u32,
        height: u32,
        compute: impl FnOnce(&Self, RawHandle, PixelBuffer) -> Result<PixelBuffer, EngineError>,
    ) -> Result<PixelHandle, EngineError> {
        let src_raw = input.raw();
        // Validates the handle and the declared size before allocating.
        self.pixels.get(src_raw)?.declared(width, height)?;
        self.limits.check_pixel_buffer(width, height)?;

        // The output is computed outside the arena, then inserted, so a
        // failure never leaves an orphaned slot behind.
        let out = PixelBuffer::try_new(width, height)?;
        let out = compute(&*self, src_raw, out)?;
        let size = out.len();
        let address = out.address();
        let handle = self.pixels.insert(out)?;
        let descriptor = self.registry.publish(handle.raw(), address, size);
        log::debug!(
            "published result {} ({width}x{height}, {size} bytes) as {}",
            descriptor.generation,
            handle.raw()
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convolve::Overflow;
    use crate::error::HandleFault;
    use crate::limits::LimitExceeded;
    use crate::presets;
    use alloc::vec::Vec;

    const QUAD: [u8; 16] = [
        255, 0, 0, 255, //
        0, 255, 0, 255, //
        0, 0, 255, 255, //
        255, 255, 255, 0,
    ];

    fn load(engine: &mut Engine, bytes: &[u8], width: u32, height: u32) -> PixelHandle {
        let h = engine.allocate_pixels(width, height).unwrap();
        engine
            .pixels_mut(&h)
            .unwrap()
            .as_bytes_mut()
            .copy_from_slice(bytes);
        h
    }

    fn load_weights(engine: &mut Engine, weights: &[f64]) -> WeightHandle {
        let h = engine.allocate_weights(weights.len()).unwrap();
        engine
            .weights_mut(&h)
            .unwrap()
            .as_mut_slice()
            .copy_from_slice(weights);
        h
    }

    #[test]
    fn allocation_sizes() {
        let mut engine = Engine::new();
        let h = engine.allocate_pixels(3, 5).unwrap();
        assert_eq!(engine.pixels(&h).unwrap().len(), 60);
        let w = engine.allocate_weights(9).unwrap();
        assert_eq!(engine.weights(&w).unwrap().len(), 9);
        assert_eq!(engine.live_pixel_buffers(), 1);
        assert_eq!(engine.live_weight_buffers(), 1);
        engine.release_pixels(h).unwrap();
        engine.release_weights(w).unwrap();
        assert_eq!(engine.live_pixel_buffers(), 0);
        assert_eq!(engine.live_weight_buffers(), 0);
    }

    #[test]
    fn grayscale_scenario_publishes_result() {
        let mut engine = Engine::new();
        let input = load(&mut engine, &QUAD, 2, 2);
        let out = engine.grayscale(&input, 2, 2).unwrap();

        let desc = engine.last_result().unwrap();
        assert_eq!(desc.handle, out.raw());
        assert_eq!(desc.size, 16);
        assert_eq!(desc.generation, 1);
        let buf = engine.pixels(&out).unwrap();
        assert_eq!(desc.address, buf.address());
        assert_eq!(engine.last_result_pointer(), buf.address());
        assert_eq!(engine.last_result_size(), 16);

        let bytes = buf.as_bytes();
        let lumas: Vec<u8> = bytes.chunks_exact(4).map(|p| p[0]).collect();
        assert_eq!(lumas, [54, 182, 69, 255]);
        let alphas: Vec<u8> = bytes.chunks_exact(4).map(|p| p[3]).collect();
        assert_eq!(alphas, [255, 255, 255, 0]);

        engine.release_pixels(input).unwrap();
        engine.release_pixels(out).unwrap();
        assert_eq!(engine.live_pixel_buffers(), 0);
        assert_eq!(engine.last_result(), None);
    }

    #[test]
    fn input_is_untouched() {
        let mut engine = Engine::new();
        let input = load(&mut engine, &QUAD, 2, 2);
        let _ = engine.invert(&input, 2, 2).unwrap();
        assert_eq!(engine.pixels(&input).unwrap().as_bytes(), &QUAD);
    }

    #[test]
    fn each_call_overwrites_descriptor() {
        let mut engine = Engine::new();
        let input = load(&mut engine, &QUAD, 2, 2);
        let first = engine.invert(&input, 2, 2).unwrap();
        let first_desc = engine.last_result().unwrap();
        let second = engine.replicate_red(&input, 2, 2).unwrap();
        let second_desc = engine.last_result().unwrap();
        assert_ne!(first_desc.handle, second_desc.handle);
        assert_eq!(second_desc.generation, first_desc.generation + 1);
        assert!(!engine.registry().is_current(&first_desc));

        // Releasing an older result leaves the current one alone.
        engine.release_pixels(first).unwrap();
        assert_eq!(engine.last_result(), Some(second_desc));
        assert_eq!(
            engine.pixels(&second).unwrap().as_bytes(),
            &[
                255, 255, 255, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 0
            ]
        );
        assert_eq!(engine.take_last_result(), Some(second_desc));
        assert_eq!(engine.last_result_pointer(), 0);
    }

    #[test]
    fn double_release_rejected() {
        let mut engine = Engine::new();
        let h = engine.allocate_pixels(1, 1).unwrap();
        let raw = h.raw();
        engine.release_pixels(h).unwrap();
        let err = engine.release_pixels(PixelHandle::from_raw(raw)).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidHandle {
                handle: raw,
                fault: HandleFault::Released
            }
        );
    }

    #[test]
    fn foreign_release_rejected() {
        let mut a = Engine::new();
        let mut b = Engine::new();
        let h = a.allocate_pixels(1, 1).unwrap();
        let raw = h.raw();
        assert!(matches!(
            b.release_pixels(h),
            Err(EngineError::InvalidHandle {
                fault: HandleFault::Foreign,
                ..
            })
        ));
        // A pixel handle is not a weight handle, even in the same engine.
        assert!(matches!(
            a.release_weights(WeightHandle::from_raw(raw)),
            Err(EngineError::InvalidHandle {
                fault: HandleFault::Foreign,
                ..
            })
        ));
        a.release_pixels(PixelHandle::from_raw(raw)).unwrap();
    }

    #[test]
    fn declared_size_larger_than_buffer() {
        let mut engine = Engine::new();
        let input = engine.allocate_pixels(2, 2).unwrap();
        let err = engine.grayscale(&input, 3, 3).unwrap_err();
        assert_eq!(
            err,
            EngineError::DimensionMismatch {
                expected: 36,
                actual: 16
            }
        );
        assert_eq!(engine.live_pixel_buffers(), 1);
        assert_eq!(engine.last_result(), None);
    }

    #[test]
    fn limits_reject_before_allocating() {
        let mut engine = Engine::new().with_limits(
            ResourceLimits::none()
                .with_max_width(100)
                .with_max_kernel_len(9),
        );
        assert_eq!(
            engine.allocate_pixels(101, 1).unwrap_err(),
            EngineError::Limit(LimitExceeded::Width {
                actual: 101,
                max: 100
            })
        );
        assert!(matches!(
            engine.allocate_weights(25),
            Err(EngineError::Limit(LimitExceeded::KernelLength { .. }))
        ));
        let mut engine =
            Engine::new().with_limits(ResourceLimits::none().with_max_memory(63));
        assert!(matches!(
            engine.allocate_pixels(4, 4),
            Err(EngineError::Limit(LimitExceeded::Memory { .. }))
        ));
        assert_eq!(engine.live_pixel_buffers(), 0);
    }

    #[test]
    fn overflowing_dimensions_are_invalid() {
        let mut engine = Engine::new();
        assert_eq!(
            engine.allocate_pixels(u32::MAX, u32::MAX).unwrap_err(),
            EngineError::InvalidDimensions {
                width: u32::MAX.into(),
                height: u32::MAX.into()
            }
        );
        assert_eq!(engine.live_pixel_buffers(), 0);
    }

    #[test]
    fn unsatisfiable_allocation_is_recoverable() {
        // Representable byte lengths above isize::MAX on either pointer width.
        let (width, height) = if usize::BITS >= 64 {
            (0x7fff_ffff, 0x7fff_ffff)
        } else {
            (0x8000, 0x4000)
        };
        let mut engine = Engine::new();
        assert!(matches!(
            engine.allocate_pixels(width, height),
            Err(EngineError::Allocation { .. })
        ));
        assert_eq!(engine.live_pixel_buffers(), 0);
        // The engine keeps working afterwards.
        let h = engine.allocate_pixels(1, 1).unwrap();
        assert_eq!(engine.live_pixel_buffers(), 1);
        engine.release_pixels(h).unwrap();
    }

    #[test]
    fn limits_apply_to_transform_outputs() {
        let mut engine = Engine::new();
        let input = engine.allocate_pixels(4, 4).unwrap();
        let mut engine = engine.with_limits(ResourceLimits::none().with_max_memory(32));
        assert_eq!(
            engine.invert(&input, 4, 4).unwrap_err(),
            EngineError::Limit(LimitExceeded::Memory { actual: 64, max: 32 })
        );
        assert_eq!(engine.live_pixel_buffers(), 1);
        assert_eq!(engine.last_result(), None);

        let out = engine.invert(&input, 2, 2).unwrap();
        assert_eq!(engine.pixels(&out).unwrap().len(), 16);
    }

    #[test]
    fn weight_limits_checked_before_allocating() {
        let mut engine = Engine::new()
            .with_limits(ResourceLimits::none().with_max_kernel_len(49).with_max_memory(200));
        let ok = engine.allocate_weights(25).unwrap();
        assert_eq!(
            engine.allocate_weights(26).unwrap_err(),
            EngineError::Limit(LimitExceeded::Memory { actual: 208, max: 200 })
        );
        assert_eq!(engine.live_weight_buffers(), 1);
        engine.release_weights(ok).unwrap();
    }

    #[test]
    fn convolve_identity() {
        let mut engine = Engine::new();
        let src: Vec<u8> = (0..36u8).collect();
        let input = load(&mut engine, &src, 3, 3);
        let weights = load_weights(&mut engine, &[1.0]);
        let out = engine.convolve(&input, 3, 3, &weights, 1).unwrap();
        assert_eq!(engine.pixels(&out).unwrap().as_bytes(), &src[..]);
        assert_eq!(engine.last_result_size(), 36);
    }

    #[test]
    fn convolve_rejects_malformed_kernel_before_allocating() {
        let mut engine = Engine::new();
        let input = engine.allocate_pixels(2, 2).unwrap();
        let weights = engine.allocate_weights(4).unwrap();
        assert_eq!(
            engine.convolve(&input, 2, 2, &weights, 0).unwrap_err(),
            EngineError::MalformedKernel { len: 0 }
        );
        assert!(matches!(
            engine.convolve(&input, 2, 2, &weights, 9),
            Err(EngineError::KernelTooShort { len: 9, available: 4 })
        ));
        assert_eq!(engine.live_pixel_buffers(), 1);
        assert_eq!(engine.registry().generation(), 0);
    }

    #[test]
    fn convolve_literal_vs_canonical() {
        let mut engine = Engine::new();
        let src = [
            10, 0, 0, 1, //
            20, 0, 0, 1, //
            30, 0, 0, 1,
        ];
        let input = load(&mut engine, &src, 3, 1);
        let weights = load_weights(&mut engine, &presets::box_blur(9).unwrap());

        let canonical = engine.convolve(&input, 3, 1, &weights, 9).unwrap();
        // Edge pixels: (10 + 20) / 9 = 3.33 -> 3; middle: 60 / 9 -> 6.
        assert_eq!(
            engine.pixels(&canonical).unwrap().as_bytes(),
            &[3, 0, 0, 0, 6, 0, 0, 0, 5, 0, 0, 0]
        );

        let literal = engine.convolve_center_tap(&input, 3, 1, &weights, 9).unwrap();
        assert_eq!(
            engine.pixels(&literal).unwrap().as_bytes(),
            &[20, 0, 0, 2, 60, 0, 0, 3, 60, 0, 0, 2]
        );
    }

    #[test]
    fn convolve_with_saturation_option() {
        let mut engine = Engine::new();
        let input = load(&mut engine, &[200, 100, 0, 255], 1, 1);
        let weights = load_weights(&mut engine, &[2.0]);
        let options = ConvolveOptions::new().with_overflow(Overflow::Saturate);
        let out = engine
            .convolve_with(&input, 1, 1, &weights, 1, &options, &Unstoppable)
            .unwrap();
        assert_eq!(engine.pixels(&out).unwrap().as_bytes(), &[255, 200, 0, 255]);
    }

    #[test]
    fn cancelled_convolution_publishes_nothing() {
        struct Cancelled;
        impl Stop for Cancelled {
            fn check(&self) -> Result<(), enough::StopReason> {
                Err(enough::StopReason::Cancelled)
            }
        }
        let mut engine = Engine::new();
        let input = engine.allocate_pixels(4, 4).unwrap();
        let weights = load_weights(&mut engine, &[1.0]);
        let err = engine
            .convolve_with(
                &input,
                4,
                4,
                &weights,
                1,
                &ConvolveOptions::new(),
                &Cancelled,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::Stopped(_)));
        assert_eq!(engine.live_pixel_buffers(), 1);
        assert_eq!(engine.last_result(), None);
    }

    #[test]
    fn stale_input_handle_rejected() {
        let mut engine = Engine::new();
        let input = engine.allocate_pixels(1, 1).unwrap();
        let raw = input.raw();
        engine.release_pixels(input).unwrap();
        let stale = PixelHandle::from_raw(raw);
        assert!(matches!(
            engine.grayscale(&stale, 1, 1),
            Err(EngineError::InvalidHandle { .. })
        ));
        assert_eq!(engine.live_pixel_buffers(), 0);
    }
}
