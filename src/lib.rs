//! Handle-based RGBA8 pixel buffer engine.
//!
//! A host (typically JavaScript driving a WebAssembly build) allocates
//! buffers, fills them with raw RGBA8 pixels, runs a transform, and reads
//! the result back. This crate provides:
//!
//! - [`Engine`]: allocator, result registry and transforms
//! - [`PixelBuffer`] / [`WeightBuffer`]: owned pixel and kernel storage
//! - [`PixelHandle`] / [`WeightHandle`]: generation-checked ownership handles
//! - [`ResultRegistry`] / [`ResultDescriptor`]: the most recent output
//! - [`ConvolveOptions`]: sampling mode, overflow policy and alpha bias
//! - [`ResourceLimits`]: allocation caps
//! - [`boundary`]: the process-wide engine for the host (feature `std`)
//!
//! Transforms never modify their input. Each one allocates a new output,
//! publishes its descriptor, and returns the owning handle.
//!
//! # Example
//!
//! ```
//! use pixbuf_engine::Engine;
//!
//! let mut engine = Engine::new();
//! let input = engine.allocate_pixels(1, 1)?;
//! engine.pixels_mut(&input)?.as_bytes_mut().copy_from_slice(&[0, 255, 0, 128]);
//!
//! let output = engine.grayscale(&input, 1, 1)?;
//! assert_eq!(engine.pixels(&output)?.as_bytes(), &[182, 182, 182, 128]);
//! assert_eq!(engine.last_result_size(), 4);
//!
//! engine.release_pixels(input)?;
//! engine.release_pixels(output)?;
//! # Ok::<(), pixbuf_engine::EngineError>(())
//! ```

#![no_std]
#![forbid(unsafe_code)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

mod arena;
mod buffer;
mod convolve;
mod engine;
mod error;
mod kernel;
mod limits;
mod ops;
mod registry;

pub mod presets;

#[cfg(feature = "std")]
pub mod boundary;

pub use arena::{Handle, PixelHandle, RawHandle, WeightHandle};
pub use buffer::{BYTES_PER_PIXEL, PixelBuffer, WeightBuffer, channel, rgba_len};
pub use convolve::{ConvolveOptions, KernelSampling, Overflow};
pub use engine::Engine;
pub use error::{EngineError, HandleFault};
pub use kernel::Kernel;
pub use limits::{LimitExceeded, ResourceLimits};
pub use ops::LuminanceWeights;
pub use registry::{ResultDescriptor, ResultRegistry};

// Re-exports for callers.
pub use enough::{Stop, StopReason, Unstoppable};
pub use imgref::{ImgRef, ImgVec};
pub use rgb::Rgba;
