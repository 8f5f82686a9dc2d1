//! Engine error type.
//!
//! Every fallible operation returns [`EngineError`]. Failures fall into three
//! groups: resource exhaustion ([`Allocation`](EngineError::Allocation),
//! [`Limit`](EngineError::Limit)), contract violations
//! ([`InvalidHandle`](EngineError::InvalidHandle)) and input validation
//! (dimensions and kernel length). None of them are retried.

use core::fmt;

use enough::StopReason;

use crate::arena::RawHandle;
use crate::limits::LimitExceeded;

/// Why a handle was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandleFault {
    /// The handle was issued by another arena (another engine, or the
    /// pixel arena when a weight handle was expected and vice versa).
    Foreign,
    /// The slot exists but the buffer it named has been released.
    Released,
    /// The handle does not name any slot this arena ever issued.
    Unknown,
}

impl fmt::Display for HandleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreign => f.write_str("issued by another allocator"),
            Self::Released => f.write_str("already released"),
            Self::Unknown => f.write_str("never issued"),
        }
    }
}

/// Errors from allocation, handle lookup and transform operations.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    /// The platform could not reserve the requested memory.
    Allocation {
        /// Requested size in bytes.
        bytes: usize,
    },
    /// Width or height is negative, or `width * height * 4` overflows.
    InvalidDimensions {
        /// Declared width.
        width: i64,
        /// Declared height.
        height: i64,
    },
    /// Declared dimensions need more bytes than the buffer holds.
    DimensionMismatch {
        /// Bytes implied by the declared dimensions.
        expected: usize,
        /// Bytes actually held by the buffer.
        actual: usize,
    },
    /// Handle is stale, foreign, or was never issued.
    InvalidHandle {
        /// The rejected handle.
        handle: RawHandle,
        /// Why it was rejected.
        fault: HandleFault,
    },
    /// Kernel length is negative or yields a zero-sided kernel.
    MalformedKernel {
        /// Declared kernel length.
        len: i64,
    },
    /// Declared kernel length exceeds the weight buffer.
    KernelTooShort {
        /// Declared kernel length.
        len: usize,
        /// Weights actually held by the buffer.
        available: usize,
    },
    /// A configured resource limit was exceeded.
    Limit(LimitExceeded),
    /// The operation was cancelled through its stop token.
    Stopped(StopReason),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { bytes } => write!(f, "failed to allocate {bytes} bytes"),
            Self::InvalidDimensions { width, height } => {
                write!(f, "invalid dimensions {width}x{height}")
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "declared dimensions need {expected} bytes, buffer holds {actual}"
                )
            }
            Self::InvalidHandle { handle, fault } => {
                write!(f, "invalid handle {handle}: {fault}")
            }
            Self::MalformedKernel { len } => {
                write!(f, "kernel length {len} does not form a square kernel")
            }
            Self::KernelTooShort { len, available } => {
                write!(
                    f,
                    "kernel length {len} exceeds weight buffer of {available}"
                )
            }
            Self::Limit(limit) => write!(f, "resource limit exceeded: {limit}"),
            Self::Stopped(reason) => write!(f, "operation stopped: {reason:?}"),
        }
    }
}

impl core::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Limit(limit) => Some(limit),
            _ => None,
        }
    }
}

impl From<LimitExceeded> for EngineError {
    fn from(limit: LimitExceeded) -> Self {
        Self::Limit(limit)
    }
}

impl From<StopReason> for EngineError {
    fn from(reason: StopReason) -> Self {
        Self::Stopped(reason)
    }
}
