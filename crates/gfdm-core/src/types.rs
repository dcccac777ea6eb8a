//! Core types for GFDM receiver processing
//!
//! Defines the complex sample aliases and the error taxonomy shared by the
//! synchronization and channel-estimation kernels.
//!
//! All signal processing works on complex I/Q (In-phase/Quadrature) baseband
//! samples at `f64` precision. Errors are reserved for construction-time
//! configuration problems; a frame that is simply not found in a processing
//! window is an expected outcome and is reported through `Option`, never
//! through this error type.

use num_complex::Complex64;

/// Type alias for complex numbers using f64 precision
pub type Complex = Complex64;

/// A single I/Q sample point
pub type IQSample = Complex64;

/// A buffer of I/Q samples
pub type IQBuffer = Vec<IQSample>;

/// Result type for GFDM receiver operations
pub type GfdmResult<T> = Result<T, GfdmError>;

/// Errors that can occur when configuring the receiver kernels.
///
/// Every variant is a fail-fast construction or configuration error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GfdmError {
    #[error("preamble length mismatch: expected {expected} (2 * n_subcarriers), got {actual}")]
    PreambleLengthMismatch { expected: usize, actual: usize },

    #[error("invalid subcarrier count: {0}. Must be positive")]
    InvalidSubcarrierCount(usize),

    #[error("chunk length too short: need more than {min} samples, got {actual}")]
    InvalidChunkSize { min: usize, actual: usize },

    #[error("false alarm probability {0} out of range (0, 1)")]
    InvalidFalseAlarmProbability(f64),

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}
