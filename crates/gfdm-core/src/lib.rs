//! # GFDM Receiver Core
//!
//! Blind frame synchronization and channel estimation for a block-based
//! GFDM waveform: locate a known preamble in a continuous stream of complex
//! baseband samples, estimate and correct the carrier frequency offset
//! (CFO), and recover the per-subcarrier channel response from the aligned
//! preamble.
//!
//! ## Signal Flow
//!
//! ```text
//! sample stream ──► SyncKernel::detect ──► (offset, cfo)
//!                                             │
//!                         caller windows the stream at `offset`
//!                                             │
//!                                             ▼
//!                   ChannelEstimator::remove_cfo + estimate ──► H[0..N]
//! ```
//!
//! The synchronizer is stateful across calls (one instance per stream) and
//! combines a CFO-robust lag-N auto-correlation with a cross-correlation
//! against the known preamble, gated by an analytic false-alarm threshold.
//! The channel estimator is a pure per-call transform and can be shared
//! between streams.
//!
//! Host integration (stream slicing, metadata tag propagation, scheduling)
//! lives outside this crate; the kernels expose a narrow procedural
//! interface over sample slices.
//!
//! ## Example
//!
//! ```rust
//! use gfdm_core::preamble::generate_preamble;
//! use gfdm_core::sync::SyncKernel;
//! use gfdm_core::channel_est::ChannelEstimator;
//! use num_complex::Complex64;
//!
//! let n = 32;
//! let preamble = generate_preamble(n, 42);
//! let mut sync = SyncKernel::new(n, 8, &preamble, 256, 0.3).unwrap();
//! let estimator = ChannelEstimator::new(n, &preamble).unwrap();
//!
//! let mut chunk = vec![Complex64::new(0.0, 0.0); 256];
//! chunk[100..164].copy_from_slice(sync.preamble());
//!
//! let result = sync.detect(&chunk);
//! let offset = result.offset.unwrap() as usize;
//! let window = estimator.remove_cfo(&chunk[offset..offset + 2 * n], result.cfo);
//! let taps = estimator.estimate(&window);
//! assert_eq!(taps.len(), n);
//! ```

pub mod channel_est;
pub mod config;
pub mod fft_utils;
pub mod logging;
pub mod preamble;
pub mod sync;
pub mod types;

pub use channel_est::ChannelEstimator;
pub use config::{ReceiverConfig, ThresholdMode};
pub use preamble::{generate_preamble, PreambleTemplate};
pub use sync::{DetectionResult, SyncKernel};
pub use types::{GfdmError, GfdmResult, IQBuffer, IQSample};
