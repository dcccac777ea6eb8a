//! FFT utilities for GFDM receiver processing
//!
//! Thin wrapper around `rustfft` used by the channel estimator (size-2N and
//! size-N transforms of the preamble) and by preamble generation.
//!
//! Transform plans are cached process-wide, keyed by size and direction,
//! so building several kernels for the same transform size plans only once.
//! The cache is in-memory only and correctness never depends on it.

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

/// Process-local plan cache, keyed by (size, forward?).
fn plan_cache() -> &'static Mutex<HashMap<(usize, bool), Arc<dyn Fft<f64>>>> {
    static CACHE: OnceLock<Mutex<HashMap<(usize, bool), Arc<dyn Fft<f64>>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cached_plan(size: usize, forward: bool) -> Arc<dyn Fft<f64>> {
    let mut cache = match plan_cache().lock() {
        Ok(guard) => guard,
        // A poisoned cache only means another thread panicked mid-insert;
        // the map contents are still valid plans.
        Err(poisoned) => poisoned.into_inner(),
    };
    Arc::clone(cache.entry((size, forward)).or_insert_with(|| {
        let mut planner = FftPlanner::new();
        if forward {
            planner.plan_fft_forward(size)
        } else {
            planner.plan_fft_inverse(size)
        }
    }))
}

/// Get a (cached) forward FFT plan for the given size.
pub fn plan_forward(size: usize) -> Arc<dyn Fft<f64>> {
    cached_plan(size, true)
}

/// Get a (cached) inverse FFT plan for the given size.
pub fn plan_inverse(size: usize) -> Arc<dyn Fft<f64>> {
    cached_plan(size, false)
}

/// FFT processor for a fixed transform size.
pub struct FftProcessor {
    /// FFT size
    size: usize,
    /// Forward FFT instance
    fft_forward: Arc<dyn Fft<f64>>,
    /// Inverse FFT instance
    fft_inverse: Arc<dyn Fft<f64>>,
    /// Scratch buffer for FFT operations
    scratch: Vec<Complex64>,
}

impl fmt::Debug for FftProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftProcessor")
            .field("size", &self.size)
            .finish()
    }
}

impl FftProcessor {
    /// Create a new FFT processor for the given size.
    pub fn new(size: usize) -> Self {
        let fft_forward = plan_forward(size);
        let fft_inverse = plan_inverse(size);
        let scratch_len = fft_forward
            .get_inplace_scratch_len()
            .max(fft_inverse.get_inplace_scratch_len());
        let scratch = vec![Complex64::new(0.0, 0.0); scratch_len];

        Self {
            size,
            fft_forward,
            fft_inverse,
            scratch,
        }
    }

    /// Get the FFT size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Compute the forward FFT in-place
    pub fn fft_inplace(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_forward
            .process_with_scratch(buffer, &mut self.scratch);
    }

    /// Compute the forward FFT, returning a new buffer
    pub fn fft(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = input.to_vec();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.fft_inplace(&mut buffer);
        buffer
    }

    /// Compute the inverse FFT in-place (normalized by 1/N)
    pub fn ifft_inplace(&mut self, buffer: &mut [Complex64]) {
        assert_eq!(buffer.len(), self.size);
        self.fft_inverse
            .process_with_scratch(buffer, &mut self.scratch);

        let scale = 1.0 / self.size as f64;
        for sample in buffer.iter_mut() {
            *sample *= scale;
        }
    }

    /// Compute the inverse FFT, returning a new buffer
    pub fn ifft(&mut self, input: &[Complex64]) -> Vec<Complex64> {
        let mut buffer = input.to_vec();
        buffer.resize(self.size, Complex64::new(0.0, 0.0));
        self.ifft_inplace(&mut buffer);
        buffer
    }
}
