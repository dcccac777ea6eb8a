//! GFDM Frame Synchronization
//!
//! Blind, streaming preamble detection for a GFDM receiver. Combines a
//! Schmidl & Cox style lag-N auto-correlation (coarse timing + CFO, robust
//! against frequency offset) with a cross-correlation against the known
//! preamble (sample-accurate timing), gated by an analytically derived
//! false-alarm threshold.
//!
//! References:
//! - T. M. Schmidl and D. C. Cox, "Robust Frequency and Timing
//!   Synchronization for OFDM," IEEE Trans. Commun., vol. 45, no. 12, 1997.
//! - A. B. Awoseyila, C. Kasparis and B. G. Evans, "Improved preamble-aided
//!   timing estimation for OFDM systems," IEEE Commun. Lett., vol. 12,
//!   no. 11, 2008.
//!
//! The kernel is stateful across calls: the trailing `2N` raw samples and
//! smoothed correlation magnitudes of every chunk are carried over, so a
//! preamble straddling two chunks is still found. Samples closer than `3N`
//! to the end of a chunk cannot be confirmed yet; the caller re-presents
//! them by advancing its stream position by [`SyncKernel::window_advance`]
//! between calls, mirroring the consume behavior of a GNU Radio block.
//!
//! ## Example
//!
//! ```rust
//! use gfdm_core::preamble::generate_preamble;
//! use gfdm_core::sync::SyncKernel;
//! use num_complex::Complex64;
//!
//! let n = 32;
//! let preamble = generate_preamble(n, 42);
//! let mut sync = SyncKernel::new(n, 8, &preamble, 256, 0.3).unwrap();
//!
//! // Preamble embedded at offset 100 in an otherwise quiet chunk.
//! let mut chunk = vec![Complex64::new(0.0, 0.0); 256];
//! chunk[100..164].copy_from_slice(&preamble);
//!
//! let result = sync.detect(&chunk);
//! assert_eq!(result.offset, Some(100));
//! ```

use crate::preamble::PreambleTemplate;
use crate::types::{GfdmError, GfdmResult, IQSample};
use num_complex::Complex64;
use std::collections::VecDeque;
use std::f64::consts::PI;
use tracing::{debug, trace};

/// Outcome of one [`SyncKernel::detect`] call.
///
/// `offset` is relative to the start of the current chunk and may reach up
/// to `N` samples back into the previous chunk (negative values). `None`
/// means no reliable peak this call, a frequent and normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Detected frame start, or `None` if no reliable peak was found.
    pub offset: Option<i64>,
    /// Normalized CFO estimate (fraction of subcarrier spacing) at the
    /// coarse correlation peak. Zero when the coarse stage was skipped.
    pub cfo: f64,
    /// Squared magnitude of the normalized auto-correlation at the coarse
    /// peak. Close to 1.0 over a clean preamble, near zero on noise.
    pub peak_energy: f64,
}

/// Fixed-depth sliding mean over auto-correlation magnitudes.
///
/// The cyclic prefix turns the auto-correlation peak into a plateau of
/// width `cp_len`; integrating over `cp_len + 1` values collapses the
/// plateau back into a single sharp maximum.
#[derive(Debug, Clone)]
pub struct BoxcarIntegrator {
    fifo: VecDeque<f64>,
    norm: f64,
}

impl BoxcarIntegrator {
    /// Create an integrator of depth `cp_len + 1`.
    pub fn new(cp_len: usize) -> Self {
        Self {
            fifo: VecDeque::from(vec![0.0; cp_len]),
            norm: 1.0 / (cp_len as f64 + 1.0),
        }
    }

    /// Push the next magnitude, evict the oldest, return the current mean.
    pub fn push(&mut self, next_val: f64) -> f64 {
        let sum: f64 = next_val + self.fifo.iter().sum::<f64>();
        self.fifo.push_back(next_val);
        self.fifo.pop_front();
        sum * self.norm
    }

    /// Window depth (`cp_len + 1`).
    pub fn depth(&self) -> usize {
        self.fifo.len() + 1
    }
}

/// Carry-over window between `detect` calls: always exactly `2N` entries
/// per field, overwritten (never grown) at the end of every call.
#[derive(Debug, Clone)]
struct CorrelationHistory {
    /// Trailing raw samples of the processed region.
    samples: Vec<IQSample>,
    /// Trailing normalized auto-correlation values.
    corr: Vec<Complex64>,
    /// Trailing smoothed auto-correlation magnitudes.
    abs_corr: Vec<f64>,
}

impl CorrelationHistory {
    fn new(len: usize) -> Self {
        Self {
            samples: vec![Complex64::new(0.0, 0.0); len],
            corr: vec![Complex64::new(0.0, 0.0); len],
            abs_corr: vec![0.0; len],
        }
    }
}

/// Stateful streaming preamble detector.
///
/// One instance per independent sample stream; calls must arrive in stream
/// order. Construction validates the preamble length (`2N`) and normalizes
/// the template to unit average power.
#[derive(Debug, Clone)]
pub struct SyncKernel {
    n_subcarriers: usize,
    cp_len: usize,
    max_chunk_len: usize,
    /// Minimum `|corr|^2` at the coarse peak to attempt the fine search.
    energy_threshold: f64,
    /// Adaptive cross-correlation threshold factor (Rayleigh noise model).
    threshold_factor: f64,
    template: PreambleTemplate,
    integrator: BoxcarIntegrator,
    history: CorrelationHistory,
    // Per-call working buffers, reused across calls.
    corr_vals: Vec<Complex64>,
    abs_corr_vals: Vec<f64>,
    xcorr_window: Vec<IQSample>,
}

impl SyncKernel {
    /// Create a detector.
    ///
    /// * `n_subcarriers` - subcarrier count `N`
    /// * `cp_len` - cyclic prefix length in samples
    /// * `preamble` - known preamble, must be exactly `2N` samples
    /// * `max_chunk_len` - largest chunk `detect` will be called with;
    ///   must be at least `5N` so the `2N` carry-over window lies inside
    ///   the processed region of every chunk
    /// * `energy_threshold` - minimum squared coarse-peak correlation
    ///
    /// The false-alarm probability defaults to `1e-5` over a `2N` window;
    /// see [`set_false_alarm_probability`](Self::set_false_alarm_probability).
    pub fn new(
        n_subcarriers: usize,
        cp_len: usize,
        preamble: &[IQSample],
        max_chunk_len: usize,
        energy_threshold: f64,
    ) -> GfdmResult<Self> {
        let template = PreambleTemplate::new(n_subcarriers, preamble)?;
        let min_chunk = 5 * n_subcarriers;
        if max_chunk_len < min_chunk {
            return Err(GfdmError::InvalidChunkSize {
                min: min_chunk,
                actual: max_chunk_len,
            });
        }

        let buffer_len = 2 * n_subcarriers;
        let mut kernel = Self {
            n_subcarriers,
            cp_len,
            max_chunk_len,
            energy_threshold,
            threshold_factor: 0.0,
            template,
            integrator: BoxcarIntegrator::new(cp_len),
            history: CorrelationHistory::new(buffer_len),
            corr_vals: Vec::with_capacity(max_chunk_len + buffer_len),
            abs_corr_vals: Vec::with_capacity(max_chunk_len + buffer_len),
            xcorr_window: vec![Complex64::new(0.0, 0.0); 4 * n_subcarriers],
        };
        // Matches the original kernel's default operating point.
        kernel.set_false_alarm_probability(1e-5, buffer_len)?;
        Ok(kernel)
    }

    /// Derive the adaptive cross-correlation threshold factor from a target
    /// false-alarm probability over `window_len` combined-statistic values.
    ///
    /// `factor = sqrt(-4/pi * ln(p)) / window_len`, from a Rayleigh
    /// distributed noise-floor assumption. Recomputed only here.
    pub fn set_false_alarm_probability(
        &mut self,
        false_alarm_prob: f64,
        window_len: usize,
    ) -> GfdmResult<()> {
        if !(false_alarm_prob > 0.0 && false_alarm_prob < 1.0) {
            return Err(GfdmError::InvalidFalseAlarmProbability(false_alarm_prob));
        }
        self.threshold_factor =
            ((-4.0 / PI) * false_alarm_prob.ln()).sqrt() / window_len as f64;
        Ok(())
    }

    /// Current adaptive threshold factor.
    pub fn threshold_factor(&self) -> f64 {
        self.threshold_factor
    }

    /// Energy-normalized preamble template (`2N` samples).
    pub fn preamble(&self) -> &[IQSample] {
        self.template.samples()
    }

    /// Subcarrier count `N`.
    pub fn n_subcarriers(&self) -> usize {
        self.n_subcarriers
    }

    /// Cyclic prefix length in samples.
    pub fn cp_len(&self) -> usize {
        self.cp_len
    }

    /// How far the caller should advance its stream between `detect` calls
    /// on `chunk_len`-sample chunks. The trailing `3N` samples of a chunk
    /// are unconfirmed (tail region) and must be re-presented next call.
    pub fn window_advance(&self, chunk_len: usize) -> usize {
        chunk_len.saturating_sub(3 * self.n_subcarriers)
    }

    /// Process one chunk of the sample stream.
    ///
    /// Carry-over state is updated whether or not a frame is found, so the
    /// kernel must see every chunk exactly once, in order.
    ///
    /// # Panics
    ///
    /// If `chunk.len()` is below `5N` or above the configured maximum;
    /// both are caller contract violations, not runtime conditions.
    pub fn detect(&mut self, chunk: &[IQSample]) -> DetectionResult {
        let n = self.n_subcarriers;
        let buffer_len = 2 * n;
        let ninput = chunk.len();
        assert!(
            ninput >= 5 * n && ninput <= self.max_chunk_len,
            "chunk length {ninput} outside [{}, {}]",
            5 * n,
            self.max_chunk_len
        );

        // Positions in the trailing 3N of the chunk cannot be confirmed
        // this call; they are searched again next call.
        let window_size = ninput - 3 * n;
        let search_head = buffer_len / 2;

        // Stage 1+2: normalized lag-N auto-correlation, boxcar-smoothed
        // magnitudes. Working arrays are history (2N) followed by the
        // current chunk's values, so index = chunk position + 2N.
        self.corr_vals.clear();
        self.corr_vals.extend_from_slice(&self.history.corr);
        self.abs_corr_vals.clear();
        self.abs_corr_vals.extend_from_slice(&self.history.abs_corr);
        for i in 0..window_size {
            let corr = lag_correlation(&chunk[i..i + buffer_len], n);
            self.corr_vals.push(corr);
            self.abs_corr_vals.push(self.integrator.push(corr.norm()));
        }

        // Stage 3: coarse peak over [-N, window_size) chunk positions.
        let search_window = window_size + search_head;
        let w_nm = find_peak(&self.abs_corr_vals[search_head..search_head + search_window]);
        let is_tail_case = w_nm > window_size;
        let acorr_idx = w_nm + search_head;
        let peak_corr = self.corr_vals[acorr_idx];
        let peak_energy = peak_corr.norm_sqr();

        let mut offset = None;
        let mut cfo = 0.0;
        if is_tail_case {
            trace!(
                position = acorr_idx as i64 - buffer_len as i64,
                "coarse peak in tail region, deferred to next call"
            );
        } else if peak_energy <= self.energy_threshold {
            trace!(peak_energy, "coarse peak below energy threshold");
        } else {
            // Stage 5: CFO from the phase of the coarse correlation peak.
            cfo = peak_corr.arg() / PI;

            // Stage 6+7: derotate a 4N window starting N before the coarse
            // peak and search all 2N shifts against the template.
            let xcorr_start = acorr_idx as i64 - 3 * n as i64;
            self.fill_xcorr_window(chunk, xcorr_start);
            let derotated = self.remove_cfo(&self.xcorr_window, cfo);
            let xcorr = self.cross_correlate(&derotated);

            // Combined statistic: |xcorr| weighted by the smoothed
            // auto-correlation magnitude at the same candidate position.
            let abs_int = &self.abs_corr_vals[acorr_idx - n..acorr_idx + n];
            let combined: Vec<f64> = xcorr
                .iter()
                .zip(abs_int.iter())
                .map(|(x, a)| x.norm() * a)
                .collect();

            // Stage 8: adaptive threshold bounds the false-alarm rate
            // independent of signal scale.
            let nc = find_peak(&combined);
            let threshold = self.threshold_factor * combined.iter().sum::<f64>();
            if combined[nc] < threshold {
                trace!(
                    peak = combined[nc],
                    threshold,
                    "fine peak below adaptive threshold"
                );
            } else {
                // Stage 9: coarse + fine composition, range-checked.
                let peak = xcorr_start + nc as i64;
                if peak >= -(n as i64) {
                    debug!(offset = peak, cfo, peak_energy, "frame detected");
                    offset = Some(peak);
                } else {
                    trace!(position = peak, "fine peak before valid search window");
                }
            }
        }

        // Stage 10: carry over trailing 2N samples and correlation values,
        // detection or not.
        self.history
            .samples
            .copy_from_slice(&chunk[window_size - buffer_len..window_size]);
        self.history
            .corr
            .copy_from_slice(&self.corr_vals[window_size..window_size + buffer_len]);
        self.history
            .abs_corr
            .copy_from_slice(&self.abs_corr_vals[window_size..window_size + buffer_len]);

        DetectionResult {
            offset,
            cfo,
            peak_energy,
        }
    }

    /// Normalized lag-N auto-correlation of `input` at every position where
    /// a full `2N` window fits. Stateless view of the detector's stage 1.
    pub fn auto_correlate(&self, input: &[IQSample]) -> Vec<Complex64> {
        let buffer_len = 2 * self.n_subcarriers;
        if input.len() < buffer_len {
            return vec![];
        }
        (0..input.len() - buffer_len + 1)
            .map(|i| lag_correlation(&input[i..i + buffer_len], self.n_subcarriers))
            .collect()
    }

    /// Boxcar-smooth correlation magnitudes through the kernel's FIFO.
    ///
    /// Shares the integrator with `detect`, like the streaming pipeline
    /// itself does; intended for diagnostics and offline analysis.
    pub fn integrate_magnitudes(&mut self, corr_vals: &[Complex64]) -> Vec<f64> {
        corr_vals
            .iter()
            .map(|c| self.integrator.push(c.norm()))
            .collect()
    }

    /// Cross-correlate `input` against the preamble template, one value per
    /// shift in `0..len - 2N` (a template-length tail is never a shift, so
    /// the 4N window searched by `detect` yields exactly `2N` candidates).
    pub fn cross_correlate(&self, input: &[IQSample]) -> Vec<Complex64> {
        let p = self.template.samples();
        (0..input.len().saturating_sub(p.len()))
            .map(|s| {
                input[s..s + p.len()]
                    .iter()
                    .zip(p.iter())
                    .map(|(x, r)| x * r.conj())
                    .sum()
            })
            .collect()
    }

    /// Derotate `input` by a normalized CFO using a recursive phase rotator:
    /// `out[k] = in[k] * exp(-j*pi*cfo*k/N)`.
    pub fn remove_cfo(&self, input: &[IQSample], cfo: f64) -> Vec<IQSample> {
        let incr = -PI * cfo / self.n_subcarriers as f64;
        let phase_increment = Complex64::new(incr.cos(), incr.sin());
        let mut phase = Complex64::new(1.0, 0.0);
        input
            .iter()
            .map(|s| {
                let out = s * phase;
                phase *= phase_increment;
                out
            })
            .collect()
    }

    /// Assemble the 4N cross-correlation input starting at chunk position
    /// `start` (may be negative; missing samples come from carry-over).
    fn fill_xcorr_window(&mut self, chunk: &[IQSample], start: i64) {
        let total = self.xcorr_window.len();
        let n_buffered = (-start).max(0) as usize;
        if n_buffered > 0 {
            let hist = &self.history.samples;
            self.xcorr_window[..n_buffered]
                .copy_from_slice(&hist[hist.len() - n_buffered..]);
            self.xcorr_window[n_buffered..].copy_from_slice(&chunk[..total - n_buffered]);
        } else {
            let start = start as usize;
            self.xcorr_window.copy_from_slice(&chunk[start..start + total]);
        }
    }
}

/// Lag-N self-correlation of one `2N` window, normalized by half the window
/// energy. Zero-energy windows correlate to zero rather than dividing by it.
fn lag_correlation(window: &[IQSample], n: usize) -> Complex64 {
    let energy: f64 = window.iter().map(|s| s.norm_sqr()).sum();
    if energy <= f64::MIN_POSITIVE {
        return Complex64::new(0.0, 0.0);
    }
    let val: Complex64 = (0..n).map(|k| window[n + k] * window[k].conj()).sum();
    val / (0.5 * energy)
}

/// Index of the first maximum value.
fn find_peak(vals: &[f64]) -> usize {
    let mut nm = 0;
    let mut max = f64::NEG_INFINITY;
    for (i, &v) in vals.iter().enumerate() {
        if v > max {
            max = v;
            nm = i;
        }
    }
    nm
}
