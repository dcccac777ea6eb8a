//! GFDM Channel Estimation
//!
//! Estimates the per-subcarrier frequency response from the frame-aligned,
//! CFO-corrected preamble delivered by the synchronizer. Least-squares in
//! the frequency domain: transform the received preamble, divide by the
//! known reference spectrum.
//!
//! Because the preamble is built from two repeated `N`-sample halves, each
//! half is an independent noisy observation of the same channel. The
//! estimator transforms each half separately with an `N`-point FFT and
//! averages the two least-squares estimates, halving the noise variance
//! without needing a second preamble.
//!
//! ## Example
//!
//! ```rust
//! use gfdm_core::channel_est::ChannelEstimator;
//! use gfdm_core::preamble::generate_preamble;
//!
//! let n = 32;
//! let preamble = generate_preamble(n, 42);
//! let estimator = ChannelEstimator::new(n, &preamble).unwrap();
//!
//! // Ideal channel: the estimate is unity on every occupied subcarrier.
//! let taps = estimator.estimate(&preamble);
//! assert_eq!(taps.len(), n);
//! assert!((taps[1].norm() - 1.0).abs() < 1e-9);
//! ```

use crate::fft_utils::plan_forward;
use crate::preamble::PreambleTemplate;
use crate::types::{GfdmResult, IQSample};
use num_complex::Complex64;
use rustfft::Fft;
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Reference spectrum bins below this power are treated as unoccupied and
/// divide to zero instead of blowing up.
const MIN_REF_POWER: f64 = 1e-24;

/// Frequency-domain least-squares channel estimator.
///
/// Holds only read-only state after construction (the reference half
/// spectra and a shared FFT plan), so one instance can serve concurrent
/// streams as long as each call brings its own buffers.
pub struct ChannelEstimator {
    n_subcarriers: usize,
    fft: Arc<dyn Fft<f64>>,
    /// `N`-point spectra of the two template halves.
    reference_spectra: [Vec<Complex64>; 2],
}

impl fmt::Debug for ChannelEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelEstimator")
            .field("n_subcarriers", &self.n_subcarriers)
            .finish()
    }
}

impl ChannelEstimator {
    /// Create an estimator for the given preamble.
    ///
    /// The preamble must be exactly `2N` samples; it is energy-normalized
    /// and its half spectra precomputed with a cached FFT plan.
    pub fn new(n_subcarriers: usize, preamble: &[IQSample]) -> GfdmResult<Self> {
        let template = PreambleTemplate::new(n_subcarriers, preamble)?;
        let fft = plan_forward(n_subcarriers);

        let spectrum_of = |half: &[IQSample]| -> Vec<Complex64> {
            let mut buf = half.to_vec();
            fft.process(&mut buf);
            buf
        };
        let samples = template.samples();
        let reference_spectra = [
            spectrum_of(&samples[..n_subcarriers]),
            spectrum_of(&samples[n_subcarriers..]),
        ];

        Ok(Self {
            n_subcarriers,
            fft,
            reference_spectra,
        })
    }

    /// Subcarrier count `N`.
    pub fn n_subcarriers(&self) -> usize {
        self.n_subcarriers
    }

    /// Estimate the channel from a frame-aligned, CFO-corrected preamble
    /// window of `2N` samples. Returns `N` complex channel taps: the mean
    /// of the two per-half least-squares estimates.
    ///
    /// # Panics
    ///
    /// If the window is not exactly `2N` samples: a caller contract
    /// violation, not a runtime condition.
    pub fn estimate(&self, preamble_window: &[IQSample]) -> Vec<Complex64> {
        let n = self.n_subcarriers;
        assert_eq!(
            preamble_window.len(),
            2 * n,
            "preamble window must be 2 * n_subcarriers samples"
        );

        let h0 = self.half_estimate(0, &preamble_window[..n]);
        let h1 = self.half_estimate(1, &preamble_window[n..]);
        h0.iter()
            .zip(h1.iter())
            .map(|(a, b)| 0.5 * (a + b))
            .collect()
    }

    /// Raw least-squares estimate from a single `N`-sample preamble half.
    ///
    /// `half_index` selects which template half the window is compared
    /// against (0 or 1). Unoccupied reference bins estimate to zero.
    ///
    /// # Panics
    ///
    /// If `half_index > 1` or the window is not exactly `N` samples.
    pub fn half_estimate(&self, half_index: usize, half_window: &[IQSample]) -> Vec<Complex64> {
        assert!(half_index < 2, "half_index must be 0 or 1");
        assert_eq!(
            half_window.len(),
            self.n_subcarriers,
            "half window must be n_subcarriers samples"
        );

        let mut spectrum = half_window.to_vec();
        self.fft.process(&mut spectrum);

        let reference = &self.reference_spectra[half_index];
        spectrum
            .iter()
            .zip(reference.iter())
            .map(|(rx, re)| {
                if re.norm_sqr() < MIN_REF_POWER {
                    Complex64::new(0.0, 0.0)
                } else {
                    rx / re
                }
            })
            .collect()
    }

    /// Derotate `input` by a normalized CFO using a recursive phase
    /// rotator, the same correction the synchronizer applies internally:
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft_utils::FftProcessor;
    use crate::preamble::generate_preamble;
    use crate::sync::SyncKernel;

    const N: usize = 32;

    /// Preamble whose half spectrum is nonzero on every bin, so the channel
    /// is observable at every subcarrier.
    fn dense_preamble(n: usize, seed: u64) -> Vec<IQSample> {
        let mut rng = seed;
        let mut pn = || {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            if (rng >> 33) & 1 == 0 {
                1.0
            } else {
                -1.0
            }
        };
        let freq: Vec<Complex64> = (0..n).map(|_| Complex64::new(pn(), 0.0)).collect();
        let mut processor = FftProcessor::new(n);
        let half = processor.ifft(&freq);
        let mut preamble = half.clone();
        preamble.extend_from_slice(&half);
        preamble
    }

    /// Apply a per-subcarrier channel to each half by circular convolution
    /// (frequency-domain multiply).
    fn apply_channel(preamble: &[IQSample], channel: &[Complex64]) -> Vec<IQSample> {
        let n = channel.len();
        let mut processor = FftProcessor::new(n);
        let mut out = Vec::with_capacity(2 * n);
        for half in preamble.chunks(n) {
            let mut spectrum = processor.fft(half);
            for (s, h) in spectrum.iter_mut().zip(channel.iter()) {
                *s *= h;
            }
            out.extend(processor.ifft(&spectrum));
        }
        out
    }

    #[test]
    fn test_flat_channel_gain_and_phase() {
        let preamble = dense_preamble(N, 99);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();

        // Flat channel 0.8 * exp(j*0.4), applied in the time domain.
        let gain = Complex64::from_polar(0.8, 0.4);
        let received: Vec<IQSample> = estimator_input(&preamble, gain);

        let taps = estimator.estimate(&received);
        assert_eq!(taps.len(), N);
        for (k, tap) in taps.iter().enumerate() {
            assert!(
                (tap - gain).norm() < 1e-9,
                "subcarrier {k}: expected {gain}, got {tap}"
            );
        }
    }

    fn estimator_input(preamble: &[IQSample], gain: Complex64) -> Vec<IQSample> {
        // The estimator normalizes its template copy, so feed it the
        // normalized preamble scaled by the channel.
        let template = PreambleTemplate::new(preamble.len() / 2, preamble).unwrap();
        template.samples().iter().map(|s| s * gain).collect()
    }

    #[test]
    fn test_frequency_selective_channel() {
        let preamble = dense_preamble(N, 99);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();

        let channel: Vec<Complex64> = (0..N)
            .map(|k| Complex64::from_polar(0.5 + 0.02 * k as f64, 0.1 * k as f64))
            .collect();
        let template = PreambleTemplate::new(N, &preamble).unwrap();
        let received = apply_channel(template.samples(), &channel);

        let taps = estimator.estimate(&received);
        for (k, (tap, expected)) in taps.iter().zip(channel.iter()).enumerate() {
            assert!(
                (tap - expected).norm() < 1e-9,
                "subcarrier {k}: expected {expected}, got {tap}"
            );
        }
    }

    #[test]
    fn test_half_average_round_trip() {
        let preamble = dense_preamble(N, 7);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();

        // Distort the two halves differently so averaging actually matters.
        let template = PreambleTemplate::new(N, &preamble).unwrap();
        let mut received: Vec<IQSample> = template.samples().to_vec();
        for (i, s) in received.iter_mut().enumerate() {
            let tweak = if i < N { 1.05 } else { 0.95 };
            *s *= tweak;
        }

        let h0 = estimator.half_estimate(0, &received[..N]);
        let h1 = estimator.half_estimate(1, &received[N..]);
        let manual: Vec<Complex64> = h0
            .iter()
            .zip(h1.iter())
            .map(|(a, b)| 0.5 * (a + b))
            .collect();

        let combined = estimator.estimate(&received);
        for (m, c) in manual.iter().zip(combined.iter()) {
            assert!((m - c).norm() < 1e-12);
        }
    }

    #[test]
    fn test_unoccupied_bins_estimate_to_zero() {
        // generate_preamble leaves DC empty: the estimate there must be a
        // clean zero, never NaN or infinity.
        let preamble = generate_preamble(N, 42);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();
        let template = PreambleTemplate::new(N, &preamble).unwrap();

        let taps = estimator.estimate(template.samples());
        assert!(taps.iter().all(|t| t.re.is_finite() && t.im.is_finite()));
        assert_eq!(taps[0], Complex64::new(0.0, 0.0));
        // Occupied bins still estimate to unity.
        assert!((taps[1].norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cfo_removal_before_estimation() {
        let preamble = dense_preamble(N, 5);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();
        let template = PreambleTemplate::new(N, &preamble).unwrap();

        let cfo = 0.12;
        let rotated: Vec<IQSample> = template
            .samples()
            .iter()
            .enumerate()
            .map(|(k, s)| {
                let phase = PI * cfo * k as f64 / N as f64;
                s * Complex64::new(phase.cos(), phase.sin())
            })
            .collect();

        let corrected = estimator.remove_cfo(&rotated, cfo);
        let taps = estimator.estimate(&corrected);
        for tap in &taps {
            assert!((tap - Complex64::new(1.0, 0.0)).norm() < 1e-9);
        }
    }

    #[test]
    fn test_end_to_end_sync_then_estimate() {
        // Full receive path: detect the preamble in a stream, window at the
        // reported offset, derotate with the reported CFO, estimate.
        let n = N;
        let preamble = dense_preamble(n, 3);
        let template = PreambleTemplate::new(n, &preamble).unwrap();
        let mut sync = SyncKernel::new(n, 8, &preamble, 256, 0.3).unwrap();
        let estimator = ChannelEstimator::new(n, &preamble).unwrap();

        let gain = 0.7;
        let cfo = 0.05;
        let offset = 100usize;
        let mut stream = vec![Complex64::new(0.0, 0.0); 256];
        for (i, &p) in template.samples().iter().enumerate() {
            stream[offset + i] = p * gain;
        }
        for (k, s) in stream.iter_mut().enumerate() {
            let phase = PI * cfo * k as f64 / n as f64;
            *s *= Complex64::new(phase.cos(), phase.sin());
        }

        let result = sync.detect(&stream);
        assert_eq!(result.offset, Some(offset as i64));

        let window = &stream[offset..offset + 2 * n];
        let corrected = estimator.remove_cfo(window, result.cfo);
        let taps = estimator.estimate(&corrected);

        // The uncorrected carrier phase accumulated before the frame start
        // shows up as a constant rotation: magnitude must match the channel
        // gain, phase must be flat across subcarriers.
        let phase0 = taps[0].arg();
        for (k, tap) in taps.iter().enumerate() {
            assert!(
                (tap.norm() - gain).abs() < 1e-6,
                "subcarrier {k}: |H|={} expected {gain}",
                tap.norm()
            );
            let mut dphi = tap.arg() - phase0;
            while dphi > PI {
                dphi -= 2.0 * PI;
            }
            while dphi < -PI {
                dphi += 2.0 * PI;
            }
            assert!(dphi.abs() < 1e-6, "subcarrier {k}: phase ripple {dphi}");
        }
    }

    #[test]
    fn test_construction_rejects_bad_preamble() {
        let short = vec![Complex64::new(1.0, 0.0); N];
        assert!(ChannelEstimator::new(N, &short).is_err());
        assert!(ChannelEstimator::new(0, &[]).is_err());
    }

    #[test]
    #[should_panic(expected = "preamble window must be")]
    fn test_estimate_wrong_length_panics() {
        let preamble = dense_preamble(N, 1);
        let estimator = ChannelEstimator::new(N, &preamble).unwrap();
        let bad = vec![Complex64::new(0.0, 0.0); N];
        estimator.estimate(&bad);
    }
}
