//! Receiver configuration
//!
//! YAML-based configuration for the GFDM receiver kernels: waveform
//! dimensions, chunking, preamble seed, and the detection threshold policy.
//! A config validates itself and can build ready-to-use kernels.
//!
//! ## Example Configuration
//!
//! ```yaml
//! n_subcarriers: 64
//! cp_len: 16
//! chunk_len: 4096
//! preamble_seed: 42
//! threshold:
//!   false_alarm: 1.0e-5
//! ```

use crate::channel_est::ChannelEstimator;
use crate::preamble::generate_preamble;
use crate::sync::SyncKernel;
use crate::types::{GfdmError, GfdmResult, IQSample};
use serde::{Deserialize, Serialize};

/// Detection threshold policy.
///
/// The detector always runs both stages; this selects which knob the
/// configuration drives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Reject coarse peaks below this raw correlation energy.
    Energy(f64),
    /// Derive the adaptive cross-correlation threshold from a target
    /// false-alarm probability. The coarse stage keeps the default energy
    /// gate: the adaptive threshold is relative to the fine statistic's own
    /// sum and cannot reject noise-only chunks by itself.
    FalseAlarm(f64),
}

/// Coarse energy gate used in [`ThresholdMode::FalseAlarm`]. Noise-only
/// correlation peaks stay far below this; a preamble above roughly 0 dB
/// SNR sits near 1.0.
const FALSE_ALARM_COARSE_GATE: f64 = 0.3;

/// Receiver kernel configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Subcarrier count `N`.
    pub n_subcarriers: usize,
    /// Cyclic prefix length in samples.
    pub cp_len: usize,
    /// Fixed processing chunk size handed to `detect`.
    pub chunk_len: usize,
    /// Seed for the generated preamble PN sequence.
    pub preamble_seed: u64,
    /// Threshold policy.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub threshold: ThresholdMode,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            n_subcarriers: 64,
            cp_len: 16,
            chunk_len: 4096,
            preamble_seed: 42,
            threshold: ThresholdMode::FalseAlarm(1e-5),
        }
    }
}

impl ReceiverConfig {
    /// Check the configuration for consistency.
    pub fn validate(&self) -> GfdmResult<()> {
        if self.n_subcarriers == 0 {
            return Err(GfdmError::InvalidSubcarrierCount(self.n_subcarriers));
        }
        let min_chunk = 5 * self.n_subcarriers;
        if self.chunk_len < min_chunk {
            return Err(GfdmError::InvalidChunkSize {
                min: min_chunk,
                actual: self.chunk_len,
            });
        }
        match self.threshold {
            ThresholdMode::Energy(v) if v < 0.0 => Err(GfdmError::ConfigError(format!(
                "energy threshold must be non-negative, got {v}"
            ))),
            ThresholdMode::FalseAlarm(p) if !(p > 0.0 && p < 1.0) => {
                Err(GfdmError::InvalidFalseAlarmProbability(p))
            }
            _ => Ok(()),
        }
    }

    /// Parse and validate a config from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> GfdmResult<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| GfdmError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> GfdmResult<String> {
        serde_yaml::to_string(self).map_err(|e| GfdmError::ConfigError(e.to_string()))
    }

    /// The preamble this configuration implies.
    pub fn preamble(&self) -> Vec<IQSample> {
        generate_preamble(self.n_subcarriers, self.preamble_seed)
    }

    /// Build a synchronization kernel from this configuration.
    pub fn build_sync(&self) -> GfdmResult<SyncKernel> {
        self.validate()?;
        let preamble = self.preamble();
        match self.threshold {
            ThresholdMode::Energy(v) => SyncKernel::new(
                self.n_subcarriers,
                self.cp_len,
                &preamble,
                self.chunk_len,
                v,
            ),
            ThresholdMode::FalseAlarm(p) => {
                let mut kernel = SyncKernel::new(
                    self.n_subcarriers,
                    self.cp_len,
                    &preamble,
                    self.chunk_len,
                    FALSE_ALARM_COARSE_GATE,
                )?;
                kernel.set_false_alarm_probability(p, 2 * self.n_subcarriers)?;
                Ok(kernel)
            }
        }
    }

    /// Build a channel estimator from this configuration.
    pub fn build_channel_estimator(&self) -> GfdmResult<ChannelEstimator> {
        self.validate()?;
        ChannelEstimator::new(self.n_subcarriers, &self.preamble())
    }
}
