//! Tuner configuration
//!
//! Everything the engine needs is injected through [`TunerConfig`]; the core
//! never reads files or environment variables itself.

use serde::Deserialize;

use crate::error::{Result, TunerError};
use crate::profile::{self, TuningProfile};
use crate::tuning::Note;

/// Sample rate the engine is designed around (CD quality).
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Samples per analysis frame (~46ms at 44.1kHz).
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Frames quieter than this (RMS, dBFS) carry no pitch.
pub const DEFAULT_SILENCE_THRESHOLD_DB: f32 = -40.0;

/// Accepted block sizes.
pub const MIN_BLOCK_SIZE: usize = 1024;
pub const MAX_BLOCK_SIZE: usize = 2048;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub sample_rate: u32,
    pub block_size: usize,
    pub silence_threshold_db: f32,
    /// Lowest frequency the estimator searches for, in Hz.
    pub min_frequency: f32,
    /// Highest frequency the estimator searches for, in Hz.
    pub max_frequency: f32,
    pub preset: String,
    /// Six note names; overrides `preset` when present.
    pub custom_notes: Option<Vec<String>>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            silence_threshold_db: DEFAULT_SILENCE_THRESHOLD_DB,
            min_frequency: 60.0,
            max_frequency: 1500.0,
            preset: "Standard".to_string(),
            custom_notes: None,
        }
    }
}

impl TunerConfig {
    /// Checks that all values are usable by the estimator.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(TunerError::InvalidConfig("sample rate must be positive".into()));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(TunerError::InvalidConfig(format!(
                "block size {} outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if !(self.silence_threshold_db < 0.0) {
            return Err(TunerError::InvalidConfig(format!(
                "silence threshold must be below 0 dBFS, got {}",
                self.silence_threshold_db
            )));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.min_frequency > 0.0
            && self.min_frequency < self.max_frequency
            && self.max_frequency < nyquist)
        {
            return Err(TunerError::InvalidConfig(format!(
                "frequency range {}..{} Hz is not within 0..{nyquist} Hz",
                self.min_frequency, self.max_frequency
            )));
        }
        Ok(())
    }

    /// Resolves the initial tuning profile.
    ///
    /// Custom notes win over the preset name. An unknown preset name falls
    /// back to Standard.
    pub fn profile(&self) -> Result<TuningProfile> {
        match &self.custom_notes {
            Some(names) => {
                let notes = names
                    .iter()
                    .map(|name| name.parse::<Note>())
                    .collect::<Result<Vec<_>>>()?;
                TuningProfile::custom(&notes)
            }
            None => Ok(profile::select_preset(&self.preset)),
        }
    }

    /// Duration of one frame in seconds.
    pub fn frame_period(&self) -> f32 {
        self.block_size as f32 / self.sample_rate as f32
    }
}
