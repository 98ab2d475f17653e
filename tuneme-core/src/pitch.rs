//! # Pitch Detection Module
//!
//! Fundamental-frequency estimation for string instruments using the YIN
//! algorithm.
//!
//! ## Features
//! - Silence gating on frame RMS (dBFS) so quiet frames report "no pitch"
//! - Difference function computed through an FFT correlation
//! - First-dip selection to avoid octave errors
//! - Clarity check to reject noise
//! - Parabolic interpolation for sub-sample accuracy

use serde::Serialize;

use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::fft::{self, WindowedCorrelator};

/// A dip is accepted when it lies this close to the global minimum.
const DIP_TOLERANCE: f64 = 0.05;

/// Normalised difference above which a dip is treated as noise.
const CLARITY_THRESHOLD: f64 = 0.1;

/// Result of analysing one audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PitchEstimate {
    /// Fundamental frequency in Hz, absent for silence or unpitched input.
    pub frequency_hz: Option<f32>,
    /// How periodic the frame was at the chosen lag (0.0 to 1.0).
    pub clarity: f32,
    /// Frame RMS level in dBFS.
    pub level_db: f32,
}

impl PitchEstimate {
    /// An estimate carrying no pitch.
    pub fn none(level_db: f32) -> Self {
        Self {
            frequency_hz: None,
            clarity: 0.0,
            level_db,
        }
    }

    /// An estimate for a known frequency, e.g. from an external detector.
    pub fn from_frequency(frequency_hz: f32) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
            clarity: 1.0,
            level_db: 0.0,
        }
    }

    pub fn has_pitch(&self) -> bool {
        self.frequency_hz.is_some()
    }
}

/// YIN pitch estimator for fixed-size frames.
///
/// The estimator holds only configuration and pre-planned FFTs; `estimate` is
/// a pure function of the frame.
#[derive(Debug)]
pub struct PitchEstimator {
    sample_rate: u32,
    block_size: usize,
    silence_threshold_db: f32,
    /// Shortest lag searched (highest frequency).
    min_lag: usize,
    /// Longest lag searched (lowest frequency).
    max_lag: usize,
    /// Integration window of the difference function.
    window: usize,
    correlator: WindowedCorrelator,
}

impl PitchEstimator {
    pub fn new(config: &TunerConfig) -> Result<Self> {
        config.validate()?;

        let sample_rate = config.sample_rate as f32;
        let block_size = config.block_size;
        let min_lag = ((sample_rate / config.max_frequency).floor() as usize).max(2);
        // Cap the lag range so the integration window keeps a quarter of the
        // frame; the +1 leaves room for interpolating around the last lag.
        let max_lag = ((sample_rate / config.min_frequency).ceil() as usize).min(block_size * 3 / 4 - 1);
        if min_lag + 2 > max_lag {
            return Err(TunerError::InvalidConfig(format!(
                "frequency range {}..{} Hz leaves no lags to search",
                config.min_frequency, config.max_frequency
            )));
        }
        let window = block_size - (max_lag + 1);

        Ok(Self {
            sample_rate: config.sample_rate,
            block_size,
            silence_threshold_db: config.silence_threshold_db,
            min_lag,
            max_lag,
            window,
            correlator: WindowedCorrelator::new(block_size, window),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Lowest frequency this estimator can report, in Hz.
    pub fn lowest_detectable(&self) -> f32 {
        self.sample_rate as f32 / self.max_lag as f32
    }

    /// Estimates the fundamental frequency of one frame.
    ///
    /// # Errors
    /// * `InvalidFrameSize` - if the frame is not exactly `block_size` samples
    pub fn estimate(&self, frame: &[f32]) -> Result<PitchEstimate> {
        if frame.len() != self.block_size {
            return Err(TunerError::InvalidFrameSize {
                expected: self.block_size,
                actual: frame.len(),
            });
        }

        // --- Noise Gate: RMS level in dBFS filters out silence ---
        let mut signal: Vec<f64> = frame.iter().map(|&s| s as f64).collect();
        let rms = (signal.iter().map(|s| s * s).sum::<f64>() / signal.len() as f64).sqrt();
        let level_db = (20.0 * rms.log10()) as f32;
        if !(level_db >= self.silence_threshold_db) {
            return Ok(PitchEstimate::none(level_db));
        }
        fft::remove_dc_offset(&mut signal);

        let cmnd = self.normalized_difference(&signal);

        // --- Step 4: Find the first dip close to the global minimum ---
        let global_min = cmnd[self.min_lag..=self.max_lag]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let threshold = global_min + DIP_TOLERANCE;

        let Some(mut period) = (self.min_lag..=self.max_lag).find(|&tau| cmnd[tau] < threshold)
        else {
            return Ok(PitchEstimate::none(level_db));
        };
        while period < self.max_lag && cmnd[period + 1] < cmnd[period] {
            period += 1;
        }
        // Still falling at the edge: the true period lies beyond the range.
        if period == self.max_lag && cmnd[period + 1] < cmnd[period] {
            return Ok(PitchEstimate::none(level_db));
        }

        // --- Step 5: Clarity check to reject noise ---
        if cmnd[period] > CLARITY_THRESHOLD {
            return Ok(PitchEstimate::none(level_db));
        }

        // --- Step 6: Parabolic interpolation for better precision ---
        let y1 = cmnd[period - 1];
        let y2 = cmnd[period];
        let y3 = cmnd[period + 1];
        let curvature = y1 - 2.0 * y2 + y3;
        let period_float = if curvature.abs() > f64::EPSILON {
            period as f64 + (y1 - y3) / (2.0 * curvature)
        } else {
            period as f64
        };

        let frequency = (self.sample_rate as f64 / period_float) as f32;
        if !(frequency.is_finite() && frequency > 0.0) {
            return Ok(PitchEstimate::none(level_db));
        }

        Ok(PitchEstimate {
            frequency_hz: Some(frequency),
            clarity: (1.0 - y2).clamp(0.0, 1.0) as f32,
            level_db,
        })
    }

    /// Cumulative mean normalised difference for lags `0..=max_lag + 1`.
    fn normalized_difference(&self, signal: &[f64]) -> Vec<f64> {
        let limit = self.max_lag + 1;
        let window = self.window;

        // --- Step 1 & 2: Difference function via correlation ---
        // d(tau) = sum (x[j] - x[j + tau])^2 = e(0) + e(tau) - 2 r(tau)
        let mut correlation = vec![0.0; limit + 1];
        self.correlator.correlate(signal, window, &mut correlation);

        let mut prefix = Vec::with_capacity(signal.len() + 1);
        prefix.push(0.0);
        let mut acc = 0.0;
        for s in signal {
            acc += s * s;
            prefix.push(acc);
        }
        let energy = |start: usize| prefix[start + window] - prefix[start];
        let head_energy = energy(0);

        let mut buffer: Vec<f64> = (0..=limit)
            .map(|tau| (head_energy + energy(tau) - 2.0 * correlation[tau]).max(0.0))
            .collect();

        // --- Step 3: Cumulative mean normalised difference ---
        buffer[0] = 1.0;
        let mut running_sum = 0.0;
        for (tau, value) in buffer.iter_mut().enumerate().skip(1) {
            running_sum += *value;
            if running_sum > 0.0 {
                *value *= tau as f64 / running_sum;
            } else {
                *value = 1.0;
            }
        }
        buffer
    }
}
