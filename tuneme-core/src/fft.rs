//! # Fast Fourier Transform (FFT) Module
//!
//! FFT helpers for the pitch estimator. The YIN difference function needs the
//! correlation of a frame's leading window with every lagged copy of the
//! frame; computing it in the frequency domain keeps the per-frame cost at
//! O(n log n) so analysis stays well inside the frame period.

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Removes the DC offset from a signal by making its average value zero.
///
/// A constant offset would otherwise add a lag-independent term to the
/// correlation and bias the difference function.
pub fn remove_dc_offset(signal: &mut [f64]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f64>() / len as f64;
    if avg.abs() > 1e-9 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Pre-planned windowed cross-correlation for a fixed frame length.
///
/// For a frame `x`, a window length `W` and lags `0..=max_lag` this computes
/// `r(tau) = sum_{j < W} x[j] * x[j + tau]`. The caller guarantees
/// `W + max_lag <= frame_len`.
pub struct WindowedCorrelator {
    frame_len: usize,
    fft_len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for WindowedCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedCorrelator")
            .field("frame_len", &self.frame_len)
            .field("fft_len", &self.fft_len)
            .finish()
    }
}

impl WindowedCorrelator {
    pub fn new(frame_len: usize, window: usize) -> Self {
        // Linear (not circular) correlation needs room for both sequences.
        let fft_len = (frame_len + window).next_power_of_two();
        let mut planner = FftPlanner::new();
        Self {
            frame_len,
            fft_len,
            forward: planner.plan_fft_forward(fft_len),
            inverse: planner.plan_fft_inverse(fft_len),
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Fills `out[tau]` with the windowed correlation at lag `tau`.
    pub fn correlate(&self, frame: &[f64], window: usize, out: &mut [f64]) {
        debug_assert_eq!(frame.len(), self.frame_len);
        debug_assert!(window + out.len() - 1 <= self.frame_len);

        let to_complex = |s: &f64| Complex { re: *s, im: 0.0 };
        let mut head = vec![Complex::default(); self.fft_len];
        let mut full = vec![Complex::default(); self.fft_len];
        for (dst, src) in head.iter_mut().zip(frame[..window].iter()) {
            *dst = to_complex(src);
        }
        for (dst, src) in full.iter_mut().zip(frame.iter()) {
            *dst = to_complex(src);
        }

        self.forward.process(&mut head);
        self.forward.process(&mut full);

        // conj(H) * F is the transform of the correlation of head with full.
        for (h, f) in head.iter_mut().zip(full.iter()) {
            *h = h.conj() * *f;
        }
        self.inverse.process(&mut head);

        // RustFFT does not normalise.
        let scale = 1.0 / self.fft_len as f64;
        for (dst, c) in out.iter_mut().zip(head.iter()) {
            *dst = c.re * scale;
        }
    }
}
