// tuneme-core/src/lib.rs

//! The core logic for the guitar tuner.
//! This crate is responsible for audio capture, pitch detection, note
//! mapping and per-string tuning state. It is completely headless and
//! contains no UI code; front-ends subscribe to [`TunerEvent`]s.
//!
//! Data flow: audio frames → [`PitchEstimator`] → [`tuning::to_note`] →
//! [`string_state::classify`] (against the active string of the
//! [`TuningProfile`]) → events.

pub mod audio;
pub mod config;
pub mod error;
pub mod fft;
pub mod pitch;
pub mod profile;
pub mod session;
pub mod string_state;
pub mod tuner;
pub mod tuning;

pub use audio::{AudioFrame, AudioSource, CpalInput, SignalGenerator};
pub use config::TunerConfig;
pub use error::{Result, TunerError};
pub use pitch::{PitchEstimate, PitchEstimator};
pub use profile::{STRING_COUNT, TuningPreset, TuningProfile, select_preset};
pub use session::{SessionController, SessionSnapshot, TunerEvent};
pub use string_state::{StringState, TuningStatus};
pub use tuner::Tuner;
pub use tuning::{Note, PitchClass};
