//! # String Tuning State
//!
//! Per-string classifier that compares what was heard against the target
//! note of that string.
//!
//! The classifier is deliberately coarse: an exact note match is in tune, a
//! miss within [`CLOSE_THRESHOLD_HZ`] of the target frequency is close, and
//! anything else is far. The threshold is an absolute number of Hz, so it is
//! much stricter in cents on high strings than on low ones.

use serde::{Deserialize, Serialize};

use crate::tuning::{self, Note};

/// Maximum distance in Hz from the target frequency for a `Close` result.
pub const CLOSE_THRESHOLD_HZ: f32 = 1.0;

/// Tuning status of a single string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TuningStatus {
    /// No pitch has been classified since the profile was (re)selected.
    #[default]
    Unset,
    InTune,
    Close,
    Far,
}

impl TuningStatus {
    /// Normalised proximity score shown to the user (0..=100).
    pub fn proximity_score(self) -> u8 {
        match self {
            TuningStatus::Unset => 0,
            TuningStatus::InTune => 100,
            TuningStatus::Close => 66,
            TuningStatus::Far => 33,
        }
    }
}

/// Classifies a detection against the expected note.
///
/// Returns the status together with its proximity score.
pub fn classify(detected: Note, detected_freq: f32, expected: Note) -> (TuningStatus, u8) {
    let status = if detected == expected {
        TuningStatus::InTune
    } else {
        let freq_diff = (tuning::to_frequency(expected) - detected_freq).abs();
        if freq_diff < CLOSE_THRESHOLD_HZ {
            TuningStatus::Close
        } else {
            TuningStatus::Far
        }
    };
    (status, status.proximity_score())
}

/// Observable state of one string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StringState {
    pub string_index: usize,
    pub expected_note: Note,
    pub status: TuningStatus,
    pub proximity_score: u8,
    /// Last note heard on this string.
    pub detected_note: Option<Note>,
    pub detected_frequency: Option<f32>,
    /// Offset of the detected frequency from the expected note, in cents.
    pub cents_offset: Option<f32>,
}

impl StringState {
    pub fn new(string_index: usize, expected_note: Note) -> Self {
        Self {
            string_index,
            expected_note,
            status: TuningStatus::Unset,
            proximity_score: 0,
            detected_note: None,
            detected_frequency: None,
            cents_offset: None,
        }
    }

    /// Re-drives the state machine with a new detection.
    pub fn apply(&mut self, detected: Note, detected_freq: f32) {
        let (status, score) = classify(detected, detected_freq, self.expected_note);
        self.status = status;
        self.proximity_score = score;
        self.detected_note = Some(detected);
        self.detected_frequency = Some(detected_freq);
        self.cents_offset = Some(tuning::cents_between(
            detected_freq,
            self.expected_note.frequency(),
        ));
    }

    /// Back to `Unset`, keeping the string's position and target.
    pub fn reset(&mut self) {
        *self = Self::new(self.string_index, self.expected_note);
    }
}
