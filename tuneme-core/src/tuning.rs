//! # Musical Tuning Module
//!
//! Maps frequencies to equal-tempered note names and back, referenced to
//! A4 = 440 Hz.
//!
//! ## Conventions
//! - Note names use sharps only: C, C#, D, D#, E, F, F#, G, G#, A, A#, B
//! - Octaves change at C (scientific pitch notation, C4 = middle C)
//! - Key numbers follow the piano scheme where A4 is key 49
//! - Semitone rounding is `f64::round`, i.e. half away from zero

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TunerError};

/// Reference pitch for A4 in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

/// Key number of A4 in the piano key-number scheme.
pub const A4_KEY_NUMBER: i32 = 49;

/// Semitones between C0 and A4.
const C0_TO_A4_SEMITONES: i32 = 57;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the twelve chromatic pitch classes, starting at C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Position in the chromatic sequence (C = 0, B = 11).
    pub const fn index(self) -> i32 {
        self as i32
    }

    pub fn from_index(index: i32) -> PitchClass {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A musical note: pitch class plus octave.
///
/// Serialises as its display name (`"E2"`, `"C#3"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i32,
}

impl Note {
    pub const fn new(pitch_class: PitchClass, octave: i32) -> Self {
        Self { pitch_class, octave }
    }

    /// Semitones above C0.
    fn semitones_from_c0(&self) -> i32 {
        self.octave * 12 + self.pitch_class.index()
    }

    /// Piano key number of this note (A4 = 49, C4 = 40, A0 = 1).
    ///
    /// Notes outside the 88-key range simply extend the numbering.
    pub fn key_number(&self) -> i32 {
        self.semitones_from_c0() - C0_TO_A4_SEMITONES + A4_KEY_NUMBER
    }

    /// Equal-tempered frequency of this note in Hz.
    pub fn frequency(&self) -> f32 {
        to_frequency(*self)
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl FromStr for Note {
    type Err = TunerError;

    /// Parses names like `"E2"`, `"C#3"` or `"A-1"`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TunerError::InvalidNoteName(s.to_string());
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(invalid)?;
        let (name, octave) = trimmed.split_at(split);

        let pitch_class = PitchClass::ALL
            .iter()
            .copied()
            .find(|pc| pc.name().eq_ignore_ascii_case(name))
            .ok_or_else(invalid)?;
        let octave = octave.parse::<i32>().map_err(|_| invalid())?;

        Ok(Note::new(pitch_class, octave))
    }
}

impl From<Note> for String {
    fn from(note: Note) -> String {
        note.to_string()
    }
}

impl TryFrom<String> for Note {
    type Error = TunerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Finds the nearest equal-tempered note to a frequency.
///
/// The semitone distance from C0 (`A4 / 2^4.75`) is rounded half away from
/// zero, so a frequency exactly between two notes maps to the upper one.
///
/// # Errors
/// * `InvalidFrequency` - if `frequency_hz` is not a positive, finite number
pub fn to_note(frequency_hz: f32) -> Result<Note> {
    if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
        return Err(TunerError::InvalidFrequency(frequency_hz));
    }

    let c0 = A4_FREQUENCY as f64 * 2.0_f64.powf(-4.75);
    let h = (12.0 * (frequency_hz as f64 / c0).log2()).round() as i32;

    Ok(Note::new(PitchClass::from_index(h), h.div_euclid(12)))
}

/// Equal-tempered frequency of a note: `A4 * 2^((key_number - 49) / 12)`.
pub fn to_frequency(note: Note) -> f32 {
    let offset = (note.key_number() - A4_KEY_NUMBER) as f32;
    A4_FREQUENCY * 2.0_f32.powf(offset / 12.0)
}

/// Calculates the deviation of `freq` from `reference` in cents.
///
/// Positive values are sharp, negative values flat; 100 cents = 1 semitone.
pub fn cents_between(freq: f32, reference: f32) -> f32 {
    1200.0 * (freq / reference).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(s: &str) -> Note {
        s.parse().unwrap()
    }

    #[test]
    fn reference_pitch_maps_exactly() {
        assert_eq!(to_note(440.0).unwrap(), Note::new(PitchClass::A, 4));
        assert_eq!(to_frequency(Note::new(PitchClass::A, 4)), 440.0);
    }

    #[test]
    fn key_numbers_follow_piano_layout() {
        assert_eq!(note("A0").key_number(), 1);
        assert_eq!(note("C4").key_number(), 40);
        assert_eq!(note("A4").key_number(), 49);
        assert_eq!(note("C8").key_number(), 88);
    }

    #[test]
    fn guitar_strings_have_expected_frequencies() {
        let cases = [
            ("E2", 82.4069),
            ("A2", 110.0),
            ("D3", 146.8324),
            ("G3", 195.9977),
            ("B3", 246.9417),
            ("E4", 329.6276),
        ];
        for (name, freq) in cases {
            let actual = to_frequency(note(name));
            assert!((actual - freq).abs() < 0.01, "{name}: {actual}");
            assert_eq!(to_note(freq).unwrap(), note(name));
        }
    }

    #[test]
    fn round_trip_stays_within_a_semitone() {
        let semitone = 2.0_f32.powf(1.0 / 12.0);
        let mut freq = 10.0_f32;
        while freq < 8000.0 {
            let back = to_frequency(to_note(freq).unwrap());
            let ratio = if back > freq { back / freq } else { freq / back };
            assert!(ratio <= semitone, "{freq} -> {back}");
            freq *= 1.013;
        }
    }

    #[test]
    fn quarter_tone_rounds_up() {
        // 50 cents above A4 lies exactly between A4 and A#4.
        let freq = 440.0 * 2.0_f32.powf(0.5 / 12.0) * 1.000_001;
        assert_eq!(to_note(freq).unwrap(), note("A#4"));
        let just_below = 440.0 * 2.0_f32.powf(0.49 / 12.0);
        assert_eq!(to_note(just_below).unwrap(), note("A4"));
    }

    #[test]
    fn octave_boundaries_roll_over_at_c() {
        assert_eq!(to_note(261.63).unwrap(), note("C4"));
        assert_eq!(to_note(246.94).unwrap(), note("B3"));
        // Below C0 the octave goes negative.
        assert_eq!(to_note(8.18).unwrap(), note("C-1"));
    }

    #[test]
    fn non_positive_frequencies_are_rejected() {
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(to_note(bad), Err(TunerError::InvalidFrequency(_))));
        }
    }

    #[test]
    fn parses_and_displays_names() {
        assert_eq!(note("c#3"), Note::new(PitchClass::CSharp, 3));
        assert_eq!(note("A-1").to_string(), "A-1");
        assert_eq!(note(" G3 ").to_string(), "G3");
        assert!("H2".parse::<Note>().is_err());
        assert!("E".parse::<Note>().is_err());
        assert!("E2x".parse::<Note>().is_err());
    }

    #[test]
    fn cents_deviation() {
        assert!((cents_between(880.0, 440.0) - 1200.0).abs() < 1e-3);
        assert!(cents_between(439.0, 440.0) < 0.0);
        assert_eq!(cents_between(440.0, 440.0), 0.0);
    }

    #[test]
    fn note_serialises_as_name() {
        let json = serde_json::to_string(&note("D#2")).unwrap();
        assert_eq!(json, "\"D#2\"");
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back, note("D#2"));
    }
}
