//! # Tuning Profiles
//!
//! A profile assigns one target note to each of the six strings, ordered
//! from the lowest string (index 0) to the highest (index 5). Profiles are
//! immutable; switching tunings replaces the whole profile.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

use crate::error::{Result, TunerError};
use crate::tuning::{Note, PitchClass};
use PitchClass::{A, B, D, E, G};

/// Number of strings every profile covers.
pub const STRING_COUNT: usize = 6;

const fn n(pitch_class: PitchClass, octave: i32) -> Note {
    Note::new(pitch_class, octave)
}

/// The built-in tunings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TuningPreset {
    Standard,
    DropD,
    Dadgad,
    OpenG,
}

impl TuningPreset {
    pub const ALL: [TuningPreset; 4] = [
        TuningPreset::Standard,
        TuningPreset::DropD,
        TuningPreset::Dadgad,
        TuningPreset::OpenG,
    ];

    /// Display name, also the name accepted by [`select_preset`].
    pub fn name(self) -> &'static str {
        match self {
            TuningPreset::Standard => "Standard",
            TuningPreset::DropD => "Drop D",
            TuningPreset::Dadgad => "DADGAD",
            TuningPreset::OpenG => "Open G",
        }
    }

    /// Target notes, lowest string first.
    pub fn notes(self) -> [Note; STRING_COUNT] {
        match self {
            TuningPreset::Standard => [n(E, 2), n(A, 2), n(D, 3), n(G, 3), n(B, 3), n(E, 4)],
            TuningPreset::DropD => [n(D, 2), n(A, 2), n(D, 3), n(G, 3), n(B, 3), n(E, 4)],
            TuningPreset::Dadgad => [n(D, 2), n(A, 2), n(D, 3), n(G, 3), n(A, 3), n(D, 4)],
            TuningPreset::OpenG => [n(D, 2), n(G, 2), n(D, 3), n(G, 3), n(B, 3), n(D, 4)],
        }
    }

    /// Looks up a preset by name, ignoring ASCII case and surrounding spaces.
    pub fn from_name(name: &str) -> Option<TuningPreset> {
        PRESET_MAP.get(&name.trim().to_ascii_lowercase()).copied()
    }
}

/// Lower-cased preset names for lookups.
static PRESET_MAP: Lazy<BTreeMap<String, TuningPreset>> = Lazy::new(|| {
    TuningPreset::ALL
        .iter()
        .map(|preset| (preset.name().to_ascii_lowercase(), *preset))
        .collect()
});

/// An ordered set of six target notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TuningProfile {
    /// Preset name, or "Custom".
    pub name: String,
    notes: [Note; STRING_COUNT],
}

impl TuningProfile {
    pub fn from_preset(preset: TuningPreset) -> Self {
        Self {
            name: preset.name().to_string(),
            notes: preset.notes(),
        }
    }

    /// Builds a profile from a caller-supplied note sequence.
    ///
    /// # Errors
    /// * `InvalidProfileLength` - unless exactly six notes are given
    pub fn custom(notes: &[Note]) -> Result<Self> {
        let notes: [Note; STRING_COUNT] = notes
            .try_into()
            .map_err(|_| TunerError::InvalidProfileLength(notes.len()))?;
        Ok(Self {
            name: "Custom".to_string(),
            notes,
        })
    }

    pub fn notes(&self) -> &[Note; STRING_COUNT] {
        &self.notes
    }

    /// Target note for a string. `index` must be below [`STRING_COUNT`].
    pub fn note(&self, index: usize) -> Note {
        self.notes[index]
    }
}

impl Default for TuningProfile {
    fn default() -> Self {
        Self::from_preset(TuningPreset::Standard)
    }
}

impl fmt::Display for TuningProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, note) in self.notes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{note}")?;
        }
        f.write_str("]")
    }
}

/// Resolves a preset by name.
///
/// Unknown names fall back to Standard tuning; the miss is logged as a
/// warning rather than returned as an error.
pub fn select_preset(name: &str) -> TuningProfile {
    match TuningPreset::from_name(name) {
        Some(preset) => TuningProfile::from_preset(preset),
        None => {
            warn!(preset = name, "Unknown tuning preset, falling back to Standard");
            TuningProfile::from_preset(TuningPreset::Standard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(profile: &TuningProfile) -> Vec<String> {
        profile.notes().iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn dadgad_notes_in_order() {
        let profile = select_preset("DADGAD");
        assert_eq!(names(&profile), ["D2", "A2", "D3", "G3", "A3", "D4"]);
        assert_eq!(profile.name, "DADGAD");
    }

    #[test]
    fn every_preset_resolves_by_name() {
        for preset in TuningPreset::ALL {
            let profile = select_preset(preset.name());
            assert_eq!(profile.notes(), &preset.notes());
        }
        assert_eq!(names(&select_preset("Drop D"))[0], "D2");
        assert_eq!(names(&select_preset("Open G")), ["D2", "G2", "D3", "G3", "B3", "D4"]);
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(TuningPreset::from_name("drop d"), Some(TuningPreset::DropD));
        assert_eq!(TuningPreset::from_name("  dadgad "), Some(TuningPreset::Dadgad));
    }

    #[test]
    fn unknown_preset_falls_back_to_standard() {
        let profile = select_preset("Drop C#");
        assert_eq!(profile, TuningProfile::from_preset(TuningPreset::Standard));
        assert_eq!(names(&profile), ["E2", "A2", "D3", "G3", "B3", "E4"]);
    }

    #[test]
    fn custom_profile_requires_six_notes() {
        let notes: Vec<Note> = ["C2", "G2", "C3", "G3", "C4", "E4"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let profile = TuningProfile::custom(&notes).unwrap();
        assert_eq!(profile.name, "Custom");
        assert_eq!(profile.note(5).to_string(), "E4");

        assert_eq!(
            TuningProfile::custom(&notes[..5]),
            Err(TunerError::InvalidProfileLength(5))
        );
        let mut seven = notes.clone();
        seven.push(notes[0]);
        assert_eq!(
            TuningProfile::custom(&seven),
            Err(TunerError::InvalidProfileLength(7))
        );
    }

    #[test]
    fn display_lists_notes() {
        assert_eq!(
            TuningProfile::default().to_string(),
            "Standard [E2 A2 D3 G3 B3 E4]"
        );
    }
}
