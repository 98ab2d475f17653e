//! Text rendering of tuner events and parsing of stdin commands.

use tuneme_core::{StringState, TunerEvent, TuningProfile, TuningStatus};

/// Width of the proximity bar in characters.
const BAR_WIDTH: usize = 10;

/// Commands typed by the user while the tuner runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Select a string by 0-based index (may be out of range).
    SelectString(i32),
    /// Switch to a preset by name.
    Preset(String),
    Quit,
}

/// Parses one line of user input. Strings are numbered from 1.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line {
        "" => None,
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => {
            if let Some(name) = line.strip_prefix("p ") {
                return Some(Command::Preset(name.trim().to_string()));
            }
            line.parse::<i32>()
                .ok()
                .map(|n| Command::SelectString(string_index(n)))
        }
    }
}

/// Converts a 1-based string number to the 0-based index the session takes.
/// Out-of-range numbers stay out of range so the session rejects them.
pub fn string_index(number: i32) -> i32 {
    number.saturating_sub(1)
}

fn proximity_bar(score: u8) -> String {
    let filled = (score as usize * BAR_WIDTH).div_ceil(100);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

fn render_string(state: &StringState) -> String {
    let label = format!("String {}: {}", state.string_index + 1, state.expected_note);
    let detected = state
        .detected_note
        .map(|n| n.to_string())
        .unwrap_or_default();
    let status = match state.status {
        TuningStatus::Unset => "not tuned".to_string(),
        TuningStatus::InTune => "in tune".to_string(),
        TuningStatus::Close => format!("almost: {detected}"),
        TuningStatus::Far => format!("tuning: {detected}"),
    };
    let mut line = format!("{label} ({status}) {}", proximity_bar(state.proximity_score));
    if let (Some(freq), Some(cents)) = (state.detected_frequency, state.cents_offset) {
        line.push_str(&format!(" {freq:.2} Hz {cents:+.1} cents"));
    }
    line
}

/// One human-readable line per event.
pub fn render(event: &TunerEvent, profile: &TuningProfile) -> String {
    match event {
        TunerEvent::StringUpdated(state) => render_string(state),
        TunerEvent::ProfileChanged(profile) => format!("Tuning: {profile}"),
        TunerEvent::ActiveStringChanged { string_index } => format!(
            "Now tuning string {} ({})",
            string_index + 1,
            profile.note(*string_index)
        ),
        TunerEvent::SessionStopped { reason: None } => "Tuning stopped".to_string(),
        TunerEvent::SessionStopped {
            reason: Some(reason),
        } => format!("Tuning stopped: {reason}"),
    }
}
