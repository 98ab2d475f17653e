//! # Session Controller
//!
//! Owns the active tuning profile, the six string states and the active
//! string selection, and publishes every change as a [`TunerEvent`].
//!
//! ## Threading
//! - The analysis thread calls [`SessionController::on_pitch_estimate`]
//! - The UI thread selects strings and profiles and reads snapshots
//! - All mutation happens under one mutex held only for the state update and
//!   the non-blocking event send, so an estimate is always classified against
//!   the active index that was current when it was applied

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace};

use crate::error::{Result, TunerError};
use crate::pitch::PitchEstimate;
use crate::profile::{STRING_COUNT, TuningProfile};
use crate::string_state::StringState;
use crate::tuning;

/// State changes published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TunerEvent {
    /// A pitch estimate was classified against the active string.
    StringUpdated(StringState),
    /// A new profile was selected; every string is back to `Unset`.
    ProfileChanged(TuningProfile),
    ActiveStringChanged { string_index: usize },
    /// The session stopped; `reason` is set when the audio source failed.
    SessionStopped { reason: Option<String> },
}

/// Copy of the observable session state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub profile: TuningProfile,
    pub active_string: usize,
    pub strings: [StringState; STRING_COUNT],
}

#[derive(Debug)]
struct SessionState {
    profile: TuningProfile,
    active_string: usize,
    strings: [StringState; STRING_COUNT],
    subscribers: Vec<Sender<TunerEvent>>,
}

impl SessionState {
    fn publish(&mut self, event: TunerEvent) {
        // Receivers that were dropped are pruned here.
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    fn reset_strings(&mut self) {
        self.strings = fresh_strings(&self.profile);
    }
}

fn fresh_strings(profile: &TuningProfile) -> [StringState; STRING_COUNT] {
    std::array::from_fn(|i| StringState::new(i, profile.note(i)))
}

/// Tuning session shared between the analysis thread and the UI.
#[derive(Debug)]
pub struct SessionController {
    state: Mutex<SessionState>,
}

impl SessionController {
    pub fn new(profile: TuningProfile) -> Self {
        let strings = fresh_strings(&profile);
        Self {
            state: Mutex::new(SessionState {
                profile,
                active_string: 0,
                strings,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Every critical section leaves the state consistent, so a panic on
        // another thread does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new event subscriber.
    ///
    /// The channel is unbounded so that every update reaches every
    /// subscriber in order. A subscriber that stops draining its receiver
    /// holds every later event in memory; drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> Receiver<TunerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Routes a pitch estimate to the active string.
    ///
    /// Estimates without a pitch leave every string untouched and return
    /// `Ok(None)`. Otherwise the updated state is returned and published as
    /// exactly one `StringUpdated` event.
    ///
    /// # Errors
    /// * `InvalidFrequency` - if the estimate carries a non-positive frequency
    pub fn on_pitch_estimate(&self, estimate: PitchEstimate) -> Result<Option<StringState>> {
        let Some(frequency) = estimate.frequency_hz else {
            trace!(level_db = estimate.level_db, "No pitch in frame");
            return Ok(None);
        };
        let detected = tuning::to_note(frequency)?;

        let mut state = self.lock();
        let index = state.active_string;
        let string = &mut state.strings[index];
        string.apply(detected, frequency);
        let updated = *string;

        debug!(
            string = index,
            detected = %detected,
            expected = %updated.expected_note,
            frequency,
            status = ?updated.status,
            "Classified pitch"
        );
        state.publish(TunerEvent::StringUpdated(updated));
        Ok(Some(updated))
    }

    /// Replaces the tuning profile and resets every string to `Unset`.
    pub fn set_profile(&self, profile: TuningProfile) {
        info!(%profile, "Tuning profile selected");
        let mut state = self.lock();
        state.profile = profile;
        state.reset_strings();
        let event = TunerEvent::ProfileChanged(state.profile.clone());
        state.publish(event);
    }

    /// Selects the string that subsequent estimates are classified against.
    ///
    /// # Errors
    /// * `IndexOutOfRange` - unless `index` is in `0..=5`
    pub fn set_active_string(&self, index: i32) -> Result<()> {
        let string_index = usize::try_from(index)
            .ok()
            .filter(|&i| i < STRING_COUNT)
            .ok_or(TunerError::IndexOutOfRange(index))?;

        let mut state = self.lock();
        state.active_string = string_index;
        state.publish(TunerEvent::ActiveStringChanged { string_index });
        Ok(())
    }

    pub fn active_string(&self) -> usize {
        self.lock().active_string
    }

    pub fn profile(&self) -> TuningProfile {
        self.lock().profile.clone()
    }

    pub fn string_state(&self, index: usize) -> Option<StringState> {
        self.lock().strings.get(index).copied()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            profile: state.profile.clone(),
            active_string: state.active_string,
            strings: state.strings,
        }
    }

    /// Ends the session: every string returns to `Unset` and subscribers are
    /// told why.
    pub fn halt(&self, reason: Option<String>) {
        let mut state = self.lock();
        state.reset_strings();
        state.publish(TunerEvent::SessionStopped { reason });
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(TuningProfile::default())
    }
}
