//! Start/stop behaviour of the tuner against synthetic audio sources.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tuneme_core::{
    AudioFrame, AudioSource, STRING_COUNT, SignalGenerator, Tuner, TunerConfig, TunerError,
    TunerEvent, TuningProfile, TuningStatus, select_preset,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for the first event matching `pred`.
fn wait_for(rx: &Receiver<TunerEvent>, pred: impl Fn(&TunerEvent) -> bool) -> TunerEvent {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return event,
            Ok(_) => continue,
            Err(e) => panic!("no matching event: {e}"),
        }
    }
}

/// Reports a device failure on its first `open`, then behaves like a silent
/// device.
struct FlakySource {
    fail_next: bool,
    opened: usize,
    frames: Option<Sender<AudioFrame>>,
}

impl AudioSource for FlakySource {
    fn open(
        &mut self,
        _config: &TunerConfig,
        frames: Sender<AudioFrame>,
        errors: Sender<TunerError>,
    ) -> tuneme_core::Result<()> {
        self.opened += 1;
        if self.fail_next {
            self.fail_next = false;
            errors
                .try_send(TunerError::AudioSource("device disconnected".into()))
                .unwrap();
        }
        self.frames = Some(frames);
        Ok(())
    }

    fn close(&mut self) {
        self.frames = None;
    }
}

#[test]
fn detects_in_tune_low_e_from_generator() {
    let source = SignalGenerator::new(82.4069, 0.5).unpaced();
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let events = tuner.session().subscribe();

    tuner.start().unwrap();
    assert!(tuner.is_active());

    let event = wait_for(&events, |e| matches!(e, TunerEvent::StringUpdated(_)));
    let TunerEvent::StringUpdated(state) = event else {
        unreachable!()
    };
    assert_eq!(state.string_index, 0);
    assert_eq!(state.status, TuningStatus::InTune);
    assert_eq!(state.proximity_score, 100);
    assert!(state.cents_offset.unwrap().abs() < 5.0);

    tuner.stop();
    assert!(!tuner.is_active());
}

#[test]
fn start_twice_is_rejected() {
    let source = SignalGenerator::new(110.0, 0.5);
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();

    tuner.start().unwrap();
    assert_eq!(tuner.start(), Err(TunerError::StreamAlreadyActive));
    tuner.stop();

    // Stop, then start again is fine.
    tuner.start().unwrap();
    tuner.stop();
}

#[test]
fn no_updates_after_stop_returns() {
    let source = SignalGenerator::new(196.0, 0.5).unpaced();
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let events = tuner.session().subscribe();
    tuner.session().set_active_string(3).unwrap();

    tuner.start().unwrap();
    wait_for(&events, |e| matches!(e, TunerEvent::StringUpdated(_)));
    tuner.stop();

    let remaining: Vec<_> = events.try_iter().collect();
    assert!(matches!(
        remaining.last(),
        Some(TunerEvent::SessionStopped { reason: None })
    ));
    assert!(
        tuner
            .session()
            .snapshot()
            .strings
            .iter()
            .all(|s| s.status == TuningStatus::Unset)
    );

    std::thread::sleep(Duration::from_millis(100));
    assert!(events.try_recv().is_err());
}

#[test]
fn stop_is_a_no_op_when_idle() {
    let source = SignalGenerator::new(110.0, 0.5);
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let events = tuner.session().subscribe();

    tuner.stop();
    tuner.stop();
    assert!(events.try_recv().is_err());
    assert!(!tuner.is_active());
}

#[test]
fn source_failure_stops_the_session_until_restarted() {
    let source = FlakySource {
        fail_next: true,
        opened: 0,
        frames: None,
    };
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let events = tuner.session().subscribe();

    tuner.start().unwrap();
    let event = wait_for(&events, |e| matches!(e, TunerEvent::SessionStopped { .. }));
    assert_eq!(
        event,
        TunerEvent::SessionStopped {
            reason: Some("Audio source error: device disconnected".into())
        }
    );
    assert!(!tuner.is_active());

    // Explicit restart, straight after the failure event.
    tuner.start().unwrap();
    assert!(tuner.is_active());
    tuner.stop();
    wait_for(&events, |e| {
        matches!(e, TunerEvent::SessionStopped { reason: None })
    });
}

#[test]
fn restart_right_after_failure_event_succeeds() {
    for _ in 0..50 {
        let source = FlakySource {
            fail_next: true,
            opened: 0,
            frames: None,
        };
        let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
        let events = tuner.session().subscribe();

        tuner.start().unwrap();
        wait_for(&events, |e| {
            matches!(e, TunerEvent::SessionStopped { reason: Some(_) })
        });
        assert_eq!(tuner.start(), Ok(()));
        tuner.stop();
    }
}

#[test]
fn profile_change_while_running_resets_strings() {
    let source = SignalGenerator::new(82.4069, 0.5).unpaced();
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let events = tuner.session().subscribe();

    tuner.start().unwrap();
    wait_for(&events, |e| matches!(e, TunerEvent::StringUpdated(_)));

    tuner.session().set_profile(select_preset("Drop D"));
    wait_for(&events, |e| matches!(e, TunerEvent::ProfileChanged(_)));
    let TunerEvent::StringUpdated(state) =
        wait_for(&events, |e| matches!(e, TunerEvent::StringUpdated(_)))
    else {
        unreachable!()
    };
    assert!(tuner.is_active());
    assert_eq!(state.expected_note.to_string(), "D2");
    assert_eq!(state.detected_note.map(|n| n.to_string()), Some("E2".into()));
    assert_eq!(state.status, TuningStatus::Far);

    let snapshot = tuner.session().snapshot();
    assert_eq!(snapshot.profile.name, "Drop D");
    assert!(snapshot.strings[1..].iter().all(|s| s.status == TuningStatus::Unset));
    tuner.stop();
}

/// Replays an event log and checks every update against the profile and
/// active string that were current when it was published.
fn assert_updates_follow_selection(log: &[TunerEvent], mut profile: TuningProfile) -> usize {
    let mut active = 0;
    let mut updates = 0;
    for event in log {
        match event {
            TunerEvent::ProfileChanged(p) => profile = p.clone(),
            TunerEvent::ActiveStringChanged { string_index } => active = *string_index,
            TunerEvent::StringUpdated(state) => {
                assert_eq!(state.string_index, active, "update routed to a stale string");
                assert_eq!(state.expected_note, profile.note(active), "stale profile");
                updates += 1;
            }
            TunerEvent::SessionStopped { .. } => {}
        }
    }
    updates
}

#[test]
fn string_and_profile_selection_race_with_analysis() {
    let source = SignalGenerator::new(110.0, 0.5).unpaced();
    let mut tuner = Tuner::new(TunerConfig::default(), Box::new(source)).unwrap();
    let initial = tuner.session().profile();
    let log = tuner.session().subscribe();
    let ready = tuner.session().subscribe();

    tuner.start().unwrap();
    wait_for(&ready, |e| matches!(e, TunerEvent::StringUpdated(_)));

    let session = Arc::clone(tuner.session());
    let selector = thread::spawn(move || {
        let presets = ["Drop D", "DADGAD", "Open G", "Standard"];
        for i in 0..300 {
            session.set_active_string((i % STRING_COUNT) as i32).unwrap();
            if i % 20 == 0 {
                session.set_profile(select_preset(presets[(i / 20) % presets.len()]));
            }
            thread::sleep(Duration::from_micros(200));
        }
    });
    selector.join().unwrap();
    tuner.stop();

    let events: Vec<_> = log.try_iter().collect();
    let updates = assert_updates_follow_selection(&events, initial);
    assert!(updates > 1, "only {updates} updates were published");
}

#[test]
fn invalid_config_is_rejected() {
    let config = TunerConfig {
        block_size: 100,
        ..Default::default()
    };
    let result = Tuner::new(config, Box::new(SignalGenerator::new(110.0, 0.5)));
    assert!(matches!(result, Err(TunerError::InvalidConfig(_))));
}
