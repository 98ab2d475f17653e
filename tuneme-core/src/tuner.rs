//! # Tuner Lifecycle
//!
//! Wires an [`AudioSource`] to the pitch estimator and the session controller.
//!
//! ## Architecture
//! - **Source**: device callback (or generator thread) producing frames
//! - **Analysis thread**: estimates pitch and drives the session
//! - **Communication**: crossbeam channels; frames use a single slot so at
//!   most one frame is in flight
//!
//! `stop` joins the analysis thread before returning, so no estimate reaches
//! the session after it returns.

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFrame, AudioSource};
use crate::config::TunerConfig;
use crate::error::{Result, TunerError};
use crate::pitch::PitchEstimator;
use crate::session::SessionController;

/// Analysis thread management.
#[derive(Debug)]
struct AnalysisWorker {
    shutdown_tx: Sender<()>,
    thread_handle: JoinHandle<()>,
    /// Set by the thread when the source reported a failure.
    failed: Arc<AtomicBool>,
}

impl AnalysisWorker {
    /// A failed worker counts as stopped as soon as the flag is set, which
    /// happens before subscribers hear about the failure.
    fn is_running(&self) -> bool {
        !self.failed.load(Ordering::Acquire) && !self.thread_handle.is_finished()
    }
}

/// A tuning engine bound to one audio source.
pub struct Tuner {
    config: TunerConfig,
    session: Arc<SessionController>,
    estimator: Arc<PitchEstimator>,
    source: Box<dyn AudioSource>,
    worker: Option<AnalysisWorker>,
}

impl Tuner {
    /// Validates the configuration and resolves the initial profile.
    pub fn new(config: TunerConfig, source: Box<dyn AudioSource>) -> Result<Self> {
        let estimator = PitchEstimator::new(&config)?;
        let session = SessionController::new(config.profile()?);
        debug!(
            lowest_hz = estimator.lowest_detectable(),
            block_size = estimator.block_size(),
            "Pitch estimator ready"
        );
        Ok(Self {
            config,
            session: Arc::new(session),
            estimator: Arc::new(estimator),
            source,
            worker: None,
        })
    }

    /// The session, for subscribing and for string/profile selection.
    pub fn session(&self) -> &Arc<SessionController> {
        &self.session
    }

    pub fn config(&self) -> &TunerConfig {
        &self.config
    }

    /// `true` while frames are being analysed.
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(AnalysisWorker::is_running)
    }

    /// Opens the audio source and starts the analysis thread.
    ///
    /// After an audio source failure the tuner is stopped and `start` may be
    /// called again.
    ///
    /// # Errors
    /// * `StreamAlreadyActive` - if the tuner is already running
    /// * `AudioSource` - if the source cannot be opened
    pub fn start(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(TunerError::StreamAlreadyActive);
        }
        // A worker that ended on its own (source failure) is torn down first.
        if let Some(worker) = self.worker.take() {
            self.teardown(worker);
        }

        let (frame_tx, frame_rx) = crossbeam_channel::bounded::<AudioFrame>(1);
        let (error_tx, error_rx) = crossbeam_channel::bounded::<TunerError>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);

        self.source.open(&self.config, frame_tx, error_tx)?;

        let failed = Arc::new(AtomicBool::new(false));
        let context = AnalysisContext {
            estimator: Arc::clone(&self.estimator),
            session: Arc::clone(&self.session),
            failed: Arc::clone(&failed),
        };
        let spawned = thread::Builder::new()
            .name("tuneme-analysis".into())
            .spawn(move || context.run(frame_rx, error_rx, shutdown_rx));
        let thread_handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.source.close();
                return Err(TunerError::AudioSource(e.to_string()));
            }
        };

        self.worker = Some(AnalysisWorker {
            shutdown_tx,
            thread_handle,
            failed,
        });
        info!(
            sample_rate = self.config.sample_rate,
            block_size = self.config.block_size,
            "Tuner started"
        );
        Ok(())
    }

    /// Stops analysis and closes the source. A no-op when not started.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let failed = Arc::clone(&worker.failed);
        self.teardown(worker);
        // A failed session already announced why it stopped.
        if !failed.load(Ordering::Acquire) {
            self.session.halt(None);
        }
        info!("Tuner stopped");
    }

    fn teardown(&mut self, worker: AnalysisWorker) {
        // The thread may already be gone; a closed channel is fine.
        let _ = worker.shutdown_tx.send(());
        if worker.thread_handle.join().is_err() {
            error!("Analysis thread panicked");
        }
        self.source.close();
    }
}

impl Drop for Tuner {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Step {
    Continue,
    ErrorsClosed,
    Exit,
}

/// Everything the analysis thread needs.
struct AnalysisContext {
    estimator: Arc<PitchEstimator>,
    session: Arc<SessionController>,
    failed: Arc<AtomicBool>,
}

impl AnalysisContext {
    fn run(
        self,
        frames: Receiver<AudioFrame>,
        errors: Receiver<TunerError>,
        shutdown: Receiver<()>,
    ) {
        debug!("Analysis thread running");
        let mut errors = errors;
        loop {
            let step = crossbeam_channel::select! {
                recv(frames) -> msg => match msg {
                    Ok(frame) => {
                        self.analyse(&frame);
                        Step::Continue
                    }
                    Err(_) => {
                        debug!("Frame channel closed");
                        Step::Exit
                    }
                },
                recv(errors) -> msg => match msg {
                    Ok(err) => {
                        error!("Audio source failed: {}", err);
                        self.failed.store(true, Ordering::Release);
                        self.session.halt(Some(err.to_string()));
                        Step::Exit
                    }
                    Err(_) => Step::ErrorsClosed,
                },
                recv(shutdown) -> _ => {
                    debug!("Received shutdown signal");
                    Step::Exit
                },
            };
            match step {
                Step::Continue => {}
                // The source dropped its error sender; keep analysing.
                Step::ErrorsClosed => errors = crossbeam_channel::never(),
                Step::Exit => break,
            }
        }
        debug!("Analysis thread finished");
    }

    fn analyse(&self, frame: &[f32]) {
        let estimate = match self.estimator.estimate(frame) {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };
        if let Err(e) = self.session.on_pitch_estimate(estimate) {
            warn!("Estimate rejected: {}", e);
        }
    }
}
