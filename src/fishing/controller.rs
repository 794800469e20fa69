//! The fishing controller: state machine, retry policy and round accounting

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::phase::Phase;
use super::status::{Status, StatusChannel, SubscriptionHandle};
use crate::actuator::Actuator;
use crate::config::Config;
use crate::error::FishingError;
use crate::perception::{Detector, Observation, StateLabel};

/// Settling pauses around the remedial cast.
const RETRY_SETTLE_BEFORE: Duration = Duration::from_millis(500);
const RETRY_SETTLE_AFTER: Duration = Duration::from_millis(1000);
/// The catch confirmation loop never runs longer than this many checks.
const SUCCESS_CONFIRM_ATTEMPTS: u32 = 20;
/// Slice size for stop-aware sleeps.
const STOP_POLL: Duration = Duration::from_millis(15);

#[derive(Debug, Clone)]
struct Timing {
    classifier_gap: Duration,
    initial_deadline: Duration,
    hook_stall: Duration,
    halfway_pause: Duration,
    success_settle: Duration,
    key_hold: Duration,
}

impl Timing {
    fn from_config(config: &Config) -> Self {
        Self {
            classifier_gap: config.classifier_poll_gap(),
            initial_deadline: config.initial_deadline(),
            hook_stall: config.hook_stall_limit(),
            halfway_pause: config.halfway_pause(),
            success_settle: config.success_settle(),
            key_hold: config.key_hold(),
        }
    }
}

#[derive(Debug, Clone)]
struct DirectionKeys {
    left: String,
    right: String,
    confirm: String,
}

/// Phase and error, guarded together: every phase mutation and its status
/// publish happen under this one lock.
struct CtrlState {
    phase: Phase,
    last_error: Option<String>,
}

struct Inner {
    timing: Timing,
    keys: DirectionKeys,
    detector: Arc<Detector>,
    actuator: Arc<Actuator>,
    status: StatusChannel,
    state: Mutex<CtrlState>,
    rounds: AtomicU64,
    stop: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Drives one fishing round after another.
///
/// The controller owns the control thread, validates every observation
/// against the phase protocol, coordinates the actuators and publishes a
/// status snapshot on every phase change and accepted observation.
#[derive(Clone)]
pub struct FishingController {
    inner: Arc<Inner>,
}

impl FishingController {
    pub fn new(config: &Config, detector: Arc<Detector>, actuator: Arc<Actuator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                timing: Timing::from_config(config),
                keys: DirectionKeys {
                    left: config.left_key.clone(),
                    right: config.right_key.clone(),
                    confirm: config.confirm_key.clone(),
                },
                detector,
                actuator,
                status: StatusChannel::new(),
                state: Mutex::new(CtrlState {
                    phase: Phase::Stopped,
                    last_error: None,
                }),
                rounds: AtomicU64::new(0),
                stop: AtomicBool::new(false),
                worker: Mutex::new(None),
            }),
        }
    }

    /// Launch the control thread. No-op when already running. Fails and
    /// stays `Stopped` when perception cannot be brought up.
    pub fn start(&self) -> Result<(), FishingError> {
        let mut worker = self.inner.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("[CTRL] start() ignored, already running");
                return Ok(());
            }
        }
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }

        self.inner.detector.warm_up()?;

        self.inner.stop.store(false, Ordering::SeqCst);
        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::WaitingInitial;
            state.last_error = None;
            self.inner.publish_locked(&state, None);
        }

        let inner = self.inner.clone();
        *worker = Some(thread::spawn(move || inner.run()));
        tracing::info!("[CTRL] Started");
        Ok(())
    }

    /// Request cooperative termination and wait for the control thread.
    ///
    /// The longest wait is one rod cast; every other suspension point
    /// observes the stop flag within a slice.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("[CTRL] Control thread panicked");
            }
        }

        // A stop always lands in Stopped, even out of the error phase.
        let mut state = self.inner.state.lock();
        if state.phase != Phase::Stopped {
            state.phase = Phase::Stopped;
            self.inner.publish_locked(&state, None);
        }
    }

    /// Stop, but force-release every input synchronously first.
    pub fn emergency_stop(&self) {
        tracing::warn!("[CTRL] Emergency stop");
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.actuator.release_all() {
            tracing::warn!("[CTRL] Emergency release failed: {}", e);
        }
        if let Err(e) = self.inner.actuator.stop_fast_click() {
            tracing::warn!("[CTRL] Emergency click stop failed: {}", e);
        }
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn snapshot_status(&self) -> Status {
        self.inner.status.snapshot()
    }

    pub fn subscribe_status<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Status) + Send + 'static,
    {
        self.inner.status.subscribe(callback)
    }

    pub fn unsubscribe_status(&self, handle: SubscriptionHandle) {
        self.inner.status.unsubscribe(handle)
    }

    /// Completed rounds since construction.
    pub fn rounds(&self) -> u64 {
        self.inner.rounds.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn run(&self) {
        tracing::info!("[CTRL] Control loop started");
        let result = self.drive();

        // Tear down actuators before the final phase is visible.
        if let Err(e) = self.actuator.stop_fast_click() {
            tracing::warn!("[CTRL] Click teardown failed: {}", e);
        }
        if let Err(e) = self.actuator.release_all() {
            tracing::warn!("[CTRL] Input release failed: {}", e);
        }

        match result {
            Ok(()) => {
                let mut state = self.state.lock();
                state.phase = Phase::Stopped;
                self.publish_locked(&state, None);
            }
            Err(err) => {
                tracing::warn!("[CTRL] Control loop failed: {}", err);
                let mut state = self.state.lock();
                state.phase = Phase::Error;
                state.last_error = Some(err.to_string());
                self.publish_locked(&state, None);
            }
        }
        tracing::info!("[CTRL] Control loop exited");
    }

    /// Dispatch on the current phase until stopped or failed.
    fn drive(&self) -> Result<(), FishingError> {
        loop {
            if self.stopping() {
                return Ok(());
            }
            let phase = self.state.lock().phase;
            match phase {
                Phase::WaitingInitial => self.await_bite(true)?,
                Phase::WaitingHook => self.await_bite(false)?,
                Phase::FishHooked => self.play_hooked()?,
                Phase::PullingNormal => self.play_pulling(false)?,
                Phase::PullingHalfway => self.play_pulling(true)?,
                Phase::Success => self.confirm_catch()?,
                Phase::Casting => self.cast_and_count()?,
                Phase::Stopped | Phase::Error => return Ok(()),
            }
        }
    }

    /// WAITING_INITIAL / WAITING_HOOK: poll until the fish bites.
    fn await_bite(&self, initial: bool) -> Result<(), FishingError> {
        let phase = if initial {
            Phase::WaitingInitial
        } else {
            Phase::WaitingHook
        };
        let allowed = phase.allowed_labels();
        let deadline = initial.then(|| Instant::now() + self.timing.initial_deadline);

        loop {
            if self.stopping() {
                return Ok(());
            }

            if let Some(obs) = self.detector.detect_any(allowed, self.poll_budget()) {
                match obs.label {
                    StateLabel::FishHooked => {
                        self.transition(Phase::FishHooked, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::WaitingBite if initial => {
                        self.transition(Phase::WaitingHook, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::WaitingBite => self.note_observation(&obs),
                    other => self.ignore(phase, other),
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(FishingError::PerceptionTimeout {
                        waited: self.timing.initial_deadline,
                    });
                }
            }
            self.idle(self.timing.classifier_gap);
        }
    }

    /// FISH_HOOKED: fast-click while watching for the reeling cue; a long
    /// silence means the hook was lost and triggers the remedial cast.
    fn play_hooked(&self) -> Result<(), FishingError> {
        self.actuator.start_fast_click()?;
        let allowed = Phase::FishHooked.allowed_labels();
        let mut quiet_since = Instant::now();

        loop {
            if self.stopping() {
                return Ok(());
            }

            if let Some(obs) = self.detector.detect_any(allowed, self.poll_budget()) {
                quiet_since = Instant::now();
                match obs.label {
                    StateLabel::ReelingLow => {
                        self.transition(Phase::PullingNormal, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::ReelingHigh => {
                        self.transition(Phase::PullingHalfway, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::FishHooked => self.note_observation(&obs),
                    other => self.ignore(Phase::FishHooked, other),
                }
            }

            if quiet_since.elapsed() >= self.timing.hook_stall {
                return self.recast_after_stall();
            }
            self.idle(self.timing.classifier_gap);
        }
    }

    /// Remedial cast after a stalled hook. Never counts a round.
    fn recast_after_stall(&self) -> Result<(), FishingError> {
        tracing::info!(
            "[CTRL] No cue for {:?} while hooked, recasting",
            self.timing.hook_stall
        );

        self.actuator.stop_fast_click()?;
        self.actuator.release_all()?;

        if !self.idle(RETRY_SETTLE_BEFORE) {
            return Ok(());
        }
        if self.actuator.cast_rod().is_err() {
            return Err(FishingError::RetryCast);
        }
        self.idle(RETRY_SETTLE_AFTER);

        self.transition(Phase::WaitingInitial, None);
        Ok(())
    }

    /// PULLING_NORMAL / PULLING_HALFWAY: react to direction cues and the
    /// stamina band, fast-click running (paused briefly on halfway entry).
    fn play_pulling(&self, halfway: bool) -> Result<(), FishingError> {
        if halfway {
            self.actuator.pause_fast_click();
            if !self.idle(self.timing.halfway_pause) {
                return Ok(());
            }
            self.actuator.resume_fast_click();
        } else {
            self.actuator.start_fast_click()?;
        }

        let phase = if halfway {
            Phase::PullingHalfway
        } else {
            Phase::PullingNormal
        };
        let allowed = phase.allowed_labels();

        loop {
            if self.stopping() {
                return Ok(());
            }

            if let Some(obs) = self.detector.detect_any(allowed, self.poll_budget()) {
                match obs.label {
                    // The catch banner always wins.
                    StateLabel::Caught => {
                        self.transition(Phase::Success, Some(&obs));
                        return Ok(());
                    }
                    // Direction cues act without changing the phase.
                    StateLabel::PullRight => {
                        self.note_observation(&obs);
                        self.actuator.hold_key(&self.keys.right, self.timing.key_hold)?;
                    }
                    StateLabel::PullLeft => {
                        self.note_observation(&obs);
                        self.actuator.hold_key(&self.keys.left, self.timing.key_hold)?;
                    }
                    StateLabel::ReelingHigh if !halfway => {
                        self.transition(Phase::PullingHalfway, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::ReelingLow if halfway => {
                        self.transition(Phase::PullingNormal, Some(&obs));
                        return Ok(());
                    }
                    StateLabel::ReelingLow | StateLabel::ReelingHigh => {
                        self.note_observation(&obs)
                    }
                    other => self.ignore(phase, other),
                }
            }

            self.idle(self.timing.classifier_gap);
        }
    }

    /// SUCCESS: confirm the catch, bounded to a fixed number of checks.
    fn confirm_catch(&self) -> Result<(), FishingError> {
        // Reeling is over, the clicker has no business running here.
        self.actuator.stop_fast_click()?;

        if !self.idle(self.timing.success_settle) {
            return Ok(());
        }
        self.actuator.tap_key(&self.keys.confirm)?;

        for attempt in 0..SUCCESS_CONFIRM_ATTEMPTS {
            if self.stopping() {
                return Ok(());
            }
            match self
                .detector
                .detect_specific(StateLabel::Caught, self.poll_budget())
            {
                Some(obs) => self.note_observation(&obs),
                None => {
                    tracing::debug!("[CTRL] Catch banner gone after {} checks", attempt);
                    break;
                }
            }
            self.idle(self.timing.classifier_gap);
        }

        self.transition(Phase::Casting, None);
        Ok(())
    }

    /// CASTING: the only place a round is counted. The cast itself is
    /// atomic; a pending stop is honored right after it completes.
    fn cast_and_count(&self) -> Result<(), FishingError> {
        self.actuator.cast_rod()?;
        let rounds = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("[CTRL] Round {} complete", rounds);
        self.transition(Phase::WaitingInitial, None);
        Ok(())
    }

    fn transition(&self, next: Phase, obs: Option<&Observation>) {
        let mut state = self.state.lock();
        tracing::debug!("[CTRL] {:?} -> {:?}", state.phase, next);
        state.phase = next;
        self.publish_locked(&state, obs);
    }

    /// Publish an accepted observation that does not change the phase.
    fn note_observation(&self, obs: &Observation) {
        let state = self.state.lock();
        self.publish_locked(&state, Some(obs));
    }

    /// Controller-level guard: the facade already gates by allow-list, so
    /// anything landing here is a facade bug, not a game state.
    fn ignore(&self, phase: Phase, label: StateLabel) {
        tracing::debug!("[CTRL] Ignoring label {} in {:?}", label.name(), phase);
    }

    fn publish_locked(&self, state: &CtrlState, obs: Option<&Observation>) {
        let (label, confidence) = match obs {
            Some(obs) if state.phase.displays_label() => {
                (Some(obs.label), Some(obs.confidence))
            }
            _ => (None, None),
        };
        self.status.publish(Status {
            phase: state.phase,
            last_detected_label: label,
            last_confidence: confidence,
            round_count: self.rounds.load(Ordering::SeqCst),
            last_error: state.last_error.clone(),
            updated_at: Instant::now(),
        });
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn poll_budget(&self) -> Duration {
        self.timing.classifier_gap.max(Duration::from_millis(10))
    }

    /// Stop-aware sleep. Returns false when interrupted by a stop request.
    fn idle(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stopping() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(STOP_POLL));
        }
    }
}
