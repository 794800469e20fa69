//! Detector facade multiplexing the classifier and the text reader

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::base::{FrameSource, LabelSource, Observation, StateClassifier, StateLabel, TextReader};
use crate::config::Config;
use crate::error::FishingError;

/// Single entry point for perception.
///
/// The controller never talks to the engines directly; this facade owns the
/// allow-list gating, the confidence thresholds, the per-engine poll gaps
/// and the cross-engine tie-break (classifier first, text as fallback).
pub struct Detector {
    frames: Box<dyn FrameSource>,
    classifier: Box<dyn StateClassifier>,
    text: Box<dyn TextReader>,
    classifier_threshold: f32,
    text_threshold: f32,
    classifier_gap: Duration,
    text_gap: Duration,
    last_classifier_poll: Mutex<Option<Instant>>,
    last_text_poll: Mutex<Option<Instant>>,
    rejected: AtomicU64,
}

impl Detector {
    pub fn new(
        frames: Box<dyn FrameSource>,
        classifier: Box<dyn StateClassifier>,
        text: Box<dyn TextReader>,
        config: &Config,
    ) -> Self {
        Self {
            frames,
            classifier,
            text,
            classifier_threshold: config.classifier_threshold,
            text_threshold: config.text_threshold,
            classifier_gap: config.classifier_poll_gap(),
            text_gap: config.text_poll_gap(),
            last_classifier_poll: Mutex::new(None),
            last_text_poll: Mutex::new(None),
            rejected: AtomicU64::new(0),
        }
    }

    /// Verify capture and both engines before the control loop starts.
    pub fn warm_up(&self) -> Result<(), FishingError> {
        self.frames
            .grab()
            .map_err(|e| FishingError::Init(format!("capture: {e}")))?;
        self.classifier
            .warm_up()
            .map_err(|e| FishingError::Init(format!("classifier: {e}")))?;
        self.text
            .warm_up()
            .map_err(|e| FishingError::Init(format!("text: {e}")))?;
        Ok(())
    }

    /// Return the first observation whose label is in `allowed`.
    ///
    /// The classifier is consulted first, then the text reader, each at most
    /// once and only if its minimum poll gap has elapsed. Never blocks past
    /// `budget`. Labels outside `allowed` are counted and dropped.
    pub fn detect_any(&self, allowed: &[StateLabel], budget: Duration) -> Option<Observation> {
        if allowed.is_empty() {
            return None;
        }

        let deadline = Instant::now() + budget;
        let frame = match self.frames.grab() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("[DETECT] Frame grab failed: {}", e);
                return None;
            }
        };

        if Self::gate(&self.last_classifier_poll, self.classifier_gap) {
            if let Some((label, confidence)) = self.classifier.classify(&frame) {
                if allowed.contains(&label) {
                    if confidence >= self.classifier_threshold {
                        return Some(Observation {
                            label,
                            confidence,
                            source: LabelSource::Classifier,
                        });
                    }
                } else {
                    self.note_rejected(label);
                }
            }
        }

        if Instant::now() >= deadline {
            return None;
        }

        if Self::gate(&self.last_text_poll, self.text_gap) {
            if let Some((label, confidence)) = self.text.read(&frame) {
                if allowed.contains(&label) {
                    if confidence >= self.text_threshold {
                        return Some(Observation {
                            label,
                            confidence,
                            source: LabelSource::Text,
                        });
                    }
                } else {
                    self.note_rejected(label);
                }
            }
        }

        None
    }

    /// Check whether one specific label is currently visible.
    pub fn detect_specific(&self, label: StateLabel, budget: Duration) -> Option<Observation> {
        self.detect_any(std::slice::from_ref(&label), budget)
    }

    /// Observations dropped because their label was not allowed.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    fn note_rejected(&self, label: StateLabel) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("[DETECT] Dropped out-of-phase label {}", label.name());
    }

    /// True when `gap` has elapsed since the last accepted poll.
    fn gate(last: &Mutex<Option<Instant>>, gap: Duration) -> bool {
        let mut last = last.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < gap => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::base::Frame;
    use parking_lot::Mutex as PlMutex;

    struct BlankFrames;
    impl FrameSource for BlankFrames {
        fn grab(&self) -> anyhow::Result<Frame> {
            Ok(Frame::new(4, 4))
        }
    }

    struct FixedClassifier(PlMutex<Option<(StateLabel, f32)>>);
    impl StateClassifier for FixedClassifier {
        fn classify(&self, _frame: &Frame) -> Option<(StateLabel, f32)> {
            *self.0.lock()
        }
    }

    struct FixedText(Option<(StateLabel, f32)>);
    impl TextReader for FixedText {
        fn read(&self, _frame: &Frame) -> Option<(StateLabel, f32)> {
            self.0
        }
    }

    fn test_config() -> Config {
        Config {
            classifier_interval: 0.0,
            text_interval: 0.0,
            ..Config::default()
        }
    }

    fn detector(
        classifier: Option<(StateLabel, f32)>,
        text: Option<(StateLabel, f32)>,
    ) -> Detector {
        Detector::new(
            Box::new(BlankFrames),
            Box::new(FixedClassifier(PlMutex::new(classifier))),
            Box::new(FixedText(text)),
            &test_config(),
        )
    }

    #[test]
    fn test_allowed_label_accepted() {
        let d = detector(Some((StateLabel::WaitingBite, 0.9)), None);
        let obs = d
            .detect_any(&[StateLabel::WaitingBite], Duration::from_millis(50))
            .unwrap();
        assert_eq!(obs.label, StateLabel::WaitingBite);
        assert_eq!(obs.source, LabelSource::Classifier);
        assert_eq!(d.rejected_count(), 0);
    }

    #[test]
    fn test_disallowed_label_dropped_and_counted() {
        let d = detector(Some((StateLabel::Caught, 0.9)), None);
        assert!(d
            .detect_any(&[StateLabel::WaitingBite], Duration::from_millis(50))
            .is_none());
        assert_eq!(d.rejected_count(), 1);
    }

    #[test]
    fn test_low_confidence_not_accepted() {
        let d = detector(Some((StateLabel::WaitingBite, 0.2)), None);
        assert!(d
            .detect_any(&[StateLabel::WaitingBite], Duration::from_millis(50))
            .is_none());
        // Below threshold is a miss, not an out-of-phase rejection.
        assert_eq!(d.rejected_count(), 0);
    }

    #[test]
    fn test_classifier_preferred_over_text() {
        let d = detector(
            Some((StateLabel::ReelingLow, 0.8)),
            Some((StateLabel::PullLeft, 0.9)),
        );
        let obs = d
            .detect_any(
                &[StateLabel::ReelingLow, StateLabel::PullLeft],
                Duration::from_millis(50),
            )
            .unwrap();
        assert_eq!(obs.label, StateLabel::ReelingLow);
        assert_eq!(obs.source, LabelSource::Classifier);
    }

    #[test]
    fn test_text_fallback_when_classifier_silent() {
        let d = detector(None, Some((StateLabel::PullRight, 0.9)));
        let obs = d
            .detect_any(&[StateLabel::PullRight], Duration::from_millis(50))
            .unwrap();
        assert_eq!(obs.source, LabelSource::Text);
    }

    #[test]
    fn test_empty_allow_list_returns_none() {
        let d = detector(Some((StateLabel::Caught, 0.9)), None);
        assert!(d.detect_any(&[], Duration::from_millis(50)).is_none());
    }

    #[test]
    fn test_detect_specific() {
        let d = detector(Some((StateLabel::Caught, 0.9)), None);
        assert!(d
            .detect_specific(StateLabel::Caught, Duration::from_millis(50))
            .is_some());
        assert!(d
            .detect_specific(StateLabel::WaitingBite, Duration::from_millis(50))
            .is_none());
    }

    #[test]
    fn test_poll_gap_rate_limits_classifier() {
        let config = Config {
            classifier_interval: 10.0,
            text_interval: 10.0,
            ..Config::default()
        };
        let d = Detector::new(
            Box::new(BlankFrames),
            Box::new(FixedClassifier(PlMutex::new(Some((
                StateLabel::WaitingBite,
                0.9,
            ))))),
            Box::new(FixedText(None)),
            &config,
        );
        // First poll passes the gate, the second is inside the gap.
        assert!(d
            .detect_any(&[StateLabel::WaitingBite], Duration::from_millis(50))
            .is_some());
        assert!(d
            .detect_any(&[StateLabel::WaitingBite], Duration::from_millis(50))
            .is_none());
    }
}
