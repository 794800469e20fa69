//! Base types and traits for the perception layer

use serde::Serialize;

/// A captured grayscale frame.
pub type Frame = image::GrayImage;

/// A tag produced by one of the perception engines.
///
/// The discriminants match the class indices of the trained classifier, so
/// a model output maps straight onto a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum StateLabel {
    /// Rod is out, waiting for a bite.
    WaitingBite = 0,
    /// Fish took the bait, reeling has not started.
    FishHooked = 1,
    /// Reeling with stamina below the halfway mark.
    ReelingLow = 2,
    /// Reeling with stamina at or above the halfway mark.
    ReelingHigh = 3,
    /// "Pull right" overlay cue.
    PullRight = 4,
    /// "Pull left" overlay cue.
    PullLeft = 5,
    /// Catch succeeded.
    Caught = 6,
}

impl StateLabel {
    /// Map a classifier class index back to a label.
    pub fn from_class_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(StateLabel::WaitingBite),
            1 => Some(StateLabel::FishHooked),
            2 => Some(StateLabel::ReelingLow),
            3 => Some(StateLabel::ReelingHigh),
            4 => Some(StateLabel::PullRight),
            5 => Some(StateLabel::PullLeft),
            6 => Some(StateLabel::Caught),
            _ => None,
        }
    }

    pub fn class_index(self) -> u8 {
        self as u8
    }

    /// Short name used in logs and for template file lookup.
    pub fn name(self) -> &'static str {
        match self {
            StateLabel::WaitingBite => "waiting_bite",
            StateLabel::FishHooked => "fish_hooked",
            StateLabel::ReelingLow => "reeling_low",
            StateLabel::ReelingHigh => "reeling_high",
            StateLabel::PullRight => "pull_right",
            StateLabel::PullLeft => "pull_left",
            StateLabel::Caught => "caught",
        }
    }
}

/// Which engine produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LabelSource {
    Classifier,
    Text,
}

/// A single accepted perception result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub label: StateLabel,
    pub confidence: f32,
    pub source: LabelSource,
}

/// Delivers a current frame on demand.
///
/// Implementations must be callable from any thread; backends with
/// thread-local handles construct them lazily per thread.
pub trait FrameSource: Send + Sync {
    fn grab(&self) -> anyhow::Result<Frame>;
}

/// Image classifier over full frames.
pub trait StateClassifier: Send + Sync {
    /// Returns the top label with its confidence in `[0, 1]`, or `None`
    /// when the frame matches nothing.
    fn classify(&self, frame: &Frame) -> Option<(StateLabel, f32)>;

    /// Verify the engine is usable before the control loop starts.
    fn warm_up(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Text recognizer for overlay cues.
pub trait TextReader: Send + Sync {
    /// Returns the recognized cue with a normalized confidence in `[0, 1]`.
    fn read(&self, frame: &Frame) -> Option<(StateLabel, f32)>;

    fn warm_up(&self) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_index_round_trip() {
        for index in 0u8..=6 {
            let label = StateLabel::from_class_index(index).unwrap();
            assert_eq!(label.class_index(), index);
        }
        assert!(StateLabel::from_class_index(7).is_none());
    }

    #[test]
    fn test_label_names_unique() {
        let names: std::collections::HashSet<_> = (0u8..=6)
            .map(|i| StateLabel::from_class_index(i).unwrap().name())
            .collect();
        assert_eq!(names.len(), 7);
    }
}
