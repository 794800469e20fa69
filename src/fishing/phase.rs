//! Fishing phases and the phase -> allowed-label protocol table

use serde::Serialize;

use crate::perception::StateLabel;

/// The controller's position within one fishing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Stopped,
    WaitingInitial,
    WaitingHook,
    FishHooked,
    PullingNormal,
    PullingHalfway,
    Success,
    Casting,
    Error,
}

impl Phase {
    /// Labels accepted as transition triggers while in this phase.
    ///
    /// This table is the protocol: an observation outside the current
    /// phase's set never mutates the phase, which is what keeps a stale
    /// label from re-entering an earlier action.
    pub fn allowed_labels(self) -> &'static [StateLabel] {
        use StateLabel::*;
        match self {
            Phase::WaitingInitial | Phase::WaitingHook => &[WaitingBite, FishHooked],
            Phase::FishHooked => &[FishHooked, ReelingLow, ReelingHigh],
            Phase::PullingNormal | Phase::PullingHalfway => {
                &[ReelingLow, ReelingHigh, PullRight, PullLeft, Caught]
            }
            Phase::Success => &[Caught],
            // Casting ignores perception; Stopped and Error have no loop.
            Phase::Casting | Phase::Stopped | Phase::Error => &[],
        }
    }

    /// Whether status snapshots may carry the last detected label.
    ///
    /// Action phases never display a label, so a stale detection cannot be
    /// paired with them in the UI.
    pub fn displays_label(self) -> bool {
        matches!(
            self,
            Phase::WaitingInitial
                | Phase::WaitingHook
                | Phase::FishHooked
                | Phase::PullingNormal
                | Phase::PullingHalfway
                | Phase::Success
        )
    }

    /// Human-readable description for status displays.
    pub fn description(self) -> &'static str {
        match self {
            Phase::Stopped => "Stopped",
            Phase::WaitingInitial => "Waiting for the rod to settle...",
            Phase::WaitingHook => "Waiting for a bite...",
            Phase::FishHooked => "Fish hooked! Reeling...",
            Phase::PullingNormal => "Pulling (stamina low)",
            Phase::PullingHalfway => "Pulling (stamina recovered)",
            Phase::Success => "Catch succeeded!",
            Phase::Casting => "Casting the rod...",
            Phase::Error => "Error - press start to retry",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StateLabel::*;

    #[test]
    fn test_waiting_phases_accept_bite_and_hook() {
        for phase in [Phase::WaitingInitial, Phase::WaitingHook] {
            assert_eq!(phase.allowed_labels(), &[WaitingBite, FishHooked]);
        }
    }

    #[test]
    fn test_hooked_accepts_reeling_labels() {
        assert_eq!(
            Phase::FishHooked.allowed_labels(),
            &[FishHooked, ReelingLow, ReelingHigh]
        );
    }

    #[test]
    fn test_pulling_accepts_cues_and_catch() {
        for phase in [Phase::PullingNormal, Phase::PullingHalfway] {
            let allowed = phase.allowed_labels();
            assert!(allowed.contains(&PullRight));
            assert!(allowed.contains(&PullLeft));
            assert!(allowed.contains(&Caught));
            assert!(!allowed.contains(&WaitingBite));
        }
    }

    #[test]
    fn test_action_phases_accept_nothing() {
        for phase in [Phase::Casting, Phase::Stopped, Phase::Error] {
            assert!(phase.allowed_labels().is_empty());
        }
    }

    #[test]
    fn test_label_display_rule() {
        assert!(Phase::WaitingHook.displays_label());
        assert!(Phase::Success.displays_label());
        assert!(!Phase::Casting.displays_label());
        assert!(!Phase::Stopped.displays_label());
        assert!(!Phase::Error.displays_label());
    }
}
