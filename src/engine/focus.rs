// SPDX-License-Identifier: GPL-3.0-only

//! Autofocus mode and state as seen by callers
//!
//! Devices report fine-grained native AF metadata; the engine folds it into
//! the two small enums below.

use crate::backends::camera::types::{ControlAfMode, ControlAfState};

/// Requested or reported autofocus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoFocusMode {
    /// The device refocuses on its own whenever the scene changes
    #[default]
    Continuous,
    /// Focus is held after a single triggered scan
    SingleTrigger,
}

impl AutoFocusMode {
    pub fn from_native(mode: ControlAfMode) -> Self {
        match mode {
            ControlAfMode::Auto => AutoFocusMode::SingleTrigger,
            _ => AutoFocusMode::Continuous,
        }
    }

    /// Native mode requested for this mode
    pub fn to_native(self) -> ControlAfMode {
        match self {
            AutoFocusMode::Continuous => ControlAfMode::ContinuousPicture,
            AutoFocusMode::SingleTrigger => ControlAfMode::Auto,
        }
    }
}

/// Reported autofocus state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoFocusState {
    #[default]
    Inactive,
    Scanning,
    StoppedFocused,
    StoppedUnfocused,
}

impl AutoFocusState {
    pub fn from_native(state: ControlAfState) -> Self {
        match state {
            ControlAfState::Inactive => AutoFocusState::Inactive,
            ControlAfState::PassiveScan | ControlAfState::ActiveScan => AutoFocusState::Scanning,
            ControlAfState::PassiveFocused | ControlAfState::FocusedLocked => {
                AutoFocusState::StoppedFocused
            }
            ControlAfState::NotFocusedLocked | ControlAfState::PassiveUnfocused => {
                AutoFocusState::StoppedUnfocused
            }
        }
    }

    /// Whether the lens has stopped moving
    pub fn is_stopped(self) -> bool {
        matches!(
            self,
            AutoFocusState::StoppedFocused | AutoFocusState::StoppedUnfocused
        )
    }
}

impl std::fmt::Display for AutoFocusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AutoFocusState::Inactive => "inactive",
            AutoFocusState::Scanning => "scanning",
            AutoFocusState::StoppedFocused => "focused",
            AutoFocusState::StoppedUnfocused => "unfocused",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_auto_maps_to_single_trigger() {
        assert_eq!(
            AutoFocusMode::from_native(ControlAfMode::Auto),
            AutoFocusMode::SingleTrigger
        );
        for mode in [
            ControlAfMode::Off,
            ControlAfMode::Macro,
            ControlAfMode::ContinuousVideo,
            ControlAfMode::ContinuousPicture,
            ControlAfMode::Edof,
        ] {
            assert_eq!(AutoFocusMode::from_native(mode), AutoFocusMode::Continuous);
        }
    }

    #[test]
    fn test_native_state_mapping() {
        use AutoFocusState::*;
        let cases = [
            (ControlAfState::Inactive, Inactive),
            (ControlAfState::PassiveScan, Scanning),
            (ControlAfState::ActiveScan, Scanning),
            (ControlAfState::PassiveFocused, StoppedFocused),
            (ControlAfState::FocusedLocked, StoppedFocused),
            (ControlAfState::NotFocusedLocked, StoppedUnfocused),
            (ControlAfState::PassiveUnfocused, StoppedUnfocused),
        ];
        for (native, expected) in cases {
            assert_eq!(AutoFocusState::from_native(native), expected, "{:?}", native);
        }
    }

    #[test]
    fn test_lens_stopped() {
        assert!(AutoFocusState::StoppedFocused.is_stopped());
        assert!(AutoFocusState::StoppedUnfocused.is_stopped());
        assert!(!AutoFocusState::Scanning.is_stopped());
        assert!(!AutoFocusState::Inactive.is_stopped());
    }

    #[test]
    fn test_requested_mode_round_trips_through_native() {
        for mode in [AutoFocusMode::Continuous, AutoFocusMode::SingleTrigger] {
            assert_eq!(AutoFocusMode::from_native(mode.to_native()), mode);
        }
    }
}
