//! Last-known tally state per bus.
//!
//! Fed by `ABST` status packets. An empty label means the device has not
//! reported that bus since the last reset.

use crate::error::DecodeError;
use crate::status::DeviceMessage;
use crate::tables::DeviceModelProfile;

/// Number of tracked tally fields
pub const NUM_FIELDS: usize = 14;

/// A bus whose routed input is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TallyField {
    Program,
    Preview,
    BusA,
    BusB,
    KeyFill,
    KeySource,
    DskFill,
    DskSource,
    PinP1,
    PinP2,
    Aux1,
    Aux2,
    Aux3,
    Aux4,
}

impl TallyField {
    pub const ALL: [TallyField; NUM_FIELDS] = [
        Self::Program,
        Self::Preview,
        Self::BusA,
        Self::BusB,
        Self::KeyFill,
        Self::KeySource,
        Self::DskFill,
        Self::DskSource,
        Self::PinP1,
        Self::PinP2,
        Self::Aux1,
        Self::Aux2,
        Self::Aux3,
        Self::Aux4,
    ];

    /// Map an ABST bus selector to a field. Unknown selectors map to `None`.
    pub fn from_selector(selector: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.selector() == selector)
    }

    /// Wire bus selector, shared by ABST reports and SBUS commands.
    pub fn selector(self) -> &'static str {
        match self {
            Self::BusA => "00",
            Self::BusB => "01",
            Self::Program => "02",
            Self::Preview => "03",
            Self::KeyFill => "04",
            Self::KeySource => "05",
            Self::DskFill => "06",
            Self::DskSource => "07",
            Self::PinP1 => "10",
            Self::PinP2 => "11",
            Self::Aux1 => "12",
            Self::Aux2 => "13",
            Self::Aux3 => "14",
            Self::Aux4 => "15",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Snapshot of every tracked tally field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TallyState {
    labels: [String; NUM_FIELDS],
}

impl TallyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported label, or `""` if unknown.
    pub fn read(&self, field: TallyField) -> &str {
        &self.labels[field.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.labels.iter().all(String::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TallyField, &str)> + '_ {
        TallyField::ALL
            .into_iter()
            .map(move |field| (field, self.read(field)))
    }

    /// Reset every field to unknown.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Record `input_code` as selected on the bus named by `selector`.
    ///
    /// Returns the field whose label changed. Unknown selectors are ignored;
    /// an input code missing from the model's table leaves the state as is
    /// and returns an error for the caller to log.
    pub fn update(
        &mut self,
        profile: &DeviceModelProfile,
        selector: &str,
        input_code: &str,
    ) -> Result<Option<TallyField>, DecodeError> {
        if !profile.supports_status() {
            return Err(DecodeError::StatusUnsupported {
                model: profile.name,
            });
        }

        let Some(field) = TallyField::from_selector(selector) else {
            return Ok(None);
        };

        let entry = profile
            .inputs
            .by_code(input_code)
            .ok_or_else(|| DecodeError::UnknownInput {
                model: profile.name,
                code: input_code.to_string(),
            })?;

        let slot = &mut self.labels[field.index()];
        if slot.as_str() == entry.label {
            return Ok(None);
        }
        slot.clear();
        slot.push_str(entry.label);
        Ok(Some(field))
    }

    /// Apply a decoded device message. Only bus status changes state.
    pub fn apply(
        &mut self,
        profile: &DeviceModelProfile,
        message: &DeviceMessage,
    ) -> Result<Option<TallyField>, DecodeError> {
        match message {
            DeviceMessage::BusStatus { bus, input } => self.update(profile, bus, input),
            DeviceMessage::TransitionStatus { .. } | DeviceMessage::Keepalive { .. } => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::DeviceModel;

    fn hs410() -> &'static DeviceModelProfile {
        DeviceModel::Hs410.profile()
    }

    #[test]
    fn program_update() {
        let mut state = TallyState::new();
        let changed = state.update(hs410(), "02", "00").unwrap();
        assert_eq!(changed, Some(TallyField::Program));
        assert_eq!(state.read(TallyField::Program), "XPT 1");

        for field in TallyField::ALL {
            if field != TallyField::Program {
                assert_eq!(state.read(field), "", "{field:?}");
            }
        }
    }

    #[test]
    fn repeated_update_reports_no_change() {
        let mut state = TallyState::new();
        state.update(hs410(), "03", "50").unwrap();
        assert_eq!(state.update(hs410(), "03", "50").unwrap(), None);
        assert_eq!(state.read(TallyField::Preview), "Input 1");
    }

    #[test]
    fn unknown_input_is_a_noop() {
        let mut state = TallyState::new();
        state.update(hs410(), "12", "70").unwrap();
        let before = state.clone();

        let err = state.update(hs410(), "12", "42").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownInput { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn unknown_selector_is_ignored() {
        let mut state = TallyState::new();
        assert_eq!(state.update(hs410(), "09", "00").unwrap(), None);
        assert!(state.is_empty());
    }

    #[test]
    fn models_without_status_are_rejected() {
        let mut state = TallyState::new();
        let err = state
            .update(DeviceModel::Hs50.profile(), "02", "00")
            .unwrap_err();
        assert!(matches!(err, DecodeError::StatusUnsupported { .. }));
        assert!(state.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = TallyState::new();
        state.update(hs410(), "02", "00").unwrap();
        state.update(hs410(), "15", "99").unwrap();
        state.reset();
        assert!(state.iter().all(|(_, label)| label.is_empty()));
    }

    #[test]
    fn selectors_round_trip() {
        for field in TallyField::ALL {
            assert_eq!(TallyField::from_selector(field.selector()), Some(field));
        }
        assert_eq!(TallyField::from_selector("16"), None);
    }

    #[test]
    fn transition_status_leaves_state() {
        let mut state = TallyState::new();
        let msg = DeviceMessage::TransitionStatus { args: vec!["00".into()] };
        assert_eq!(state.apply(hs410(), &msg).unwrap(), None);
        assert!(state.is_empty());
    }
}
