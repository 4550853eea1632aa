//! Surface exposed to an automation host: actions, the tally feedback,
//! variables and connection status.
//!
//! Everything here is derived from the active [`DeviceModelProfile`] so a
//! host can rebuild its registries whenever the model changes.

use serde::Serialize;

use crate::commands::Dispatcher;
use crate::error::InvalidCode;
use crate::tables::{DeviceModelProfile, Entry};
use crate::tally::{TallyField, TallyState};

/// Value published for every tally variable when multicast tally is off.
pub const NOT_SUPPORTED: &str = "Not Enabled/Supported";

/// Feedback input choices stop at the crosspoint buttons.
pub const FEEDBACK_INPUT_LIMIT: usize = 24;

/// Connection status reported to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message")]
pub enum InstanceStatus {
    Disconnected,
    Connecting,
    Ok,
    BadConfig(String),
    UnknownError(String),
}

impl InstanceStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// An operator-triggered action, as codes from the model's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Crosspoint { bus: String, input: String },
    Auto { target: String },
    Cut { target: String },
}

impl Action {
    pub fn to_command(&self, dispatcher: &Dispatcher) -> Result<String, InvalidCode> {
        match self {
            Self::Crosspoint { bus, input } => dispatcher.crosspoint_select(bus, input),
            Self::Auto { target } => dispatcher.auto_transition(target),
            Self::Cut { target } => dispatcher.cut_transition(target),
        }
    }
}

/// Dropdown option of an action or feedback.
#[derive(Debug, Clone, Serialize)]
pub struct OptionDefinition {
    pub id: &'static str,
    pub label: &'static str,
    pub choices: &'static [Entry],
    pub default: Option<&'static str>,
}

impl OptionDefinition {
    fn dropdown(id: &'static str, label: &'static str, choices: &'static [Entry]) -> Self {
        Self {
            id,
            label,
            choices,
            default: choices.first().map(|entry| entry.code),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub options: Vec<OptionDefinition>,
}

pub fn action_definitions(profile: &DeviceModelProfile) -> Vec<ActionDefinition> {
    vec![
        ActionDefinition {
            id: "xpt",
            name: "Bus crosspoint control",
            options: vec![
                OptionDefinition::dropdown("bus", "BUS", profile.buses.entries()),
                OptionDefinition::dropdown("input", "Input", profile.inputs.entries()),
            ],
        },
        ActionDefinition {
            id: "auto",
            name: "Send AUTO transition",
            options: vec![OptionDefinition::dropdown(
                "target",
                "Target",
                profile.targets.entries(),
            )],
        },
        ActionDefinition {
            id: "cut",
            name: "Send CUT transition",
            options: vec![OptionDefinition::dropdown(
                "target",
                "Target",
                profile.cut_targets.entries(),
            )],
        },
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionDefinition>,
}

/// The boolean tally feedback, `XptTally`.
pub fn feedback_definition(profile: &DeviceModelProfile) -> FeedbackDefinition {
    FeedbackDefinition {
        id: "XptTally",
        name: "Tally Feedback",
        description: "Indicate if Camera is selected on a bus",
        options: vec![
            OptionDefinition::dropdown("bus", "BUS", profile.buses.entries()),
            OptionDefinition::dropdown("input", "Input", feedback_inputs(profile)),
        ],
    }
}

pub fn feedback_inputs(profile: &DeviceModelProfile) -> &'static [Entry] {
    let inputs = profile.inputs.entries();
    &inputs[..inputs.len().min(FEEDBACK_INPUT_LIMIT)]
}

/// True if `input` is the last input reported on `bus`.
///
/// Unknown bus or input codes never match.
pub fn tally_is_selected(
    profile: &DeviceModelProfile,
    tally: &TallyState,
    bus: &str,
    input: &str,
) -> bool {
    let Some(field) = TallyField::from_selector(bus) else {
        return false;
    };
    let Some(entry) = profile.inputs.by_code(input) else {
        return false;
    };
    tally.read(field) == entry.label
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct VariableDefinition {
    pub id: &'static str,
    pub name: &'static str,
}

pub fn variable_id(field: TallyField) -> &'static str {
    match field {
        TallyField::Program => "tally_pgm",
        TallyField::Preview => "tally_pvw",
        TallyField::BusA => "bus_a",
        TallyField::BusB => "bus_b",
        TallyField::KeyFill => "key_fill",
        TallyField::KeySource => "key_source",
        TallyField::DskFill => "dsk_fill",
        TallyField::DskSource => "dsk_source",
        TallyField::PinP1 => "pinp_1",
        TallyField::PinP2 => "pinp_2",
        TallyField::Aux1 => "aux_1",
        TallyField::Aux2 => "aux_2",
        TallyField::Aux3 => "aux_3",
        TallyField::Aux4 => "aux_4",
    }
}

fn variable_name(field: TallyField) -> &'static str {
    match field {
        TallyField::Program => "Tally Program",
        TallyField::Preview => "Tally Preview",
        TallyField::BusA => "Bus A Selected",
        TallyField::BusB => "Bus B Selected",
        TallyField::KeyFill => "Key Fill Selected",
        TallyField::KeySource => "Key Source Selected",
        TallyField::DskFill => "DSK Fill Selected",
        TallyField::DskSource => "DSK Source Selected",
        TallyField::PinP1 => "PinP 1 Selected",
        TallyField::PinP2 => "PinP 2 Selected",
        TallyField::Aux1 => "AUX 1 Selected",
        TallyField::Aux2 => "AUX 2 Selected",
        TallyField::Aux3 => "AUX 3 Selected",
        TallyField::Aux4 => "AUX 4 Selected",
    }
}

pub fn variable_definitions() -> Vec<VariableDefinition> {
    TallyField::ALL
        .into_iter()
        .map(|field| VariableDefinition {
            id: variable_id(field),
            name: variable_name(field),
        })
        .collect()
}

/// Current variable values in definition order.
///
/// Labels are only meaningful while multicast tally is running on a model
/// that reports status; otherwise every variable reads [`NOT_SUPPORTED`].
pub fn variable_values(
    profile: &DeviceModelProfile,
    multicast_enabled: bool,
    tally: &TallyState,
) -> Vec<(&'static str, String)> {
    let live = multicast_enabled && profile.supports_status();
    tally
        .iter()
        .map(|(field, label)| {
            let value = if live { label } else { NOT_SUPPORTED };
            (variable_id(field), value.to_string())
        })
        .collect()
}
