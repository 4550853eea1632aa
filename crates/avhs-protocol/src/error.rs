use thiserror::Error;

use crate::tables::TableKind;

/// A wire code that is not part of the active model's table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} code {code:?} is not defined for {model}")]
pub struct InvalidCode {
    pub model: &'static str,
    pub kind: TableKind,
    pub code: String,
}

/// Errors raised while turning a framed payload into state.
///
/// None of these are fatal: the offending packet is dropped and the
/// stream carries on with the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("unknown opcode {0:?}")]
    UnknownOpcode(String),

    #[error("{opcode} is missing field {field}")]
    MissingField { opcode: &'static str, field: &'static str },

    #[error("input code {code:?} is not defined for {model}")]
    UnknownInput { model: &'static str, code: String },

    #[error("{model} does not report tally status")]
    StatusUnsupported { model: &'static str },

    #[error("receive buffer overflow, discarded {0} bytes without end marker")]
    Overflow(usize),
}
