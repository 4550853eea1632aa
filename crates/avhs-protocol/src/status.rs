//! Decoding of incoming status payloads.

use crate::commands::opcode;
use crate::error::DecodeError;

/// A decoded packet from the switcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// `ABST:<bus selector>:<input code>`
    BusStatus { bus: String, input: String },
    /// `ATST:...` transition progress, carried but not tracked
    TransitionStatus { args: Vec<String> },
    /// `SPAT:...` echo of the keepalive
    Keepalive { args: Vec<String> },
}

impl DeviceMessage {
    /// Parse a payload with the markers already stripped.
    ///
    /// Surrounding whitespace (CR/LF some firmware appends) is ignored.
    pub fn parse(payload: &str) -> Result<Self, DecodeError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut fields = payload.split(':');
        let op = fields.next().unwrap_or_default();

        match op {
            opcode::ABST => {
                let bus = fields.next().ok_or(DecodeError::MissingField {
                    opcode: opcode::ABST,
                    field: "bus",
                })?;
                let input = fields.next().ok_or(DecodeError::MissingField {
                    opcode: opcode::ABST,
                    field: "input",
                })?;
                Ok(Self::BusStatus {
                    bus: bus.to_string(),
                    input: input.to_string(),
                })
            }
            opcode::ATST => Ok(Self::TransitionStatus {
                args: fields.map(str::to_string).collect(),
            }),
            opcode::SPAT => Ok(Self::Keepalive {
                args: fields.map(str::to_string).collect(),
            }),
            other => Err(DecodeError::UnknownOpcode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_status() {
        assert_eq!(
            DeviceMessage::parse("ABST:02:00\r\n"),
            Ok(DeviceMessage::BusStatus {
                bus: "02".into(),
                input: "00".into()
            })
        );
    }

    #[test]
    fn bus_status_missing_input() {
        assert_eq!(
            DeviceMessage::parse("ABST:02"),
            Err(DecodeError::MissingField {
                opcode: "ABST",
                field: "input"
            })
        );
    }

    #[test]
    fn reserved_opcodes_decode() {
        assert!(matches!(
            DeviceMessage::parse("ATST:00:1:0"),
            Ok(DeviceMessage::TransitionStatus { args }) if args.len() == 3
        ));
        assert!(matches!(
            DeviceMessage::parse("SPAT:0:00"),
            Ok(DeviceMessage::Keepalive { .. })
        ));
    }

    #[test]
    fn unknown_opcode() {
        assert_eq!(
            DeviceMessage::parse("QXYZ:1"),
            Err(DecodeError::UnknownOpcode("QXYZ".into()))
        );
        assert_eq!(DeviceMessage::parse("  "), Err(DecodeError::Empty));
    }
}
