//! Outgoing command construction.
//!
//! Commands are built against the active model's tables so that a code the
//! device does not know never reaches the wire.

use crate::error::InvalidCode;
use crate::tables::DeviceModelProfile;

/// Four-character opcodes.
pub mod opcode {
    /// Crosspoint select: bus, input
    pub const SBUS: &str = "SBUS";
    /// Auto transition: target, `0`
    pub const SAUT: &str = "SAUT";
    /// Cut transition: target
    pub const SCUT: &str = "SCUT";
    /// Keepalive / status request
    pub const SPAT: &str = "SPAT";
    /// Bus status report (incoming)
    pub const ABST: &str = "ABST";
    /// Transition status report (incoming)
    pub const ATST: &str = "ATST";
}

/// Keepalive payload for models that need a heartbeat.
pub const KEEPALIVE: &str = "SPAT:0:00";

/// Builds command payloads for one model.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    profile: &'static DeviceModelProfile,
}

impl Dispatcher {
    pub fn new(profile: &'static DeviceModelProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &'static DeviceModelProfile {
        self.profile
    }

    /// Route `input` onto `bus`.
    pub fn crosspoint_select(&self, bus: &str, input: &str) -> Result<String, InvalidCode> {
        let bus = self.profile.buses.require(bus)?;
        let input = self.profile.inputs.require(input)?;
        Ok(format!("{}:{}:{}", opcode::SBUS, bus.code, input.code))
    }

    pub fn auto_transition(&self, target: &str) -> Result<String, InvalidCode> {
        let target = self.profile.targets.require(target)?;
        Ok(format!("{}:{}:0", opcode::SAUT, target.code))
    }

    pub fn cut_transition(&self, target: &str) -> Result<String, InvalidCode> {
        let target = self.profile.cut_targets.require(target)?;
        Ok(format!("{}:{}", opcode::SCUT, target.code))
    }

    /// Heartbeat payload, or `None` if this model does not need one.
    pub fn keepalive(&self) -> Option<&'static str> {
        self.profile.keepalive.map(|_| KEEPALIVE)
    }
}
