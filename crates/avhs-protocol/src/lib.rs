pub mod commands;
pub mod error;
pub mod framing;
pub mod host;
pub mod status;
pub mod tables;
pub mod tally;

/// Packet start marker
pub const STX: u8 = 0x02;
/// Packet end marker
pub const ETX: u8 = 0x03;

/// Multicast tally group used by the AV-HS410
pub const TALLY_MULTICAST_GROUP: &str = "224.0.0.200";
/// Multicast tally port
pub const TALLY_MULTICAST_PORT: u16 = 60020;

/// Default control ports
pub const UHS500_PORT: u16 = 62000;
pub const HS410_PORT: u16 = 60040;
pub const HS410_MULTICAST_PORT: u16 = 60020;
pub const HS50_PORT: u16 = 60040;

/// Keepalive interval for models that drop idle control sessions
pub const HS410_KEEPALIVE_MS: u64 = 500;
