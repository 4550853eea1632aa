pub mod config;
pub mod error;
pub mod multicast;
pub mod transport;

pub use config::{ConfigError, Settings, SwitcherConfig};
pub use transport::{Switcher, TallySnapshot};
