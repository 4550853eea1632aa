//! Connection configuration.
//!
//! The TOML file mirrors the fields an operator fills in on the host:
//!
//! ```toml
//! [device]
//! host = "192.168.0.50"
//! model = "HS410"
//!
//! [multicast]
//! enabled = true
//! interface = "192.168.0.10"
//! ```

use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, warn};

use avhs_protocol::tables::{DeviceModel, DeviceModelProfile};
use avhs_protocol::{TALLY_MULTICAST_GROUP, TALLY_MULTICAST_PORT};

#[derive(Debug, Clone, Deserialize)]
pub struct SwitcherConfig {
    pub device: DeviceSection,
    #[serde(default)]
    pub multicast: MulticastSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_model")]
    pub model: DeviceModel,
    /// Replaces the model's control port (lab setups, port forwarding)
    #[serde(default)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MulticastSection {
    #[serde(default)]
    pub enabled: bool,
    /// Local IPv4 address of the interface that joins the tally group
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default = "default_group")]
    pub group: String,
    #[serde(default = "default_multicast_port")]
    pub port: u16,
}

impl Default for MulticastSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interface: None,
            group: default_group(),
            port: default_multicast_port(),
        }
    }
}

fn default_model() -> DeviceModel { DeviceModel::Hs410 }
fn default_group() -> String { TALLY_MULTICAST_GROUP.to_string() }
fn default_multicast_port() -> u16 { TALLY_MULTICAST_PORT }

/// Operator configuration mistakes. Reported as BadConfig, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("device host is not set")]
    MissingHost,

    #[error("device host {0:?} is not a valid IP address")]
    InvalidHost(String),

    #[error("multicast tally is enabled but no network interface is selected")]
    MissingInterface,

    #[error("multicast interface {0:?} is not a valid IPv4 address")]
    InvalidInterface(String),

    #[error("multicast interface {0} is not one of this machine's addresses")]
    UnknownInterface(Ipv4Addr),

    #[error("multicast group {0:?} is not a valid IPv4 multicast address")]
    InvalidGroup(String),
}

/// Multicast tally listener parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastSettings {
    pub group: Ipv4Addr,
    pub port: u16,
    pub interface: Ipv4Addr,
}

/// Validated configuration, ready for the transport.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    pub profile: &'static DeviceModelProfile,
    /// `Some` only when enabled and the model publishes tally
    pub multicast: Option<MulticastSettings>,
}

impl SwitcherConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let config_str = tokio::fs::read_to_string(path).await.map_err(|e| {
            error!("Failed to read config file {:?}: {}", path, e);
            e
        })?;
        let config: Self = toml::from_str(&config_str).map_err(|e| {
            error!("Failed to parse config: {}", e);
            e
        })?;
        Ok(config)
    }

    /// Validate against the host-supplied list of local interface addresses.
    ///
    /// An empty list skips the membership check.
    pub fn validate(&self, interfaces: &[Ipv4Addr]) -> Result<Settings, ConfigError> {
        let host = self.device.host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let host: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(host.to_string()))?;

        let profile = self.device.model.profile();
        let multicast = if self.multicast.enabled {
            self.multicast_settings(interfaces, profile)?
        } else {
            None
        };

        let port = self
            .device
            .port
            .unwrap_or_else(|| profile.control_port(multicast.is_some()));

        Ok(Settings {
            host,
            port,
            profile,
            multicast,
        })
    }

    fn multicast_settings(
        &self,
        interfaces: &[Ipv4Addr],
        profile: &DeviceModelProfile,
    ) -> Result<Option<MulticastSettings>, ConfigError> {
        let section = &self.multicast;

        let interface = match section.interface.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingInterface),
            Some(raw) => raw
                .parse::<Ipv4Addr>()
                .map_err(|_| ConfigError::InvalidInterface(raw.to_string()))?,
        };
        if !interfaces.is_empty() && !interfaces.contains(&interface) {
            return Err(ConfigError::UnknownInterface(interface));
        }

        let group = section
            .group
            .parse::<Ipv4Addr>()
            .ok()
            .filter(Ipv4Addr::is_multicast)
            .ok_or_else(|| ConfigError::InvalidGroup(section.group.clone()))?;

        if !profile.supports_multicast() {
            warn!(
                model = profile.name,
                "Multicast tally is only available on the AV-HS410, ignoring"
            );
            return Ok(None);
        }

        Ok(Some(MulticastSettings {
            group,
            port: section.port,
            interface,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> SwitcherConfig {
        toml::from_str(toml_str).unwrap()
    }

    #[test]
    fn minimal_config_defaults() {
        let config = parse("[device]\nhost = \"10.0.0.5\"\n");
        assert_eq!(config.device.model, DeviceModel::Hs410);
        assert!(!config.multicast.enabled);

        let settings = config.validate(&[]).unwrap();
        assert_eq!(settings.port, 60040);
        assert!(settings.multicast.is_none());
    }

    #[test]
    fn multicast_switches_hs410_port() {
        let config = parse(
            "[device]\nhost = \"10.0.0.5\"\nmodel = \"HS410\"\n\
             [multicast]\nenabled = true\ninterface = \"10.0.0.2\"\n",
        );
        let settings = config.validate(&[]).unwrap();
        assert_eq!(settings.port, 60020);
        let multicast = settings.multicast.unwrap();
        assert_eq!(multicast.group, Ipv4Addr::new(224, 0, 0, 200));
        assert_eq!(multicast.port, 60020);
        assert_eq!(multicast.interface, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn multicast_without_interface_is_bad_config() {
        let config = parse("[device]\nhost = \"10.0.0.5\"\n[multicast]\nenabled = true\n");
        assert_eq!(config.validate(&[]).unwrap_err(), ConfigError::MissingInterface);
    }

    #[test]
    fn interface_must_be_in_injected_list() {
        let config = parse(
            "[device]\nhost = \"10.0.0.5\"\n[multicast]\nenabled = true\ninterface = \"10.0.0.9\"\n",
        );
        let known = [Ipv4Addr::new(10, 0, 0, 2)];
        assert_eq!(
            config.validate(&known).unwrap_err(),
            ConfigError::UnknownInterface(Ipv4Addr::new(10, 0, 0, 9))
        );
    }

    #[test]
    fn bad_host() {
        let config = parse("[device]\nhost = \"switcher.local\"\n");
        assert!(matches!(config.validate(&[]), Err(ConfigError::InvalidHost(_))));
        let config = parse("[device]\n");
        assert_eq!(config.validate(&[]).unwrap_err(), ConfigError::MissingHost);
    }

    #[test]
    fn multicast_ignored_on_other_models() {
        let config = parse(
            "[device]\nhost = \"10.0.0.5\"\nmodel = \"UHS500\"\n\
             [multicast]\nenabled = true\ninterface = \"10.0.0.2\"\n",
        );
        let settings = config.validate(&[]).unwrap();
        assert!(settings.multicast.is_none());
        assert_eq!(settings.port, 62000);
    }

    #[test]
    fn port_override() {
        let config = parse("[device]\nhost = \"127.0.0.1\"\nmodel = \"HS50\"\nport = 4000\n");
        assert_eq!(config.validate(&[]).unwrap().port, 4000);
    }
}
