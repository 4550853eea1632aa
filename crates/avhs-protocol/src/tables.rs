//! Per-model protocol tables.
//!
//! Every switcher model speaks the same framing but numbers its buses,
//! sources and transition targets differently. A [`DeviceModelProfile`]
//! bundles the tables and transport parameters for one model; it is picked
//! once from configuration and never mutated.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::InvalidCode;
use crate::{HS410_KEEPALIVE_MS, HS410_MULTICAST_PORT, HS410_PORT, HS50_PORT, UHS500_PORT};

/// Supported switcher models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceModel {
    #[serde(rename = "UHS500", alias = "uhs500")]
    Uhs500,
    #[serde(rename = "HS410", alias = "hs410")]
    Hs410,
    #[serde(rename = "HS50", alias = "hs50")]
    Hs50,
}

impl DeviceModel {
    pub const ALL: [DeviceModel; 3] = [Self::Uhs500, Self::Hs410, Self::Hs50];

    pub fn profile(self) -> &'static DeviceModelProfile {
        match self {
            Self::Uhs500 => &UHS500,
            Self::Hs410 => &HS410,
            Self::Hs50 => &HS50,
        }
    }

    pub fn id(self) -> &'static str {
        match self {
            Self::Uhs500 => "UHS500",
            Self::Hs410 => "HS410",
            Self::Hs50 => "HS50",
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().name)
    }
}

impl FromStr for DeviceModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        let wanted = wanted
            .strip_prefix("AV-")
            .or_else(|| wanted.strip_prefix("AW-"))
            .unwrap_or(&wanted);
        Self::ALL
            .into_iter()
            .find(|m| m.id() == wanted)
            .ok_or_else(|| format!("unknown model {s:?} (expected UHS500, HS410 or HS50)"))
    }
}

/// Which of the four tables an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Bus,
    Input,
    Target,
    CutTarget,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bus => "bus",
            Self::Input => "input",
            Self::Target => "transition target",
            Self::CutTarget => "cut target",
        })
    }
}

/// One (wire code, display label) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub code: &'static str,
    pub label: &'static str,
}

const fn e(code: &'static str, label: &'static str) -> Entry {
    Entry { code, label }
}

/// An ordered lookup table. Order is the display order offered to operators.
#[derive(Debug)]
pub struct Table {
    model: &'static str,
    kind: TableKind,
    entries: &'static [Entry],
}

impl Table {
    const fn new(model: &'static str, kind: TableKind, entries: &'static [Entry]) -> Self {
        Self { model, kind, entries }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn entries(&self) -> &'static [Entry] {
        self.entries
    }

    pub fn by_code(&self, code: &str) -> Option<&'static Entry> {
        self.entries.iter().find(|entry| entry.code == code)
    }

    pub fn by_label(&self, label: &str) -> Option<&'static Entry> {
        self.entries
            .iter()
            .find(|entry| entry.label.eq_ignore_ascii_case(label))
    }

    /// Look a code up, failing with [`InvalidCode`] if it is not in the table.
    pub fn require(&self, code: &str) -> Result<&'static Entry, InvalidCode> {
        self.by_code(code).ok_or_else(|| InvalidCode {
            model: self.model,
            kind: self.kind,
            code: code.to_string(),
        })
    }

    /// Accept either a wire code or a label. Codes win when both match.
    pub fn resolve(&self, code_or_label: &str) -> Result<&'static Entry, InvalidCode> {
        let wanted = code_or_label.trim();
        self.by_code(wanted)
            .or_else(|| self.by_label(wanted))
            .ok_or_else(|| InvalidCode {
                model: self.model,
                kind: self.kind,
                code: wanted.to_string(),
            })
    }
}

/// Everything model-specific: transport parameters and the four tables.
#[derive(Debug)]
pub struct DeviceModelProfile {
    pub model: DeviceModel,
    pub name: &'static str,
    /// Control port used when multicast tally is off
    pub port: u16,
    /// Control port used when multicast tally is on
    pub multicast_port: Option<u16>,
    /// Heartbeat period; the device closes idle sessions without it
    pub keepalive: Option<Duration>,
    pub buses: Table,
    pub inputs: Table,
    pub targets: Table,
    pub cut_targets: Table,
}

impl DeviceModelProfile {
    pub fn supports_multicast(&self) -> bool {
        self.multicast_port.is_some()
    }

    /// Only models with a multicast feed report ABST status.
    pub fn supports_status(&self) -> bool {
        self.supports_multicast()
    }

    pub fn control_port(&self, multicast: bool) -> u16 {
        match self.multicast_port {
            Some(port) if multicast => port,
            _ => self.port,
        }
    }

    pub fn table(&self, kind: TableKind) -> &Table {
        match kind {
            TableKind::Bus => &self.buses,
            TableKind::Input => &self.inputs,
            TableKind::Target => &self.targets,
            TableKind::CutTarget => &self.cut_targets,
        }
    }
}

// ── AV-UHS500 ──

static UHS500_BUS: [Entry; 23] = [
    e("01", "ME1PGM"),
    e("02", "ME1PVW"),
    e("03", "ME1KEY1-F"),
    e("04", "ME1KEY1-S"),
    e("05", "ME1KEY2-F"),
    e("06", "ME1KEY2-S"),
    e("07", "ME1KEY3-F"),
    e("08", "ME1KEY3-S"),
    e("97", "DSK1-F"),
    e("98", "DSK1-S"),
    e("99", "DSK2-F"),
    e("100", "DSK2-S"),
    e("113", "AUX 1"),
    e("114", "AUX 2"),
    e("115", "AUX 3"),
    e("116", "AUX 4"),
    e("141", "DISP"),
    e("150", "VMEM-V"),
    e("151", "VMEM-K"),
    e("153", "MV1-1"),
    e("168", "MV1-16"),
    e("169", "MV2-1"),
    e("184", "MV2-16"),
];

static UHS500_INPUTS: [Entry; 40] = [
    e("01", "IN1"),
    e("02", "IN2"),
    e("03", "SDI IN3"),
    e("04", "SDI IN4"),
    e("05", "SDI IN5"),
    e("06", "SDI IN6"),
    e("07", "SDI IN7"),
    e("08", "SDI IN8"),
    e("09", "OPA IN1"),
    e("10", "OPA IN2"),
    e("11", "OPA IN3"),
    e("12", "OPA IN4"),
    e("13", "OPB IN1"),
    e("14", "OPB IN2"),
    e("15", "OPB IN3"),
    e("16", "OPB IN4"),
    e("145", "CBGD 1"),
    e("146", "CBGD 2"),
    e("147", "CBAR"),
    e("148", "BLACK"),
    e("149", "STILL1-V"),
    e("150", "STILL1-K"),
    e("151", "STILL2-V"),
    e("152", "STILL2-K"),
    e("157", "CLIP1-V"),
    e("158", "CLIP1-K"),
    e("159", "CLIP2-V"),
    e("160", "CLIP2-K"),
    e("165", "MV 1"),
    e("166", "MV 2"),
    e("171", "KEY OUT"),
    e("172", "CLN"),
    e("201", "PGM"),
    e("203", "PVW"),
    e("209", "ME PGM"),
    e("227", "AUX 1"),
    e("228", "AUX 2"),
    e("229", "AUX 3"),
    e("230", "AUX 4"),
    e("251", "CLOCK"),
];

static UHS500_TARGETS: [Entry; 7] = [
    e("00", "BKGD"),
    e("01", "KEY 1"),
    e("04", "KEY 2"),
    e("05", "KEY 3"),
    e("06", "FTB"),
    e("07", "DSK 1"),
    e("08", "DSK 2"),
];

// ── AV-HS410 ──

static HS410_BUS: [Entry; 14] = [
    e("02", "PGM"),
    e("03", "PVW"),
    e("00", "Bus A"),
    e("01", "Bus B"),
    e("04", "Key Fill"),
    e("05", "Key Source"),
    e("06", "DSK Fill"),
    e("07", "DSK Source"),
    e("10", "PinP 1"),
    e("11", "PinP 2"),
    e("12", "Aux 1"),
    e("13", "Aux 2"),
    e("14", "Aux 3"),
    e("15", "Aux 4"),
];

static HS410_INPUTS: [Entry; 56] = [
    e("00", "XPT 1"),
    e("01", "XPT 2"),
    e("02", "XPT 3"),
    e("03", "XPT 4"),
    e("04", "XPT 5"),
    e("05", "XPT 6"),
    e("06", "XPT 7"),
    e("07", "XPT 8"),
    e("08", "XPT 9"),
    e("09", "XPT 10"),
    e("10", "XPT 11"),
    e("11", "XPT 12"),
    e("12", "XPT 13"),
    e("13", "XPT 14"),
    e("14", "XPT 15"),
    e("15", "XPT 16"),
    e("16", "XPT 17"),
    e("17", "XPT 18"),
    e("18", "XPT 19"),
    e("19", "XPT 20"),
    e("20", "XPT 21"),
    e("21", "XPT 22"),
    e("22", "XPT 23"),
    e("23", "XPT 24"),
    e("50", "Input 1"),
    e("51", "Input 2"),
    e("52", "Input 3"),
    e("53", "Input 4"),
    e("54", "Input 5"),
    e("55", "Input 6"),
    e("56", "Input 7"),
    e("57", "Input 8"),
    e("58", "Input 9"),
    e("59", "Input 10"),
    e("60", "Input 11"),
    e("61", "Input 12"),
    e("62", "Input 13"),
    e("70", "Color bars"),
    e("71", "Color background 1"),
    e("96", "Color background 2"),
    e("72", "Black"),
    e("73", "Still1V"),
    e("74", "Still2V"),
    e("75", "Clip1V"),
    e("76", "Clip2V"),
    e("77", "PGM"),
    e("78", "PVW"),
    e("79", "KeyOut"),
    e("80", "CLN"),
    e("81", "Multi view"),
    e("91", "M-PVW"),
    e("92", "Still1K"),
    e("93", "Still2K"),
    e("94", "Clip1K"),
    e("95", "Clip2K"),
    e("99", "No selection"),
];

static HS410_TARGETS: [Entry; 6] = [
    e("00", "BKGD"),
    e("01", "KEY"),
    e("04", "PinP 1"),
    e("05", "PinP 2"),
    e("06", "FTB"),
    e("02", "DSK"),
];

// The HS410 and HS50 only accept SCUT for background and key.
static HS4X_CUT_TARGETS: [Entry; 2] = [e("00", "BKGD"), e("01", "KEY")];

// ── AW-HS50 ──

static HS50_BUS: [Entry; 8] = [
    e("02", "PGM"),
    e("03", "PVW"),
    e("00", "Bus A"),
    e("01", "Bus B"),
    e("04", "Key Fill"),
    e("05", "Key Source"),
    e("10", "PinP"),
    e("12", "Aux"),
];

static HS50_INPUTS: [Entry; 25] = [
    e("00", "XPT 1"),
    e("01", "XPT 2"),
    e("02", "XPT 3"),
    e("03", "XPT 4"),
    e("04", "XPT 5"),
    e("05", "XPT 6"),
    e("06", "XPT 7"),
    e("07", "XPT 8"),
    e("08", "XPT 9"),
    e("09", "XPT 10"),
    e("50", "Input 1"),
    e("51", "Input 2"),
    e("52", "Input 3"),
    e("53", "Input 4"),
    e("54", "Input 5"),
    e("70", "Color bars"),
    e("71", "Color background"),
    e("72", "Black"),
    e("73", "Frame memory 1"),
    e("74", "Frame memory 2"),
    e("77", "PGM"),
    e("78", "PVW"),
    e("79", "KeyOut"),
    e("80", "CLN"),
    e("81", "Multi view"),
];

static HS50_TARGETS: [Entry; 4] = [
    e("00", "BKGD"),
    e("01", "KEY"),
    e("04", "PinP"),
    e("06", "FTB"),
];

// ── Profiles ──

static UHS500: DeviceModelProfile = DeviceModelProfile {
    model: DeviceModel::Uhs500,
    name: "AV-UHS500",
    port: UHS500_PORT,
    multicast_port: None,
    keepalive: None,
    buses: Table::new("AV-UHS500", TableKind::Bus, &UHS500_BUS),
    inputs: Table::new("AV-UHS500", TableKind::Input, &UHS500_INPUTS),
    targets: Table::new("AV-UHS500", TableKind::Target, &UHS500_TARGETS),
    cut_targets: Table::new("AV-UHS500", TableKind::CutTarget, &UHS500_TARGETS),
};

static HS410: DeviceModelProfile = DeviceModelProfile {
    model: DeviceModel::Hs410,
    name: "AV-HS410",
    port: HS410_PORT,
    multicast_port: Some(HS410_MULTICAST_PORT),
    keepalive: Some(Duration::from_millis(HS410_KEEPALIVE_MS)),
    buses: Table::new("AV-HS410", TableKind::Bus, &HS410_BUS),
    inputs: Table::new("AV-HS410", TableKind::Input, &HS410_INPUTS),
    targets: Table::new("AV-HS410", TableKind::Target, &HS410_TARGETS),
    cut_targets: Table::new("AV-HS410", TableKind::CutTarget, &HS4X_CUT_TARGETS),
};

static HS50: DeviceModelProfile = DeviceModelProfile {
    model: DeviceModel::Hs50,
    name: "AW-HS50",
    port: HS50_PORT,
    multicast_port: None,
    keepalive: None,
    buses: Table::new("AW-HS50", TableKind::Bus, &HS50_BUS),
    inputs: Table::new("AW-HS50", TableKind::Input, &HS50_INPUTS),
    targets: Table::new("AW-HS50", TableKind::Target, &HS50_TARGETS),
    cut_targets: Table::new("AW-HS50", TableKind::CutTarget, &HS4X_CUT_TARGETS),
};

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const KINDS: [TableKind; 4] = [
        TableKind::Bus,
        TableKind::Input,
        TableKind::Target,
        TableKind::CutTarget,
    ];

    #[test]
    fn codes_are_unique_per_table() {
        for model in DeviceModel::ALL {
            let profile = model.profile();
            for kind in KINDS {
                let table = profile.table(kind);
                let codes: HashSet<_> = table.entries().iter().map(|e| e.code).collect();
                assert_eq!(codes.len(), table.entries().len(), "{model} {kind}");
                assert_eq!(table.kind(), kind);
            }
        }
    }

    #[test]
    fn ports_follow_model_and_multicast() {
        assert_eq!(DeviceModel::Uhs500.profile().control_port(false), 62000);
        assert_eq!(DeviceModel::Uhs500.profile().control_port(true), 62000);
        assert_eq!(DeviceModel::Hs410.profile().control_port(false), 60040);
        assert_eq!(DeviceModel::Hs410.profile().control_port(true), 60020);
        assert_eq!(DeviceModel::Hs50.profile().control_port(true), 60040);
    }

    #[test]
    fn only_hs410_keeps_alive_and_multicasts() {
        let hs410 = DeviceModel::Hs410.profile();
        assert_eq!(hs410.keepalive, Some(Duration::from_millis(500)));
        assert!(hs410.supports_multicast());
        for model in [DeviceModel::Uhs500, DeviceModel::Hs50] {
            assert!(model.profile().keepalive.is_none());
            assert!(!model.profile().supports_status());
        }
    }

    #[test]
    fn require_rejects_unknown_code() {
        let err = DeviceModel::Hs50.profile().inputs.require("23").unwrap_err();
        assert_eq!(err.kind, TableKind::Input);
        assert_eq!(err.code, "23");
    }

    #[test]
    fn resolve_accepts_label_or_code() {
        let buses = &DeviceModel::Hs410.profile().buses;
        assert_eq!(buses.resolve("02").unwrap().label, "PGM");
        assert_eq!(buses.resolve("key fill").unwrap().code, "04");
        assert!(buses.resolve("nope").is_err());
    }

    #[test]
    fn model_parses_from_ui_names() {
        assert_eq!("AV-HS410".parse::<DeviceModel>(), Ok(DeviceModel::Hs410));
        assert_eq!("hs50".parse::<DeviceModel>(), Ok(DeviceModel::Hs50));
        assert_eq!("AV-UHS500".parse::<DeviceModel>(), Ok(DeviceModel::Uhs500));
        assert!("HS6000".parse::<DeviceModel>().is_err());
    }
}
