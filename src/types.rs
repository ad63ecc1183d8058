use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Operating mode as reported by the portal (`"COOL"`, `"HEAT"`, ...).
/// Anything other than cool or heat is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperatingMode {
    Cool,
    Heat,
    Other(String),
}

impl OperatingMode {
    pub fn as_portal_str(&self) -> &str {
        match self {
            OperatingMode::Cool => "COOL",
            OperatingMode::Heat => "HEAT",
            OperatingMode::Other(s) => s,
        }
    }

    pub fn from_portal_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("COOL") {
            OperatingMode::Cool
        } else if s.eq_ignore_ascii_case("HEAT") {
            OperatingMode::Heat
        } else {
            OperatingMode::Other(s.to_string())
        }
    }
}

impl From<String> for OperatingMode {
    fn from(s: String) -> Self {
        OperatingMode::from_portal_str(&s)
    }
}

impl From<OperatingMode> for String {
    fn from(mode: OperatingMode) -> Self {
        mode.as_portal_str().to_string()
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_portal_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Missing from some page revisions; required only for setpoint writes.
    #[serde(default)]
    pub id: Option<u64>,
    pub temperature: f64,
    pub cooling_setpoint: f64,
    pub heating_setpoint: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thermostat {
    pub id: u64,
    pub name: String,
    pub operating_mode: OperatingMode,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl Thermostat {
    /// All operations act on the first zone only.
    pub fn primary_zone(&self) -> Option<&Zone> {
        self.zones.first()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.primary_zone().map(|z| z.temperature)
    }

    /// Setpoint for the active mode: cooling when cooling, heating when heating.
    pub fn setpoint(&self) -> Option<f64> {
        let zone = self.primary_zone()?;
        match self.operating_mode {
            OperatingMode::Cool => Some(zone.cooling_setpoint),
            OperatingMode::Heat => Some(zone.heating_setpoint),
            OperatingMode::Other(_) => None,
        }
    }

    pub(crate) fn require_zone(&self) -> Result<&Zone> {
        self.primary_zone().ok_or_else(|| {
            Error::MarkupChanged(format!("thermostat {} has no zones", self.id))
        })
    }
}

/// Reference to a thermostat: its portal id, or its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(u64),
    Name(String),
}

impl Selector {
    fn matches_id(&self, id: u64) -> bool {
        match self {
            Selector::Id(want) => *want == id,
            Selector::Name(s) => s.trim().parse::<u64>().is_ok_and(|n| n == id),
        }
    }

    fn matches_name(&self, name: &str) -> bool {
        match self {
            Selector::Id(_) => false,
            Selector::Name(s) => s.to_lowercase() == name.to_lowercase(),
        }
    }
}

impl From<u64> for Selector {
    fn from(id: u64) -> Self {
        Selector::Id(id)
    }
}

impl From<&str> for Selector {
    fn from(name: &str) -> Self {
        Selector::Name(name.to_string())
    }
}

impl From<String> for Selector {
    fn from(name: String) -> Self {
        Selector::Name(name)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::Name(name) => write!(f, "{name:?}"),
        }
    }
}

/// Resolve a selector against a fetched list. An exact id match wins over a
/// case-insensitive name match; within each pass the first hit is returned.
pub fn find_thermostat<'a>(
    thermostats: &'a [Thermostat],
    selector: &Selector,
) -> Result<&'a Thermostat> {
    thermostats
        .iter()
        .find(|t| selector.matches_id(t.id))
        .or_else(|| thermostats.iter().find(|t| selector.matches_name(&t.name)))
        .ok_or_else(|| Error::NotFound(selector.to_string()))
}

/// One row of a history CSV, keyed by the header row.
pub type HistoryRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPeriod {
    Daily,
    Monthly,
}

impl HistoryPeriod {
    pub fn from_annual(annual: bool) -> Self {
        if annual {
            HistoryPeriod::Monthly
        } else {
            HistoryPeriod::Daily
        }
    }

    pub(crate) fn file_name(&self) -> &'static str {
        match self {
            HistoryPeriod::Daily => "daily_history.csv",
            HistoryPeriod::Monthly => "monthly_history.csv",
        }
    }
}
