//! Home appliances and their drivers.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Appliance {
    Light,
    SecuritySystem,
    SmartTv,
}

impl Appliance {
    pub const ALL: [Appliance; 3] = [Appliance::Light, Appliance::SecuritySystem, Appliance::SmartTv];

    pub fn name(&self) -> &'static str {
        match self {
            Appliance::Light => "Light",
            Appliance::SecuritySystem => "Security System",
            Appliance::SmartTv => "Smart TV",
        }
    }

    /// Whether battery backup blocks control of this appliance.
    pub fn battery_gated(&self) -> bool {
        !matches!(self, Appliance::SecuritySystem)
    }

    /// Whether an outage switches this appliance off immediately.
    pub fn non_essential(&self) -> bool {
        matches!(self, Appliance::SmartTv)
    }

    /// Ledger wording for a state change.
    pub fn change_details(&self, on: bool) -> String {
        match self {
            Appliance::Light => format!("Light turned {}", if on { "ON" } else { "OFF" }),
            Appliance::SecuritySystem => {
                format!("Security system {}", if on { "ARMED" } else { "DISARMED" })
            }
            Appliance::SmartTv => format!("TV turned {}", if on { "ON" } else { "OFF" }),
        }
    }

    /// Operator-facing reason when the battery gate refuses a change.
    pub fn refusal_reason(&self) -> &'static str {
        match self {
            Appliance::Light => "Battery mode: Lighting control disabled",
            _ => "Battery mode: Non-essential devices disabled",
        }
    }

    fn index(&self) -> usize {
        match self {
            Appliance::Light => 0,
            Appliance::SecuritySystem => 1,
            Appliance::SmartTv => 2,
        }
    }
}

impl fmt::Display for Appliance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Appliance {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" | "lights" => Ok(Appliance::Light),
            "security" | "alarm" | "security-system" => Ok(Appliance::SecuritySystem),
            "tv" | "smart-tv" | "smarttv" => Ok(Appliance::SmartTv),
            other => Err(format!("unknown appliance {other:?} (light, security, tv)")),
        }
    }
}

/// On/off state of every appliance. All start off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplianceStates {
    on: [bool; 3],
}

impl ApplianceStates {
    pub fn get(&self, appliance: Appliance) -> bool {
        self.on[appliance.index()]
    }

    pub(crate) fn set(&mut self, appliance: Appliance, on: bool) {
        self.on[appliance.index()] = on;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Appliance, bool)> + '_ {
        Appliance::ALL.iter().map(move |&a| (a, self.get(a)))
    }
}

impl Serialize for ApplianceStates {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(Appliance::ALL.len()))?;
        for (appliance, on) in self.iter() {
            map.serialize_entry(appliance.name(), &on)?;
        }
        map.end()
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{appliance}: {reason}")]
    Rejected { appliance: Appliance, reason: String },
}

/// Backend that physically switches an appliance.
pub trait ApplianceDriver: Send {
    fn apply(&mut self, appliance: Appliance, on: bool) -> Result<(), DriverError>;
}

/// Simulation-mode backend. Only reports what would happen.
#[derive(Debug, Default)]
pub struct SimulatedDriver;

impl ApplianceDriver for SimulatedDriver {
    fn apply(&mut self, appliance: Appliance, on: bool) -> Result<(), DriverError> {
        tracing::info!(%appliance, on, "SIMULATION: {}", appliance.change_details(on));
        Ok(())
    }
}

/// Live-mode placeholder used until a GPIO backend is wired in.
#[derive(Debug, Default)]
pub struct UnwiredDriver;

impl ApplianceDriver for UnwiredDriver {
    fn apply(&mut self, appliance: Appliance, on: bool) -> Result<(), DriverError> {
        tracing::info!(%appliance, on, "live driver not wired; recording state only");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gating_policy() {
        assert!(Appliance::Light.battery_gated());
        assert!(Appliance::SmartTv.battery_gated());
        assert!(!Appliance::SecuritySystem.battery_gated());
        assert!(Appliance::SmartTv.non_essential());
        assert!(!Appliance::Light.non_essential());
    }

    #[test]
    fn test_change_details_wording() {
        assert_eq!(Appliance::Light.change_details(true), "Light turned ON");
        assert_eq!(Appliance::SecuritySystem.change_details(false), "Security system DISARMED");
        assert_eq!(Appliance::SmartTv.change_details(false), "TV turned OFF");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("TV".parse::<Appliance>().unwrap(), Appliance::SmartTv);
        assert_eq!("alarm".parse::<Appliance>().unwrap(), Appliance::SecuritySystem);
        assert!("toaster".parse::<Appliance>().is_err());
    }

    #[test]
    fn test_states_default_off() {
        let s = ApplianceStates::default();
        assert!(s.iter().all(|(_, on)| !on));
    }

    #[test]
    fn test_states_serialize_by_name() {
        let mut s = ApplianceStates::default();
        s.set(Appliance::SmartTv, true);
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["Smart TV"], true);
        assert_eq!(json["Light"], false);
    }
}
