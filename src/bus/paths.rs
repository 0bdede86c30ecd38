//! Closed set of published D-Bus paths
//!
//! Every path the service registers is a variant of [`PropertyPath`], so
//! dispatch on paths is exhaustive and a typo'd path cannot compile. The
//! partition into management paths and charger-tree paths decides which
//! writes reach the external-write handler: management values are fixed at
//! registration and reject writes at the bus level.

/// One registered D-Bus path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyPath {
    // Management values, set once at startup
    MgmtProcessName,
    MgmtProcessVersion,
    MgmtConnection,
    DeviceInstance,
    ProductId,
    ProductName,
    CustomName,
    HardwareVersion,
    Connected,
    Position,
    UpdateIndex,

    // Charger tree, refreshed by the poll loop
    AcPower,
    AcPowerL1,
    AcPowerL2,
    AcPowerL3,
    AcEnergyForward,
    AcVoltage,
    ChargingTime,
    Current,
    SetCurrent,
    MaxCurrent,
    McuTemperature,
    StartStop,
    Mode,
    Status,
}

impl PropertyPath {
    /// Every path the service registers, in registration order
    pub const ALL: [PropertyPath; 25] = [
        PropertyPath::MgmtProcessName,
        PropertyPath::MgmtProcessVersion,
        PropertyPath::MgmtConnection,
        PropertyPath::DeviceInstance,
        PropertyPath::ProductId,
        PropertyPath::ProductName,
        PropertyPath::CustomName,
        PropertyPath::HardwareVersion,
        PropertyPath::Connected,
        PropertyPath::Position,
        PropertyPath::UpdateIndex,
        PropertyPath::AcPower,
        PropertyPath::AcPowerL1,
        PropertyPath::AcPowerL2,
        PropertyPath::AcPowerL3,
        PropertyPath::AcEnergyForward,
        PropertyPath::AcVoltage,
        PropertyPath::ChargingTime,
        PropertyPath::Current,
        PropertyPath::SetCurrent,
        PropertyPath::MaxCurrent,
        PropertyPath::McuTemperature,
        PropertyPath::StartStop,
        PropertyPath::Mode,
        PropertyPath::Status,
    ];

    /// The D-Bus object path string
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyPath::MgmtProcessName => "/Mgmt/ProcessName",
            PropertyPath::MgmtProcessVersion => "/Mgmt/ProcessVersion",
            PropertyPath::MgmtConnection => "/Mgmt/Connection",
            PropertyPath::DeviceInstance => "/DeviceInstance",
            PropertyPath::ProductId => "/ProductId",
            PropertyPath::ProductName => "/ProductName",
            PropertyPath::CustomName => "/CustomName",
            PropertyPath::HardwareVersion => "/HardwareVersion",
            PropertyPath::Connected => "/Connected",
            PropertyPath::Position => "/Position",
            PropertyPath::UpdateIndex => "/UpdateIndex",
            PropertyPath::AcPower => "/Ac/Power",
            PropertyPath::AcPowerL1 => "/Ac/L1/Power",
            PropertyPath::AcPowerL2 => "/Ac/L2/Power",
            PropertyPath::AcPowerL3 => "/Ac/L3/Power",
            PropertyPath::AcEnergyForward => "/Ac/Energy/Forward",
            PropertyPath::AcVoltage => "/Ac/Voltage",
            PropertyPath::ChargingTime => "/ChargingTime",
            PropertyPath::Current => "/Current",
            PropertyPath::SetCurrent => "/SetCurrent",
            PropertyPath::MaxCurrent => "/MaxCurrent",
            PropertyPath::McuTemperature => "/MCU/Temperature",
            PropertyPath::StartStop => "/StartStop",
            PropertyPath::Mode => "/Mode",
            PropertyPath::Status => "/Status",
        }
    }

    /// Parse a D-Bus path string back into the enum
    pub fn parse(path: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == path)
    }

    /// Whether an external `SetValue` on this path is forwarded to the
    /// registered write handler. Management values and the update index
    /// reject writes before the handler is consulted.
    pub fn accepts_external_writes(&self) -> bool {
        !matches!(
            self,
            PropertyPath::MgmtProcessName
                | PropertyPath::MgmtProcessVersion
                | PropertyPath::MgmtConnection
                | PropertyPath::DeviceInstance
                | PropertyPath::ProductId
                | PropertyPath::ProductName
                | PropertyPath::CustomName
                | PropertyPath::HardwareVersion
                | PropertyPath::Connected
                | PropertyPath::Position
                | PropertyPath::UpdateIndex
        )
    }

    /// Human-readable rendition of a value at this path, used for `GetText`
    /// and the Text half of change signals
    pub fn format_text(&self, value: &serde_json::Value) -> String {
        match self {
            PropertyPath::AcPower
            | PropertyPath::AcPowerL1
            | PropertyPath::AcPowerL2
            | PropertyPath::AcPowerL3 => format!("{:.1}W", number_of(value)),
            PropertyPath::AcVoltage => format!("{:.1}V", number_of(value)),
            PropertyPath::Current | PropertyPath::SetCurrent | PropertyPath::MaxCurrent => {
                format!("{:.1}A", number_of(value))
            }
            PropertyPath::AcEnergyForward => format!("{:.2}kWh", number_of(value)),
            PropertyPath::ChargingTime => format!("{}s", number_of(value) as i64),
            PropertyPath::McuTemperature => format!("{}°C", number_of(value) as i64),
            _ => plain_text(value),
        }
    }
}

fn number_of(value: &serde_json::Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

fn plain_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_path() {
        for path in PropertyPath::ALL {
            assert_eq!(PropertyPath::parse(path.as_str()), Some(path));
        }
        assert_eq!(PropertyPath::parse("/Nope"), None);
        assert_eq!(PropertyPath::parse("/Ac/Power"), Some(PropertyPath::AcPower));
    }

    #[test]
    fn writability_partition() {
        for path in [
            PropertyPath::SetCurrent,
            PropertyPath::MaxCurrent,
            PropertyPath::StartStop,
            PropertyPath::Mode,
            PropertyPath::AcPower,
            PropertyPath::Status,
        ] {
            assert!(path.accepts_external_writes(), "{} should dispatch", path.as_str());
        }
        for path in [
            PropertyPath::MgmtConnection,
            PropertyPath::DeviceInstance,
            PropertyPath::ProductId,
            PropertyPath::UpdateIndex,
            PropertyPath::Position,
        ] {
            assert!(!path.accepts_external_writes(), "{} should refuse", path.as_str());
        }
    }

    #[test]
    fn text_formatting_per_path() {
        assert_eq!(
            PropertyPath::AcPower.format_text(&serde_json::json!(2301)),
            "2301.0W"
        );
        assert_eq!(
            PropertyPath::AcEnergyForward.format_text(&serde_json::json!(12.35)),
            "12.35kWh"
        );
        assert_eq!(
            PropertyPath::Current.format_text(&serde_json::json!(10.25)),
            "10.2A"
        );
        assert_eq!(
            PropertyPath::ChargingTime.format_text(&serde_json::json!(125)),
            "125s"
        );
        assert_eq!(
            PropertyPath::McuTemperature.format_text(&serde_json::json!(41)),
            "41°C"
        );
        assert_eq!(
            PropertyPath::Status.format_text(&serde_json::json!(2)),
            "2"
        );
        assert_eq!(
            PropertyPath::ProductName.format_text(&serde_json::json!("go-eCharger")),
            "go-eCharger"
        );
    }
}
