//! Charging mode state machine and write-back validation
//!
//! External writes from the GX device land here. Planning is a pure
//! function from the requested path/value and the currently published
//! control state to a [`WriteAction`]; execution talks to the charger and
//! reports a plain accepted/rejected boolean back to the bus.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::bus::{BusSharedState, ExternalWriteHandler, PropertyPath};
use crate::error::Result;
use crate::flows::PowerFlowSource;
use crate::goe::GoeClient;
use crate::logging::get_logger;

/// Fallback station limit until the first poll publishes the real one
const DEFAULT_MAX_CURRENT: u64 = 32;

/// Victron charging mode as published on `/Mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargingMode {
    Manual,
    Automatic,
    Scheduled,
}

impl ChargingMode {
    pub fn from_value(value: u64) -> Option<Self> {
        match value {
            0 => Some(ChargingMode::Manual),
            1 => Some(ChargingMode::Automatic),
            2 => Some(ChargingMode::Scheduled),
            _ => None,
        }
    }

    pub fn as_value(self) -> u64 {
        match self {
            ChargingMode::Manual => 0,
            ChargingMode::Automatic => 1,
            ChargingMode::Scheduled => 2,
        }
    }

    /// The charger-side loading mode: basic, eco, or daily trip
    pub fn loading_mode(self) -> u64 {
        match self {
            ChargingMode::Manual => 3,
            ChargingMode::Automatic => 4,
            ChargingMode::Scheduled => 5,
        }
    }
}

/// Writable charger parameter and its wire name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceParam {
    Current,
    ForceState,
    LoadingMode,
}

impl DeviceParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceParam::Current => "amp",
            DeviceParam::ForceState => "frc",
            DeviceParam::LoadingMode => "lmo",
        }
    }
}

/// What an external write translates to on the device
#[derive(Debug, Clone, PartialEq)]
pub enum WriteAction {
    Reject { reason: &'static str },
    Set { param: DeviceParam, value: u64 },
    SwitchMode { lmo: u64, frc: u64 },
}

fn as_u64(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_i64().and_then(|i| u64::try_from(i).ok()))
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f as u64)
        })
}

/// Translate an external property write into a device action.
///
/// `mode`, `start_stop` and `max_current` are the currently published
/// control values; they decide how start/stop and mode switches map onto
/// the charger's force-state parameter.
pub fn plan_external_write(
    path: PropertyPath,
    value: &serde_json::Value,
    mode: ChargingMode,
    start_stop: u64,
    max_current: u64,
) -> WriteAction {
    match path {
        PropertyPath::SetCurrent => {
            let Some(amps) = as_u64(value) else {
                return WriteAction::Reject {
                    reason: "set current must be a non-negative number",
                };
            };
            WriteAction::Set {
                param: DeviceParam::Current,
                value: amps.min(max_current),
            }
        }
        PropertyPath::StartStop => {
            let requested = match as_u64(value) {
                Some(v @ (0 | 1)) => v,
                _ => {
                    return WriteAction::Reject {
                        reason: "start/stop must be 0 or 1",
                    };
                }
            };
            match mode {
                // Manual: frc 1 stops, frc 2 forces charging
                ChargingMode::Manual => WriteAction::Set {
                    param: DeviceParam::ForceState,
                    value: requested + 1,
                },
                // Automatic: frc 0 hands control back to eco mode
                ChargingMode::Automatic => WriteAction::Set {
                    param: DeviceParam::ForceState,
                    value: if requested == 1 { 0 } else { 1 },
                },
                ChargingMode::Scheduled => WriteAction::Reject {
                    reason: "start/stop has no effect in scheduled mode",
                },
            }
        }
        PropertyPath::MaxCurrent => WriteAction::Reject {
            reason: "station limit can only be changed on the charger itself",
        },
        PropertyPath::Mode => {
            let Some(target) = as_u64(value).and_then(ChargingMode::from_value) else {
                return WriteAction::Reject {
                    reason: "mode must be 0 (manual), 1 (automatic) or 2 (scheduled)",
                };
            };
            let frc = match (target, start_stop) {
                (ChargingMode::Manual, 1) => 2,
                (ChargingMode::Automatic, 1) => 0,
                _ => 1,
            };
            WriteAction::SwitchMode {
                lmo: target.loading_mode(),
                frc,
            }
        }
        _ => WriteAction::Reject {
            reason: "no mapping for this path",
        },
    }
}

/// Owns the write-back table and the automatic-mode cycle work for one
/// charger instance
pub struct ModeController {
    client: Arc<GoeClient>,
    flows: Arc<dyn PowerFlowSource>,
    shared: Arc<Mutex<BusSharedState>>,
    logger: crate::logging::StructuredLogger,
}

impl ModeController {
    pub fn new(
        client: Arc<GoeClient>,
        flows: Arc<dyn PowerFlowSource>,
        shared: Arc<Mutex<BusSharedState>>,
    ) -> Self {
        Self {
            client,
            flows,
            shared,
            logger: get_logger("controls"),
        }
    }

    /// Currently published control state, with defaults for paths that
    /// have not been written yet
    fn control_state(&self) -> (ChargingMode, u64, u64) {
        let shared = self.shared.lock().unwrap();
        let mode = ChargingMode::from_value(shared.cached_u64(PropertyPath::Mode, 0))
            .unwrap_or(ChargingMode::Manual);
        let start_stop = shared.cached_u64(PropertyPath::StartStop, 0);
        let max_current = shared.cached_u64(PropertyPath::MaxCurrent, DEFAULT_MAX_CURRENT);
        (mode, start_stop, max_current)
    }

    /// Inputs for [`on_cycle`](Self::on_cycle), taken from the values
    /// published by the previous poll cycle
    pub fn cycle_inputs(&self) -> (ChargingMode, u64, u64) {
        let shared = self.shared.lock().unwrap();
        let mode = ChargingMode::from_value(shared.cached_u64(PropertyPath::Mode, 0))
            .unwrap_or(ChargingMode::Manual);
        let set_current = shared.cached_u64(PropertyPath::SetCurrent, 0);
        let max_current = shared.cached_u64(PropertyPath::MaxCurrent, DEFAULT_MAX_CURRENT);
        (mode, set_current, max_current)
    }

    async fn write_param(&self, param: DeviceParam, value: u64) -> Result<bool> {
        self.client
            .write_parameter(param.as_str(), &serde_json::json!(value))
            .await
    }

    async fn execute(&self, path: PropertyPath, action: WriteAction) -> bool {
        match action {
            WriteAction::Reject { reason } => {
                self.logger.warn(&format!(
                    "Refusing write to {}: {}",
                    path.as_str(),
                    reason
                ));
                false
            }
            WriteAction::Set { param, value } => {
                match self.write_param(param, value).await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        self.logger.error(&format!(
                            "Write of {}={} failed: {}",
                            param.as_str(),
                            value,
                            e
                        ));
                        false
                    }
                }
            }
            WriteAction::SwitchMode { lmo, frc } => {
                // Loading mode first; the force state is only touched once
                // the mode switch validated
                let lmo_ok = match self.write_param(DeviceParam::LoadingMode, lmo).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        self.logger
                            .error(&format!("Mode switch (lmo={}) failed: {}", lmo, e));
                        false
                    }
                };
                if !lmo_ok {
                    return false;
                }
                match self.write_param(DeviceParam::ForceState, frc).await {
                    Ok(ok) => ok,
                    Err(e) => {
                        self.logger
                            .error(&format!("Mode switch (frc={}) failed: {}", frc, e));
                        false
                    }
                }
            }
        }
    }

    /// Automatic-mode work for one poll cycle: push the current power
    /// flows to the charger's eco logic, then make sure the current limit
    /// sits at the station maximum so the charger has the full range to
    /// modulate in. No-op in manual and scheduled mode.
    pub async fn on_cycle(&self, mode: ChargingMode, set_current: u64, max_current: u64) {
        if mode != ChargingMode::Automatic {
            return;
        }

        match self.flows.sample().await {
            Ok(sample) => {
                self.client
                    .push_surplus_targets(
                        sample.grid_total(),
                        sample.battery_export(),
                        sample.pv_total(),
                    )
                    .await;
            }
            Err(e) => {
                self.logger
                    .warn(&format!("Power flows unavailable, skipping surplus push: {}", e));
            }
        }

        if set_current < max_current {
            if let Err(e) = self.write_param(DeviceParam::Current, max_current).await {
                self.logger
                    .error(&format!("Raising current limit to {} failed: {}", max_current, e));
            }
        }
    }
}

#[async_trait]
impl ExternalWriteHandler for ModeController {
    async fn handle_write(&self, path: PropertyPath, value: serde_json::Value) -> bool {
        self.logger.info(&format!(
            "External write: {} = {}",
            path.as_str(),
            value
        ));
        let (mode, start_stop, max_current) = self.control_state();
        let action = plan_external_write(path, &value, mode, start_stop, max_current);
        self.execute(path, action).await
    }
}
