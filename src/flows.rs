//! System power flows for surplus charging
//!
//! Automatic mode feeds the charger the instantaneous grid, PV and battery
//! powers so its own eco logic can chase the surplus. The production source
//! reads them from `com.victronenergy.system`; tests substitute their own
//! [`PowerFlowSource`].

use async_trait::async_trait;
use std::time::Duration;
use zbus::Connection;

use crate::error::{HeliosError, Result};

const SYSTEM_SERVICE: &str = "com.victronenergy.system";
const READ_TIMEOUT: Duration = Duration::from_millis(600);

/// One sample of the system's power flows, all in watts
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PowerFlowSample {
    /// Grid power per phase, positive = import
    pub grid: [f64; 3],
    /// AC-coupled PV power per phase
    pub pv: [f64; 3],
    /// Battery power, positive = charging
    pub battery_w: f64,
}

impl PowerFlowSample {
    pub fn grid_total(&self) -> f64 {
        self.grid.iter().sum()
    }

    pub fn pv_total(&self) -> f64 {
        self.pv.iter().sum()
    }

    /// Battery power as the charger expects it: positive = discharging
    pub fn battery_export(&self) -> f64 {
        -self.battery_w
    }
}

#[async_trait]
pub trait PowerFlowSource: Send + Sync {
    async fn sample(&self) -> Result<PowerFlowSample>;
}

/// Reads the flows from the Venus system service over D-Bus. Any missing or
/// unreadable value fails the whole sample; the caller skips the surplus
/// push for that cycle.
pub struct SystemFlows {
    connection: Connection,
}

impl SystemFlows {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    async fn read_power(&self, path: &str) -> Result<f64> {
        let proxy = tokio::time::timeout(
            READ_TIMEOUT,
            zbus::Proxy::new(
                &self.connection,
                SYSTEM_SERVICE,
                path,
                "com.victronenergy.BusItem",
            ),
        )
        .await
        .map_err(|_| HeliosError::dbus(format!("Proxy creation timed out for {}", path)))?
        .map_err(|e| HeliosError::dbus(format!("Proxy creation failed for {}: {}", path, e)))?;

        let val: zbus::zvariant::OwnedValue =
            tokio::time::timeout(READ_TIMEOUT, proxy.call("GetValue", &()))
                .await
                .map_err(|_| HeliosError::dbus(format!("GetValue timed out for {}", path)))?
                .map_err(|e| HeliosError::dbus(format!("GetValue failed for {}: {}", path, e)))?;

        crate::bus::util::owned_value_to_serde(&val)
            .as_f64()
            .ok_or_else(|| HeliosError::dbus(format!("Non-numeric value at {}", path)))
    }
}

#[async_trait]
impl PowerFlowSource for SystemFlows {
    async fn sample(&self) -> Result<PowerFlowSample> {
        let mut sample = PowerFlowSample::default();
        for (i, slot) in sample.grid.iter_mut().enumerate() {
            *slot = self
                .read_power(&format!("/Ac/Grid/L{}/Power", i + 1))
                .await?;
        }
        for (i, slot) in sample.pv.iter_mut().enumerate() {
            *slot = self
                .read_power(&format!("/Ac/PvOnGrid/L{}/Power", i + 1))
                .await?;
        }
        sample.battery_w = self.read_power("/Dc/Battery/Power").await?;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_totals() {
        let sample = PowerFlowSample {
            grid: [-2000.0, -2100.0, -1900.0],
            pv: [2400.0, 2400.0, 2469.0],
            battery_w: 186.0,
        };
        assert!((sample.grid_total() - -6000.0).abs() < f64::EPSILON);
        assert!((sample.pv_total() - 7269.0).abs() < f64::EPSILON);
        assert!((sample.battery_export() - -186.0).abs() < f64::EPSILON);
    }
}
