//! HTTP client for the go-eCharger JSON API
//!
//! This module wraps the two device requests the driver needs (status read
//! and parameter write) plus the fire-and-forget surplus push, and decodes
//! the responses into typed values. Transport and contract failures are kept
//! apart: a timeout or refused connection means "no data this cycle", while
//! an empty or malformed body means the device broke its API contract.

use crate::error::{HeliosError, Result};
use crate::logging::get_logger;
use serde::Deserialize;
use std::time::Duration;

/// Field filter requested on every status read
const STATUS_FILTER: &str = "fwv,sse,nrg,wh,alw,amp,ama,car";

/// Bounded timeout for status reads
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded timeout for parameter writes. The device normally answers a set
/// request well within this; an unresponsive charger must not stall the
/// poll loop indefinitely.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded timeout for the bulk surplus push
const SURPLUS_TIMEOUT: Duration = Duration::from_secs(15);

/// Number of entries in the `nrg` measurement vector
pub const MEASUREMENT_COUNT: usize = 16;

/// Fixed positions inside the `nrg` measurement vector. The device never
/// renumbers these.
pub mod nrg {
    pub const VOLTAGE_L1: usize = 0;
    pub const VOLTAGE_L2: usize = 1;
    pub const VOLTAGE_L3: usize = 2;
    pub const VOLTAGE_N: usize = 3;
    pub const CURRENT_L1: usize = 4;
    pub const CURRENT_L2: usize = 5;
    pub const CURRENT_L3: usize = 6;
    pub const POWER_L1: usize = 7;
    pub const POWER_L2: usize = 8;
    pub const POWER_L3: usize = 9;
    pub const POWER_N: usize = 10;
    pub const POWER_TOTAL: usize = 11;
    pub const POWER_FACTOR_L1: usize = 12;
    pub const POWER_FACTOR_L2: usize = 13;
    pub const POWER_FACTOR_L3: usize = 14;
    pub const POWER_FACTOR_N: usize = 15;
}

/// Decoded result of one successful status read
#[derive(Debug, Clone, Deserialize)]
pub struct ChargerSnapshot {
    /// Firmware version string
    #[serde(rename = "fwv")]
    pub firmware_version: String,

    /// Charger serial number
    #[serde(rename = "sse")]
    pub serial: String,

    /// Measurement vector, always [`MEASUREMENT_COUNT`] entries in the
    /// order documented in [`nrg`]
    #[serde(rename = "nrg")]
    pub measurements: Vec<f64>,

    /// Cumulative energy counter in watt-hours
    #[serde(rename = "wh")]
    pub energy_wh: f64,

    /// Allowed-to-charge flag (0/1)
    #[serde(rename = "alw")]
    pub allowed_to_charge: u8,

    /// Present set current in amperes
    #[serde(rename = "amp")]
    pub set_current: u32,

    /// Present maximum current in amperes
    #[serde(rename = "ama")]
    pub max_current: u32,

    /// Vehicle connection code (1=ready, 2=charging, 3=waiting, 4=finished)
    #[serde(rename = "car")]
    pub vehicle_code: u8,
}

impl ChargerSnapshot {
    /// Active power for phase 1..=3 in watts
    pub fn phase_power(&self, phase: usize) -> f64 {
        debug_assert!((1..=3).contains(&phase));
        self.measurements[nrg::POWER_L1 + phase - 1]
    }

    /// Total active power in watts
    pub fn total_power(&self) -> f64 {
        self.measurements[nrg::POWER_TOTAL]
    }

    /// Highest of the three phase currents in amperes
    pub fn max_phase_current(&self) -> f64 {
        let l1 = self.measurements[nrg::CURRENT_L1];
        let l2 = self.measurements[nrg::CURRENT_L2];
        let l3 = self.measurements[nrg::CURRENT_L3];
        l1.max(l2).max(l3)
    }

    /// Cumulative energy in kilowatt-hours, rounded to two decimals
    pub fn energy_kwh(&self) -> f64 {
        (self.energy_wh / 1000.0 * 100.0).round() / 100.0
    }
}

/// Thin typed client for one charger's HTTP API
pub struct GoeClient {
    host: String,
    http: reqwest::Client,
    logger: crate::logging::StructuredLogger,
}

impl GoeClient {
    /// Create a client for the given charger host
    pub fn new(host: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| HeliosError::network(format!("HTTP client init failed: {}", e)))?;
        Ok(Self {
            host: host.to_string(),
            http,
            logger: get_logger("goe"),
        })
    }

    /// Charger host this client talks to
    pub fn host(&self) -> &str {
        &self.host
    }

    fn status_url(&self) -> String {
        format!("http://{}/api/status?filter={}", self.host, STATUS_FILTER)
    }

    fn set_url(&self, parameter: &str, value: &str) -> String {
        format!("http://{}/api/set?{}={}", self.host, parameter, value)
    }

    /// Read the charger status.
    ///
    /// A connection problem or timeout yields a network error ("no data this
    /// cycle"); an empty body, a non-JSON body, a missing field or a short
    /// measurement vector yields a protocol error.
    pub async fn read_status(&self) -> Result<ChargerSnapshot> {
        let url = self.status_url();
        let response = self
            .http
            .get(&url)
            .timeout(STATUS_TIMEOUT)
            .send()
            .await
            .map_err(HeliosError::from)?;

        let body = response.text().await.map_err(HeliosError::from)?;
        if body.trim().is_empty() {
            return Err(HeliosError::protocol(format!(
                "Empty status response from {}",
                url
            )));
        }

        let snapshot: ChargerSnapshot = serde_json::from_str(&body)
            .map_err(|e| HeliosError::protocol(format!("Bad status JSON from {}: {}", url, e)))?;

        if snapshot.measurements.len() != MEASUREMENT_COUNT {
            return Err(HeliosError::protocol(format!(
                "Measurement vector has {} entries, expected {}",
                snapshot.measurements.len(),
                MEASUREMENT_COUNT
            )));
        }

        Ok(snapshot)
    }

    /// Write a single device parameter and validate the echoed value.
    ///
    /// Returns `Ok(true)` only when the device echoes acceptance as defined
    /// by [`write_accepted`]; `Ok(false)` means the device rejected or
    /// ignored the write. An `Err` means the write outcome is unknown and
    /// callers must not assume success.
    pub async fn write_parameter(&self, parameter: &str, value: &serde_json::Value) -> Result<bool> {
        let sent = param_to_string(value);
        let url = self.set_url(parameter, &sent);
        self.logger.debug(&format!("Setting {} via {}", parameter, url));

        let response = self
            .http
            .get(&url)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await
            .map_err(HeliosError::from)?;

        let body = response.text().await.map_err(HeliosError::from)?;
        if body.trim().is_empty() {
            return Err(HeliosError::protocol(format!(
                "Empty set response from {}",
                url
            )));
        }

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| HeliosError::protocol(format!("Bad set JSON from {}: {}", url, e)))?;
        let echo = json.get(parameter).ok_or_else(|| {
            HeliosError::protocol(format!("Set response is missing key '{}'", parameter))
        })?;

        if write_accepted(echo, &sent) {
            Ok(true)
        } else {
            self.logger.error(&format!(
                "Charger parameter {} not set to {} (echoed {})",
                parameter, sent, echo
            ));
            Ok(false)
        }
    }

    /// Best-effort bulk write of the instantaneous grid/battery/PV powers.
    /// The response is not inspected and failures are only logged.
    pub async fn push_surplus_targets(&self, grid_w: f64, battery_w: f64, pv_w: f64) {
        let ids = format!(
            "{{\"pGrid\":{},\"pAkku\":{},\"pPv\":{}}}",
            grid_w, battery_w, pv_w
        );
        let url = format!("http://{}/api/set?ids={}", self.host, ids);
        self.logger.debug(&format!("Pushing surplus targets: {}", url));

        match self.http.get(&url).timeout(SURPLUS_TIMEOUT).send().await {
            Ok(_) => {}
            Err(e) => {
                self.logger
                    .warn(&format!("Surplus push to {} failed: {}", self.host, e));
            }
        }
    }
}

/// Render a parameter value the way it goes onto the wire. Integral floats
/// drop their decimal point so the echo comparison lines up with what the
/// device sends back.
pub(crate) fn param_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Whether the echoed value counts as acceptance: the boolean `true`, the
/// string `"true"`/`"True"`, or a string equal to the value as sent. A
/// numeric echo never matches, even when it equals the sent number.
pub(crate) fn write_accepted(echo: &serde_json::Value, sent: &str) -> bool {
    match echo {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "true" || s == "True" || s == sent,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status_json() -> String {
        r#"{
            "fwv": "054.1",
            "sse": "123456",
            "nrg": [230.1, 229.9, 230.4, 0.5, 10.0, 9.8, 10.2, 2301.0, 2254.0, 2347.0, 1.0, 6903.0, 0.99, 0.98, 0.99, 0.0],
            "wh": 12345,
            "alw": 1,
            "amp": 16,
            "ama": 32,
            "car": 2
        }"#
        .to_string()
    }

    #[test]
    fn decode_full_status() {
        let snap: ChargerSnapshot = serde_json::from_str(&sample_status_json()).unwrap();
        assert_eq!(snap.firmware_version, "054.1");
        assert_eq!(snap.serial, "123456");
        assert_eq!(snap.measurements.len(), MEASUREMENT_COUNT);
        assert_eq!(snap.vehicle_code, 2);
        assert_eq!(snap.set_current, 16);
        assert_eq!(snap.max_current, 32);
    }

    #[test]
    fn derived_accessors() {
        let snap: ChargerSnapshot = serde_json::from_str(&sample_status_json()).unwrap();
        assert!((snap.phase_power(1) - 2301.0).abs() < f64::EPSILON);
        assert!((snap.phase_power(3) - 2347.0).abs() < f64::EPSILON);
        assert!((snap.total_power() - 6903.0).abs() < f64::EPSILON);
        assert!((snap.max_phase_current() - 10.2).abs() < f64::EPSILON);
        // 12345 Wh rounds to 12.35 kWh
        assert!((snap.energy_kwh() - 12.35).abs() < 1e-9);
    }

    #[test]
    fn decode_rejects_missing_field() {
        let json = r#"{"fwv": "054.1", "sse": "123456"}"#;
        assert!(serde_json::from_str::<ChargerSnapshot>(json).is_err());
    }

    #[test]
    fn status_url_contains_filter() {
        let client = GoeClient::new("192.168.100.4").unwrap();
        assert_eq!(
            client.status_url(),
            "http://192.168.100.4/api/status?filter=fwv,sse,nrg,wh,alw,amp,ama,car"
        );
        assert_eq!(
            client.set_url("amp", "16"),
            "http://192.168.100.4/api/set?amp=16"
        );
    }

    #[test]
    fn param_to_string_formats() {
        assert_eq!(param_to_string(&serde_json::json!(16)), "16");
        assert_eq!(param_to_string(&serde_json::json!(32.0)), "32");
        assert_eq!(param_to_string(&serde_json::json!(6.5)), "6.5");
        assert_eq!(param_to_string(&serde_json::json!("eco")), "eco");
        assert_eq!(param_to_string(&serde_json::json!(true)), "true");
    }

    #[test]
    fn write_acceptance_rules() {
        assert!(write_accepted(&serde_json::json!(true), "16"));
        assert!(write_accepted(&serde_json::json!("true"), "16"));
        assert!(write_accepted(&serde_json::json!("True"), "16"));
        assert!(write_accepted(&serde_json::json!("16"), "16"));
        // A numeric echo is not acceptance, even when it equals the sent value
        assert!(!write_accepted(&serde_json::json!(16), "16"));
        assert!(!write_accepted(&serde_json::json!(false), "16"));
        assert!(!write_accepted(&serde_json::json!("17"), "16"));
        assert!(!write_accepted(&serde_json::json!(null), "16"));
    }
}
