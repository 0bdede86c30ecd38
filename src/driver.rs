//! Poll-and-translate loop for one charger instance
//!
//! `GoeDriver` owns everything belonging to a single charger: the HTTP
//! client, the D-Bus service, the mode controller and the session tracker.
//! One failed cycle never stops the loop; published values simply keep
//! their last state until the charger answers again.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::bus::{DbusService, PropertyPath};
use crate::config::ChargerConfig;
use crate::controls::ModeController;
use crate::error::{HeliosError, Result};
use crate::flows::{PowerFlowSource, SystemFlows};
use crate::goe::{ChargerSnapshot, GoeClient};
use crate::logging::{LogContext, get_logger, get_logger_with_context};
use crate::session::ChargeSessionTracker;

/// Translate the charger's vehicle code into the Victron status value.
/// Total: an out-of-contract code is logged and reported as disconnected.
pub fn map_vehicle_code_to_status(vehicle_code: u8) -> u8 {
    match vehicle_code {
        1 => 0, // ready, no vehicle
        2 => 2, // charging
        3 => 6, // waiting for vehicle
        4 => 3, // finished, still connected
        other => {
            get_logger("driver")
                .warn(&format!("Unknown vehicle code {}, reporting disconnected", other));
            0
        }
    }
}

/// Initial value for a path at registration time. Management values come
/// from the configuration; telemetry starts at zero until the first poll.
fn initial_value(config: &ChargerConfig, path: PropertyPath) -> serde_json::Value {
    match path {
        PropertyPath::MgmtProcessName => serde_json::json!(env!("CARGO_PKG_NAME")),
        PropertyPath::MgmtProcessVersion => serde_json::json!(env!("CARGO_PKG_VERSION")),
        PropertyPath::MgmtConnection => {
            serde_json::json!(format!("{} {}", config.access_type, config.host))
        }
        PropertyPath::DeviceInstance => serde_json::json!(config.device_instance),
        PropertyPath::ProductId => serde_json::json!(0xFFFFu32),
        PropertyPath::ProductName | PropertyPath::CustomName => serde_json::json!("go-eCharger"),
        PropertyPath::HardwareVersion => serde_json::json!(config.hardware_version),
        PropertyPath::Connected => serde_json::json!(1),
        PropertyPath::Position => serde_json::json!(config.position),
        _ => serde_json::json!(0),
    }
}

pub struct GoeDriver {
    config: ChargerConfig,
    sign_of_life_interval_min: u32,
    client: Arc<GoeClient>,
    service: DbusService,
    session: ChargeSessionTracker,
    update_index: u8,
    last_update: Option<DateTime<Utc>>,
    identity_logged: bool,
    logger: crate::logging::StructuredLogger,
}

impl GoeDriver {
    pub async fn new(config: ChargerConfig, sign_of_life_interval_min: u32) -> Result<Self> {
        let logger = get_logger_with_context(
            LogContext::new("driver").with_device_instance(config.device_instance),
        );
        let client = Arc::new(GoeClient::new(&config.host)?);
        let service = DbusService::new(config.device_instance).await?;
        Ok(Self {
            config,
            sign_of_life_interval_min,
            client,
            service,
            session: ChargeSessionTracker::new(),
            update_index: 0,
            last_update: None,
            identity_logged: false,
            logger,
        })
    }

    /// Bring up the D-Bus service and run the poll loop until shutdown is
    /// signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.logger.info(&format!(
            "Starting driver for {} (instance {}, poll every {} ms)",
            self.config.host, self.config.device_instance, self.config.poll_interval_ms
        ));

        self.service.start().await?;
        self.register_paths().await?;

        let connection = self
            .service
            .connection()
            .ok_or_else(|| HeliosError::dbus("D-Bus connection missing after start"))?;
        let flows: Arc<dyn PowerFlowSource> = Arc::new(SystemFlows::new(connection));
        let controller = Arc::new(ModeController::new(
            Arc::clone(&self.client),
            flows,
            self.service.shared_state(),
        ));
        self.service.set_write_handler(controller.clone());

        let mut poll =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        let mut sign_of_life = tokio::time::interval(Duration::from_secs(
            u64::from(self.sign_of_life_interval_min) * 60,
        ));

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    self.poll_cycle(&controller).await;
                }
                _ = sign_of_life.tick() => {
                    self.sign_of_life();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.logger.info("Shutting down driver");
        self.service.stop().await
    }

    async fn register_paths(&mut self) -> Result<()> {
        let seeds: Vec<(PropertyPath, serde_json::Value)> = PropertyPath::ALL
            .iter()
            .map(|p| (*p, initial_value(&self.config, *p)))
            .collect();
        for (path, value) in seeds {
            self.service.ensure_item(path, value).await?;
        }
        Ok(())
    }

    /// One poll: read the charger, run automatic-mode side effects against
    /// the previously published state, then publish fresh telemetry.
    async fn poll_cycle(&mut self, controller: &ModeController) {
        let snapshot = match self.client.read_status().await {
            Ok(s) => s,
            Err(e) if e.is_network() => {
                self.logger
                    .warn(&format!("Charger not reachable, skipping cycle: {}", e));
                return;
            }
            Err(e) => {
                self.logger
                    .error(&format!("Charger broke its contract, skipping cycle: {}", e));
                return;
            }
        };

        if !self.identity_logged {
            self.logger.info(&format!(
                "Connected to charger, firmware {}, serial {}",
                snapshot.firmware_version, snapshot.serial
            ));
            self.identity_logged = true;
        }

        let (mode, set_current, max_current) = controller.cycle_inputs();
        controller.on_cycle(mode, set_current, max_current).await;

        if let Err(e) = self.publish_snapshot(&snapshot).await {
            self.logger
                .error(&format!("Publishing telemetry failed: {}", e));
        }
    }

    /// Publish one snapshot's telemetry: session time, status, the measured
    /// values, and finally the update index. Only runs for a successful
    /// status read, so a failed cycle leaves every published value, the
    /// charging time and /UpdateIndex exactly as they were.
    async fn publish_snapshot(&mut self, snapshot: &ChargerSnapshot) -> Result<()> {
        let charging_time = self.session.update(snapshot.vehicle_code);
        let status = map_vehicle_code_to_status(snapshot.vehicle_code);

        let updates = [
            (
                PropertyPath::AcPowerL1,
                serde_json::json!(snapshot.phase_power(1) as i64),
            ),
            (
                PropertyPath::AcPowerL2,
                serde_json::json!(snapshot.phase_power(2) as i64),
            ),
            (
                PropertyPath::AcPowerL3,
                serde_json::json!(snapshot.phase_power(3) as i64),
            ),
            (
                PropertyPath::AcPower,
                serde_json::json!(snapshot.total_power() as i64),
            ),
            (
                PropertyPath::Current,
                serde_json::json!(snapshot.max_phase_current()),
            ),
            (
                PropertyPath::AcEnergyForward,
                serde_json::json!(snapshot.energy_kwh()),
            ),
            (
                PropertyPath::SetCurrent,
                serde_json::json!(snapshot.set_current),
            ),
            (
                PropertyPath::MaxCurrent,
                serde_json::json!(snapshot.max_current),
            ),
            (PropertyPath::ChargingTime, serde_json::json!(charging_time)),
            (PropertyPath::Status, serde_json::json!(status)),
        ];
        self.service.update_paths(updates).await?;

        // Bump the update index so consumers see fresh data; wraps 255 -> 0
        self.update_index = self.update_index.wrapping_add(1);
        self.service
            .update_path(
                PropertyPath::UpdateIndex,
                serde_json::json!(self.update_index),
            )
            .await?;

        self.last_update = Some(Utc::now());
        Ok(())
    }

    fn sign_of_life(&self) {
        let power = self
            .service
            .cached_value(PropertyPath::AcPower)
            .unwrap_or(serde_json::json!(0));
        let last = self
            .last_update
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        self.logger.info(&format!(
            "Alive; last successful poll: {}, /Ac/Power: {}",
            last, power
        ));
    }
}
