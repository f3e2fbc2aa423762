// ── Power monitor ──
//
// Optional energy-monitoring add-on. The configuration is fetched once
// when the subsystem is first requested; live readings are pulled on
// demand and kept only when their reading number moves.

use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use izone_api::models::{
    POWER_REQUEST, PowerConfigResponse, PowerMonitorConfig, PowerMonitorStatus, PowerRequest,
    PowerRequestKind, PowerStatusResponse,
};

use crate::controller::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::model::power::{self, PowerDevice, PowerGroup};
use crate::sync::{read, write};

/// Power-monitor subsystem of one controller.
#[derive(Clone)]
pub struct Power {
    inner: Arc<PowerInner>,
}

struct PowerInner {
    controller: Weak<ControllerInner>,
    config: PowerMonitorConfig,
    status: RwLock<Option<PowerMonitorStatus>>,
}

impl Power {
    pub(crate) async fn fetch(controller: &Controller) -> Result<Self, CoreError> {
        let response: PowerConfigResponse = controller
            .request(POWER_REQUEST, PowerRequest::new(PowerRequestKind::Config).into())
            .await?;
        debug!(
            device_uid = controller.device_uid(),
            enabled = response.config.enabled,
            devices = response.config.devices.len(),
            "power monitor configuration loaded"
        );
        Ok(Self {
            inner: Arc::new(PowerInner {
                controller: controller.downgrade(),
                config: response.config,
                status: RwLock::new(None),
            }),
        })
    }

    fn controller(&self) -> Result<Controller, CoreError> {
        self.inner
            .controller
            .upgrade()
            .map(Controller::from_inner)
            .ok_or(CoreError::Closed)
    }

    fn ensure_connected(&self) -> Result<(), CoreError> {
        self.controller()?.ensure_connected()
    }

    /// Pull the latest readings. Returns `false` when the controller has
    /// no newer reading than the one already held.
    pub async fn refresh(&self) -> Result<bool, CoreError> {
        let controller = self.controller()?;
        controller.ensure_connected()?;
        let response: PowerStatusResponse = controller
            .request(POWER_REQUEST, PowerRequest::new(PowerRequestKind::Status).into())
            .await?;

        let mut status = write(&self.inner.status);
        if status
            .as_ref()
            .is_some_and(|s| s.last_reading_no == response.status.last_reading_no)
        {
            return Ok(false);
        }
        *status = Some(response.status);
        Ok(true)
    }

    /// Static configuration as fetched.
    pub fn config(&self) -> &PowerMonitorConfig {
        &self.inner.config
    }

    pub fn enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Nominal mains voltage.
    pub fn voltage(&self) -> i64 {
        self.inner.config.voltage
    }

    /// Power factor, percent.
    pub fn power_factor(&self) -> i64 {
        self.inner.config.power_factor
    }

    /// Cost of power in cents per kWh.
    pub fn cost_of_power(&self) -> i64 {
        self.inner.config.cost_of_power
    }

    /// Emissions in grams of CO2 per kWh.
    pub fn emissions(&self) -> i64 {
        self.inner.config.emissions
    }

    /// Number of the held reading; `None` before the first refresh.
    pub fn last_reading(&self) -> Result<Option<i64>, CoreError> {
        self.ensure_connected()?;
        Ok(read(&self.inner.status).as_ref().map(|s| s.last_reading_no))
    }

    /// Devices and channels with their latest readings.
    pub fn devices(&self) -> Result<Vec<PowerDevice>, CoreError> {
        self.ensure_connected()?;
        let status = read(&self.inner.status);
        Ok(power::devices(&self.inner.config, status.as_ref()))
    }

    /// Channels combined by group number.
    pub fn groups(&self) -> Result<Vec<PowerGroup>, CoreError> {
        Ok(power::groups(&self.devices()?))
    }
}

impl std::fmt::Debug for Power {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Power")
            .field("enabled", &self.inner.config.enabled)
            .field("devices", &self.inner.config.devices.len())
            .finish_non_exhaustive()
    }
}
