// ── Zone ──
//
// A zone is addressed by its 0-based slot on the owning controller.
// The handle reads the controller's cached zone document and routes
// writes through the controller's command path.

use std::fmt;
use std::sync::Weak;

use crate::controller::{Controller, ControllerInner};
use crate::error::CoreError;
use crate::model::{Settings, ZoneMode, ZoneType};
use crate::validate;

/// Handle to one zone of a controller.
///
/// Holds the controller weakly; once the discovery service drops the
/// controller, every call fails with [`CoreError::Closed`].
#[derive(Clone)]
pub struct Zone {
    index: usize,
    controller: Weak<ControllerInner>,
}

impl Zone {
    pub(crate) fn new(index: usize, controller: Weak<ControllerInner>) -> Self {
        Self { index, controller }
    }

    /// 0-based slot on the controller.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn controller(&self) -> Result<Controller, CoreError> {
        self.controller
            .upgrade()
            .map(Controller::from_inner)
            .ok_or(CoreError::Closed)
    }

    fn read<T>(&self, decode: impl FnOnce(&Settings) -> Result<T, CoreError>) -> Result<T, CoreError> {
        self.controller()?.with_zone(self.index, decode)
    }

    /// Snapshot of the raw zone document.
    pub fn settings(&self) -> Result<Settings, CoreError> {
        self.read(|z| Ok(z.clone()))
    }

    pub fn name(&self) -> Result<String, CoreError> {
        self.read(|z| z.text("Name").map(str::to_owned))
    }

    pub fn zone_type(&self) -> Result<ZoneType, CoreError> {
        self.read(|z| z.parse("Type"))
    }

    pub fn mode(&self) -> Result<ZoneMode, CoreError> {
        self.read(|z| z.parse("Mode"))
    }

    /// Zone setpoint in °C.
    pub fn temp_setpoint(&self) -> Result<Option<f64>, CoreError> {
        self.read(|z| z.reading("SetPoint"))
    }

    /// Zone sensor temperature in °C; `None` without a sensor.
    pub fn temp_current(&self) -> Result<Option<f64>, CoreError> {
        self.read(|z| z.reading("Temp"))
    }

    /// Minimum damper opening, percent.
    pub fn airflow_min(&self) -> Result<i64, CoreError> {
        self.read(|z| z.integer("MinAir"))
    }

    /// Maximum damper opening, percent.
    pub fn airflow_max(&self) -> Result<i64, CoreError> {
        self.read(|z| z.integer("MaxAir"))
    }

    // ── Setters ──────────────────────────────────────────────────

    /// Change the damper mode.
    ///
    /// Constant zones reject every change; `Auto` needs a
    /// temperature-controlled zone.
    pub async fn set_mode(&self, mode: ZoneMode) -> Result<(), CoreError> {
        let controller = self.controller()?;
        let zone_type = self.zone_type()?;
        if zone_type == ZoneType::Const {
            return Err(CoreError::validation(format!(
                "zone {} is a constant zone; its mode cannot change",
                self.index
            )));
        }
        if mode == ZoneMode::Auto && zone_type != ZoneType::Auto {
            return Err(CoreError::validation(format!(
                "zone {} has no temperature control",
                self.index
            )));
        }
        if controller.unchanged(self.mode(), &mode)? {
            return Ok(());
        }

        match mode {
            ZoneMode::Auto => controller.set_zone_auto(self.index).await,
            ZoneMode::Open | ZoneMode::Close => {
                controller
                    .write_zone(self.index, "ZoneCommand", mode.to_string())
                    .await
            }
        }
    }

    /// Change the zone setpoint, moving the zone to auto if needed.
    pub async fn set_temp_setpoint(&self, value: f64) -> Result<(), CoreError> {
        let controller = self.controller()?;
        if self.zone_type()? != ZoneType::Auto {
            return Err(CoreError::validation(format!(
                "zone {} has no temperature control",
                self.index
            )));
        }
        let (min, max) = controller.temp_range()?;
        validate::setpoint(value, min, max)?;
        if controller.unchanged(self.temp_setpoint(), &Some(value))? {
            return Ok(());
        }
        controller.set_zone_setpoint(self.index, value).await
    }

    pub async fn set_airflow_min(&self, percent: i64) -> Result<(), CoreError> {
        validate::airflow("minimum airflow", percent)?;
        let controller = self.controller()?;
        if controller.unchanged(self.airflow_min(), &percent)? {
            return Ok(());
        }
        controller
            .write_zone(self.index, "AirMinCommand", percent.to_string())
            .await
    }

    pub async fn set_airflow_max(&self, percent: i64) -> Result<(), CoreError> {
        validate::airflow("maximum airflow", percent)?;
        let controller = self.controller()?;
        if controller.unchanged(self.airflow_max(), &percent)? {
            return Ok(());
        }
        controller
            .write_zone(self.index, "AirMaxCommand", percent.to_string())
            .await
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device_uid = self
            .controller
            .upgrade()
            .map(|inner| Controller::from_inner(inner).device_uid().to_owned());
        f.debug_struct("Zone")
            .field("index", &self.index)
            .field("device_uid", &device_uid)
            .finish()
    }
}

impl PartialEq for Zone {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && Weak::ptr_eq(&self.controller, &other.controller)
    }
}

impl Eq for Zone {}
