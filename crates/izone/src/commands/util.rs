//! Shared helpers for command handlers.

use izone_core::{Controller, DiscoveryService, Zone};

use crate::config::Settings;
use crate::error::CliError;

/// Wait for the configured controller, or the first one to answer.
pub async fn select_controller(
    service: &DiscoveryService,
    settings: &Settings,
) -> Result<Controller, CliError> {
    let controller = service
        .wait_for_controller(settings.uid.as_deref(), settings.wait)
        .await?;
    tracing::debug!(device_uid = controller.device_uid(), "controller selected");
    Ok(controller)
}

/// Look up a zone by index.
pub fn resolve_zone(controller: &Controller, index: usize) -> Result<Zone, CliError> {
    controller.zone(index).ok_or(CliError::ZoneNotFound {
        index,
        count: controller.zone_count(),
    })
}
