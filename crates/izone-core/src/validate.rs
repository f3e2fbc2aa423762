// ── Write validation ──
//
// Checks applied before any command leaves the process. A failure here
// means nothing was sent and nothing changed.

use crate::error::CoreError;
use crate::model::Fan;

/// Largest sleep timer, in minutes.
pub const SLEEP_TIMER_MAX: i64 = 120;
const SLEEP_TIMER_STEP: i64 = 30;

const AIRFLOW_MAX: i64 = 100;
const AIRFLOW_STEP: i64 = 5;

/// Setpoint range when eco lock is off.
pub const DEFAULT_TEMP_RANGE: (f64, f64) = (15.0, 30.0);

pub(crate) fn sleep_timer(minutes: i64) -> Result<i64, CoreError> {
    if !(0..=SLEEP_TIMER_MAX).contains(&minutes) || minutes % SLEEP_TIMER_STEP != 0 {
        return Err(CoreError::validation(format!(
            "sleep timer {minutes} must be 0 to {SLEEP_TIMER_MAX} in steps of {SLEEP_TIMER_STEP}"
        )));
    }
    Ok(minutes)
}

pub(crate) fn setpoint(value: f64, min: f64, max: f64) -> Result<f64, CoreError> {
    if !value.is_finite() || (value * 2.0).fract() != 0.0 {
        return Err(CoreError::validation(format!(
            "setpoint {value} is not a multiple of 0.5"
        )));
    }
    if value < min || value > max {
        return Err(CoreError::validation(format!(
            "setpoint {value} is outside {min} to {max}"
        )));
    }
    Ok(value)
}

pub(crate) fn airflow(field: &str, percent: i64) -> Result<i64, CoreError> {
    if !(0..=AIRFLOW_MAX).contains(&percent) || percent % AIRFLOW_STEP != 0 {
        return Err(CoreError::validation(format!(
            "{field} {percent} must be 0 to {AIRFLOW_MAX} in steps of {AIRFLOW_STEP}"
        )));
    }
    Ok(percent)
}

pub(crate) fn fan(value: Fan, allowed: &[Fan]) -> Result<Fan, CoreError> {
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(CoreError::validation(format!(
            "fan speed {value} is not supported by this controller"
        )))
    }
}

/// Setpoints travel as strings with one decimal, e.g. `"22.5"`.
pub(crate) fn format_setpoint(value: f64) -> String {
    format!("{value:.1}")
}
