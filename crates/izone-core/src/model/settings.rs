//! Opaque settings document with typed field decoding.
//!
//! Controllers return flat JSON objects whose values may arrive as
//! strings or numbers depending on firmware revision. `Settings` keeps
//! the document as received and decodes fields on demand; any value it
//! cannot interpret is reported as [`CoreError::InvalidState`].

use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Key carrying the controller's device identifier.
pub const DEVICE_UID_KEY: &str = "AirStreamDeviceUId";

/// A settings document as last fetched from the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

impl From<Map<String, Value>> for Settings {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl Settings {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The device identifier embedded in a system-settings document.
    pub fn device_uid(&self) -> Option<&str> {
        self.get(DEVICE_UID_KEY).and_then(Value::as_str)
    }

    fn require(&self, key: &'static str) -> Result<&Value, CoreError> {
        self.get(key).ok_or(CoreError::InvalidState {
            key,
            value: "<missing>".into(),
        })
    }

    /// A string field.
    pub fn text(&self, key: &'static str) -> Result<&str, CoreError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| invalid(key, value))
    }

    /// A numeric field, accepting numbers or numeric strings.
    pub fn number(&self, key: &'static str) -> Result<f64, CoreError> {
        let value = self.require(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| invalid(key, value))
    }

    /// An integral field, accepting integers, whole floats, or numeric strings.
    pub fn integer(&self, key: &'static str) -> Result<i64, CoreError> {
        let value = self.require(key)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
            Value::String(s) => {
                let s = s.trim();
                s.parse()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(whole))
            }
            _ => None,
        };
        parsed.ok_or_else(|| invalid(key, value))
    }

    /// A string field decoded into an enumeration.
    pub fn parse<T: FromStr>(&self, key: &'static str) -> Result<T, CoreError> {
        let raw = self.text(key)?;
        raw.parse().map_err(|_| CoreError::InvalidState {
            key,
            value: raw.to_owned(),
        })
    }

    /// A numeric field where zero means "no reading".
    pub fn reading(&self, key: &'static str) -> Result<Option<f64>, CoreError> {
        let value = self.number(key)?;
        Ok((value != 0.0).then_some(value))
    }
}

fn invalid(key: &'static str, value: &Value) -> CoreError {
    CoreError::InvalidState {
        key,
        value: value.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn whole(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::SystemMode;
    use serde_json::json;

    fn settings(value: Value) -> Settings {
        match value {
            Value::Object(map) => Settings::from(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn numbers_accept_strings_and_numbers() {
        let s = settings(json!({"Setpoint": "22.5", "Temp": 21, "EcoMin": 15.0}));
        assert!((s.number("Setpoint").unwrap() - 22.5).abs() < f64::EPSILON);
        assert!((s.number("Temp").unwrap() - 21.0).abs() < f64::EPSILON);
        assert_eq!(s.integer("EcoMin").unwrap(), 15);
    }

    #[test]
    fn integers_reject_fractions() {
        let s = settings(json!({"SleepTimer": "30", "NoOfZones": 6.5}));
        assert_eq!(s.integer("SleepTimer").unwrap(), 30);
        assert!(matches!(
            s.integer("NoOfZones"),
            Err(CoreError::InvalidState { key: "NoOfZones", .. })
        ));
    }

    #[test]
    fn unknown_enum_value_is_invalid_state() {
        let s = settings(json!({"SysMode": "turbo"}));
        let err = s.parse::<SystemMode>("SysMode").unwrap_err();
        match err {
            CoreError::InvalidState { key, value } => {
                assert_eq!(key, "SysMode");
                assert_eq!(value, "turbo");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_key_is_invalid_state() {
        let s = Settings::default();
        assert!(matches!(
            s.text("SysOn"),
            Err(CoreError::InvalidState { key: "SysOn", .. })
        ));
    }

    #[test]
    fn zero_reading_is_none() {
        let s = settings(json!({"Supply": 0, "Temp": "19.5"}));
        assert_eq!(s.reading("Supply").unwrap(), None);
        assert_eq!(s.reading("Temp").unwrap(), Some(19.5));
    }
}
