use crate::error::Result;
use crate::types::{SensorKind, SensorState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::Path;

/// Persisted user selection
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    pub sensor_states: SensorState,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sensor_states: SensorState::from_kinds(&[
                SensorKind::Gps,
                SensorKind::Accelerometer,
                SensorKind::Gyroscope,
                SensorKind::Magnetometer,
            ]),
        }
    }
}

impl Settings {
    /// Load from JSON. A missing file yields defaults and missing keys keep
    /// their default value.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let mut merged = serde_json::to_value(Self::default())?;
        merge(&mut merged, serde_json::from_str(&text)?);
        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
