pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported onboard sensors, in canonical column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Gps,
    Accelerometer,
    Gyroscope,
    Magnetometer,
    Barometer,
    Pedometer,
    Light,
}

impl SensorKind {
    /// Canonical order used for headers and records
    pub const ALL: [SensorKind; 7] = [
        SensorKind::Gps,
        SensorKind::Accelerometer,
        SensorKind::Gyroscope,
        SensorKind::Magnetometer,
        SensorKind::Barometer,
        SensorKind::Pedometer,
        SensorKind::Light,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SensorKind::Gps => "gps",
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
            SensorKind::Magnetometer => "magnetometer",
            SensorKind::Barometer => "barometer",
            SensorKind::Pedometer => "pedometer",
            SensorKind::Light => "light",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-sensor flag set.
///
/// Used both as an availability/permission report and as the enabled mask of
/// a logging session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorState {
    pub gps: bool,
    pub accelerometer: bool,
    pub gyroscope: bool,
    pub magnetometer: bool,
    pub light: bool,
    pub barometer: bool,
    pub pedometer: bool,
}

impl SensorState {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        let mut state = Self::default();
        for kind in SensorKind::ALL {
            state.set(kind, true);
        }
        state
    }

    pub fn from_kinds(kinds: &[SensorKind]) -> Self {
        let mut state = Self::default();
        for kind in kinds {
            state.set(*kind, true);
        }
        state
    }

    pub fn get(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Gps => self.gps,
            SensorKind::Accelerometer => self.accelerometer,
            SensorKind::Gyroscope => self.gyroscope,
            SensorKind::Magnetometer => self.magnetometer,
            SensorKind::Barometer => self.barometer,
            SensorKind::Pedometer => self.pedometer,
            SensorKind::Light => self.light,
        }
    }

    pub fn set(&mut self, kind: SensorKind, enabled: bool) {
        match kind {
            SensorKind::Gps => self.gps = enabled,
            SensorKind::Accelerometer => self.accelerometer = enabled,
            SensorKind::Gyroscope => self.gyroscope = enabled,
            SensorKind::Magnetometer => self.magnetometer = enabled,
            SensorKind::Barometer => self.barometer = enabled,
            SensorKind::Pedometer => self.pedometer = enabled,
            SensorKind::Light => self.light = enabled,
        }
    }

    /// Enabled sensors in canonical order
    pub fn enabled(&self) -> impl Iterator<Item = SensorKind> + '_ {
        SensorKind::ALL.into_iter().filter(move |kind| self.get(*kind))
    }

    pub fn count(&self) -> usize {
        self.enabled().count()
    }

    /// Sensors enabled here but not in `allowed`
    pub fn not_in(&self, allowed: &SensorState) -> Vec<SensorKind> {
        self.enabled().filter(|kind| !allowed.get(*kind)).collect()
    }

    pub fn intersect(&self, other: &SensorState) -> SensorState {
        let mut state = SensorState::none();
        for kind in SensorKind::ALL {
            state.set(kind, self.get(kind) && other.get(kind));
        }
        state
    }
}

/// Three-axis reading (accelerometer m/s², gyroscope rad/s, magnetometer µT)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisData {
    pub timestamp: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AxisData {
    pub fn new(x: f64, y: f64, z: f64, timestamp: f64) -> Self {
        Self { timestamp, x, y, z }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GpsData {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub heading: f64,
    pub accuracy: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BaroData {
    pub timestamp: f64,
    pub pressure_hpa: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepData {
    pub timestamp: f64,
    pub steps: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LightData {
    pub timestamp: f64,
    pub illuminance: f64,
}

/// One reading from one sensor
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Sample {
    Gps(GpsData),
    Accelerometer(AxisData),
    Gyroscope(AxisData),
    Magnetometer(AxisData),
    Barometer(BaroData),
    Pedometer(StepData),
    Light(LightData),
}

impl Sample {
    pub fn kind(&self) -> SensorKind {
        match self {
            Sample::Gps(_) => SensorKind::Gps,
            Sample::Accelerometer(_) => SensorKind::Accelerometer,
            Sample::Gyroscope(_) => SensorKind::Gyroscope,
            Sample::Magnetometer(_) => SensorKind::Magnetometer,
            Sample::Barometer(_) => SensorKind::Barometer,
            Sample::Pedometer(_) => SensorKind::Pedometer,
            Sample::Light(_) => SensorKind::Light,
        }
    }
}

/// Most recent reading of every sensor. Sensors that never reported stay zeroed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSnapshot {
    pub gps: GpsData,
    pub accel: AxisData,
    pub gyro: AxisData,
    pub mag: AxisData,
    pub baro: BaroData,
    pub steps: StepData,
    pub light: LightData,
}

impl SampleSnapshot {
    /// Overwrite the buffered reading; step counts only move forward.
    pub fn store(&mut self, sample: Sample) {
        match sample {
            Sample::Gps(data) => self.gps = data,
            Sample::Accelerometer(data) => self.accel = data,
            Sample::Gyroscope(data) => self.gyro = data,
            Sample::Magnetometer(data) => self.mag = data,
            Sample::Barometer(data) => self.baro = data,
            Sample::Pedometer(data) => {
                if data.steps >= self.steps.steps {
                    self.steps = data;
                }
            }
            Sample::Light(data) => self.light = data,
        }
    }

    pub fn reset(&mut self, kind: SensorKind) {
        match kind {
            SensorKind::Gps => self.gps = GpsData::default(),
            SensorKind::Accelerometer => self.accel = AxisData::default(),
            SensorKind::Gyroscope => self.gyro = AxisData::default(),
            SensorKind::Magnetometer => self.mag = AxisData::default(),
            SensorKind::Barometer => self.baro = BaroData::default(),
            SensorKind::Pedometer => self.steps = StepData::default(),
            SensorKind::Light => self.light = LightData::default(),
        }
    }
}

/// Vector in the North-East-Down frame
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Ned {
    pub north: f64,
    pub east: f64,
    pub down: f64,
}

impl Ned {
    pub fn new(north: f64, east: f64, down: f64) -> Self {
        Self { north, east, down }
    }

    pub fn is_finite(&self) -> bool {
        self.north.is_finite() && self.east.is_finite() && self.down.is_finite()
    }
}

/// Euler attitude in radians (3-2-1 sequence)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Attitude {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    pub fn is_finite(&self) -> bool {
        self.roll.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_state_mask_helpers() {
        let mask = SensorState::from_kinds(&[SensorKind::Light, SensorKind::Gps]);
        let enabled: Vec<_> = mask.enabled().collect();
        // Canonical order, not insertion order
        assert_eq!(enabled, vec![SensorKind::Gps, SensorKind::Light]);
        assert_eq!(mask.count(), 2);

        let allowed = SensorState::from_kinds(&[SensorKind::Gps]);
        assert_eq!(mask.not_in(&allowed), vec![SensorKind::Light]);
        assert_eq!(mask.intersect(&allowed), allowed);
    }

    #[test]
    fn test_sensor_state_json_keys() {
        let json = r#"{"gps":true,"light":true}"#;
        let state: SensorState = serde_json::from_str(json).unwrap();
        assert!(state.gps);
        assert!(state.light);
        assert!(!state.accelerometer);
    }

    #[test]
    fn test_step_count_is_monotonic() {
        let mut snapshot = SampleSnapshot::default();
        snapshot.store(Sample::Pedometer(StepData { timestamp: 1.0, steps: 12 }));
        snapshot.store(Sample::Pedometer(StepData { timestamp: 2.0, steps: 7 }));
        assert_eq!(snapshot.steps.steps, 12);

        snapshot.store(Sample::Pedometer(StepData { timestamp: 3.0, steps: 15 }));
        assert_eq!(snapshot.steps.steps, 15);
    }
}
