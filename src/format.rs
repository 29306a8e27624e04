//! Fixed-schema CSV rendering of buffered samples.
//!
//! Everything here is pure: the same timestamp, samples and mask always yield
//! the same line.

use crate::types::{SampleSnapshot, SensorKind, SensorState};
use chrono::{NaiveDateTime, Timelike};
use std::fmt::Write;

pub const START_MARKER: &str = "START";
pub const END_MARKER: &str = "END";

const LEADING_COLUMNS: [&str; 2] = ["Date", "Time"];
const TRAILING_COLUMN: &str = "SampleRate";

/// Header names contributed by one sensor
pub fn column_group(kind: SensorKind) -> &'static [&'static str] {
    match kind {
        SensorKind::Gps => &["Latitude", "Longitude", "Altitude", "Speed"],
        SensorKind::Accelerometer => &["AccX", "AccY", "AccZ"],
        SensorKind::Gyroscope => &["GyroX", "GyroY", "GyroZ"],
        SensorKind::Magnetometer => &["MagX", "MagY", "MagZ"],
        SensorKind::Barometer => &["Pressure"],
        SensorKind::Pedometer => &["Steps"],
        SensorKind::Light => &["Illuminance"],
    }
}

pub fn column_count(mask: &SensorState) -> usize {
    LEADING_COLUMNS.len()
        + mask
            .enabled()
            .map(|kind| column_group(kind).len())
            .sum::<usize>()
        + 1
}

/// `Date,Time[,<sensor columns>...],SampleRate`
pub fn header(mask: &SensorState) -> String {
    let mut columns: Vec<&str> = LEADING_COLUMNS.to_vec();
    for kind in mask.enabled() {
        columns.extend_from_slice(column_group(kind));
    }
    columns.push(TRAILING_COLUMN);
    columns.join(",")
}

pub fn start_marker(epoch_ms: i64) -> String {
    format!("{},{}", START_MARKER, epoch_ms)
}

pub fn end_marker(epoch_ms: i64) -> String {
    format!("{},{}", END_MARKER, epoch_ms)
}

/// Configured rate in Hz; not a measured one
pub fn sample_rate(interval_ms: u64) -> f64 {
    1000.0 / interval_ms as f64
}

/// `MM/dd/yyyy` date and `HH:mm:ss.ss` time, independent of locale
pub fn format_timestamp(timestamp: &NaiveDateTime) -> (String, String) {
    let date = timestamp.format("%m/%d/%Y").to_string();
    let hundredths = (timestamp.nanosecond() / 10_000_000).min(99);
    let time = format!("{}.{:02}", timestamp.format("%H:%M:%S"), hundredths);
    (date, time)
}

/// Render one data record matching [`header`] for the same mask.
pub fn format_record(
    timestamp: &NaiveDateTime,
    samples: &SampleSnapshot,
    mask: &SensorState,
    interval_ms: u64,
) -> String {
    let (date, time) = format_timestamp(timestamp);
    let mut line = format!("{},{}", date, time);

    for kind in mask.enabled() {
        match kind {
            SensorKind::Gps => {
                let gps = &samples.gps;
                push_fixed(&mut line, gps.latitude, 6);
                push_fixed(&mut line, gps.longitude, 6);
                push_fixed(&mut line, gps.altitude, 2);
                push_fixed(&mut line, gps.speed, 2);
            }
            SensorKind::Accelerometer => push_axes(&mut line, samples.accel.x, samples.accel.y, samples.accel.z),
            SensorKind::Gyroscope => push_axes(&mut line, samples.gyro.x, samples.gyro.y, samples.gyro.z),
            SensorKind::Magnetometer => push_axes(&mut line, samples.mag.x, samples.mag.y, samples.mag.z),
            SensorKind::Barometer => push_fixed(&mut line, samples.baro.pressure_hpa, 2),
            SensorKind::Pedometer => {
                let _ = write!(line, ",{}", samples.steps.steps);
            }
            SensorKind::Light => push_fixed(&mut line, samples.light.illuminance, 2),
        }
    }

    push_fixed(&mut line, sample_rate(interval_ms), 3);
    line
}

fn push_axes(line: &mut String, x: f64, y: f64, z: f64) {
    push_fixed(line, x, 2);
    push_fixed(line, y, 2);
    push_fixed(line, z, 2);
}

fn push_fixed(line: &mut String, value: f64, decimals: usize) {
    let _ = write!(line, ",{:.*}", decimals, round_half_up(value, decimals));
}

/// Round ties away from zero; `{:.N}` alone rounds exact ties to even.
fn round_half_up(value: f64, decimals: usize) -> f64 {
    // Avoid "-0.00" for a negative zero
    if value == 0.0 {
        return 0.0;
    }
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() {
        rounded
    } else {
        value
    }
}

/// Classification of one artifact line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogLine<'a> {
    Start(i64),
    End(i64),
    Header(&'a str),
    Record(&'a str),
    Blank,
}

pub fn classify(line: &str) -> LogLine<'_> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return LogLine::Blank;
    }
    if let Some(ts) = marker_timestamp(trimmed, START_MARKER) {
        return LogLine::Start(ts);
    }
    if let Some(ts) = marker_timestamp(trimmed, END_MARKER) {
        return LogLine::End(ts);
    }
    if trimmed.starts_with("Date,Time") {
        return LogLine::Header(trimmed);
    }
    LogLine::Record(trimmed)
}

fn marker_timestamp(line: &str, marker: &str) -> Option<i64> {
    let rest = line.strip_prefix(marker)?.strip_prefix(',')?;
    rest.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisData, BaroData, GpsData, LightData, StepData};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn samples() -> SampleSnapshot {
        SampleSnapshot {
            gps: GpsData {
                timestamp: 0.0,
                latitude: 37.774929,
                longitude: -122.419416,
                altitude: 15.456,
                speed: 3.1,
                heading: 90.0,
                accuracy: 4.0,
            },
            accel: AxisData::new(0.123, -9.806, 0.5, 0.0),
            gyro: AxisData::new(0.01, 0.02, -0.03, 0.0),
            mag: AxisData::new(22.5, 5.25, -41.0, 0.0),
            baro: BaroData { timestamp: 0.0, pressure_hpa: 1013.256 },
            steps: StepData { timestamp: 0.0, steps: 42 },
            light: LightData { timestamp: 0.0, illuminance: 320.0 },
        }
    }

    #[test]
    fn test_header_all_sensors() {
        assert_eq!(
            header(&SensorState::all()),
            "Date,Time,Latitude,Longitude,Altitude,Speed,AccX,AccY,AccZ,GyroX,GyroY,GyroZ,\
             MagX,MagY,MagZ,Pressure,Steps,Illuminance,SampleRate"
        );
    }

    #[test]
    fn test_header_no_sensors() {
        assert_eq!(header(&SensorState::none()), "Date,Time,SampleRate");
    }

    #[test]
    fn test_column_count_for_every_mask() {
        for bits in 0u32..128 {
            let mut mask = SensorState::none();
            for (i, kind) in SensorKind::ALL.iter().enumerate() {
                mask.set(*kind, bits & (1 << i) != 0);
            }
            let b = |v: bool| v as usize;
            let expected = 2
                + 3 * b(mask.accelerometer)
                + 3 * b(mask.gyroscope)
                + 3 * b(mask.magnetometer)
                + b(mask.barometer)
                + b(mask.pedometer)
                + b(mask.light)
                + 4 * b(mask.gps)
                + 1;
            assert_eq!(header(&mask).split(',').count(), expected);
            assert_eq!(column_count(&mask), expected);

            let record = format_record(&at(1, 2, 3, 0), &samples(), &mask, 200);
            assert_eq!(record.split(',').count(), expected, "mask {:07b}", bits);
        }
    }

    #[test]
    fn test_record_all_sensors_literal() {
        let line = format_record(&at(9, 5, 7, 456), &samples(), &SensorState::all(), 200);
        assert_eq!(
            line,
            "03/07/2024,09:05:07.45,37.774929,-122.419416,15.46,3.10,0.12,-9.81,0.50,\
             0.01,0.02,-0.03,22.50,5.25,-41.00,1013.26,42,320.00,5.000"
        );
    }

    #[test]
    fn test_record_subset_literal() {
        let mask = SensorState::from_kinds(&[SensorKind::Barometer, SensorKind::Accelerometer]);
        let line = format_record(&at(23, 59, 59, 990), &samples(), &mask, 300);
        assert_eq!(line, "03/07/2024,23:59:59.99,0.12,-9.81,0.50,1013.26,3.333");
    }

    #[test]
    fn test_unset_sensors_render_as_zero() {
        let mask = SensorState::from_kinds(&[SensorKind::Light, SensorKind::Pedometer]);
        let line = format_record(&at(0, 0, 0, 5), &SampleSnapshot::default(), &mask, 1000);
        assert_eq!(line, "03/07/2024,00:00:00.00,0,0.00,1.000");
    }

    #[test]
    fn test_exact_ties_round_away_from_zero() {
        let mut snapshot = SampleSnapshot::default();
        snapshot.accel = AxisData::new(0.125, 0.375, -0.125, 0.0);
        let mask = SensorState::from_kinds(&[SensorKind::Accelerometer]);
        let line = format_record(&at(0, 0, 0, 0), &snapshot, &mask, 1000);
        assert_eq!(line, "03/07/2024,00:00:00.00,0.13,0.38,-0.13,1.000");
    }

    #[test]
    fn test_sample_rate_tie_rounds_up() {
        let none = SensorState::none();
        let line = format_record(&at(0, 0, 0, 0), &SampleSnapshot::default(), &none, 16000);
        assert_eq!(line, "03/07/2024,00:00:00.00,0.063");
    }

    #[test]
    fn test_negative_zero_is_normalised() {
        let mut snapshot = SampleSnapshot::default();
        snapshot.accel = AxisData::new(-0.0, 0.0, 0.0, 0.0);
        let mask = SensorState::from_kinds(&[SensorKind::Accelerometer]);
        let line = format_record(&at(0, 0, 0, 0), &snapshot, &mask, 1000);
        assert_eq!(line, "03/07/2024,00:00:00.00,0.00,0.00,0.00,1.000");
    }

    #[test]
    fn test_classify_lines() {
        assert_eq!(classify("START,1700000000000"), LogLine::Start(1_700_000_000_000));
        assert_eq!(classify("END,1700000000001\n"), LogLine::End(1_700_000_000_001));
        assert_eq!(classify("Date,Time,SampleRate"), LogLine::Header("Date,Time,SampleRate"));
        assert_eq!(classify("   "), LogLine::Blank);
        assert_eq!(
            classify("03/07/2024,00:00:00.00,5.000"),
            LogLine::Record("03/07/2024,00:00:00.00,5.000")
        );
        // Malformed marker is just data
        assert_eq!(classify("END,abc"), LogLine::Record("END,abc"));
    }
}
