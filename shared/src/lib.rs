use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// One telemetry reading as it arrives from the vehicle bridge.
///
/// Every field is optional: sources send whatever subset they have. Wire keys
/// are camelCase; the keys used by the original dashboard feed are accepted
/// as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    // kinematic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(alias = "altitude", skip_serializing_if = "Option::is_none")]
    pub altitude_meters: Option<f64>,
    #[serde(alias = "downrange", skip_serializing_if = "Option::is_none")]
    pub downrange_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(alias = "verticalVelocity", skip_serializing_if = "Option::is_none")]
    pub vertical_speed: Option<f64>,
    #[serde(alias = "horizontalVelocity", skip_serializing_if = "Option::is_none")]
    pub horizontal_speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_pressure: Option<f64>,

    // inertial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accel_z: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub angular_rate: Option<f64>,

    // environmental
    #[serde(alias = "temperature", skip_serializing_if = "Option::is_none")]
    pub temperature_celsius: Option<f64>,
    #[serde(alias = "pressure", skip_serializing_if = "Option::is_none")]
    pub pressure_hectopascals: Option<f64>,

    // status flags
    #[serde(
        default,
        alias = "ignition",
        deserialize_with = "flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub ignition_active: Option<bool>,
    #[serde(
        default,
        alias = "commStatus",
        deserialize_with = "flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub comm_link_ok: Option<bool>,
    #[serde(alias = "gpsSats", skip_serializing_if = "Option::is_none")]
    pub satellite_count: Option<u32>,
}

/// Accepts `true`/`false` as well as the `1`/`0` some bridges send.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(f64),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|f| match f {
        Flag::Bool(b) => b,
        Flag::Number(n) => n != 0.0,
    }))
}

impl TelemetrySample {
    /// A sample counts toward mission start only if it carries altitude, a
    /// velocity-like field, or a coordinate.
    pub fn is_valid(&self) -> bool {
        self.altitude_meters.is_some()
            || self.velocity.is_some()
            || self.vertical_speed.is_some()
            || self.horizontal_speed.is_some()
            || self.latitude.is_some()
            || self.longitude.is_some()
    }

    pub fn total_accel(&self) -> Option<f64> {
        match (self.accel_x, self.accel_y, self.accel_z) {
            (Some(x), Some(y), Some(z)) => Some((x * x + y * y + z * z).sqrt()),
            _ => None,
        }
    }

    pub fn map_fix(&self) -> Option<MapFix> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some(MapFix {
                lat,
                lng,
                altitude: self.altitude_meters,
            }),
            _ => None,
        }
    }
}

/// A sample after the pipeline accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampedSample {
    /// Packet number within the current mission, starting at 1.
    pub seq: u64,
    pub received_at_ms: u64,
    pub mission_elapsed_seconds: f64,
    #[serde(flatten)]
    pub sample: TelemetrySample,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapFix {
    pub lat: f64,
    pub lng: f64,
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartChannel {
    Altitude,
    Velocity,
    AccelX,
    AccelY,
    AccelZ,
    TotalAccel,
    Pressure,
    Temperature,
    Trajectory,
}

impl ChartChannel {
    pub const ALL: [ChartChannel; 9] = [
        ChartChannel::Altitude,
        ChartChannel::Velocity,
        ChartChannel::AccelX,
        ChartChannel::AccelY,
        ChartChannel::AccelZ,
        ChartChannel::TotalAccel,
        ChartChannel::Pressure,
        ChartChannel::Temperature,
        ChartChannel::Trajectory,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartChannel::Altitude => "altitude",
            ChartChannel::Velocity => "velocity",
            ChartChannel::AccelX => "accel_x",
            ChartChannel::AccelY => "accel_y",
            ChartChannel::AccelZ => "accel_z",
            ChartChannel::TotalAccel => "total_accel",
            ChartChannel::Pressure => "pressure",
            ChartChannel::Temperature => "temperature",
            ChartChannel::Trajectory => "trajectory",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionStatus {
    Standby,
    Active,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Standby => "STANDBY",
            MissionStatus::Active => "ACTIVE",
        }
    }
}

/// Read-only view derived from mission history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub status: MissionStatus,
    pub started_at_ms: Option<u64>,
    pub packet_count: u64,
    pub data_points: usize,
    pub mission_time_s: f64,
    pub max_altitude_m: Option<f64>,
    pub current_altitude_m: Option<f64>,
    pub ignition_mission_time_s: Option<f64>,
    pub descent_altitude_m: Option<f64>,
    pub packet_rate_hz: f64,
}

/// Operator commands, from the HTTP API or the WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionCommand {
    Connect,
    Disconnect,
    ResetMission,
    /// Empty the operator event log.
    ClearLog,
    StartSimulation,
    StopSimulation,
    /// Feed one randomized sample through ingestion.
    SimulateSample,
    ArmIgnition,
    StartCountdown,
    AbortCountdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_dashboard_keys_are_accepted() {
        let raw = r#"{
            "altitude": 1200.5,
            "verticalVelocity": 25.0,
            "temperature": 21.5,
            "pressure": 870.0,
            "ignition": 1,
            "commStatus": true,
            "gpsSats": 12
        }"#;
        let sample: TelemetrySample = serde_json::from_str(raw).expect("decode");
        assert_eq!(sample.altitude_meters, Some(1200.5));
        assert_eq!(sample.vertical_speed, Some(25.0));
        assert_eq!(sample.temperature_celsius, Some(21.5));
        assert_eq!(sample.pressure_hectopascals, Some(870.0));
        assert_eq!(sample.ignition_active, Some(true));
        assert_eq!(sample.comm_link_ok, Some(true));
        assert_eq!(sample.satellite_count, Some(12));
    }

    #[test]
    fn numeric_flags_and_missing_fields() {
        let sample: TelemetrySample =
            serde_json::from_str(r#"{"ignitionActive": 0, "roll": -1.5}"#).expect("decode");
        assert_eq!(sample.ignition_active, Some(false));
        assert_eq!(sample.comm_link_ok, None);
        assert_eq!(sample.roll, Some(-1.5));
        assert!(!sample.is_valid());
    }

    #[test]
    fn validity_needs_position_or_motion() {
        assert!(!TelemetrySample::default().is_valid());
        let with_speed = TelemetrySample {
            horizontal_speed: Some(3.0),
            ..Default::default()
        };
        assert!(with_speed.is_valid());
        let with_lon = TelemetrySample {
            longitude: Some(73.46),
            ..Default::default()
        };
        assert!(with_lon.is_valid());
    }

    #[test]
    fn total_accel_requires_all_axes() {
        let mut sample = TelemetrySample {
            accel_x: Some(3.0),
            accel_y: Some(4.0),
            ..Default::default()
        };
        assert_eq!(sample.total_accel(), None);
        sample.accel_z = Some(0.0);
        assert_eq!(sample.total_accel(), Some(5.0));
    }

    #[test]
    fn stamped_sample_flattens_fields() {
        let stamped = StampedSample {
            seq: 3,
            received_at_ms: 1_000,
            mission_elapsed_seconds: 1.5,
            sample: TelemetrySample {
                altitude_meters: Some(10.0),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&stamped).expect("encode");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["altitudeMeters"], 10.0);
        assert!(json.get("latitude").is_none());
    }
}
