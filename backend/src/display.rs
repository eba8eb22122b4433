use mission_control_shared::TelemetrySample;
use serde::Serialize;

/// Text rendering of the primary telemetry panel.
///
/// Rebuilt from every sample; a field the sample lacks shows `--` with its
/// unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayReadout {
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,
    pub downrange: String,
    pub velocity: String,
    pub accel_x: String,
    pub accel_y: String,
    pub accel_z: String,
    pub total_accel: String,
    pub roll: String,
    pub pitch: String,
    pub yaw: String,
    pub angular_rate: String,
    pub ignition: String,
    pub comm_status: String,
    pub gps_sats: String,
    pub temperature: String,
    pub pressure: String,
}

const NO_COORDINATE: &str = "--.--°";

impl Default for DisplayReadout {
    fn default() -> Self {
        Self {
            latitude: NO_COORDINATE.to_string(),
            longitude: NO_COORDINATE.to_string(),
            altitude: "-- m".to_string(),
            downrange: "-- km".to_string(),
            velocity: "-- m/s".to_string(),
            accel_x: "-- G".to_string(),
            accel_y: "-- G".to_string(),
            accel_z: "-- G".to_string(),
            total_accel: "-- G".to_string(),
            roll: "--°".to_string(),
            pitch: "--°".to_string(),
            yaw: "--°".to_string(),
            angular_rate: "--°/s".to_string(),
            ignition: "NOT IGNITED".to_string(),
            comm_status: "NO DATA".to_string(),
            gps_sats: "--".to_string(),
            temperature: "-- °C".to_string(),
            pressure: "-- hPa".to_string(),
        }
    }
}

impl DisplayReadout {
    /// Readout for a single sample. Fields the sample omits show their
    /// placeholder rather than an older reading.
    pub fn from_sample(s: &TelemetrySample) -> Self {
        let mut readout = Self::default();
        readout.latitude = format_coordinate(s.latitude, true);
        readout.longitude = format_coordinate(s.longitude, false);
        set(&mut readout.altitude, s.altitude_meters, |v| format!("{v:.0} m"));
        set(&mut readout.downrange, s.downrange_meters, |v| {
            format!("{:.1} km", v / 1000.0)
        });
        set(&mut readout.velocity, s.velocity, |v| format!("{v:.1} m/s"));
        set(&mut readout.accel_x, s.accel_x, |v| format!("{v:.2} G"));
        set(&mut readout.accel_y, s.accel_y, |v| format!("{v:.2} G"));
        set(&mut readout.accel_z, s.accel_z, |v| format!("{v:.2} G"));
        set(&mut readout.total_accel, s.total_accel(), |v| format!("{v:.2} G"));
        set(&mut readout.roll, s.roll, |v| format!("{v:.1}°"));
        set(&mut readout.pitch, s.pitch, |v| format!("{v:.1}°"));
        set(&mut readout.yaw, s.yaw, |v| format!("{v:.1}°"));
        set(&mut readout.angular_rate, s.angular_rate, |v| format!("{v:.1}°/s"));
        if s.ignition_active == Some(true) {
            readout.ignition = "IGNITED".to_string();
        }
        // no comm flag in the packet means the link did not vouch for it
        if s.comm_link_ok == Some(true) {
            readout.comm_status = "NOMINAL".to_string();
        }
        set(&mut readout.gps_sats, s.satellite_count, |v| v.to_string());
        set(&mut readout.temperature, s.temperature_celsius, |v| {
            format!("{v:.1} °C")
        });
        set(&mut readout.pressure, s.pressure_hectopascals, |v| {
            format!("{v:.1} hPa")
        });
        readout
    }
}

/// Starts from the placeholder already in `slot`.
fn set<T>(slot: &mut String, value: Option<T>, fmt: impl FnOnce(T) -> String) {
    if let Some(v) = value {
        *slot = fmt(v);
    }
}

/// Degrees and decimal minutes with hemisphere, e.g. `18°43.7460' N`.
pub fn format_coordinate(value: Option<f64>, is_latitude: bool) -> String {
    let Some(value) = value else {
        return NO_COORDINATE.to_string();
    };
    let abs = value.abs();
    let degrees = abs.floor();
    let minutes = (abs - degrees) * 60.0;
    let hemisphere = match (is_latitude, value >= 0.0) {
        (true, true) => 'N',
        (true, false) => 'S',
        (false, true) => 'E',
        (false, false) => 'W',
    };
    format!("{degrees:.0}°{minutes:.4}' {hemisphere}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_use_degrees_and_minutes() {
        assert_eq!(format_coordinate(Some(18.7291), true), "18°43.7460' N");
        assert_eq!(format_coordinate(Some(-73.5), false), "73°30.0000' W");
        assert_eq!(format_coordinate(None, true), "--.--°");
    }

    #[test]
    fn absent_fields_show_placeholders() {
        let readout = DisplayReadout::from_sample(&TelemetrySample {
            altitude_meters: Some(1234.56),
            downrange_meters: Some(5432.0),
            accel_x: Some(0.123),
            ..Default::default()
        });
        assert_eq!(readout.altitude, "1235 m");
        assert_eq!(readout.downrange, "5.4 km");
        assert_eq!(readout.accel_x, "0.12 G");
        assert_eq!(readout.accel_y, "-- G");
        assert_eq!(readout.total_accel, "-- G");
        assert_eq!(readout.roll, "--°");
        assert_eq!(readout.gps_sats, "--");
        assert_eq!(readout.temperature, "-- °C");
        assert_eq!(readout.comm_status, "NO DATA");
    }

    #[test]
    fn omitted_fields_fall_back_to_placeholders() {
        let first = DisplayReadout::from_sample(&TelemetrySample {
            latitude: Some(18.7),
            altitude_meters: Some(42.0),
            temperature_celsius: Some(21.26),
            ignition_active: Some(true),
            satellite_count: Some(9),
            comm_link_ok: Some(true),
            ..Default::default()
        });
        assert_eq!(first.latitude, "18°42.0000' N");
        assert_eq!(first.altitude, "42 m");
        assert_eq!(first.temperature, "21.3 °C");
        assert_eq!(first.ignition, "IGNITED");
        assert_eq!(first.gps_sats, "9");
        assert_eq!(first.comm_status, "NOMINAL");

        let next = DisplayReadout::from_sample(&TelemetrySample::default());
        assert_eq!(next, DisplayReadout::default());
        assert_eq!(next.altitude, "-- m");
        assert_eq!(next.latitude, "--.--°");
    }
}
