use crate::charts::ChartSet;
use crate::display::DisplayReadout;
use crate::event_log::clock_time;
use anyhow::bail;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use mission_control_shared::{
    ChartChannel, ChartPoint, LogEntry, MissionStatus, MissionSummary, StampedSample,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;

const MISSION_NAME: &str = "MISSION CONTROL GROUND STATION";
/// Trailing samples included with the primary readout.
pub const PRIMARY_RECENT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Primary,
    History,
    Charts,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Txt,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Txt => "txt",
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Txt => "text/plain; charset=utf-8",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

impl Export {
    fn new(stem: &str, format: ExportFormat, now_ms: u64, body: String) -> Self {
        let stamp = utc(now_ms)
            .format("%Y-%m-%dT%H-%M-%S")
            .to_string();
        Self {
            filename: format!("{stem}_{stamp}.{}", format.extension()),
            content_type: format.content_type(),
            body,
        }
    }
}

fn utc(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms as i64).unwrap_or_default()
}

fn local_display(ms: u64) -> String {
    utc(ms)
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn iso(ms: u64) -> String {
    utc(ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn mission_time(summary: &MissionSummary) -> String {
    match summary.status {
        MissionStatus::Active => format!("{:.1}s", summary.mission_time_s),
        MissionStatus::Standby => "0s".to_string(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn fixed(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_default()
}

fn or_dashes(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_else(|| "--".to_string())
}

/// Current readout, mission info and the last few samples.
pub struct PrimarySnapshot<'a> {
    pub readout: &'a DisplayReadout,
    pub summary: &'a MissionSummary,
    pub recent: &'a [StampedSample],
    pub now_ms: u64,
}

pub fn primary(snapshot: &PrimarySnapshot<'_>, format: ExportFormat) -> anyhow::Result<Export> {
    let body = match format {
        ExportFormat::Csv => primary_csv(snapshot),
        ExportFormat::Json => primary_json(snapshot)?,
        ExportFormat::Txt => primary_text(snapshot),
    };
    Ok(Export::new("primary_telemetry", format, snapshot.now_ms, body))
}

fn readout_groups(r: &DisplayReadout) -> [(&'static str, [(&'static str, &str); 4]); 4] {
    [
        (
            "Position Data",
            [
                ("Latitude", r.latitude.as_str()),
                ("Longitude", r.longitude.as_str()),
                ("Altitude", r.altitude.as_str()),
                ("Downrange", r.downrange.as_str()),
            ],
        ),
        (
            "Acceleration",
            [
                ("Accel X", r.accel_x.as_str()),
                ("Accel Y", r.accel_y.as_str()),
                ("Accel Z", r.accel_z.as_str()),
                ("Total Accel", r.total_accel.as_str()),
            ],
        ),
        (
            "Attitude",
            [
                ("Roll", r.roll.as_str()),
                ("Pitch", r.pitch.as_str()),
                ("Yaw", r.yaw.as_str()),
                ("Angular Rate", r.angular_rate.as_str()),
            ],
        ),
        (
            "System",
            [
                ("Ignition Status", r.ignition.as_str()),
                ("Comm Status", r.comm_status.as_str()),
                ("GPS Satellites", r.gps_sats.as_str()),
                ("Temperature", r.temperature.as_str()),
            ],
        ),
    ]
}

fn primary_csv(s: &PrimarySnapshot<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "PRIMARY TELEMETRY DATA - {MISSION_NAME}");
    let _ = writeln!(out, "Generated: {}", local_display(s.now_ms));
    out.push('\n');
    out.push_str("CATEGORY,PARAMETER,VALUE\n");
    for (category, fields) in readout_groups(s.readout) {
        for (name, value) in fields {
            let _ = writeln!(out, "{category},{name},{}", csv_field(value));
        }
    }

    out.push_str("\nMISSION INFORMATION\nParameter,Value\n");
    let _ = writeln!(out, "Mission Status,{}", s.summary.status.as_str());
    let _ = writeln!(out, "Packet Count,{}", s.summary.packet_count);
    let _ = writeln!(out, "Data Points,{}", s.summary.data_points);
    let _ = writeln!(out, "Mission Time,{}", mission_time(s.summary));

    if !s.recent.is_empty() {
        out.push_str("\n=== LATEST TELEMETRY DATA POINTS ===\n");
        out.push_str(
            "Timestamp,Latitude,Longitude,Altitude(m),Velocity(m/s),AccelX(G),AccelY(G),AccelZ(G),Temperature(°C)\n",
        );
        for stamped in s.recent {
            let d = &stamped.sample;
            let _ = writeln!(
                out,
                "{},{},{},{},{},{},{},{},{}",
                clock_time(stamped.received_at_ms),
                or_dashes(d.latitude, 6),
                or_dashes(d.longitude, 6),
                or_dashes(d.altitude_meters, 2),
                or_dashes(d.velocity, 2),
                or_dashes(d.accel_x, 3),
                or_dashes(d.accel_y, 3),
                or_dashes(d.accel_z, 3),
                or_dashes(d.temperature_celsius, 1),
            );
        }
    }
    out
}

fn primary_json(s: &PrimarySnapshot<'_>) -> anyhow::Result<String> {
    let r = s.readout;
    let recent: Vec<_> = s
        .recent
        .iter()
        .map(|stamped| {
            json!({
                "timestamp": clock_time(stamped.received_at_ms),
                "latitude": stamped.sample.latitude,
                "longitude": stamped.sample.longitude,
                "altitude": stamped.sample.altitude_meters,
                "velocity": stamped.sample.velocity,
            })
        })
        .collect();

    let doc = json!({
        "header": {
            "mission": MISSION_NAME,
            "timestamp": iso(s.now_ms),
            "generated": local_display(s.now_ms),
        },
        "telemetry": {
            "positionData": {
                "latitude": r.latitude,
                "longitude": r.longitude,
                "altitude": r.altitude,
                "downrange": r.downrange,
            },
            "accelerationVectors": {
                "accelX": r.accel_x,
                "accelY": r.accel_y,
                "accelZ": r.accel_z,
                "totalAccel": r.total_accel,
            },
            "attitudeOrientation": {
                "roll": r.roll,
                "pitch": r.pitch,
                "yaw": r.yaw,
                "angularRate": r.angular_rate,
            },
            "systemStatus": {
                "ignition": r.ignition,
                "commStatus": r.comm_status,
                "gpsSats": r.gps_sats,
                "temperature": r.temperature,
            },
        },
        "missionInfo": {
            "status": s.summary.status.as_str(),
            "packetCount": s.summary.packet_count,
            "dataPoints": s.summary.data_points,
            "missionTime": mission_time(s.summary),
        },
        "recentData": recent,
    });
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn primary_text(s: &PrimarySnapshot<'_>) -> String {
    let rule = "========================================";
    let mut out = String::new();
    let _ = writeln!(out, "{rule}\n  {MISSION_NAME}\n       PRIMARY TELEMETRY DATA\n{rule}\n");
    let _ = writeln!(out, "Generated: {}", local_display(s.now_ms));
    let _ = writeln!(out, "Mission Status: {}\n", s.summary.status.as_str());

    for (category, fields) in readout_groups(s.readout) {
        let title = category.to_uppercase();
        let _ = writeln!(out, "{title}\n{}", "─".repeat(title.chars().count()));
        for (name, value) in fields {
            let label = format!("{name}:");
            let _ = writeln!(out, "{label:<16}{value}");
        }
        out.push('\n');
    }

    let _ = writeln!(out, "MISSION INFORMATION\n{}", "─".repeat(19));
    let _ = writeln!(out, "{:<16}{}", "Packet Count:", s.summary.packet_count);
    let _ = writeln!(out, "{:<16}{}", "Data Points:", s.summary.data_points);
    let _ = writeln!(out, "{:<16}{}", "Mission Time:", mission_time(s.summary));
    out
}

const HISTORY_HEADER: &str = "Timestamp,Mission Time (s),Latitude,Longitude,Altitude (m),\
Velocity (m/s),Vertical Velocity (m/s),Horizontal Velocity (m/s),Accel X (G),Accel Y (G),\
Accel Z (G),Roll (°),Pitch (°),Yaw (°),Angular Rate (°/s),Temperature (°C),GPS Satellites,\
Ignition,Communication Status,Dynamic Pressure (Pa),Downrange (m),Pressure (hPa)";

/// Every retained sample, one row each. Absent fields are empty cells.
pub fn history<'a>(
    samples: impl Iterator<Item = &'a StampedSample>,
    format: ExportFormat,
    now_ms: u64,
) -> anyhow::Result<Export> {
    let body = match format {
        ExportFormat::Csv => history_csv(samples),
        ExportFormat::Json => serde_json::to_string_pretty(&samples.collect::<Vec<_>>())?,
        ExportFormat::Txt => bail!("history export supports csv or json"),
    };
    Ok(Export::new("mission_telemetry", format, now_ms, body))
}

fn history_csv<'a>(samples: impl Iterator<Item = &'a StampedSample>) -> String {
    let mut out = String::from(HISTORY_HEADER);
    out.push('\n');
    for stamped in samples {
        let d = &stamped.sample;
        let flag = |v: Option<bool>, yes: &str, no: &str| match v {
            Some(true) => yes.to_string(),
            Some(false) => no.to_string(),
            None => String::new(),
        };
        let row = [
            iso(stamped.received_at_ms),
            format!("{:.2}", stamped.mission_elapsed_seconds),
            fixed(d.latitude, 6),
            fixed(d.longitude, 6),
            fixed(d.altitude_meters, 2),
            fixed(d.velocity, 2),
            fixed(d.vertical_speed, 2),
            fixed(d.horizontal_speed, 2),
            fixed(d.accel_x, 3),
            fixed(d.accel_y, 3),
            fixed(d.accel_z, 3),
            fixed(d.roll, 2),
            fixed(d.pitch, 2),
            fixed(d.yaw, 2),
            fixed(d.angular_rate, 2),
            fixed(d.temperature_celsius, 2),
            d.satellite_count.map(|n| n.to_string()).unwrap_or_default(),
            flag(d.ignition_active, "YES", "NO"),
            flag(d.comm_link_ok, "OK", "FAIL"),
            fixed(d.dynamic_pressure, 2),
            fixed(d.downrange_meters, 2),
            fixed(d.pressure_hectopascals, 2),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Column layout of the charts export: (header, channel, take x instead of y, precision).
const CHART_COLUMNS: [(&str, ChartChannel, bool, usize); 12] = [
    ("Time (s)", ChartChannel::Altitude, true, 2),
    ("Altitude (m)", ChartChannel::Altitude, false, 2),
    ("Velocity (m/s)", ChartChannel::Velocity, false, 2),
    ("Pressure (hPa)", ChartChannel::Pressure, false, 2),
    ("Accel X (G)", ChartChannel::AccelX, false, 3),
    ("Accel Y (G)", ChartChannel::AccelY, false, 3),
    ("Accel Z (G)", ChartChannel::AccelZ, false, 3),
    ("Total Acceleration (G)", ChartChannel::TotalAccel, false, 3),
    ("Temperature (°C)", ChartChannel::Temperature, false, 2),
    ("Temperature Altitude (m)", ChartChannel::Temperature, true, 2),
    ("Downrange (km)", ChartChannel::Trajectory, true, 3),
    ("Trajectory Altitude (m)", ChartChannel::Trajectory, false, 2),
];

#[derive(Serialize)]
struct ChartsDoc<'a> {
    channel: ChartChannel,
    points: Vec<&'a ChartPoint>,
}

/// Chart series side by side, row `i` holding the `i`-th retained point of
/// each channel.
pub fn charts(set: &ChartSet, format: ExportFormat, now_ms: u64) -> anyhow::Result<Export> {
    let body = match format {
        ExportFormat::Csv => charts_csv(set),
        ExportFormat::Json => {
            let doc: Vec<ChartsDoc<'_>> = ChartChannel::ALL
                .iter()
                .map(|&channel| ChartsDoc {
                    channel,
                    points: set.series(channel).iter().collect(),
                })
                .collect();
            serde_json::to_string_pretty(&doc)?
        }
        ExportFormat::Txt => bail!("charts export supports csv or json"),
    };
    Ok(Export::new("mission_graphs_data", format, now_ms, body))
}

fn charts_csv(set: &ChartSet) -> String {
    let header: Vec<&str> = CHART_COLUMNS.iter().map(|(h, ..)| *h).collect();
    let mut out = header.join(",");
    out.push('\n');

    let rows = ChartChannel::ALL
        .iter()
        .map(|&ch| set.series(ch).len())
        .max()
        .unwrap_or(0);
    for i in 0..rows {
        let cells: Vec<String> = CHART_COLUMNS
            .iter()
            .map(|&(_, channel, take_x, precision)| {
                let point = set.series(channel).get(i);
                fixed(point.map(|p| if take_x { p.x } else { p.y }), precision)
            })
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

pub fn log<'a>(
    entries: impl Iterator<Item = &'a LogEntry>,
    format: ExportFormat,
    now_ms: u64,
) -> anyhow::Result<Export> {
    let body = match format {
        ExportFormat::Csv => {
            let mut out = String::from("Time,Message\n");
            for entry in entries {
                let message = format!("[{}] {}", entry.level, entry.message);
                let _ = writeln!(
                    out,
                    "{},{}",
                    clock_time(entry.timestamp_ms),
                    csv_field(&message)
                );
            }
            out
        }
        ExportFormat::Json => serde_json::to_string_pretty(&entries.collect::<Vec<_>>())?,
        ExportFormat::Txt => bail!("log export supports csv or json"),
    };
    Ok(Export::new("mission_log", format, now_ms, body))
}
