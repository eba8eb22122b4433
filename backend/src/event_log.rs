use crate::ring_buffer::RingBuffer;
use chrono::{DateTime, Local};
use mission_control_shared::{LogEntry, TelemetrySample};

pub const DEFAULT_LOG_CAP: usize = 100;

/// Operator-facing mission log, oldest entries dropped past the cap.
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: RingBuffer<LogEntry>,
}

impl EventLog {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: RingBuffer::new(cap),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Wall-clock time of day for log lines and exports.
pub fn clock_time(timestamp_ms: u64) -> String {
    DateTime::from_timestamp_millis(timestamp_ms as i64)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

/// `12:00:01 [WARNING] message`
pub fn format_line(entry: &LogEntry) -> String {
    format!(
        "{} [{}] {}",
        clock_time(entry.timestamp_ms),
        entry.level,
        entry.message
    )
}

/// One-line summary of a sample for the telemetry log.
pub fn summarize_sample(sample: &TelemetrySample) -> String {
    match (sample.latitude, sample.longitude, sample.altitude_meters) {
        (Some(lat), Some(lon), alt) => {
            let mut msg = format!("Pos: {lat:.4}°, {lon:.4}°");
            if let Some(alt) = alt {
                msg.push_str(&format!(", Alt: {alt:.0}m"));
            }
            msg
        }
        (_, _, Some(alt)) => {
            let mut msg = format!("Alt: {alt:.0}m");
            if let Some(vel) = sample.velocity {
                msg.push_str(&format!(", Vel: {vel:.1}m/s"));
            }
            msg
        }
        _ => "Telemetry data received".to_string(),
    }
}
