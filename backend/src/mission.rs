use crate::ring_buffer::RingBuffer;
use mission_control_shared::{MissionStatus, MissionSummary, StampedSample, TelemetrySample};

/// Mission lifecycle plus the bounded sample history.
///
/// `STANDBY --(first valid sample)--> ACTIVE --(reset)--> STANDBY`
#[derive(Debug, Clone)]
pub struct MissionState {
    active: bool,
    started_at_ms: Option<u64>,
    packet_count: u64,
    history: RingBuffer<StampedSample>,
}

impl MissionState {
    pub fn new(history_cap: usize) -> Self {
        Self {
            active: false,
            started_at_ms: None,
            packet_count: 0,
            history: RingBuffer::new(history_cap),
        }
    }

    /// Activates the mission on the first valid sample. Returns true only on
    /// the call that performed the transition.
    pub fn start_if_valid(&mut self, sample: &TelemetrySample, now_ms: u64) -> bool {
        if self.active || !sample.is_valid() {
            return false;
        }
        self.active = true;
        self.started_at_ms = Some(now_ms);
        true
    }

    /// Counts the packet and stamps it with arrival and mission time.
    pub fn stamp(&mut self, sample: TelemetrySample, now_ms: u64) -> StampedSample {
        self.packet_count += 1;
        StampedSample {
            seq: self.packet_count,
            received_at_ms: now_ms,
            mission_elapsed_seconds: self.elapsed_s(now_ms),
            sample,
        }
    }

    pub fn record(&mut self, stamped: StampedSample) {
        self.history.push(stamped);
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.started_at_ms = None;
        self.packet_count = 0;
        self.history.clear();
    }

    pub fn elapsed_s(&self, now_ms: u64) -> f64 {
        match (self.active, self.started_at_ms) {
            (true, Some(start)) => now_ms.saturating_sub(start) as f64 / 1000.0,
            _ => 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at_ms(&self) -> Option<u64> {
        self.started_at_ms
    }

    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    pub fn history(&self) -> &RingBuffer<StampedSample> {
        &self.history
    }

    pub fn status(&self) -> MissionStatus {
        if self.active {
            MissionStatus::Active
        } else {
            MissionStatus::Standby
        }
    }

    pub fn summary(&self, now_ms: u64) -> MissionSummary {
        let mut max_altitude_m: Option<f64> = None;
        let mut ignition_mission_time_s = None;
        let mut descent_altitude_m = None;

        for entry in self.history.iter() {
            let s = &entry.sample;
            if let Some(alt) = s.altitude_meters {
                max_altitude_m = Some(max_altitude_m.map_or(alt, |m| m.max(alt)));
                if s.vertical_speed.is_some_and(|v| v < 0.0) {
                    descent_altitude_m = Some(alt);
                }
            }
            if ignition_mission_time_s.is_none() && s.ignition_active == Some(true) {
                ignition_mission_time_s = Some(entry.mission_elapsed_seconds);
            }
        }

        let current_altitude_m = self
            .history
            .iter()
            .rev()
            .find_map(|e| e.sample.altitude_meters);

        MissionSummary {
            status: self.status(),
            started_at_ms: self.started_at_ms,
            packet_count: self.packet_count,
            data_points: self.history.len(),
            mission_time_s: self.elapsed_s(now_ms),
            max_altitude_m,
            current_altitude_m,
            ignition_mission_time_s,
            descent_altitude_m,
            packet_rate_hz: self.packet_rate_hz(),
        }
    }

    /// Samples per second across the retained history window.
    fn packet_rate_hz(&self) -> f64 {
        let (Some(first), Some(last)) = (self.history.iter().next(), self.history.latest()) else {
            return 0.0;
        };
        let span_ms = last.received_at_ms.saturating_sub(first.received_at_ms);
        if span_ms == 0 {
            return 0.0;
        }
        (self.history.len() - 1) as f64 * 1000.0 / span_ms as f64
    }
}
