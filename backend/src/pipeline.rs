use crate::charts::{ChartSet, ChartView};
use crate::consumers::Consumers;
use crate::error::IngestError;
use crate::event_log::summarize_sample;
use crate::link::LinkFlags;
use crate::mission::MissionState;
use mission_control_shared::{
    ChartChannel, LogEntry, LogLevel, MissionSummary, StampedSample, TelemetrySample,
};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

pub const DEFAULT_HISTORY_CAP: usize = 1024;

/// Wall clock in milliseconds.
pub trait Clock: Send {
    fn now_ms(&self) -> u64;
}

impl<F> Clock for F
where
    F: Fn() -> u64 + Send,
{
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// Input to `ingest`, before decoding.
#[derive(Debug, Clone)]
pub enum RawTelemetry {
    Text(String),
    Json(Value),
    Sample(TelemetrySample),
}

impl From<String> for RawTelemetry {
    fn from(text: String) -> Self {
        RawTelemetry::Text(text)
    }
}

impl From<&str> for RawTelemetry {
    fn from(text: &str) -> Self {
        RawTelemetry::Text(text.to_string())
    }
}

impl From<Value> for RawTelemetry {
    fn from(value: Value) -> Self {
        RawTelemetry::Json(value)
    }
}

impl From<TelemetrySample> for RawTelemetry {
    fn from(sample: TelemetrySample) -> Self {
        RawTelemetry::Sample(sample)
    }
}

impl RawTelemetry {
    pub fn decode(self) -> Result<TelemetrySample, IngestError> {
        let value = match self {
            RawTelemetry::Sample(sample) => return Ok(sample),
            RawTelemetry::Text(text) => serde_json::from_str::<Value>(&text)?,
            RawTelemetry::Json(value) => value,
        };
        if !value.is_object() {
            return Err(IngestError::NotARecord {
                found: json_kind(&value),
            });
        }
        Ok(serde_json::from_value(value)?)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Which link flags must be up before samples are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatePolicy {
    pub require_connected: bool,
    pub require_link: bool,
}

impl GatePolicy {
    pub fn check(&self, flags: LinkFlags) -> Result<(), IngestError> {
        if self.require_connected && !flags.connected {
            return Err(IngestError::GateClosed {
                missing: "system not connected",
            });
        }
        if self.require_link && !flags.link_established {
            return Err(IngestError::GateClosed {
                missing: "link not established",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub history_cap: usize,
    pub gate: GatePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            gate: GatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub seq: u64,
    pub mission_started: bool,
    pub touched: Vec<ChartChannel>,
}

/// Owns the mission state and chart series; the only thing allowed to
/// mutate them.
///
/// Each call runs to completion. Consumers are notified synchronously, in the
/// order display, chart, map, log, and a failing consumer is reported without
/// stopping the others.
pub struct TelemetryPipeline {
    mission: MissionState,
    charts: ChartSet,
    gate: GatePolicy,
    link: LinkFlags,
    consumers: Consumers,
    clock: Box<dyn Clock>,
}

impl TelemetryPipeline {
    pub fn new(config: PipelineConfig, consumers: Consumers, clock: Box<dyn Clock>) -> Self {
        Self {
            mission: MissionState::new(config.history_cap),
            charts: ChartSet::new(),
            gate: config.gate,
            link: LinkFlags::default(),
            consumers,
            clock,
        }
    }

    pub fn ingest(&mut self, raw: impl Into<RawTelemetry>) -> Result<IngestOutcome, IngestError> {
        if let Err(e) = self.gate.check(self.link) {
            self.report(LogLevel::Warning, format!("Telemetry rejected: {e}"));
            return Err(e);
        }

        let sample = match raw.into().decode() {
            Ok(sample) => sample,
            Err(e) => {
                self.report(
                    LogLevel::Error,
                    format!("Invalid telemetry data format received: {e}"),
                );
                return Err(e);
            }
        };

        let now_ms = self.clock.now_ms();
        let mission_started = self.mission.start_if_valid(&sample, now_ms);
        if mission_started {
            self.report(LogLevel::Info, "Mission started - receiving telemetry data");
        }

        let stamped = self.mission.stamp(sample, now_ms);
        self.mission.record(stamped.clone());
        let touched = self.charts.append(&stamped);

        self.notify(&stamped, &touched);

        Ok(IngestOutcome {
            seq: stamped.seq,
            mission_started,
            touched,
        })
    }

    /// Back to STANDBY with empty history and charts. Link flags and the
    /// gate policy are left alone.
    pub fn reset_mission(&mut self) {
        self.mission.reset();
        self.charts.clear();

        let mut failures = Vec::new();
        if let Some(display) = self.consumers.display.as_mut() {
            failures.extend(isolate("display", || display.on_reset()).err());
        }
        if let Some(chart) = self.consumers.chart.as_mut() {
            failures.extend(isolate("chart", || chart.on_reset()).err());
        }
        if let Some(map) = self.consumers.map.as_mut() {
            failures.extend(isolate("map", || map.on_reset()).err());
        }
        for failure in failures {
            self.report(LogLevel::Error, failure);
        }

        self.report(
            LogLevel::Info,
            "Mission reset completed. Ready for new data.",
        );
    }

    /// Sends an operator-facing line to the log consumer and mirrors it to
    /// the process log.
    pub fn report(&mut self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.deliver_log(level, message);
    }

    fn deliver_log(&mut self, level: LogLevel, message: String) {
        let entry = LogEntry {
            timestamp_ms: self.clock.now_ms(),
            level,
            message,
        };
        if let Some(log) = self.consumers.log.as_mut()
            && let Err(failure) = isolate("log", || log.on_log(&entry))
        {
            tracing::error!("{failure}");
        }
    }

    fn notify(&mut self, stamped: &StampedSample, touched: &[ChartChannel]) {
        let mut failures = Vec::new();

        if let Some(display) = self.consumers.display.as_mut() {
            failures.extend(isolate("display", || display.on_sample(stamped)).err());
        }
        if let Some(chart) = self.consumers.chart.as_mut() {
            let view = ChartView {
                charts: &self.charts,
                touched,
            };
            failures.extend(isolate("chart", || chart.on_charts(view)).err());
        }
        if let (Some(map), Some(fix)) = (self.consumers.map.as_mut(), stamped.sample.map_fix()) {
            failures.extend(isolate("map", || map.on_fix(fix)).err());
        }

        for failure in failures {
            self.report(LogLevel::Error, failure);
        }

        let line = summarize_sample(&stamped.sample);
        tracing::debug!(seq = stamped.seq, "{line}");
        self.deliver_log(LogLevel::Info, line);
    }

    pub fn set_link_flags(&mut self, flags: LinkFlags) {
        self.link = flags;
    }

    pub fn link_flags(&self) -> LinkFlags {
        self.link
    }

    pub fn gate(&self) -> GatePolicy {
        self.gate
    }

    pub fn mission(&self) -> &MissionState {
        &self.mission
    }

    pub fn charts(&self) -> &ChartSet {
        &self.charts
    }

    pub fn summary(&self) -> MissionSummary {
        self.mission.summary(self.clock.now_ms())
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Runs one consumer call, turning an error or a panic into a report line.
fn isolate(consumer: &str, call: impl FnOnce() -> anyhow::Result<()>) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{consumer} consumer failed: {e:#}")),
        Err(payload) => Err(format!(
            "{consumer} consumer panicked: {}",
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::{ChartConsumer, DisplayConsumer, LogConsumer, MapConsumer};
    use mission_control_shared::MapFix;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Display(u64),
        Charts(Vec<ChartChannel>),
        Map(MapFix),
        Log(LogLevel, String),
        Reset(&'static str),
    }

    type Events = Arc<Mutex<Vec<Event>>>;

    #[derive(Clone)]
    struct Recorder(Events);

    impl Recorder {
        fn push(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl DisplayConsumer for Recorder {
        fn on_sample(&mut self, sample: &StampedSample) -> anyhow::Result<()> {
            self.push(Event::Display(sample.seq));
            Ok(())
        }
        fn on_reset(&mut self) -> anyhow::Result<()> {
            self.push(Event::Reset("display"));
            Ok(())
        }
    }

    impl ChartConsumer for Recorder {
        fn on_charts(&mut self, view: ChartView<'_>) -> anyhow::Result<()> {
            self.push(Event::Charts(view.touched.to_vec()));
            Ok(())
        }
        fn on_reset(&mut self) -> anyhow::Result<()> {
            self.push(Event::Reset("chart"));
            Ok(())
        }
    }

    impl MapConsumer for Recorder {
        fn on_fix(&mut self, fix: MapFix) -> anyhow::Result<()> {
            self.push(Event::Map(fix));
            Ok(())
        }
        fn on_reset(&mut self) -> anyhow::Result<()> {
            self.push(Event::Reset("map"));
            Ok(())
        }
    }

    impl LogConsumer for Recorder {
        fn on_log(&mut self, entry: &LogEntry) -> anyhow::Result<()> {
            self.push(Event::Log(entry.level, entry.message.clone()));
            Ok(())
        }
    }

    struct FailingDisplay;

    impl DisplayConsumer for FailingDisplay {
        fn on_sample(&mut self, _: &StampedSample) -> anyhow::Result<()> {
            anyhow::bail!("screen unplugged")
        }
    }

    struct PanickingChart;

    impl ChartConsumer for PanickingChart {
        fn on_charts(&mut self, _: ChartView<'_>) -> anyhow::Result<()> {
            panic!("chart widget exploded")
        }
    }

    struct Harness {
        pipeline: TelemetryPipeline,
        events: Events,
        clock: Arc<AtomicU64>,
    }

    impl Harness {
        fn new(config: PipelineConfig) -> Self {
            let events: Events = Arc::default();
            let recorder = Recorder(events.clone());
            let consumers = Consumers::default()
                .with_display(recorder.clone())
                .with_chart(recorder.clone())
                .with_map(recorder.clone())
                .with_log(recorder);
            Self::with_consumers(config, consumers, events)
        }

        fn with_consumers(config: PipelineConfig, consumers: Consumers, events: Events) -> Self {
            let clock = Arc::new(AtomicU64::new(1_000));
            let tick = clock.clone();
            let pipeline = TelemetryPipeline::new(
                config,
                consumers,
                Box::new(move || tick.load(Ordering::Relaxed)),
            );
            Self {
                pipeline,
                events,
                clock,
            }
        }

        fn advance(&self, ms: u64) {
            self.clock.fetch_add(ms, Ordering::Relaxed);
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn logs(&self, level: LogLevel) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    Event::Log(l, msg) if l == level => Some(msg),
                    _ => None,
                })
                .collect()
        }

        fn history_altitudes(&self) -> Vec<f64> {
            self.pipeline
                .mission()
                .history()
                .iter()
                .filter_map(|s| s.sample.altitude_meters)
                .collect()
        }
    }

    fn cap(history_cap: usize) -> PipelineConfig {
        PipelineConfig {
            history_cap,
            ..Default::default()
        }
    }

    #[test]
    fn history_keeps_most_recent_cap_samples() {
        let mut h = Harness::new(cap(3));
        for alt in [100, 200, 300, 400] {
            h.pipeline
                .ingest(json!({ "altitudeMeters": alt }))
                .expect("accepted");
        }
        assert_eq!(h.history_altitudes(), vec![200.0, 300.0, 400.0]);
        assert_eq!(h.pipeline.mission().packet_count(), 4);
    }

    #[test]
    fn history_length_is_min_of_calls_and_cap() {
        for n in [0usize, 1, 5, 10, 25] {
            let mut h = Harness::new(cap(10));
            for i in 0..n {
                h.pipeline
                    .ingest(TelemetrySample {
                        altitude_meters: Some(i as f64),
                        ..Default::default()
                    })
                    .expect("accepted");
            }
            assert_eq!(h.pipeline.mission().history().len(), n.min(10));
            let expected: Vec<f64> = (n.saturating_sub(10)..n).map(|i| i as f64).collect();
            assert_eq!(h.history_altitudes(), expected);
        }
    }

    #[test]
    fn mission_start_is_one_shot() {
        let mut h = Harness::new(PipelineConfig::default());
        let first = h.pipeline.ingest(r#"{"latitude": 18.7}"#).expect("accepted");
        assert!(first.mission_started);
        let started = h.pipeline.mission().started_at_ms();
        assert_eq!(started, Some(1_000));

        h.advance(2_500);
        let second = h.pipeline.ingest(r#"{"altitude": 50}"#).expect("accepted");
        assert!(!second.mission_started);
        h.pipeline.ingest("{}").expect("accepted");
        assert_eq!(h.pipeline.mission().started_at_ms(), started);

        let last = h.pipeline.mission().history().latest().cloned().unwrap();
        assert_eq!(last.mission_elapsed_seconds, 2.5);
        assert_eq!(
            h.logs(LogLevel::Info)
                .iter()
                .filter(|m| m.starts_with("Mission started"))
                .count(),
            1
        );
    }

    #[test]
    fn empty_record_never_starts_mission() {
        let mut h = Harness::new(PipelineConfig::default());
        h.pipeline.ingest("{}").expect("accepted");
        h.advance(1_000);
        h.pipeline
            .ingest(json!({ "roll": 1.0, "temperatureCelsius": 20.0 }))
            .expect("accepted");

        assert!(!h.pipeline.mission().is_active());
        assert_eq!(h.pipeline.mission().packet_count(), 2);
        let stamped = h.pipeline.mission().history().latest().cloned().unwrap();
        assert_eq!(stamped.mission_elapsed_seconds, 0.0);
        assert!(
            h.logs(LogLevel::Info)
                .iter()
                .all(|m| !m.starts_with("Mission started"))
        );
    }

    #[test]
    fn malformed_input_is_reported_without_mutation() {
        let mut h = Harness::new(PipelineConfig::default());
        assert!(matches!(
            h.pipeline.ingest("not json at all"),
            Err(IngestError::Decode(_))
        ));
        assert!(matches!(
            h.pipeline.ingest(json!([1, 2, 3])),
            Err(IngestError::NotARecord { found: "an array" })
        ));
        assert!(matches!(
            h.pipeline.ingest(r#""altitude""#),
            Err(IngestError::NotARecord { found: "a string" })
        ));
        assert!(matches!(
            h.pipeline.ingest(json!({ "altitude": "high" })),
            Err(IngestError::Decode(_))
        ));

        assert_eq!(h.pipeline.mission().packet_count(), 0);
        assert!(h.pipeline.mission().history().is_empty());
        assert!(h.pipeline.charts().is_empty());
        assert_eq!(h.logs(LogLevel::Error).len(), 4);
        assert!(
            h.events()
                .iter()
                .all(|e| matches!(e, Event::Log(LogLevel::Error, _)))
        );
    }

    #[test]
    fn closed_link_gate_rejects_with_one_warning() {
        let mut h = Harness::new(PipelineConfig {
            gate: GatePolicy {
                require_connected: false,
                require_link: true,
            },
            ..Default::default()
        });
        h.pipeline.set_link_flags(LinkFlags {
            connected: true,
            link_established: false,
        });

        let full = json!({
            "latitude": 18.73, "longitude": 73.46, "altitudeMeters": 1500.0,
            "verticalSpeed": 40.0, "accelX": 0.1, "accelY": 0.0, "accelZ": 2.5,
            "commLinkOk": false
        });
        let err = h.pipeline.ingest(full.clone()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::GateClosed {
                missing: "link not established"
            }
        ));
        assert!(h.pipeline.mission().history().is_empty());
        assert_eq!(h.pipeline.mission().packet_count(), 0);
        assert_eq!(h.events().len(), 1);
        assert_eq!(h.logs(LogLevel::Warning).len(), 1);

        h.pipeline.set_link_flags(LinkFlags {
            connected: true,
            link_established: true,
        });
        h.pipeline.ingest(full).expect("accepted once link is up");
        assert_eq!(h.pipeline.mission().packet_count(), 1);
    }

    #[test]
    fn connected_gate_checked_first() {
        let mut h = Harness::new(PipelineConfig {
            gate: GatePolicy {
                require_connected: true,
                require_link: true,
            },
            ..Default::default()
        });
        assert!(matches!(
            h.pipeline.ingest("{}"),
            Err(IngestError::GateClosed {
                missing: "system not connected"
            })
        ));
    }

    #[test]
    fn consumers_run_in_fixed_order() {
        let mut h = Harness::new(PipelineConfig::default());
        h.pipeline
            .ingest(json!({ "latitude": 1.0, "longitude": 2.0, "altitude": 3.0 }))
            .expect("accepted");
        assert_eq!(
            h.events(),
            vec![
                Event::Log(
                    LogLevel::Info,
                    "Mission started - receiving telemetry data".into()
                ),
                Event::Display(1),
                Event::Charts(vec![ChartChannel::Altitude]),
                Event::Map(MapFix {
                    lat: 1.0,
                    lng: 2.0,
                    altitude: Some(3.0)
                }),
                Event::Log(LogLevel::Info, "Pos: 1.0000°, 2.0000°, Alt: 3m".into()),
            ]
        );
    }

    #[test]
    fn map_consumer_skipped_without_both_coordinates() {
        let mut h = Harness::new(PipelineConfig::default());
        h.pipeline.ingest(json!({ "latitude": 1.0 })).expect("accepted");
        assert!(!h.events().iter().any(|e| matches!(e, Event::Map(_))));
    }

    #[test]
    fn failing_consumers_do_not_stop_the_others() {
        let events: Events = Arc::default();
        let recorder = Recorder(events.clone());
        let consumers = Consumers::default()
            .with_display(FailingDisplay)
            .with_chart(PanickingChart)
            .with_map(recorder.clone())
            .with_log(recorder);
        let mut h = Harness::with_consumers(PipelineConfig::default(), consumers, events);

        let outcome = h
            .pipeline
            .ingest(json!({ "latitude": 1.0, "longitude": 2.0, "altitude": 3.0 }))
            .expect("consumer failures do not fail ingest");
        assert_eq!(outcome.seq, 1);
        assert_eq!(h.pipeline.mission().history().len(), 1);
        assert_eq!(h.pipeline.mission().packet_count(), 1);
        assert!(h.events().iter().any(|e| matches!(e, Event::Map(_))));

        let errors = h.logs(LogLevel::Error);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("display consumer failed: screen unplugged"));
        assert!(errors[1].contains("chart consumer panicked: chart widget exploded"));

        h.pipeline.ingest(json!({ "altitude": 4.0 })).expect("still usable");
        assert_eq!(h.pipeline.mission().packet_count(), 2);
    }

    #[test]
    fn reset_is_idempotent_and_keeps_link_flags() {
        let mut h = Harness::new(cap(5));
        let flags = LinkFlags {
            connected: true,
            link_established: true,
        };
        h.pipeline.set_link_flags(flags);
        for alt in [1.0, 2.0, 3.0] {
            h.pipeline
                .ingest(json!({ "altitude": alt, "temperature": 20.0 }))
                .expect("accepted");
        }

        h.pipeline.reset_mission();
        let once = (
            h.pipeline.mission().is_active(),
            h.pipeline.mission().started_at_ms(),
            h.pipeline.mission().packet_count(),
            h.pipeline.mission().history().len(),
            h.pipeline.charts().is_empty(),
        );
        h.pipeline.reset_mission();
        let twice = (
            h.pipeline.mission().is_active(),
            h.pipeline.mission().started_at_ms(),
            h.pipeline.mission().packet_count(),
            h.pipeline.mission().history().len(),
            h.pipeline.charts().is_empty(),
        );
        assert_eq!(once, (false, None, 0, 0, true));
        assert_eq!(once, twice);
        assert_eq!(h.pipeline.link_flags(), flags);

        let resets: Vec<_> = h
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Reset(_)))
            .collect();
        assert_eq!(
            resets,
            vec![
                Event::Reset("display"),
                Event::Reset("chart"),
                Event::Reset("map"),
                Event::Reset("display"),
                Event::Reset("chart"),
                Event::Reset("map"),
            ]
        );

        let next = h.pipeline.ingest(json!({ "altitude": 9.0 })).expect("accepted");
        assert!(next.mission_started);
        assert_eq!(next.seq, 1);
    }

    #[test]
    fn packet_count_ignores_rejected_calls() {
        let mut h = Harness::new(PipelineConfig::default());
        h.pipeline.ingest(json!({ "altitude": 1.0 })).expect("accepted");
        let _ = h.pipeline.ingest("{broken");
        h.pipeline.ingest(json!({})).expect("accepted");
        let _ = h.pipeline.ingest(json!(42));
        assert_eq!(h.pipeline.mission().packet_count(), 2);
        let seqs: Vec<u64> = h
            .pipeline
            .mission()
            .history()
            .iter()
            .map(|s| s.seq)
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }
}
