use crate::charts::ChartView;
use crate::db::insert_alert;
use crate::display::DisplayReadout;
use crate::event_log::EventLog;
use crate::map::FlightTrack;
use crate::state::lock;
use crate::web::{ChartsMsg, SeriesMsg, WsOutMsg};
use mission_control_shared::{ChartChannel, LogEntry, LogLevel, MapFix, StampedSample};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

// ======================================================================
//  Capabilities the pipeline notifies after every accepted sample
// ======================================================================

pub trait DisplayConsumer: Send {
    fn on_sample(&mut self, sample: &StampedSample) -> anyhow::Result<()>;

    fn on_reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait ChartConsumer: Send {
    fn on_charts(&mut self, view: ChartView<'_>) -> anyhow::Result<()>;

    fn on_reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Only called for samples that carry both latitude and longitude.
pub trait MapConsumer: Send {
    fn on_fix(&mut self, fix: MapFix) -> anyhow::Result<()>;

    fn on_reset(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub trait LogConsumer: Send {
    fn on_log(&mut self, entry: &LogEntry) -> anyhow::Result<()>;
}

/// The consumers injected into a pipeline. Any of them may be absent.
#[derive(Default)]
pub struct Consumers {
    pub display: Option<Box<dyn DisplayConsumer>>,
    pub chart: Option<Box<dyn ChartConsumer>>,
    pub map: Option<Box<dyn MapConsumer>>,
    pub log: Option<Box<dyn LogConsumer>>,
}

impl Consumers {
    pub fn with_display(mut self, consumer: impl DisplayConsumer + 'static) -> Self {
        self.display = Some(Box::new(consumer));
        self
    }

    pub fn with_chart(mut self, consumer: impl ChartConsumer + 'static) -> Self {
        self.chart = Some(Box::new(consumer));
        self
    }

    pub fn with_map(mut self, consumer: impl MapConsumer + 'static) -> Self {
        self.map = Some(Box::new(consumer));
        self
    }

    pub fn with_log(mut self, consumer: impl LogConsumer + 'static) -> Self {
        self.log = Some(Box::new(consumer));
        self
    }
}

// ======================================================================
//  WebSocket-backed implementations
// ======================================================================

/// How many trailing points each chart push carries.
const CHART_WINDOW: usize = 50;
const TEMPERATURE_WINDOW: usize = 100;

/// Keeps the primary readout current and streams it to clients.
pub struct PanelDisplay {
    readout: Arc<Mutex<DisplayReadout>>,
    ws_tx: broadcast::Sender<WsOutMsg>,
}

impl PanelDisplay {
    pub fn new(readout: Arc<Mutex<DisplayReadout>>, ws_tx: broadcast::Sender<WsOutMsg>) -> Self {
        Self { readout, ws_tx }
    }

    fn publish(&self, update: impl FnOnce(&mut DisplayReadout)) -> anyhow::Result<()> {
        let snapshot = {
            let mut readout = lock(&self.readout);
            update(&mut readout);
            readout.clone()
        };
        // no subscribers is not an error
        let _ = self.ws_tx.send(WsOutMsg::Display(snapshot));
        Ok(())
    }
}

impl DisplayConsumer for PanelDisplay {
    fn on_sample(&mut self, sample: &StampedSample) -> anyhow::Result<()> {
        self.publish(|readout| *readout = DisplayReadout::from_sample(&sample.sample))
    }

    fn on_reset(&mut self) -> anyhow::Result<()> {
        self.publish(|readout| *readout = DisplayReadout::default())
    }
}

/// Streams the trailing window of every channel that just grew.
pub struct ChartFeed {
    ws_tx: broadcast::Sender<WsOutMsg>,
}

impl ChartFeed {
    pub fn new(ws_tx: broadcast::Sender<WsOutMsg>) -> Self {
        Self { ws_tx }
    }
}

impl ChartConsumer for ChartFeed {
    fn on_charts(&mut self, view: ChartView<'_>) -> anyhow::Result<()> {
        if view.touched.is_empty() {
            return Ok(());
        }
        let series = view
            .touched
            .iter()
            .map(|&channel| {
                let window = match channel {
                    ChartChannel::Temperature => TEMPERATURE_WINDOW,
                    _ => CHART_WINDOW,
                };
                SeriesMsg {
                    channel,
                    points: view.charts.latest(channel, window),
                }
            })
            .collect();
        let _ = self.ws_tx.send(WsOutMsg::Charts(ChartsMsg {
            reset: false,
            series,
        }));
        Ok(())
    }

    fn on_reset(&mut self) -> anyhow::Result<()> {
        let _ = self.ws_tx.send(WsOutMsg::Charts(ChartsMsg {
            reset: true,
            series: Vec::new(),
        }));
        Ok(())
    }
}

/// Moves the rocket marker and streams the bounded flight path.
pub struct TrackFeed {
    track: Arc<Mutex<FlightTrack>>,
    ws_tx: broadcast::Sender<WsOutMsg>,
}

impl TrackFeed {
    pub fn new(track: Arc<Mutex<FlightTrack>>, ws_tx: broadcast::Sender<WsOutMsg>) -> Self {
        Self { track, ws_tx }
    }

    fn publish(&self, update: impl FnOnce(&mut FlightTrack)) -> anyhow::Result<()> {
        let snapshot = {
            let mut track = lock(&self.track);
            update(&mut track);
            track.snapshot()
        };
        let _ = self.ws_tx.send(WsOutMsg::Map(snapshot));
        Ok(())
    }
}

impl MapConsumer for TrackFeed {
    fn on_fix(&mut self, fix: MapFix) -> anyhow::Result<()> {
        self.publish(|track| track.update(fix))
    }

    fn on_reset(&mut self) -> anyhow::Result<()> {
        self.publish(FlightTrack::reset)
    }
}

/// Appends to the bounded mission log and streams each line. Warnings and
/// errors are also written to the `alerts` table when a database is attached.
pub struct MissionLog {
    log: Arc<Mutex<EventLog>>,
    ws_tx: broadcast::Sender<WsOutMsg>,
    db: Option<SqlitePool>,
}

impl MissionLog {
    pub fn new(log: Arc<Mutex<EventLog>>, ws_tx: broadcast::Sender<WsOutMsg>) -> Self {
        Self {
            log,
            ws_tx,
            db: None,
        }
    }

    pub fn with_db(mut self, db: SqlitePool) -> Self {
        self.db = Some(db);
        self
    }

    fn spawn_alert_insert(&self, entry: &LogEntry) {
        let Some(db) = self.db.clone() else {
            return;
        };
        if entry.level == LogLevel::Info {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let entry = entry.clone();
        handle.spawn(async move {
            if let Err(e) = insert_alert(&db, &entry).await {
                tracing::warn!("failed to persist alert: {e}");
            }
        });
    }
}

impl LogConsumer for MissionLog {
    fn on_log(&mut self, entry: &LogEntry) -> anyhow::Result<()> {
        lock(&self.log).push(entry.clone());
        let _ = self.ws_tx.send(WsOutMsg::Log(entry.clone()));
        self.spawn_alert_insert(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::ChartSet;
    use crate::event_log::DEFAULT_LOG_CAP;
    use crate::map::{GeoPoint, DEFAULT_PATH_CAP};
    use mission_control_shared::TelemetrySample;

    fn stamped(sample: TelemetrySample) -> StampedSample {
        StampedSample {
            seq: 1,
            received_at_ms: 0,
            mission_elapsed_seconds: 0.5,
            sample,
        }
    }

    #[test]
    fn panel_display_updates_shared_readout_and_streams_it() {
        let (tx, mut rx) = broadcast::channel(8);
        let readout = Arc::new(Mutex::new(DisplayReadout::default()));
        let mut display = PanelDisplay::new(readout.clone(), tx);

        display
            .on_sample(&stamped(TelemetrySample {
                altitude_meters: Some(42.0),
                ..Default::default()
            }))
            .expect("display");

        assert_eq!(readout.lock().unwrap().altitude, "42 m");
        match rx.try_recv() {
            Ok(WsOutMsg::Display(r)) => assert_eq!(r.altitude, "42 m"),
            _ => panic!("expected a display message"),
        }

        display
            .on_sample(&stamped(TelemetrySample::default()))
            .expect("display");
        assert_eq!(readout.lock().unwrap().altitude, "-- m");

        display.on_reset().expect("reset");
        assert_eq!(*readout.lock().unwrap(), DisplayReadout::default());
    }

    #[test]
    fn chart_feed_sends_only_touched_channels() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut feed = ChartFeed::new(tx);
        let mut charts = ChartSet::new();
        let touched = charts.append(&stamped(TelemetrySample {
            altitude_meters: Some(10.0),
            ..Default::default()
        }));

        feed.on_charts(ChartView {
            charts: &charts,
            touched: &touched,
        })
        .expect("charts");

        match rx.try_recv() {
            Ok(WsOutMsg::Charts(msg)) => {
                assert!(!msg.reset);
                assert_eq!(msg.series.len(), 1);
                assert_eq!(msg.series[0].channel, ChartChannel::Altitude);
                assert_eq!(msg.series[0].points.len(), 1);
            }
            _ => panic!("expected a charts message"),
        }
    }

    #[test]
    fn track_feed_and_log_share_state_with_readers() {
        let (tx, _rx) = broadcast::channel(8);
        let track = Arc::new(Mutex::new(FlightTrack::new(
            GeoPoint { lat: 1.0, lng: 2.0 },
            DEFAULT_PATH_CAP,
        )));
        let mut feed = TrackFeed::new(track.clone(), tx.clone());
        feed.on_fix(MapFix {
            lat: 1.5,
            lng: 2.5,
            altitude: None,
        })
        .expect("fix");
        assert_eq!(track.lock().unwrap().path_len(), 2);

        let log = Arc::new(Mutex::new(EventLog::new(DEFAULT_LOG_CAP)));
        let mut mission_log = MissionLog::new(log.clone(), tx);
        mission_log
            .on_log(&LogEntry {
                timestamp_ms: 1,
                level: LogLevel::Warning,
                message: "low battery".into(),
            })
            .expect("log");
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    fn poison<T: Send + 'static>(shared: &Arc<Mutex<T>>) {
        let clone = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poisoned");
        })
        .join();
    }

    #[test]
    fn consumers_keep_working_after_a_poisoned_lock() {
        let (tx, _rx) = broadcast::channel(8);
        let readout = Arc::new(Mutex::new(DisplayReadout::default()));
        let log = Arc::new(Mutex::new(EventLog::new(DEFAULT_LOG_CAP)));
        poison(&readout);
        poison(&log);
        assert!(readout.is_poisoned() && log.is_poisoned());

        let mut display = PanelDisplay::new(readout.clone(), tx.clone());
        display
            .on_sample(&stamped(TelemetrySample {
                altitude_meters: Some(7.0),
                ..Default::default()
            }))
            .expect("display after poison");
        assert_eq!(lock(&readout).altitude, "7 m");

        let mut mission_log = MissionLog::new(log.clone(), tx);
        mission_log
            .on_log(&LogEntry {
                timestamp_ms: 1,
                level: LogLevel::Info,
                message: "still here".into(),
            })
            .expect("log after poison");
        assert_eq!(lock(&log).len(), 1);
    }
}
