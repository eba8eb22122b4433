use crate::config::GroundConfig;
use crate::consumers::{ChartFeed, Consumers, MissionLog, PanelDisplay, TrackFeed};
use crate::display::DisplayReadout;
use crate::error::IngestError;
use crate::event_log::EventLog;
use crate::link::{LinkFlags, LinkState};
use crate::map::FlightTrack;
use crate::pipeline::{IngestOutcome, RawTelemetry, TelemetryPipeline};
use crate::sequences::IgnitionStatus;
use crate::telemetry_task::get_current_timestamp_ms;
use crate::web::{LinkMsg, WsOutMsg};
use mission_control_shared::MissionCommand;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Raw input on its way to the pipeline, with an optional channel for the
/// caller to hear how it went.
#[derive(Debug)]
pub struct TelemetryInput {
    pub raw: RawTelemetry,
    pub reply: Option<oneshot::Sender<Result<IngestOutcome, IngestError>>>,
}

impl From<RawTelemetry> for TelemetryInput {
    fn from(raw: RawTelemetry) -> Self {
        Self { raw, reply: None }
    }
}

#[derive(Clone)]
pub struct AppState {
    /// Mutated only by the telemetry task; handlers take read snapshots
    pub pipeline: Arc<Mutex<TelemetryPipeline>>,

    /// Telemetry from HTTP / WebSocket → telemetry task
    pub input_tx: mpsc::Sender<TelemetryInput>,

    /// Operator commands → telemetry task
    pub cmd_tx: mpsc::Sender<MissionCommand>,

    /// Everything streamed to clients
    pub ws_tx: broadcast::Sender<WsOutMsg>,

    pub event_log: Arc<Mutex<EventLog>>,
    pub readout: Arc<Mutex<DisplayReadout>>,
    pub track: Arc<Mutex<FlightTrack>>,

    pub link_rx: watch::Receiver<LinkMsg>,
    pub ignition_rx: watch::Receiver<IgnitionStatus>,

    /// SQLite database
    pub db: SqlitePool,

    pub config: Arc<GroundConfig>,
}

/// Receiving ends the telemetry task owns.
pub struct TaskChannels {
    pub input_rx: mpsc::Receiver<TelemetryInput>,
    pub cmd_rx: mpsc::Receiver<MissionCommand>,
    pub link_tx: watch::Sender<LinkMsg>,
    pub ignition_tx: watch::Sender<IgnitionStatus>,
}

impl AppState {
    /// Wires the pipeline to its WebSocket-backed consumers.
    pub fn new(config: GroundConfig, db: SqlitePool) -> (Arc<Self>, TaskChannels) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (ws_tx, _ws_rx) = broadcast::channel(512);
        let (link_tx, link_rx) = watch::channel(LinkMsg {
            state: LinkState::Disconnected,
            flags: LinkFlags::default(),
        });
        let (ignition_tx, ignition_rx) = watch::channel(IgnitionStatus::Safe);

        let event_log = Arc::new(Mutex::new(EventLog::new(config.log_cap)));
        let readout = Arc::new(Mutex::new(DisplayReadout::default()));
        let track = Arc::new(Mutex::new(FlightTrack::new(
            config.launch_site,
            config.map_path_cap,
        )));

        let consumers = Consumers::default()
            .with_display(PanelDisplay::new(readout.clone(), ws_tx.clone()))
            .with_chart(ChartFeed::new(ws_tx.clone()))
            .with_map(TrackFeed::new(track.clone(), ws_tx.clone()))
            .with_log(MissionLog::new(event_log.clone(), ws_tx.clone()).with_db(db.clone()));
        let pipeline = TelemetryPipeline::new(
            config.pipeline.clone(),
            consumers,
            Box::new(get_current_timestamp_ms),
        );

        let state = Arc::new(Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            input_tx,
            cmd_tx,
            ws_tx,
            event_log,
            readout,
            track,
            link_rx,
            ignition_rx,
            db,
            config: Arc::new(config),
        });
        let channels = TaskChannels {
            input_rx,
            cmd_rx,
            link_tx,
            ignition_tx,
        };
        (state, channels)
    }

    pub fn link_msg(&self) -> LinkMsg {
        *self.link_rx.borrow()
    }
}

/// Locks a shared value. A panic while holding one of these leaves plain
/// data behind, so the poison flag is ignored.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
