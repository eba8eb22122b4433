use crate::db::TelemetryWriter;
use crate::error::IngestError;
use crate::flight_sim::{sample_burst, FlightSim};
use crate::link::{LinkMachine, LinkStep};
use crate::pipeline::{IngestOutcome, RawTelemetry};
use crate::sequences::{CountdownEvent, IgnitionSequence, IgnitionStatus};
use crate::state::{lock, AppState, TaskChannels, TelemetryInput};
use crate::web::{LinkMsg, WsOutMsg};
use mission_control_shared::{LogLevel, MissionCommand};
use rand::RngExt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

const COUNTDOWN_TICK_MS: u64 = 100;
/// Chance a simulated connection attempt succeeds.
const LINK_ATTEMPT_SUCCESS: f64 = 0.8;

/// Collaborators of the pipeline that live on the telemetry task: the link
/// handshake, the ignition countdown, the simulated feed and persistence.
pub struct MissionControl {
    state: Arc<AppState>,
    link: LinkMachine,
    link_deadline: Option<Instant>,
    link_tx: watch::Sender<LinkMsg>,
    ignition: IgnitionSequence,
    ignition_tx: watch::Sender<IgnitionStatus>,
    sim: FlightSim,
    sim_running: bool,
    writer: TelemetryWriter,
}

impl MissionControl {
    pub fn new(
        state: Arc<AppState>,
        link_tx: watch::Sender<LinkMsg>,
        ignition_tx: watch::Sender<IgnitionStatus>,
    ) -> Self {
        let config = state.config.clone();
        Self {
            link: LinkMachine::new(config.link.clone()),
            link_deadline: None,
            link_tx,
            ignition: IgnitionSequence::new(config.countdown),
            ignition_tx,
            sim: FlightSim::new(config.launch_site),
            sim_running: config.sim_autostart,
            writer: TelemetryWriter::spawn(state.db.clone()),
            state,
        }
    }

    fn report(&self, level: LogLevel, message: impl Into<String>) {
        lock(&self.state.pipeline).report(level, message);
    }

    fn now_ms(&self) -> u64 {
        lock(&self.state.pipeline).now_ms()
    }

    pub fn ingest(&mut self, raw: RawTelemetry) -> Result<IngestOutcome, IngestError> {
        let (result, summary) = {
            let mut pipeline = lock(&self.state.pipeline);
            let result = pipeline.ingest(raw);
            (result, pipeline.summary())
        };
        if result.is_ok() {
            let _ = self.state.ws_tx.send(WsOutMsg::Mission(summary));
        }
        result
    }

    fn handle_input(&mut self, input: TelemetryInput) {
        let result = self.ingest(input.raw);
        if let Some(reply) = input.reply {
            let _ = reply.send(result);
        }
    }

    pub fn handle_command(&mut self, cmd: MissionCommand) {
        tracing::info!("operator command: {cmd:?}");
        match cmd {
            MissionCommand::Connect => {
                let step = self.link.connect();
                self.apply_link_step(step);
            }
            MissionCommand::Disconnect => {
                let step = self.link.disconnect();
                self.apply_link_step(step);
            }
            MissionCommand::ResetMission => {
                self.persist();
                self.sim_running = false;
                self.sim.reset();
                self.ignition.reset();
                self.writer.rewind();
                let summary = {
                    let mut pipeline = lock(&self.state.pipeline);
                    pipeline.reset_mission();
                    pipeline.summary()
                };
                let _ = self.state.ws_tx.send(WsOutMsg::Mission(summary));
            }
            MissionCommand::StartSimulation => {
                if !self.sim_running {
                    self.sim_running = true;
                    self.report(LogLevel::Info, "Simulated telemetry feed started");
                }
            }
            MissionCommand::StopSimulation => {
                if self.sim_running {
                    self.sim_running = false;
                    self.report(LogLevel::Info, "Simulated telemetry feed stopped");
                }
            }
            MissionCommand::ClearLog => {
                lock(&self.state.event_log).clear();
                let _ = self.state.ws_tx.send(WsOutMsg::LogCleared);
                self.report(LogLevel::Info, "Log cleared by user");
            }
            MissionCommand::SimulateSample => {
                let sample = sample_burst(self.state.config.launch_site, &mut rand::rng());
                let _ = self.ingest(sample.into());
            }
            MissionCommand::ArmIgnition => match self.ignition.arm() {
                Ok(()) => self.report(LogLevel::Warning, "Ignition ARMED"),
                Err(e) => self.report(LogLevel::Warning, format!("Cannot arm: {e}")),
            },
            MissionCommand::StartCountdown => {
                let now_ms = self.now_ms();
                let link_ok = {
                    let pipeline = lock(&self.state.pipeline);
                    !pipeline.gate().require_link || pipeline.link_flags().link_established
                };
                match self.ignition.start(now_ms, link_ok) {
                    Ok(secs) => self.report(LogLevel::Info, format!("Countdown started: T-{secs}")),
                    Err(e) => {
                        self.report(LogLevel::Warning, format!("Cannot start countdown: {e}"))
                    }
                }
            }
            MissionCommand::AbortCountdown => match self.ignition.abort() {
                Ok(true) => self.report(LogLevel::Warning, "Countdown aborted, ignition safed"),
                Ok(false) => self.report(LogLevel::Info, "Ignition already safe"),
                Err(e) => self.report(LogLevel::Error, format!("Abort refused: {e}")),
            },
        }
        self.publish_ignition();
    }

    fn apply_link_step(&mut self, step: LinkStep) {
        if let Some((level, message)) = step.event {
            self.report(level, message);
        }
        self.link_deadline = step.next_in.map(|d| Instant::now() + d);

        let flags = self.link.flags();
        lock(&self.state.pipeline).set_link_flags(flags);
        let msg = LinkMsg {
            state: self.link.state(),
            flags,
        };
        self.link_tx.send_replace(msg);
        let _ = self.state.ws_tx.send(WsOutMsg::Link(msg));
    }

    pub fn advance_link(&mut self, attempt_ok: bool) {
        let step = self.link.advance(attempt_ok);
        self.apply_link_step(step);
    }

    pub fn tick_countdown(&mut self) {
        let now_ms = self.now_ms();
        match self.ignition.tick(now_ms) {
            Some(CountdownEvent::TMinus(secs)) => {
                self.report(LogLevel::Info, format!("T-{secs}"));
            }
            Some(CountdownEvent::Ignition) => {
                self.sim.ignite(now_ms);
                self.report(LogLevel::Info, "IGNITION");
            }
            None => return,
        }
        self.publish_ignition();
    }

    fn publish_ignition(&self) {
        let status = self.ignition.status(self.now_ms());
        if *self.ignition_tx.borrow() != status {
            self.ignition_tx.send_replace(status);
            let _ = self.state.ws_tx.send(WsOutMsg::Ignition(status));
        }
    }

    pub fn sim_tick<R: RngExt + ?Sized>(&mut self, rng: &mut R) {
        let sample = self.sim.next_sample(self.now_ms(), rng);
        if let Err(IngestError::GateClosed { missing }) = self.ingest(sample.into()) {
            self.sim_running = false;
            self.report(
                LogLevel::Warning,
                format!("Simulated feed paused: {missing}"),
            );
        }
    }

    /// Queues whatever the writer has not seen yet.
    pub fn persist(&mut self) {
        let pipeline = lock(&self.state.pipeline);
        let mission = pipeline.mission();
        let batch = self.writer.unsaved(mission.history().iter());
        self.writer.queue(mission.started_at_ms(), batch);
    }

    /// Final save, then waits for the writer to finish.
    pub async fn shutdown(mut self) {
        self.persist();
        self.writer.close().await;
    }
}

pub async fn telemetry_task(
    state: Arc<AppState>,
    channels: TaskChannels,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let TaskChannels {
        mut input_rx,
        mut cmd_rx,
        link_tx,
        ignition_tx,
    } = channels;

    let config = state.config.clone();
    let mut control = MissionControl::new(state, link_tx, ignition_tx);

    let mut sim_interval = interval(config.sim_period);
    sim_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut save_interval = interval(config.save_period);
    save_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut countdown_interval = interval(Duration::from_millis(COUNTDOWN_TICK_MS));
    countdown_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let link_deadline = control.link_deadline.unwrap_or_else(Instant::now);

        tokio::select! {
            Some(input) = input_rx.recv() => {
                control.handle_input(input);
            }
            Some(cmd) = cmd_rx.recv() => {
                control.handle_command(cmd);
            }
            _ = sim_interval.tick(), if control.sim_running => {
                control.sim_tick(&mut rand::rng());
            }
            _ = countdown_interval.tick(), if control.ignition.is_counting() => {
                control.tick_countdown();
            }
            _ = tokio::time::sleep_until(link_deadline), if control.link_deadline.is_some() => {
                let attempt_ok = rand::rng().random_bool(LINK_ATTEMPT_SUCCESS);
                control.advance_link(attempt_ok);
            }
            _ = save_interval.tick() => {
                control.persist();
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }

    control.shutdown().await;
    tracing::info!("telemetry task stopped");
}

pub fn get_current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
