use mission_control_shared::LogLevel;
use serde::Serialize;
use std::time::Duration;

/// Sensors brought up, in order, once the link is connected.
pub const SENSORS: [&str; 4] = ["GPS", "IMU", "Barometer", "Thermometer"];

/// The two coarse flags ingestion may be gated on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkFlags {
    pub connected: bool,
    pub link_established: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    InitializingSensors { ready: usize },
    LinkEstablished,
}

#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub retries: u32,
    pub retry_delay: Duration,
    pub sensor_init_delay: Duration,
}

/// Result of driving the handshake one step: an optional log line for the
/// operator and when to call `advance` next.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStep {
    pub event: Option<(LogLevel, String)>,
    pub next_in: Option<Duration>,
}

impl LinkStep {
    fn idle() -> Self {
        Self {
            event: None,
            next_in: None,
        }
    }

    fn log(level: LogLevel, message: impl Into<String>, next_in: Option<Duration>) -> Self {
        Self {
            event: Some((level, message.into())),
            next_in,
        }
    }
}

/// `Disconnected -> Connecting -> Connected -> InitializingSensors -> LinkEstablished`
///
/// Timing is left to the caller: every step says how long to wait before the
/// next `advance`.
#[derive(Debug, Clone)]
pub struct LinkMachine {
    state: LinkState,
    config: LinkConfig,
}

impl LinkMachine {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            state: LinkState::Disconnected,
            config,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn flags(&self) -> LinkFlags {
        match self.state {
            LinkState::Disconnected | LinkState::Connecting { .. } => LinkFlags::default(),
            LinkState::Connected | LinkState::InitializingSensors { .. } => LinkFlags {
                connected: true,
                link_established: false,
            },
            LinkState::LinkEstablished => LinkFlags {
                connected: true,
                link_established: true,
            },
        }
    }

    /// Starts a handshake. Ignored unless disconnected.
    pub fn connect(&mut self) -> LinkStep {
        if self.state != LinkState::Disconnected {
            return LinkStep::idle();
        }
        self.state = LinkState::Connecting { attempt: 1 };
        LinkStep::log(
            LogLevel::Info,
            "Connecting to ground link (attempt 1)",
            Some(self.config.retry_delay),
        )
    }

    pub fn disconnect(&mut self) -> LinkStep {
        if self.state == LinkState::Disconnected {
            return LinkStep::idle();
        }
        self.state = LinkState::Disconnected;
        LinkStep::log(LogLevel::Warning, "Ground link disconnected", None)
    }

    /// Moves the handshake forward once its delay has elapsed.
    /// `attempt_ok` is the outcome of the pending connection attempt and is
    /// only consulted while connecting.
    pub fn advance(&mut self, attempt_ok: bool) -> LinkStep {
        match self.state {
            LinkState::Disconnected | LinkState::LinkEstablished => LinkStep::idle(),
            LinkState::Connecting { attempt } if attempt_ok => {
                self.state = LinkState::Connected;
                LinkStep::log(
                    LogLevel::Info,
                    format!("System connected after {attempt} attempt(s)"),
                    Some(self.config.sensor_init_delay),
                )
            }
            LinkState::Connecting { attempt } if attempt > self.config.retries => {
                self.state = LinkState::Disconnected;
                LinkStep::log(
                    LogLevel::Error,
                    format!("Connection failed after {attempt} attempt(s)"),
                    None,
                )
            }
            LinkState::Connecting { attempt } => {
                let next = attempt + 1;
                self.state = LinkState::Connecting { attempt: next };
                LinkStep::log(
                    LogLevel::Warning,
                    format!("Connection attempt {attempt} failed, retrying (attempt {next})"),
                    Some(self.config.retry_delay),
                )
            }
            LinkState::Connected => self.sensor_ready(0),
            LinkState::InitializingSensors { ready } => self.sensor_ready(ready),
        }
    }

    fn sensor_ready(&mut self, ready_before: usize) -> LinkStep {
        let ready = ready_before + 1;
        let sensor = SENSORS[ready_before];
        if ready == SENSORS.len() {
            self.state = LinkState::LinkEstablished;
            return LinkStep::log(
                LogLevel::Info,
                format!("{sensor} ready. All sensors online, link established"),
                None,
            );
        }
        self.state = LinkState::InitializingSensors { ready };
        LinkStep::log(
            LogLevel::Info,
            format!("{sensor} ready ({ready}/{})", SENSORS.len()),
            Some(self.config.sensor_init_delay),
        )
    }
}
