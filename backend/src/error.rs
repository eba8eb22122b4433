use thiserror::Error;

/// Why an `ingest` call was turned away. No state is touched in any case.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("precondition not met: {missing}")]
    GateClosed { missing: &'static str },

    #[error("telemetry must be a JSON object, got {found}")]
    NotARecord { found: &'static str },

    #[error("telemetry decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SequenceError {
    #[error("ignition sequence is not armed")]
    NotArmed,

    #[error("countdown already running")]
    AlreadyCounting,

    #[error("vehicle already ignited, reset the mission first")]
    AlreadyIgnited,

    #[error("link not established")]
    LinkDown,
}
