//! Error taxonomy for the reporter
//!
//! Per-instance errors (`StructureError`, `PollError`) are contained inside a
//! cycle and only ever logged. `ConfigError` is fatal at startup.

/// The response does not have the shape we flatten
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing `{0}` in response envelope")]
    MissingField(String),
    #[error("expected an object at `{path}`, found {found}")]
    NotAnObject { path: String, found: &'static str },
}

/// Failure to write a measurement to InfluxDB
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("InfluxDB rejected the write ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("InfluxDB unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Anything that can go wrong while reporting a single instance
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("malformed response: {0}")]
    Structure(#[from] StructureError),
    #[error("unexpected response {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("write failed: {0}")]
    Sink(#[from] SinkError),
}

/// Missing or invalid settings
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("INSTANCES must be defined")]
    MissingInstances,
    #[error("unable to parse instance definition `{0}` (expected `name; user; password; url`)")]
    InvalidInstance(String),
    #[error("instance `{0}` is defined more than once")]
    DuplicateInstance(String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("failed to load settings: {0}")]
    Load(#[from] figment::Error),
}

/// Shortens a response body so it stays readable in a log line
pub(crate) fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
