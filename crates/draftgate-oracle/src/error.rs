use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("failed to start oracle `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("oracle timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("oracle exited with code {}: {stderr}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Exit { code: Option<i32>, stderr: String },

    #[error("oracle output has no `{marker}` line")]
    MarkerMissing { marker: String },

    #[error("oracle score `{0}` is not a number")]
    InvalidValue(String),

    #[error("oracle score {0} is outside 0..=100")]
    OutOfRange(f64),
}
