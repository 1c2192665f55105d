//! Quality oracle adapter: scores a persisted document through an external
//! procedure and normalizes the result to `[0, 1]`.
//!
//! The oracle is a black box. Any failure to obtain a reading (spawn error,
//! timeout, nonzero exit, unparseable output) surfaces as an [`OracleError`],
//! and [`score_or_zero`] turns that into a zero score so callers keep going.

mod command;
mod error;
mod output;

use std::path::Path;

use async_trait::async_trait;
use draftgate_core::QualityScore;
use tracing::{debug, warn};

pub use command::CommandOracle;
pub use error::OracleError;
pub use output::parse_score_output;

/// Something that can score a document stored at `path`.
#[async_trait]
pub trait QualityOracle: Send + Sync {
    async fn score(&self, path: &Path) -> Result<QualityScore, OracleError>;
}

/// Result of one scoring call after error mapping.
#[derive(Debug)]
pub struct ScoreReading {
    pub score: QualityScore,
    /// Set when the oracle failed and `score` is the zero fallback.
    pub error: Option<OracleError>,
}

impl ScoreReading {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Score a document, mapping any oracle failure to [`QualityScore::ZERO`].
pub async fn score_or_zero(oracle: &dyn QualityOracle, path: &Path) -> ScoreReading {
    match oracle.score(path).await {
        Ok(score) => {
            debug!(path = %path.display(), %score, "oracle score");
            ScoreReading { score, error: None }
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "oracle failed, recording score 0.00");
            ScoreReading {
                score: QualityScore::ZERO,
                error: Some(err),
            }
        }
    }
}
