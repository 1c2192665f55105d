use std::path::PathBuf;

use draftgate_store::StoreError;
use thiserror::Error;

/// Input and persistence failures that stop a single document's run.
///
/// Oracle failures are not here: they score as zero and the run continues.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("cannot load {path}: {source}")]
    Load { path: PathBuf, source: StoreError },

    #[error("cannot save fixes to {path}: {source}")]
    Persist { path: PathBuf, source: StoreError },

    #[error("file task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl GateError {
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Load { path, .. } | Self::Persist { path, .. } => Some(path),
            Self::Blocking(_) => None,
        }
    }
}
