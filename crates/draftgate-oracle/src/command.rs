//! Oracle backed by an external program.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use draftgate_core::{OracleConfig, QualityScore};
use tokio::process::Command;
use tracing::debug;

use crate::{OracleError, QualityOracle, parse_score_output};

const PATH_PLACEHOLDER: &str = "{path}";
const STDERR_TAIL: usize = 2000;

/// Runs `program args...` per document and reads the score from stdout.
///
/// Every `{path}` in the arguments is replaced with the document path; if no
/// argument mentions it, the path is appended. The child is killed when the
/// timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    marker: String,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>) -> Self {
        let defaults = OracleConfig::default();
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(defaults.timeout_secs),
            marker: defaults.marker,
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            marker: config.marker.clone(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command_args(&self, path: &Path) -> Vec<OsString> {
        let path_str = path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<OsString> = self
            .args
            .iter()
            .map(|arg| {
                if arg == PATH_PLACEHOLDER {
                    substituted = true;
                    path.as_os_str().to_owned()
                } else if arg.contains(PATH_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(PATH_PLACEHOLDER, &path_str).into()
                } else {
                    arg.into()
                }
            })
            .collect();
        if !substituted {
            args.push(path.as_os_str().to_owned());
        }
        args
    }
}

#[async_trait]
impl QualityOracle for CommandOracle {
    async fn score(&self, path: &Path) -> Result<QualityScore, OracleError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.command_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, path = %path.display(), "running oracle");

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(OracleError::Spawn {
                    program: self.program.clone(),
                    source,
                });
            }
            Err(_) => return Err(OracleError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::Exit {
                code: output.status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL).to_string(),
            });
        }

        parse_score_output(&String::from_utf8_lossy(&output.stdout), &self.marker)
    }
}

/// Last `max` bytes of `s`, cut at a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
