//! Test doubles shared by the gate and batch tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use draftgate_core::QualityScore;
use draftgate_oracle::{OracleError, QualityOracle};

use crate::StopSignal;

/// Returns scripted percentages in order, repeating the last one.
/// `None` stands for an oracle failure. Records the file content it saw.
pub(crate) struct ScriptedOracle {
    script: Vec<Option<f64>>,
    seen: Mutex<Vec<String>>,
    raise_on_score: Option<StopSignal>,
}

impl ScriptedOracle {
    pub(crate) fn new(script: impl IntoIterator<Item = Option<f64>>) -> Arc<Self> {
        Arc::new(Self {
            script: script.into_iter().collect(),
            seen: Mutex::new(Vec::new()),
            raise_on_score: None,
        })
    }

    /// Like [`ScriptedOracle::new`], but raises `stop` from inside every
    /// scoring call, as an interrupt arriving mid-document would.
    pub(crate) fn raising(
        script: impl IntoIterator<Item = Option<f64>>,
        stop: StopSignal,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: script.into_iter().collect(),
            seen: Mutex::new(Vec::new()),
            raise_on_score: Some(stop),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub(crate) fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl QualityOracle for ScriptedOracle {
    async fn score(&self, path: &Path) -> Result<QualityScore, OracleError> {
        let content = fs::read_to_string(path).unwrap_or_default();
        let call = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(content);
            seen.len() - 1
        };
        if let Some(stop) = &self.raise_on_score {
            stop.raise();
        }
        let step = self.script[call.min(self.script.len() - 1)];
        match step {
            Some(pct) => Ok(QualityScore::from_percentage(pct).unwrap()),
            None => Err(OracleError::MarkerMissing {
                marker: "Quality Score:".into(),
            }),
        }
    }
}

const META: &str = "---\ntitle: Best Espresso Machines\nkeyword: espresso\nkeywords: [espresso, coffee]\nimage: /img/espresso-hero.webp\n---\n";

fn body(words: usize) -> String {
    format!(
        "# Best Espresso Machines\n\n\
         Compare [model A](https://example.com/a) and [model B](https://example.org/b).\n\n\
         ![Espresso machine on a kitchen counter](/img/espresso-counter.webp)\n\n\
         {}\n\n## Conclusion\n\nPick the one that fits your kitchen.\n",
        "crema ".repeat(words).trim_end()
    )
}

/// Passes every rubric check.
pub(crate) fn clean_doc() -> String {
    format!("{META}{}", body(1600))
}

/// Only issue: word count below the minimum.
pub(crate) fn short_doc() -> String {
    format!("{META}{}", body(200))
}

pub(crate) fn write_doc(dir: &Path, name: &str, raw: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, raw).unwrap();
    path
}
