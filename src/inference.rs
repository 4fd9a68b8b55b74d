//! Remote image classification
//!
//! The model bundle is a directory holding the inference script, a TFLite
//! model, a labels file and a sample image. It is uploaded as-is and the
//! script is invoked with the three data files as positional arguments:
//!
//! ```text
//! $ python3 model.py model.tflite labels.txt parrot.jpg
//! time: 0.0532s
//! 0.878431: tabby cat
//! ```

use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EdgeError, Result};
use crate::shell;

/// Python packages the inference script imports
pub const DEPENDENCY_COMMAND: &str = "pip install --no-cache-dir tflite-runtime pillow numpy";

pub const DEFAULT_REMOTE_DIR: &str = "/root/image_model";
pub const DEFAULT_SCRIPT: &str = "model.py";
pub const DEFAULT_MODEL: &str = "model.tflite";
pub const DEFAULT_LABELS: &str = "labels.txt";
pub const DEFAULT_SAMPLE: &str = "parrot.jpg";

/// One inference invocation, with file names relative to `remote_dir`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceJob {
    pub remote_dir: String,
    pub script: String,
    pub model: String,
    pub labels: String,
    pub image: String,
}

impl Default for InferenceJob {
    fn default() -> Self {
        Self {
            remote_dir: DEFAULT_REMOTE_DIR.to_string(),
            script: DEFAULT_SCRIPT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            labels: DEFAULT_LABELS.to_string(),
            image: DEFAULT_SAMPLE.to_string(),
        }
    }
}

impl InferenceJob {
    /// Shell command running the script from inside `remote_dir`
    pub fn command(&self) -> String {
        format!(
            "cd {} && python3 {} {} {} {}",
            shell::quote(&self.remote_dir),
            shell::quote(&self.script),
            shell::quote(&self.model),
            shell::quote(&self.labels),
            shell::quote(&self.image)
        )
    }

    /// Make sure the local bundle holds every file the job needs
    pub fn check_bundle(&self, bundle: &Path) -> Result<()> {
        if !bundle.is_dir() {
            return Err(EdgeError::Config(format!(
                "model bundle {} is not a directory",
                bundle.display()
            )));
        }
        let missing: Vec<&str> = [&self.script, &self.model, &self.labels, &self.image]
            .into_iter()
            .map(String::as_str)
            .filter(|name| !bundle.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(EdgeError::Config(format!(
                "model bundle {} is missing {}",
                bundle.display(),
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// Top prediction reported by the inference script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceReport {
    /// Time spent inside the interpreter
    #[serde(with = "seconds")]
    pub elapsed: Duration,
    /// Quantized score scaled to 0..1
    pub score: f64,
    pub label: String,
}

fn time_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^time:\s*([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)s\s*$").expect("valid regex"))
}

fn prediction_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*([0-9]+\.[0-9]+):\s*(.*?)\s*$").expect("valid regex"))
}

impl InferenceReport {
    /// Parse the script's standard output
    pub fn parse(output: &str) -> Result<Self> {
        let elapsed = time_line()
            .captures(output)
            .and_then(|c| c[1].parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .ok_or_else(|| EdgeError::InferenceOutput("no `time: <seconds>s` line".to_string()))?;

        let captures = prediction_line()
            .captures(output)
            .ok_or_else(|| EdgeError::InferenceOutput("no `<score>: <label>` line".to_string()))?;
        let score = captures[1]
            .parse::<f64>()
            .map_err(|e| EdgeError::InferenceOutput(format!("bad score: {}", e)))?;

        Ok(Self {
            elapsed,
            score,
            label: captures[2].to_string(),
        })
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
