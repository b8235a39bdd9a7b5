//! Job descriptor read from standard input
//!
//! A job is parsed exactly once, validated, and then only touched again by
//! the controller to resolve the `max_width` sentinel against the measured
//! surface width before it is relayed to the renderer.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;

/// Library settings: option name to value, passed through to mermaid as-is.
pub type Settings = serde_json::Map<String, Value>;

/// Sentinel for `width` / `max_width` meaning "derive from the surface".
pub const UNSET: i64 = -1;

/// Width used when the job leaves `config.width` unset.
pub const DEFAULT_SURFACE_WIDTH: u32 = 800;

fn unset() -> i64 {
    UNSET
}

fn default_zoom() -> f64 {
    1.0
}

/// Render-time settings of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Surface width in pixels, or `-1` for the default width
    #[serde(default = "unset")]
    pub width: i64,
    /// Per-diagram display cap in pixels, or `-1` for the surface content width
    #[serde(default = "unset")]
    pub max_width: i64,
    /// Content zoom factor
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            width: UNSET,
            max_width: UNSET,
            zoom: default_zoom(),
        }
    }
}

/// One diagram of the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramJob {
    /// Diagram source text
    pub code: String,
    /// Overrides merged over the job's `mmd_config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Settings>,
}

/// The complete standard-input payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    #[serde(default)]
    pub config: JobConfig,
    #[serde(default)]
    pub mmd_config: Settings,
    pub mmd: Vec<DiagramJob>,
}

impl JobDescriptor {
    /// Read the whole stream to EOF and parse it as a single job.
    ///
    /// Nothing is parsed until the stream is exhausted.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| Error::InputError(format!("Failed to read standard input: {}", e)))?;
        Self::from_slice(&buf)
    }

    /// Parse and validate a job from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let job: JobDescriptor = serde_json::from_slice(bytes)
            .map_err(|e| Error::InputError(format!("Malformed job JSON: {}", e)))?;
        job.validate()?;
        Ok(job)
    }

    /// Reject settings the surface cannot honor.
    pub fn validate(&self) -> Result<()> {
        let zoom = self.config.zoom;
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(Error::InputError(format!("config.zoom must be positive, got {}", zoom)));
        }
        check_dimension("config.width", self.config.width)?;
        check_dimension("config.max_width", self.config.max_width)?;
        Ok(())
    }

    /// Width the surface should be created with
    pub fn surface_width(&self) -> u32 {
        if self.config.width == UNSET {
            DEFAULT_SURFACE_WIDTH
        } else {
            self.config.width as u32
        }
    }

    /// Substitute the measured content width when `max_width` is the sentinel.
    ///
    /// Any explicit value is kept unchanged.
    pub fn resolve_max_width(&mut self, measured: u32) {
        if self.config.max_width == UNSET {
            self.config.max_width = i64::from(measured);
        }
    }

    /// Resolved per-diagram cap, `None` until `resolve_max_width` has run.
    pub fn max_width(&self) -> Option<u32> {
        if self.config.max_width == UNSET {
            None
        } else {
            Some(self.config.max_width as u32)
        }
    }

    /// Settings for one diagram: its own keys win over `mmd_config`.
    pub fn effective_settings(&self, diagram: &DiagramJob) -> Settings {
        let mut settings = self.mmd_config.clone();
        if let Some(overrides) = &diagram.config {
            for (key, value) in overrides {
                settings.insert(key.clone(), value.clone());
            }
        }
        settings
    }
}

fn check_dimension(field: &str, value: i64) -> Result<()> {
    if value == UNSET || (1..=i64::from(u32::MAX)).contains(&value) {
        Ok(())
    } else {
        Err(Error::InputError(format!("{} must be -1 or a positive pixel count, got {}", field, value)))
    }
}
