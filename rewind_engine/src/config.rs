// Copyright 2026 the Rewind Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Engine configuration.

use std::path::{Path, PathBuf};

use rewind_trace::TraceLimits;
use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Settings shared by capture and replay sessions.
///
/// Every field has a default, so a TOML file only needs to name what it
/// changes:
///
/// ```toml
/// trace_path = "/tmp/session.rply"
/// emulated = true
///
/// [limits]
/// max_record_len = 1048576
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where capture writes and replay reads.
    pub trace_path: PathBuf,
    /// Ceilings for on-disk lengths when opening a trace.
    pub limits: TraceLimits,
    /// Most commands held back waiting for their target node.
    pub pending_capacity: usize,
    /// Metrics sampling period during capture; zero disables the sampler.
    pub metrics_interval_ms: u64,
    /// Pause replay this many seconds after it starts.
    pub pause_at_secs: Option<f64>,
    /// Run without a live producer.
    pub emulated: bool,
    /// Command records to drop from the end of a capture when it stops.
    pub remove_last_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::live()
    }
}

impl EngineConfig {
    /// Capturing from, or replaying next to, a running producer.
    #[must_use]
    pub fn live() -> Self {
        Self {
            trace_path: PathBuf::from("rewind.rply"),
            limits: TraceLimits::default(),
            pending_capacity: 256,
            metrics_interval_ms: 100,
            pause_at_secs: None,
            emulated: false,
            remove_last_records: 0,
        }
    }

    /// Replaying a file with nothing else running.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            pending_capacity: 4096,
            metrics_interval_ms: 0,
            emulated: true,
            ..Self::live()
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Returns the metrics sampling period, if sampling is enabled.
    #[must_use]
    pub fn metrics_interval(&self) -> Option<std::time::Duration> {
        (self.metrics_interval_ms > 0).then(|| std::time::Duration::from_millis(self.metrics_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_live_preset() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::live());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            trace_path = "/tmp/x.rply"
            emulated = true
            pause_at_secs = 2.5

            [limits]
            max_record_len = 1024
            "#,
        )
        .unwrap();
        assert_eq!(config.trace_path, PathBuf::from("/tmp/x.rply"));
        assert!(config.emulated);
        assert_eq!(config.pause_at_secs, Some(2.5));
        assert_eq!(config.limits.max_record_len, 1024);
        assert_eq!(config.limits.max_metadata_len, TraceLimits::default().max_metadata_len);
        assert_eq!(config.pending_capacity, 256);
    }

    #[test]
    fn bad_types_are_reported() {
        let err = EngineConfig::from_toml_str("pending_capacity = \"lots\"").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn offline_disables_sampling() {
        let offline = EngineConfig::offline();
        assert!(offline.emulated);
        assert_eq!(offline.metrics_interval(), None);
        assert_eq!(
            EngineConfig::live().metrics_interval(),
            Some(std::time::Duration::from_millis(100))
        );
    }

    #[test]
    fn load_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rewind.toml");
        std::fs::write(&path, "remove_last_records = 2\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().remove_last_records, 2);
        assert!(matches!(
            EngineConfig::load(dir.path().join("missing.toml")),
            Err(EngineError::Io(_))
        ));
    }
}
