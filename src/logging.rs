//! Logging setup and run reports for the command-line tools.
//!
//! Stdout carries binary payloads, so every log line goes to stderr.

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install a stderr subscriber; `RUST_LOG` overrides the default `warn` level.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Summary of one tool invocation, logged as a single JSON object.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub tool: &'static str,
    pub original_count: usize,
    pub output_count: usize,
    pub processing_time: f64,
}

impl RunReport {
    /// `processing_time` is measured in milliseconds from `started`.
    pub fn new(tool: &'static str, original_count: usize, output_count: usize, started: Instant) -> Self {
        Self {
            tool,
            original_count,
            output_count,
            processing_time: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(json) => info!(report = %json, "run finished"),
            Err(err) => warn!(%err, "could not serialize run report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_fields() {
        let report = RunReport {
            tool: "voxel_downsample_rust",
            original_count: 10,
            output_count: 3,
            processing_time: 1.5,
        };
        let value: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["tool"], "voxel_downsample_rust");
        assert_eq!(value["original_count"], 10);
        assert_eq!(value["output_count"], 3);
        assert_eq!(value["processing_time"], 1.5);
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
