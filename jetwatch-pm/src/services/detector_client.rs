//! Colormap detector client
//!
//! Wraps the external `jetscan` binary, which rasterizes the figures in a
//! PDF and classifies whether any of them use a rainbow colormap. The
//! binary writes its findings as JSON to an output path we supply; we run
//! it off the async runtime and parse the report it leaves behind.

use async_trait::async_trait;
use jetwatch_common::models::Verdict;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use uuid::Uuid;

/// Detector client errors
#[derive(Debug, Error)]
pub enum DetectError {
    /// Detector binary not found
    #[error("Detector binary not found: {0}")]
    BinaryNotFound(String),

    /// Detector execution failed
    #[error("Detector execution failed: {0}")]
    ExecutionError(String),

    /// Detector ran but reported a failure
    #[error("Detection failed: {0}")]
    DetectionFailed(String),

    /// Failed to parse detector output
    #[error("Failed to parse detector output: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input file not found
    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// Outcome of running the detector over one paper
#[derive(Debug, Clone)]
pub struct Detection {
    /// Whether a rainbow colormap was found
    pub verdict: Verdict,
    /// Detector diagnostics, stored verbatim alongside the paper
    pub data: serde_json::Value,
}

/// JSON report written by the detector binary
#[derive(Debug, Deserialize)]
struct DetectorReport {
    verdict: String,
    #[serde(default)]
    diagnostics: serde_json::Value,
}

/// Classifies the figures of a paper document
#[async_trait]
pub trait ColormapDetector: Send + Sync {
    /// Analyze the PDF at `pdf_path` and return the verdict
    async fn analyze(&self, pdf_path: &Path) -> Result<Detection, DetectError>;
}

/// Client for the external `jetscan` detector binary
pub struct DetectorClient {
    binary_path: String,
}

impl DetectorClient {
    /// Create a new detector client
    ///
    /// Verifies the binary exists and responds to `--version`.
    pub fn new(binary_path: impl Into<String>) -> Result<Self, DetectError> {
        let binary_path = binary_path.into();

        let output = Command::new(&binary_path).arg("--version").output();

        match output {
            Ok(output) => {
                let version = String::from_utf8_lossy(&output.stdout);
                tracing::info!(
                    binary = %binary_path,
                    version = %version.trim(),
                    "Detector binary verified"
                );
                Ok(Self { binary_path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DetectError::BinaryNotFound(binary_path))
            }
            Err(e) => Err(DetectError::ExecutionError(format!(
                "Failed to execute {}: {}",
                binary_path, e
            ))),
        }
    }

    /// Check if the detector binary is available
    pub fn is_available(binary_path: &str) -> bool {
        Command::new(binary_path)
            .arg("--version")
            .output()
            .is_ok()
    }
}

#[async_trait]
impl ColormapDetector for DetectorClient {
    async fn analyze(&self, pdf_path: &Path) -> Result<Detection, DetectError> {
        if !pdf_path.exists() {
            return Err(DetectError::FileNotFound(
                pdf_path.display().to_string(),
            ));
        }

        let output_path = std::env::temp_dir().join(format!("jetscan_{}.json", Uuid::new_v4()));

        tracing::debug!(
            pdf = %pdf_path.display(),
            output = %output_path.display(),
            "Running colormap detector"
        );

        let binary = self.binary_path.clone();
        let pdf = pdf_path.to_path_buf();
        let out = output_path.clone();

        let result = tokio::task::spawn_blocking(move || {
            Command::new(&binary)
                .arg(&pdf)
                .arg("--output")
                .arg(&out)
                .output()
        })
        .await
        .map_err(|e| DetectError::ExecutionError(format!("Task join error: {}", e)))?;

        let output = match result {
            Ok(output) => output,
            Err(e) => {
                let _ = std::fs::remove_file(&output_path);
                return Err(DetectError::ExecutionError(e.to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let _ = std::fs::remove_file(&output_path);
            return Err(DetectError::DetectionFailed(stderr.to_string()));
        }

        let report_json = std::fs::read_to_string(&output_path).map_err(|e| {
            DetectError::ParseError(format!("Failed to read detector output: {}", e))
        })?;

        let _ = std::fs::remove_file(&output_path);

        let report: DetectorReport = serde_json::from_str(&report_json)
            .map_err(|e| DetectError::ParseError(e.to_string()))?;

        let verdict = match report.verdict.as_str() {
            "clean" => Verdict::Clean,
            "flagged" => Verdict::Flagged,
            other => {
                return Err(DetectError::ParseError(format!(
                    "Unknown verdict: {}",
                    other
                )))
            }
        };

        tracing::debug!(pdf = %pdf_path.display(), verdict = ?verdict, "Detection complete");

        Ok(Detection {
            verdict,
            data: report.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_output_path() -> PathBuf {
        std::env::temp_dir().join(format!("jetscan_{}.json", Uuid::new_v4()))
    }

    #[test]
    fn missing_binary_is_reported() {
        let result = DetectorClient::new("/nonexistent/jetscan");
        assert!(matches!(result, Err(DetectError::BinaryNotFound(_))));
    }

    #[test]
    fn is_available_false_for_missing_binary() {
        assert!(!DetectorClient::is_available("/nonexistent/jetscan"));
    }

    #[test]
    fn temp_output_paths_are_unique() {
        assert_ne!(temp_output_path(), temp_output_path());
    }

    #[test]
    fn report_parses_with_and_without_diagnostics() {
        let full: DetectorReport =
            serde_json::from_str(r#"{"verdict":"flagged","diagnostics":{"pages":[3,7]}}"#)
                .unwrap();
        assert_eq!(full.verdict, "flagged");
        assert_eq!(full.diagnostics["pages"][0], 3);

        let bare: DetectorReport = serde_json::from_str(r#"{"verdict":"clean"}"#).unwrap();
        assert_eq!(bare.verdict, "clean");
        assert!(bare.diagnostics.is_null());
    }
}
