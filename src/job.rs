//! Conversion jobs and batch reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One input workbook and what became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    pub job_id: String,
    pub input: PathBuf,
    pub mode: JobMode,
    pub outputs: Vec<PathBuf>,
    pub status: JobStatus,
    pub renderer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Whole workbook into one PDF.
    Aggregate,
    /// One PDF per visible worksheet.
    PerSheet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ConversionJob {
    pub fn new(input: impl Into<PathBuf>, mode: JobMode) -> Self {
        let now = Utc::now();
        Self {
            job_id: Uuid::new_v4().to_string(),
            input: input.into(),
            mode,
            outputs: Vec::new(),
            status: JobStatus::Queued,
            renderer: None,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    /// File name of the input, for progress lines.
    pub fn input_name(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// One-line outcome for the console: `✓ name -> pdf` or
    /// `✗ name failed: reason`. `None` while the job is unfinished.
    pub fn progress_line(&self) -> Option<String> {
        match self.status {
            JobStatus::Complete => {
                let outputs: Vec<String> = self.outputs.iter().map(|p| p.display().to_string()).collect();
                Some(format!("✓ {} -> {}", self.input_name(), outputs.join(", ")))
            }
            JobStatus::Failed => Some(format!(
                "✗ {} failed: {}",
                self.input_name(),
                self.error.as_deref().unwrap_or("unknown error")
            )),
            JobStatus::Queued | JobStatus::Processing => None,
        }
    }

    pub fn start_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_complete(&mut self, renderer: Option<&str>, outputs: Vec<PathBuf>) {
        self.status = JobStatus::Complete;
        self.updated_at = Utc::now();
        self.renderer = renderer.map(str::to_string);
        self.outputs = outputs;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.updated_at = Utc::now();
        self.error = Some(error);
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Complete | JobStatus::Failed)
    }

    pub fn processing_duration_ms(&self) -> Option<i64> {
        if self.is_finished() {
            Some(self.updated_at.signed_duration_since(self.created_at).num_milliseconds())
        } else {
            None
        }
    }
}

/// Every job of one invocation, in processing order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub jobs: Vec<ConversionJob>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: ConversionJob) {
        self.jobs.push(job);
    }

    /// Number of PDFs written across all jobs.
    pub fn created_count(&self) -> usize {
        self.jobs.iter().map(|j| j.outputs.len()).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionJob> {
        self.jobs.iter().filter(|j| j.status == JobStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let json = self.to_json().context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))
    }
}
