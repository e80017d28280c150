//! Structured logging for conversion runs.

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::job::{ConversionJob, JobStatus};

/// Conversions slower than this get a warning.
pub const SLOW_JOB_THRESHOLD_MS: i64 = 60_000;

/// Installs the global subscriber: `RUST_LOG` filter (default `warn`) and a
/// fmt layer on stderr, keeping stdout for progress lines.
///
/// Calling it twice is harmless; the second call does nothing.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Records the outcome of one finished job.
pub fn record_job_telemetry(job: &ConversionJob) {
    let renderer = job.renderer.as_deref().unwrap_or("-");

    if let Some(duration_ms) = job.processing_duration_ms() {
        info!(
            job_id = %job.job_id,
            input = %job.input.display(),
            mode = ?job.mode,
            status = %job.status,
            renderer,
            outputs = job.outputs.len(),
            duration_ms,
            "conversion job finished"
        );

        if duration_ms > SLOW_JOB_THRESHOLD_MS {
            warn!(
                job_id = %job.job_id,
                input = %job.input.display(),
                duration_ms,
                "conversion exceeded {SLOW_JOB_THRESHOLD_MS}ms"
            );
        }
    }

    if job.status == JobStatus::Failed {
        if let Some(ref error) = job.error {
            warn!(
                job_id = %job.job_id,
                input = %job.input.display(),
                error = %error,
                "conversion job failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobMode;
    use std::path::PathBuf;

    #[test]
    fn test_record_job_telemetry() {
        init_logging();
        init_logging();

        let mut job = ConversionJob::new("/in/book.xlsx", JobMode::Aggregate);
        job.start_processing();
        job.mark_complete(Some("excel"), vec![PathBuf::from("/out/book.pdf")]);

        // Should not panic
        record_job_telemetry(&job);
    }

    #[test]
    fn test_record_failed_job() {
        let mut job = ConversionJob::new("/in/book.xlsx", JobMode::PerSheet);
        job.mark_failed("Test error".to_string());

        record_job_telemetry(&job);
    }

    #[test]
    fn test_unfinished_job_is_ignored() {
        let job = ConversionJob::new("/in/book.xlsx", JobMode::Aggregate);
        record_job_telemetry(&job);
    }
}
