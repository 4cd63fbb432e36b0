//! CSV performance log: one row per task that finished running or aged out.

use std::fs::{create_dir_all, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::core::{AuditAction, AuditEvent, AuditSink, SchedulerError, TaskRecord, TaskStatus};

const HEADER: &str = "timestamp,task_name,enqueue_time,start_time,end_time,wait_time,exec_duration,deadline,deadline_status";

/// Appends finished tasks to a CSV file.
pub struct PerfLogSink {
    path: PathBuf,
    writer: BufWriter<std::fs::File>,
}

impl PerfLogSink {
    /// Open (or create) the log, writing the header when the file is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent).map_err(|e| SchedulerError::Backend(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        let fresh = file
            .metadata()
            .map_err(|e| SchedulerError::Backend(e.to_string()))?
            .len()
            == 0;
        let mut writer = BufWriter::new(file);
        if fresh {
            writeln!(writer, "{HEADER}")
                .and_then(|()| writer.flush())
                .map_err(|e| SchedulerError::Backend(e.to_string()))?;
        }
        Ok(Self { path, writer })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn row(record: &TaskRecord) -> String {
        let missed = record.status == TaskStatus::DeadlineMissed || record.deadline_exceeded;
        let deadline_status = if missed {
            "missed"
        } else {
            "on-time"
        };
        [
            Utc::now().to_rfc3339(),
            escape(&record.descriptor.name),
            secs(Some(record.submitted_at_ms)),
            secs(record.started_at_ms),
            secs(record.finished_at_ms),
            secs(record.wait_ms()),
            secs(record.exec_ms()),
            secs(record.descriptor.deadline_ms),
            deadline_status.to_string(),
        ]
        .join(",")
    }
}

impl AuditSink for PerfLogSink {
    fn record(&mut self, event: AuditEvent) {
        // rejected tasks never entered the queue
        if !event.action.is_final() || event.action == AuditAction::Reject {
            return;
        }
        let line = Self::row(&event.record);
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            tracing::error!("failed to write performance log {}: {e}", self.path.display());
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn secs(ms: Option<u128>) -> String {
    ms.map(|ms| format!("{:.3}", ms as f64 / 1000.0))
        .unwrap_or_default()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
