//! Artifact writers.
//!
//! Every artifact goes through the same scoped temp-file acquisition in
//! the destination directory, atomically renamed into place on successful
//! close, so a concurrent re-run never exposes a torn file.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;
use tracing::debug;

use crate::error::SchedulerError;
use crate::extract::SolutionRow;

const SOLUTION_COLUMNS: [&str; 5] = [
    "surgery_id",
    "start_time",
    "end_time",
    "anesthetist_id",
    "room_id",
];

/// Writes `solution.csv` with UTC `+00:00` timestamps.
///
/// An empty schedule still produces the header row.
pub fn write_solution_csv(rows: &[SolutionRow], path: &Path) -> Result<(), SchedulerError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for row in rows {
        if !seen.insert(row.surgery_id.as_str()) {
            return Err(SchedulerError::data(
                format!("duplicate surgery_id in export: {}", row.surgery_id),
                "write_solution_csv",
                "Ensure a unique surgery_id per exported row.",
            ));
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(SOLUTION_COLUMNS).map_err(csv_error)?;
    for row in rows {
        let start = row.start_time.to_rfc3339_opts(SecondsFormat::Secs, false);
        let end = row.end_time.to_rfc3339_opts(SecondsFormat::Secs, false);
        writer
            .write_record([
                row.surgery_id.as_str(),
                start.as_str(),
                end.as_str(),
                row.anesthetist_id.as_str(),
                row.room_id.as_str(),
            ])
            .map_err(csv_error)?;
    }
    let bytes = writer.into_inner().map_err(|e| {
        SchedulerError::data(
            format!("CSV buffer flush failed: {e}"),
            "write_solution_csv",
            "Retry the export; this indicates an in-memory I/O failure.",
        )
    })?;

    write_atomic(path, &bytes)
}

/// Serializes any report payload to pretty JSON, atomically.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), SchedulerError> {
    let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| {
        SchedulerError::data(
            format!("JSON serialization failed: {e}"),
            "write_json",
            "Report payloads must be JSON-serializable (no NaN/Inf).",
        )
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes)
}

/// Writes a plain-text artifact (the solver log), atomically.
pub fn write_text(text: &str, path: &Path) -> Result<(), SchedulerError> {
    write_atomic(path, text.as_bytes())
}

/// Temp file in the destination directory, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SchedulerError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| io_error(path, e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(path, e))?;
    temp.write_all(bytes).map_err(|e| io_error(path, e))?;
    temp.persist(path).map_err(|e| io_error(path, e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

fn io_error(path: &Path, e: std::io::Error) -> SchedulerError {
    SchedulerError::data(
        format!("failed to write artifact {}: {e}", path.display()),
        "export::write_atomic",
        "Check disk permissions and free space.",
    )
}

fn csv_error(e: csv::Error) -> SchedulerError {
    SchedulerError::data(
        format!("CSV encoding failed: {e}"),
        "write_solution_csv",
        "Inspect the offending row values.",
    )
}
