//! CSV loader for the surgery batch.
//!
//! Row-level issues are collected into a [`LoadResult`] envelope instead
//! of aborting: if any issue is present the envelope reports
//! `success = false` with an empty surgery set, and the pipeline halts.
//! Only structural problems (missing file, bad header) raise immediately.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::domain::Surgery;
use crate::error::SchedulerError;

const REQUIRED_COLUMNS: [&str; 3] = ["surgery_id", "start_time", "end_time"];

/// Category of a row-level load issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadIssueKind {
    MissingId,
    InvalidDatetime,
    NonPositiveDuration,
    DuplicateId,
}

/// One rejected input row with enough context to fix the file.
#[derive(Debug, Clone, Serialize)]
pub struct LoadIssue {
    pub kind: LoadIssueKind,
    /// 1-based file line, header counted as line 1.
    pub line_no: usize,
    pub surgery_id: Option<String>,
    pub message: String,
}

/// Envelope returned by the loader.
///
/// `success = false` implies `surgeries` is empty and `errors` holds at
/// least one issue.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    pub success: bool,
    pub surgeries: Vec<Surgery>,
    pub errors: Vec<LoadIssue>,
    pub total_rows: usize,
    pub kept_rows: usize,
}

/// CSV → `LoadResult<Surgery>`.
#[derive(Debug, Default)]
pub struct SurgeriesLoader;

impl SurgeriesLoader {
    pub fn new() -> Self {
        Self
    }

    /// Loads and validates the surgery CSV.
    ///
    /// Fatal failures (missing file, unreadable content, invalid header)
    /// return a `DataError`; per-row problems land in the envelope.
    pub fn load(&self, path: &Path) -> Result<LoadResult, SchedulerError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| {
                SchedulerError::data(
                    format!("unable to read input CSV {}: {e}", path.display()),
                    "SurgeriesLoader::load",
                    "Verify the file path and that the CSV is present and readable.",
                )
            })?;

        let columns = self.column_indices(&mut reader)?;
        let result = self.rows_to_result(&mut reader, columns)?;
        self.report_summary(path, &result);
        Ok(result)
    }

    /// Resolves required column positions, ignoring extra columns.
    fn column_indices(
        &self,
        reader: &mut csv::Reader<std::fs::File>,
    ) -> Result<[usize; 3], SchedulerError> {
        let headers = reader.headers().map_err(|e| {
            SchedulerError::data(
                format!("CSV has no readable header row: {e}"),
                "SurgeriesLoader::column_indices",
                "Ensure the first line contains column names.",
            )
        })?;

        let mut indices = [0usize; 3];
        for (slot, required) in REQUIRED_COLUMNS.iter().enumerate() {
            match headers.iter().position(|h| h == *required) {
                Some(idx) => indices[slot] = idx,
                None => {
                    return Err(SchedulerError::data(
                        format!("invalid CSV header: missing required column '{required}'"),
                        "SurgeriesLoader::column_indices",
                        "Add required columns: surgery_id,start_time,end_time",
                    ))
                }
            }
        }
        Ok(indices)
    }

    fn rows_to_result(
        &self,
        reader: &mut csv::Reader<std::fs::File>,
        [id_col, start_col, end_col]: [usize; 3],
    ) -> Result<LoadResult, SchedulerError> {
        let mut issues: Vec<LoadIssue> = Vec::new();
        let mut surgeries: Vec<Surgery> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut total_rows = 0usize;

        for (row_idx, record) in reader.records().enumerate() {
            let line_no = row_idx + 2; // header is line 1
            total_rows += 1;

            let record = record.map_err(|e| {
                SchedulerError::data(
                    format!("structurally invalid CSV row at line {line_no}: {e}"),
                    "SurgeriesLoader::rows_to_result",
                    "Fix the malformed row (quoting, field count) and rerun.",
                )
            })?;

            let sid = record.get(id_col).unwrap_or("").to_string();
            if sid.is_empty() {
                issues.push(LoadIssue {
                    kind: LoadIssueKind::MissingId,
                    line_no,
                    surgery_id: None,
                    message: "Missing surgery_id".to_string(),
                });
                continue;
            }

            let start_raw = record.get(start_col).unwrap_or("");
            let end_raw = record.get(end_col).unwrap_or("");
            let (start_time, end_time) = match (parse_instant(start_raw), parse_instant(end_raw)) {
                (Ok(s), Ok(e)) => (s, e),
                (Err(msg), _) | (_, Err(msg)) => {
                    issues.push(LoadIssue {
                        kind: LoadIssueKind::InvalidDatetime,
                        line_no,
                        surgery_id: Some(sid),
                        message: format!("Invalid datetime format: {msg}"),
                    });
                    continue;
                }
            };

            if start_time >= end_time {
                issues.push(LoadIssue {
                    kind: LoadIssueKind::NonPositiveDuration,
                    line_no,
                    surgery_id: Some(sid),
                    message: "start_time >= end_time".to_string(),
                });
                continue;
            }

            // Duplicates keep the first valid record; later rows are issues.
            if !seen_ids.insert(sid.clone()) {
                issues.push(LoadIssue {
                    kind: LoadIssueKind::DuplicateId,
                    line_no,
                    surgery_id: Some(sid),
                    message: "Duplicate surgery_id (later occurrence skipped)".to_string(),
                });
                continue;
            }

            surgeries.push(Surgery {
                surgery_id: sid,
                start_time,
                end_time,
            });
        }

        if !issues.is_empty() {
            return Ok(LoadResult {
                success: false,
                surgeries: Vec::new(),
                errors: issues,
                total_rows,
                kept_rows: 0,
            });
        }

        surgeries.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        let kept_rows = surgeries.len();
        Ok(LoadResult {
            success: true,
            surgeries,
            errors: Vec::new(),
            total_rows,
            kept_rows,
        })
    }

    fn report_summary(&self, path: &Path, result: &LoadResult) {
        if result.success {
            info!(
                kept = result.kept_rows,
                total = result.total_rows,
                path = %path.display(),
                "surgeries loaded"
            );
        } else {
            let mut counts: Vec<(LoadIssueKind, usize)> = Vec::new();
            for issue in &result.errors {
                match counts.iter_mut().find(|(k, _)| *k == issue.kind) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((issue.kind, 1)),
                }
            }
            let summary = counts
                .iter()
                .map(|(k, n)| format!("{k:?}={n}"))
                .collect::<Vec<_>>()
                .join(", ");
            error!(
                issues = result.errors.len(),
                total = result.total_rows,
                path = %path.display(),
                %summary,
                "surgeries load failed"
            );
        }
    }
}

/// Parses an ISO-8601 timezone-aware instant, normalizing to UTC.
///
/// Naive timestamps are rejected; a trailing `Z` reads as UTC.
fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("{raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surgeries.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_and_sorts_by_start_time() {
        let (_dir, path) = write_csv(
            "surgery_id,start_time,end_time\n\
             s2,2025-01-01T10:00:00Z,2025-01-01T11:00:00Z\n\
             s1,2025-01-01T08:00:00Z,2025-01-01T09:00:00Z\n",
        );
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(result.success);
        assert_eq!(result.kept_rows, 2);
        assert_eq!(result.surgeries[0].surgery_id, "s1");
        assert_eq!(result.surgeries[1].surgery_id, "s2");
    }

    #[test]
    fn extra_columns_are_ignored() {
        let (_dir, path) = write_csv(
            "room_hint,surgery_id,start_time,end_time\n\
             R9,s1,2025-01-01T08:00:00Z,2025-01-01T09:00:00Z\n",
        );
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(result.success);
        assert_eq!(result.surgeries[0].surgery_id, "s1");
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let (_dir, path) = write_csv(
            "surgery_id,start_time,end_time\n\
             s1,2025-01-01T10:00:00+02:00,2025-01-01T11:00:00+02:00\n",
        );
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(result.success);
        assert_eq!(
            result.surgeries[0].start_time,
            "2025-01-01T08:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn row_issues_empty_the_envelope() {
        let (_dir, path) = write_csv(
            "surgery_id,start_time,end_time\n\
             ,2025-01-01T08:00:00Z,2025-01-01T09:00:00Z\n\
             s2,not-a-date,2025-01-01T09:00:00Z\n\
             s3,2025-01-01T09:00:00Z,2025-01-01T09:00:00Z\n\
             s4,2025-01-01T08:00:00Z,2025-01-01T09:00:00Z\n\
             s4,2025-01-01T10:00:00Z,2025-01-01T11:00:00Z\n",
        );
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(!result.success);
        assert!(result.surgeries.is_empty());
        assert_eq!(result.kept_rows, 0);
        assert_eq!(result.total_rows, 5);

        let kinds: Vec<LoadIssueKind> = result.errors.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                LoadIssueKind::MissingId,
                LoadIssueKind::InvalidDatetime,
                LoadIssueKind::NonPositiveDuration,
                LoadIssueKind::DuplicateId,
            ]
        );
        assert_eq!(result.errors[3].line_no, 6);
    }

    #[test]
    fn naive_timestamps_are_rejected() {
        let (_dir, path) = write_csv(
            "surgery_id,start_time,end_time\n\
             s1,2025-01-01T08:00:00,2025-01-01T09:00:00\n",
        );
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(!result.success);
        assert_eq!(result.errors[0].kind, LoadIssueKind::InvalidDatetime);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = SurgeriesLoader::new()
            .load(Path::new("/nonexistent/surgeries.csv"))
            .unwrap_err();
        assert_eq!(err.kind(), "DataError");
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let (_dir, path) = write_csv("surgery_id,begin,end\ns1,a,b\n");
        let err = SurgeriesLoader::new().load(&path).unwrap_err();
        assert_eq!(err.kind(), "DataError");
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn empty_file_with_header_succeeds_empty() {
        let (_dir, path) = write_csv("surgery_id,start_time,end_time\n");
        let result = SurgeriesLoader::new().load(&path).unwrap();
        assert!(result.success);
        assert!(result.surgeries.is_empty());
        assert_eq!(result.total_rows, 0);
    }
}
