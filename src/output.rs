//! Output formatting and persistence for aggregated results.
//!
//! Supports pretty JSON logging, one-shot CSV export of a bucket table, and
//! an append-only CSV log of headline totals over time.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::bucket::AggregatedBucket;
use crate::aggregate::totals::Totals;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs any serializable aggregate as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes the bucket table to `path` as CSV, replacing any existing file.
pub fn export_buckets(path: &str, buckets: &[AggregatedBucket]) -> Result<()> {
    debug!(path, rows = buckets.len(), "Writing bucket CSV");

    let mut writer = WriterBuilder::new().from_path(path)?;
    for bucket in buckets {
        writer.serialize(bucket)?;
    }
    writer.flush()?;

    Ok(())
}

/// One appended row of the totals log.
#[derive(Debug, Serialize)]
pub struct TotalsRow {
    pub logged_at: DateTime<Utc>,
    pub using: u64,
    pub not_using: u64,
    pub total: u64,
}

impl TotalsRow {
    pub fn new(totals: Totals) -> Self {
        Self {
            logged_at: Utc::now(),
            using: totals.using,
            not_using: totals.not_using,
            total: totals.total,
        }
    }
}

/// Appends a totals row to a CSV log.
///
/// Creates the file with headers if it does not already exist.
pub fn append_totals(path: &str, row: &TotalsRow) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending totals row");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(row)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn totals_row() -> TotalsRow {
        TotalsRow::new(Totals {
            using: 7,
            not_using: 3,
            total: 14,
        })
    }

    #[test]
    fn test_print_json_does_not_panic() {
        let buckets = vec![AggregatedBucket {
            key: "2024-3".to_string(),
            using: 1,
            not_using: 2,
            total: 3,
        }];
        print_json(&buckets).unwrap();
    }

    #[test]
    fn test_export_buckets_writes_header_and_rows() {
        let path = temp_path("masq_engine_test_export.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        let buckets = vec![
            AggregatedBucket {
                key: "2024-1".to_string(),
                using: 1,
                not_using: 0,
                total: 1,
            },
            AggregatedBucket {
                key: "2024-2".to_string(),
                using: 2,
                not_using: 1,
                total: 4,
            },
        ];
        export_buckets(&path, &buckets).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "key,using,not_using,total");
        assert_eq!(lines[2], "2024-2,2,1,4");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_totals_creates_file() {
        let path = temp_path("masq_engine_test_create.csv");
        let _ = fs::remove_file(&path);

        append_totals(&path, &totals_row()).unwrap();

        assert!(Path::new(&path).exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.is_empty());

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_totals_writes_header_once() {
        let path = temp_path("masq_engine_test_header.csv");
        let _ = fs::remove_file(&path);

        append_totals(&path, &totals_row()).unwrap();
        append_totals(&path, &totals_row()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // Header line should appear exactly once
        let header_count = content.lines().filter(|l| l.contains("logged_at")).count();
        assert_eq!(header_count, 1);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_totals_two_rows() {
        let path = temp_path("masq_engine_test_rows.csv");
        let _ = fs::remove_file(&path);

        append_totals(&path, &totals_row()).unwrap();
        append_totals(&path, &totals_row()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        // 1 header + 2 data rows
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        fs::remove_file(&path).unwrap();
    }
}
