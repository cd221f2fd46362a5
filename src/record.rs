use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MalformedRecordError;

/// A single compliance reading submitted by the upstream mask detector.
///
/// Records are immutable once fetched; the mirror replaces the whole set
/// rather than patching rows, because the change feed does not guarantee
/// delivery of the changed row's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRecord {
    /// When the detector produced this reading.
    pub observed_at: DateTime<Utc>,
    /// Subjects wearing a mask in this reading.
    pub using_mask_count: u64,
    /// Non-compliant subjects in this reading.
    pub not_using_mask_count: u64,
    /// Running series reported by the detector. Only the first element is
    /// consumed downstream: the cumulative total at the time of the reading.
    pub totals_series: Vec<u64>,
}

impl ObservationRecord {
    /// Cumulative total as of this reading, or 0 when the series is empty.
    pub fn cumulative_total(&self) -> u64 {
        self.totals_series.first().copied().unwrap_or(0)
    }

    /// Builds a record from one raw store row.
    ///
    /// A bad row fails here, one record at a time; callers log and skip it
    /// and keep the rest of the fetch.
    pub fn from_row(row: &Value) -> Result<Self, MalformedRecordError> {
        let observed_at = row
            .get("observed_at")
            .and_then(Value::as_str)
            .ok_or(MalformedRecordError::Field("observed_at"))?;
        let observed_at = parse_timestamp(observed_at)?;

        let using_mask_count = row
            .get("using_mask_count")
            .and_then(Value::as_u64)
            .ok_or(MalformedRecordError::Field("using_mask_count"))?;

        let not_using_mask_count = row
            .get("not_using_mask_count")
            .and_then(Value::as_u64)
            .ok_or(MalformedRecordError::Field("not_using_mask_count"))?;

        let totals_series = match row.get("totals_series") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .ok_or(MalformedRecordError::Field("totals_series"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(MalformedRecordError::Field("totals_series")),
        };

        Ok(Self {
            observed_at,
            using_mask_count,
            not_using_mask_count,
            totals_series,
        })
    }
}

/// Parses a store timestamp.
///
/// Accepts RFC 3339 with an offset as well as the bare
/// `YYYY-MM-DDTHH:MM:SS[.frac]` shape some stores emit, which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MalformedRecordError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(MalformedRecordError::Timestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let ts = parse_timestamp("2024-03-01T14:37:00+07:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T07:37:00+00:00");
    }

    #[test]
    fn test_parse_timestamp_bare_is_utc() {
        let ts = parse_timestamp("2024-03-01T14:37:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T14:37:00+00:00");

        let ts = parse_timestamp("2024-03-01T14:37:00.123456").unwrap();
        assert_eq!(ts.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday-ish").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_from_row_complete() {
        let row = json!({
            "observed_at": "2024-03-01T14:37:00Z",
            "using_mask_count": 4,
            "not_using_mask_count": 1,
            "totals_series": [12, 3],
        });

        let record = ObservationRecord::from_row(&row).unwrap();
        assert_eq!(record.using_mask_count, 4);
        assert_eq!(record.not_using_mask_count, 1);
        assert_eq!(record.cumulative_total(), 12);
    }

    #[test]
    fn test_from_row_missing_count_fails_that_row_only() {
        let row = json!({
            "observed_at": "2024-03-01T14:37:00Z",
            "not_using_mask_count": 1,
            "totals_series": [12],
        });

        let err = ObservationRecord::from_row(&row).unwrap_err();
        assert!(matches!(
            err,
            MalformedRecordError::Field("using_mask_count")
        ));
    }

    #[test]
    fn test_from_row_negative_count_rejected() {
        let row = json!({
            "observed_at": "2024-03-01T14:37:00Z",
            "using_mask_count": -2,
            "not_using_mask_count": 1,
            "totals_series": [],
        });

        assert!(ObservationRecord::from_row(&row).is_err());
    }

    #[test]
    fn test_from_row_missing_series_is_empty() {
        let row = json!({
            "observed_at": "2024-03-01T14:37:00Z",
            "using_mask_count": 4,
            "not_using_mask_count": 1,
        });

        let record = ObservationRecord::from_row(&row).unwrap();
        assert!(record.totals_series.is_empty());
        assert_eq!(record.cumulative_total(), 0);
    }
}
