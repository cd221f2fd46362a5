//! Bucketed aggregation of observation records.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::record::ObservationRecord;

/// Time-bucketing mode for the chart.
///
/// The wire names (`none`, `10min`, `30min`, `hourly`, `daily`, `monthly`,
/// `yearly`) are what the selector and the CLI accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// No bucketing: one output row per raw record.
    #[default]
    None,
    TenMinutes,
    ThirtyMinutes,
    Hourly,
    Daily,
    Monthly,
    Yearly,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::None => "none",
            Granularity::TenMinutes => "10min",
            Granularity::ThirtyMinutes => "30min",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    /// Sub-hour views are restricted to the most recent calendar day present
    /// in the record set, so the chart stays legible.
    pub fn is_sub_hour(self) -> bool {
        matches!(
            self,
            Granularity::TenMinutes | Granularity::ThirtyMinutes | Granularity::Hourly
        )
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Granularity::None),
            "10min" => Ok(Granularity::TenMinutes),
            "30min" => Ok(Granularity::ThirtyMinutes),
            "hourly" => Ok(Granularity::Hourly),
            "daily" => Ok(Granularity::Daily),
            "monthly" => Ok(Granularity::Monthly),
            "yearly" => Ok(Granularity::Yearly),
            other => Err(format!(
                "unknown granularity `{other}` (expected none, 10min, 30min, hourly, daily, monthly or yearly)"
            )),
        }
    }
}

/// One row of engine output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedBucket {
    /// Bucket key; also the chart's x-axis value.
    pub key: String,
    /// Sum of `using_mask_count` over the bucket's records.
    pub using: u64,
    /// Sum of `not_using_mask_count` over the bucket's records.
    pub not_using: u64,
    /// Cumulative total as of the newest record seen for this bucket.
    /// Last write wins; this is intentionally not a per-bucket sum.
    pub total: u64,
}

/// Aggregates the full record set at the given granularity.
///
/// Buckets are emitted in first-encounter order, so a chronologically
/// ordered input yields chronologically ordered buckets. Ordering the input
/// is the caller's responsibility.
///
/// Empty input yields empty output. The function never fails: malformed
/// records are rejected at the ingestion boundary, not here.
pub fn aggregate(
    records: &[ObservationRecord],
    granularity: Granularity,
) -> Vec<AggregatedBucket> {
    if granularity == Granularity::None {
        return records
            .iter()
            .map(|record| AggregatedBucket {
                key: full_label(record.observed_at),
                using: record.using_mask_count,
                not_using: record.not_using_mask_count,
                total: record.cumulative_total(),
            })
            .collect();
    }

    // Most recent calendar day in the set; ties collapse to the max
    // timestamp's date.
    let latest_day = records
        .iter()
        .map(|record| record.observed_at)
        .max()
        .map(|ts| ts.date_naive());

    let mut buckets: Vec<AggregatedBucket> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        if granularity.is_sub_hour() && Some(record.observed_at.date_naive()) != latest_day {
            continue;
        }

        let key = bucket_key(record.observed_at, granularity);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            buckets.push(AggregatedBucket {
                key,
                using: 0,
                not_using: 0,
                total: 0,
            });
            buckets.len() - 1
        });

        let bucket = &mut buckets[slot];
        bucket.using += record.using_mask_count;
        bucket.not_using += record.not_using_mask_count;
        bucket.total = record.cumulative_total();
    }

    buckets
}

/// Derives the bucket key by truncating the timestamp to the granularity
/// boundary (UTC).
///
/// Numeric components are unpadded (`2024-3-1 14:30:00`); the label layer
/// depends on this shape, so it is part of the output contract.
pub fn bucket_key(ts: DateTime<Utc>, granularity: Granularity) -> String {
    let (y, m, d) = (ts.year(), ts.month(), ts.day());
    match granularity {
        Granularity::None => full_label(ts),
        Granularity::TenMinutes => {
            format!("{y}-{m}-{d} {}:{}:00", ts.hour(), ts.minute() / 10 * 10)
        }
        Granularity::ThirtyMinutes => {
            format!("{y}-{m}-{d} {}:{}:00", ts.hour(), ts.minute() / 30 * 30)
        }
        Granularity::Hourly => format!("{y}-{m}-{d} {}:00", ts.hour()),
        Granularity::Daily => format!("{m}/{d}/{y}"),
        Granularity::Monthly => format!("{y}-{m}"),
        Granularity::Yearly => format!("{y}"),
    }
}

/// Full timestamp label used by the unbucketed view ("Mar 1, 2024, 02:37 PM").
fn full_label(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %Y, %I:%M %p").to_string()
}
