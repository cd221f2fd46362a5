//! Headline totals over the bucketed output.

use serde::Serialize;

use super::bucket::AggregatedBucket;

/// Scalar sums over a bucket sequence.
///
/// `total` sums the per-bucket `total` fields, which are themselves
/// last-write snapshots; the grand total is a sum of snapshots, not a count
/// of distinct subjects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub using: u64,
    pub not_using: u64,
    pub total: u64,
}

/// Sums the three columns of the aggregated output.
pub fn totals(buckets: &[AggregatedBucket]) -> Totals {
    let mut acc = Totals::default();
    for bucket in buckets {
        acc.using += bucket.using;
        acc.not_using += bucket.not_using;
        acc.total += bucket.total;
    }
    acc
}

/// The three totals formatted for direct display on the headline tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadlineTotals {
    pub using: String,
    pub not_using: String,
    pub total: String,
}

/// Computes and formats the column sums with grouped thousands.
pub fn headline_totals(buckets: &[AggregatedBucket]) -> HeadlineTotals {
    let sums = totals(buckets);
    HeadlineTotals {
        using: format_grouped(sums.using),
        not_using: format_grouped(sums.not_using),
        total: format_grouped(sums.total),
    }
}

/// Groups a number with comma thousands separators (1234567 -> "1,234,567").
pub fn format_grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(key: &str, using: u64, not_using: u64, total: u64) -> AggregatedBucket {
        AggregatedBucket {
            key: key.to_string(),
            using,
            not_using,
            total,
        }
    }

    #[test]
    fn test_totals_sum_all_three_columns() {
        let buckets = vec![bucket("2024-1", 3, 2, 5), bucket("2024-2", 4, 1, 9)];

        let sums = totals(&buckets);
        assert_eq!(sums.using, 7);
        assert_eq!(sums.not_using, 3);
        // Sum of per-bucket snapshots, by construction.
        assert_eq!(sums.total, 14);
    }

    #[test]
    fn test_empty_buckets_yield_zero_headlines() {
        let headline = headline_totals(&[]);
        assert_eq!(headline.using, "0");
        assert_eq!(headline.not_using, "0");
        assert_eq!(headline.total, "0");
    }

    #[test]
    fn test_headline_totals_are_grouped() {
        let buckets = vec![bucket("2024", 1_234_567, 890, 1_000)];

        let headline = headline_totals(&buckets);
        assert_eq!(headline.using, "1,234,567");
        assert_eq!(headline.not_using, "890");
        assert_eq!(headline.total, "1,000");
    }

    #[test]
    fn test_format_grouped_boundaries() {
        assert_eq!(format_grouped(0), "0");
        assert_eq!(format_grouped(999), "999");
        assert_eq!(format_grouped(1_000), "1,000");
        assert_eq!(format_grouped(999_999), "999,999");
        assert_eq!(format_grouped(1_000_000), "1,000,000");
    }
}
