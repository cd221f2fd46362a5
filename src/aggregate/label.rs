//! Axis and tooltip label formatting for the chart layer.
//!
//! Consumes bucket keys produced by [`super::bucket`]; the unpadded key
//! shape is part of that contract. Keys that fail to parse pass through
//! unchanged rather than erroring the render.

use chrono::NaiveDate;

use super::bucket::Granularity;

/// Short x-axis tick label for a bucket key.
///
/// Sub-hour keys shrink to `H:MM`, daily keys to `Mon D`; everything else
/// is already short enough to show as-is.
pub fn axis_label(key: &str, granularity: Granularity) -> String {
    match granularity {
        Granularity::None | Granularity::Monthly | Granularity::Yearly => key.to_string(),
        Granularity::TenMinutes | Granularity::ThirtyMinutes | Granularity::Hourly => {
            sub_hour_axis(key).unwrap_or_else(|| key.to_string())
        }
        Granularity::Daily => daily_axis(key).unwrap_or_else(|| key.to_string()),
    }
}

/// Tooltip heading for a bucket: the bucket's calendar day, long form
/// ("Mar 1, 2024"). The unbucketed view's keys are already full labels.
pub fn tooltip_label(key: &str, granularity: Granularity) -> String {
    if granularity == Granularity::None {
        return key.to_string();
    }
    bucket_day(key, granularity)
        .map(|day| day.format("%b %-d, %Y").to_string())
        .unwrap_or_else(|| key.to_string())
}

// "2024-3-1 14:30:00" -> "14:30"; "2024-3-1 9:0:00" -> "9:00".
fn sub_hour_axis(key: &str) -> Option<String> {
    let time = key.split(' ').nth(1)?;
    let mut parts = time.split(':');
    let hour = parts.next()?;
    let minute = parts.next()?;
    Some(format!("{hour}:{minute:0>2}"))
}

// "3/1/2024" -> "Mar 1".
fn daily_axis(key: &str) -> Option<String> {
    let date = NaiveDate::parse_from_str(key, "%m/%d/%Y").ok()?;
    Some(date.format("%b %-d").to_string())
}

fn bucket_day(key: &str, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::TenMinutes | Granularity::ThirtyMinutes | Granularity::Hourly => {
            NaiveDate::parse_from_str(key.split(' ').next()?, "%Y-%m-%d").ok()
        }
        Granularity::Daily => NaiveDate::parse_from_str(key, "%m/%d/%Y").ok(),
        Granularity::Monthly => NaiveDate::parse_from_str(&format!("{key}-1"), "%Y-%m-%d").ok(),
        Granularity::Yearly => NaiveDate::parse_from_str(&format!("{key}-1-1"), "%Y-%m-%d").ok(),
        Granularity::None => None,
    }
}
