//! Calendar bucketing of timestamps.
//!
//! Keys are `YYYY-MM-DD` for days, the Monday of the ISO week as `YYYY-MM-DD`
//! for weeks, and `YYYY-MM` for months. Enumeration is gapless: every bucket
//! touching the requested range is produced whether or not it has data.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, Utc};

use crate::error::{LookoutError, LookoutResult};
use crate::types::{Bucket, Granularity};

/// Format used for day and week keys, and for every date echoed in reports
pub const DATE_FORMAT: &str = "%Y-%m-%d";
const MONTH_FORMAT: &str = "%Y-%m";

/// Assigns dates to buckets and enumerates bucket sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct Bucketizer;

impl Bucketizer {
    /// First day of the bucket containing `date`
    pub fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
        match granularity {
            Granularity::Day => date,
            Granularity::Week => {
                date - ChronoDuration::days(date.weekday().num_days_from_monday() as i64)
            }
            Granularity::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// Last day (inclusive) of the bucket starting at `start`
    fn bucket_end(start: NaiveDate, granularity: Granularity) -> NaiveDate {
        match granularity {
            Granularity::Day => start,
            Granularity::Week => start + ChronoDuration::days(6),
            Granularity::Month => start
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .unwrap_or(start),
        }
    }

    fn next_start(start: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
        match granularity {
            Granularity::Day => start.succ_opt(),
            Granularity::Week => start.checked_add_signed(ChronoDuration::days(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    fn format_key(start: NaiveDate, granularity: Granularity) -> String {
        match granularity {
            Granularity::Day | Granularity::Week => start.format(DATE_FORMAT).to_string(),
            Granularity::Month => start.format(MONTH_FORMAT).to_string(),
        }
    }

    /// Bucket key of a calendar date
    pub fn date_key(date: NaiveDate, granularity: Granularity) -> String {
        Self::format_key(Self::bucket_start(date, granularity), granularity)
    }

    /// Bucket key of a timestamp, using its UTC calendar date
    pub fn bucket_key(timestamp: DateTime<Utc>, granularity: Granularity) -> String {
        Self::date_key(timestamp.date_naive(), granularity)
    }

    /// The bucket containing `date`
    pub fn bucket_for(date: NaiveDate, granularity: Granularity) -> Bucket {
        let start = Self::bucket_start(date, granularity);
        Bucket {
            key: Self::format_key(start, granularity),
            start_date: start,
            end_date: Self::bucket_end(start, granularity),
        }
    }

    /// Every bucket touching `[start, end]`, ascending and gapless
    pub fn enumerate_buckets(
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> LookoutResult<Vec<Bucket>> {
        if start > end {
            return Err(LookoutError::invalid_range(start, end));
        }

        let mut buckets = Vec::new();
        let mut cursor = Some(Self::bucket_start(start, granularity));
        while let Some(bucket_start) = cursor.filter(|s| *s <= end) {
            buckets.push(Bucket {
                key: Self::format_key(bucket_start, granularity),
                start_date: bucket_start,
                end_date: Self::bucket_end(bucket_start, granularity),
            });
            cursor = Self::next_start(bucket_start, granularity);
        }
        Ok(buckets)
    }

    /// Keys of [`Bucketizer::enumerate_buckets`]
    pub fn enumerate_keys(
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> LookoutResult<Vec<String>> {
        Ok(Self::enumerate_buckets(start, end, granularity)?
            .into_iter()
            .map(|b| b.key)
            .collect())
    }
}
