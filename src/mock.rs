//! Synthetic ridership used whenever the model or its data cannot answer.
//!
//! Daily values are flat noise around a fixed base. Hourly values follow a
//! time-of-day table with a weekend discount so that fallback answers still
//! look like a bus network's day.

use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use rand::Rng;

/// Hours in a week; hour-of-day and weekday repeat with this period.
const HOURS_PER_WEEK: u32 = 24 * 7;

/// Lower bound for hourly fallback values.
pub const HOURLY_FLOOR: i64 = 5;

const WEEKEND_FACTOR: f64 = 0.7;

/// Half-open range of the jitter added after the weekend adjustment.
const FINAL_JITTER: (i64, i64) = (-10, 15);

/// Time-of-day band of the hourly table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourBucket {
    /// 07-09 and 17-19.
    Rush,
    /// 10-16.
    Midday,
    /// 20-23.
    Evening,
    /// Everything else.
    Overnight,
}

impl HourBucket {
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            7..=9 | 17..=19 => HourBucket::Rush,
            10..=16 => HourBucket::Midday,
            20..=23 => HourBucket::Evening,
            _ => HourBucket::Overnight,
        }
    }

    pub fn base(self) -> i64 {
        match self {
            HourBucket::Rush => 120,
            HourBucket::Midday => 75,
            HourBucket::Evening => 45,
            HourBucket::Overnight => 15,
        }
    }

    /// Half-open jitter range added to the base.
    pub fn jitter(self) -> (i64, i64) {
        match self {
            HourBucket::Rush => (-15, 25),
            HourBucket::Midday => (-10, 15),
            HourBucket::Evening => (-8, 12),
            HourBucket::Overnight => (-5, 8),
        }
    }
}

fn is_weekend(time: &NaiveDateTime) -> bool {
    matches!(time.weekday(), Weekday::Sat | Weekday::Sun)
}

/// How a granularity produces values without the model.
#[derive(Debug, Clone, PartialEq)]
pub enum MockPolicy {
    /// `base` plus uniform noise in `[low, high)`, independent of time.
    Flat { base: i64, low: i64, high: i64 },
    /// Hour-of-day table with weekend discount.
    TimeOfDay,
}

impl MockPolicy {
    pub fn daily() -> Self {
        MockPolicy::Flat {
            base: 10_000,
            low: -2_000,
            high: 2_000,
        }
    }

    pub fn hourly() -> Self {
        MockPolicy::TimeOfDay
    }

    /// Produce a value for `horizon` hours/days after `now` (local wall time).
    pub fn generate<R: Rng + ?Sized>(&self, now: NaiveDateTime, horizon: u32, rng: &mut R) -> i64 {
        match *self {
            MockPolicy::Flat { base, low, high } => base + rng.gen_range(low..high),
            MockPolicy::TimeOfDay => {
                let target = hourly_target(now, horizon);
                let value = hourly_mock(target, rng);
                tracing::debug!(
                    horizon,
                    target_time = %target.format("%H:%M on %A"),
                    value,
                    "Mock hourly prediction"
                );
                value
            }
        }
    }
}

/// Wall time `horizon` hours after `now`, reduced modulo one week.
///
/// Only hour of day and weekday feed the table, so any horizon is answerable
/// without date overflow.
pub fn hourly_target(now: NaiveDateTime, horizon: u32) -> NaiveDateTime {
    now + Duration::hours(i64::from(horizon % HOURS_PER_WEEK))
}

/// Ridership for the hour containing `target`.
pub fn hourly_mock<R: Rng + ?Sized>(target: NaiveDateTime, rng: &mut R) -> i64 {
    let bucket = HourBucket::for_hour(target.hour());
    let (low, high) = bucket.jitter();
    let mut ridership = bucket.base() + rng.gen_range(low..high);

    if is_weekend(&target) {
        ridership = (ridership as f64 * WEEKEND_FACTOR) as i64;
    }

    let variation = rng.gen_range(FINAL_JITTER.0..FINAL_JITTER.1);
    (ridership + variation).max(HOURLY_FLOOR)
}
