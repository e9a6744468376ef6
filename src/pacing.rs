//! Schedule planning and pacing arithmetic
//!
//! Single implementation of the campaign timing rules, shared by the
//! admission planner, the operator schedule preview, and the dispatcher.
//! `plan_schedule` produces the expected-value preview (`(min+max)/2` per
//! step); the live dispatcher swaps each average for a uniform sample via
//! `sample_required_delay_secs` but applies the same gates, so the preview
//! is the expected timing of the real run.
//!
//! All arithmetic is in integer seconds. `HH:MM` policy fields are
//! interpreted as minute-of-day in the fixed campaign timezone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Timelike, Utc};
use rand::Rng;

use crate::policy::{AutomaticPause, MinuteOfDay, PolicyConfig};

/// Offset of the deployed default campaign timezone, hours east of UTC
pub const DEFAULT_TZ_OFFSET_HOURS: i32 = -3;

/// The deployed default campaign timezone (UTC-3)
#[must_use]
pub fn default_campaign_tz() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_TZ_OFFSET_HOURS * 3600)
        .expect("UTC-3 is a valid fixed offset")
}

/// Builds a campaign timezone from a whole-hour offset
#[must_use]
pub fn tz_from_offset_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
}

/// Minutes past local midnight of an instant in the campaign timezone
#[must_use]
pub fn minute_of_day(at: DateTime<Utc>, tz: FixedOffset) -> u32 {
    let local = at.with_timezone(&tz);
    local.hour() * 60 + local.minute()
}

/// Local calendar date of an instant in the campaign timezone
#[must_use]
pub fn local_date(at: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

/// Whether an instant falls outside the allowed `[resume_at, pause_at)`
/// business window
#[must_use]
pub fn outside_business_hours(
    at: DateTime<Utc>,
    tz: FixedOffset,
    pause_at: MinuteOfDay,
    resume_at: MinuteOfDay,
) -> bool {
    let m = minute_of_day(at, tz);
    m >= pause_at.minutes() || m < resume_at.minutes()
}

/// Whether the one-shot pause holds sending at `at`
///
/// Active while `at` precedes the absolute resume instant and either the
/// local time of day has reached `pause_at` or `at` is on a day strictly
/// after the campaign start day.
#[must_use]
pub fn one_shot_pause_active(
    pause: &AutomaticPause,
    at: DateTime<Utc>,
    start: DateTime<Utc>,
    tz: FixedOffset,
) -> bool {
    at < pause.resume_at
        && (minute_of_day(at, tz) >= pause.pause_at.minutes()
            || local_date(at, tz) > local_date(start, tz))
}

fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}

/// Snaps an instant to the given minute-of-day on its local calendar date
fn at_minute_of_day(at: DateTime<Utc>, tz: FixedOffset, m: MinuteOfDay) -> DateTime<Utc> {
    let local = local_date(at, tz)
        .and_hms_opt(m.hour(), m.minute(), 0)
        .expect("minute-of-day fits the 24-hour clock");
    tz.from_local_datetime(&local)
        .single()
        .expect("fixed offsets have no ambiguous local times")
        .with_timezone(&Utc)
}

/// Rolls an instant forward past the daily business pause window
///
/// Past `pause_at` advances to the next day; either way the time of day is
/// snapped to `resume_at`.
fn roll_past_business_pause(
    cursor: DateTime<Utc>,
    tz: FixedOffset,
    pause_at: MinuteOfDay,
    resume_at: MinuteOfDay,
) -> DateTime<Utc> {
    if !outside_business_hours(cursor, tz, pause_at, resume_at) {
        return cursor;
    }
    let day = if minute_of_day(cursor, tz) >= pause_at.minutes() {
        cursor + Duration::days(1)
    } else {
        cursor
    };
    at_minute_of_day(day, tz, resume_at)
}

/// Plans the expected send instants for `n` messages starting at `start`
///
/// Pure function; the admission planner and the operator preview both call
/// it, and dispatcher timing follows the same structure with sampled delays.
#[must_use]
pub fn plan_schedule(
    cfg: &PolicyConfig,
    start: DateTime<Utc>,
    n: usize,
    tz: FixedOffset,
) -> Vec<DateTime<Utc>> {
    let start = whole_seconds(start);
    let business = cfg.business_hours();
    let mut planned = Vec::with_capacity(n);
    let mut cursor = start;

    for i in 0..n {
        if i > 0 {
            cursor = cursor + Duration::seconds(cfg.avg_interval_secs());
            if cfg.use_batching && cfg.batch_size > 0 && i % cfg.batch_size as usize == 0 {
                cursor = cursor + Duration::seconds(cfg.avg_batch_pause_secs());
            }
        }
        if let Some((pause_at, resume_at)) = business {
            cursor = roll_past_business_pause(cursor, tz, pause_at, resume_at);
        }
        if let Some(one_shot) = &cfg.automatic_pause {
            if one_shot_pause_active(one_shot, cursor, start, tz) {
                cursor = whole_seconds(one_shot.resume_at);
                if let Some((pause_at, resume_at)) = business {
                    cursor = roll_past_business_pause(cursor, tz, pause_at, resume_at);
                }
            }
        }
        planned.push(cursor);
    }
    planned
}

/// The `[start, end]` window a campaign is expected to occupy
///
/// A zero-recipient campaign occupies a point window at its start.
#[must_use]
pub fn planned_window(
    cfg: &PolicyConfig,
    start: DateTime<Utc>,
    n: usize,
    tz: FixedOffset,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = whole_seconds(start);
    let end = plan_schedule(cfg, start, n, tz)
        .last()
        .copied()
        .unwrap_or(start);
    (start, end)
}

/// Samples the delay the dispatcher must wait before the next send
///
/// Uniform draw from `[min_interval, max_interval]`, plus a uniform batch
/// pause from `[batch_pause_min, batch_pause_max]` when batching is on and
/// `sent_messages` has just completed a batch. The caller zeroes the delay
/// for a campaign that has never sent.
#[must_use]
pub fn sample_required_delay_secs(cfg: &PolicyConfig, sent_messages: u64) -> i64 {
    let mut rng = rand::thread_rng();
    let mut delay = i64::from(rng.gen_range(cfg.min_interval..=cfg.max_interval));
    if cfg.use_batching
        && cfg.batch_size > 0
        && sent_messages > 0
        && sent_messages % u64::from(cfg.batch_size) == 0
    {
        delay += i64::from(rng.gen_range(cfg.batch_pause_min..=cfg.batch_pause_max));
    }
    delay
}
