//! Time parsing for schedule strings and live ETA values, and the
//! bounded time window used to filter candidate departures.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::TimeError;

/// An absolute, timezone-aware point in time in the transit timezone.
pub type Instant = DateTime<Tz>;

/// Parses an `"HH:MM"` schedule entry on the calendar date of `base`.
///
/// Seconds are zero. A result strictly before `base` is moved 24 hours
/// later, so post-midnight trips listed against the previous service day
/// land in the future.
pub fn parse_schedule_time(hhmm: &str, base: &Instant) -> Result<Instant, TimeError> {
    let malformed = || TimeError::Malformed(hhmm.to_string());

    let mut parts = hhmm.trim().split(':');
    let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
        return Err(malformed());
    };
    let hour: u32 = h.trim().parse().map_err(|_| malformed())?;
    let minute: u32 = m.trim().parse().map_err(|_| malformed())?;

    let naive = base
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .ok_or_else(|| TimeError::OutOfRange(hhmm.to_string()))?;
    let candidate = base
        .timezone()
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| TimeError::Nonexistent(hhmm.to_string()))?;

    if candidate < *base {
        Ok(candidate + Duration::hours(24))
    } else {
        Ok(candidate)
    }
}

/// Interprets a loosely typed live-API time value.
///
/// Numbers and numeric strings are whole minutes from `now`. Strings are
/// tried as RFC 3339, then as a local ISO date-time, then as `HH:MM`.
/// Anything else yields `None`.
pub fn parse_live_time(value: &Value, now: &Instant) -> Option<Instant> {
    match value {
        Value::Number(n) => minutes_from(now, n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(minutes) = s.parse::<f64>() {
                return minutes_from(now, minutes);
            }
            if let Some(dt) = parse_iso(s, &now.timezone()) {
                return Some(dt);
            }
            if s.contains(':') {
                return parse_schedule_time(s, now).ok();
            }
            None
        }
        _ => None,
    }
}

/// Parses a telemetry timestamp: epoch seconds, epoch milliseconds, or
/// an ISO-8601 string.
pub fn parse_timestamp(value: &Value, tz: &Tz) -> Option<Instant> {
    match value {
        Value::Number(n) => from_epoch(n.as_f64()?, tz),
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<f64>() {
                Ok(epoch) => from_epoch(epoch, tz),
                Err(_) => parse_iso(s, tz),
            }
        }
        _ => None,
    }
}

fn parse_iso(s: &str, tz: &Tz) -> Option<Instant> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(tz));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| tz.from_local_datetime(&naive).earliest())
}

fn from_epoch(epoch: f64, tz: &Tz) -> Option<Instant> {
    if !epoch.is_finite() {
        return None;
    }
    // Anything past ~5138 AD in seconds is really milliseconds.
    let millis = if epoch.abs() >= 1e11 { epoch } else { epoch * 1000.0 };
    DateTime::from_timestamp_millis(millis as i64).map(|utc| utc.with_timezone(tz))
}

fn minutes_from(now: &Instant, minutes: f64) -> Option<Instant> {
    if !minutes.is_finite() {
        return None;
    }
    now.checked_add_signed(Duration::try_minutes(minutes.trunc() as i64)?)
}

/// Midnight at the start of the calendar day after `now`.
pub fn next_midnight(now: &Instant) -> Option<Instant> {
    let naive = now.date_naive().succ_opt()?.and_hms_opt(0, 0, 0)?;
    now.timezone().from_local_datetime(&naive).earliest()
}

/// Whole minutes from `now` until `time`; negative once `time` has passed.
pub fn minutes_until(time: &Instant, now: &Instant) -> i64 {
    (*time - *now).num_minutes()
}

/// Inclusive window `[now - grace, now + ahead]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub ahead: Duration,
    pub grace: Duration,
}

impl TimeWindow {
    /// `None` when `ahead` minutes does not fit in a [`Duration`].
    pub fn try_minutes(ahead: i64) -> Option<Self> {
        Some(Self {
            ahead: Duration::try_minutes(ahead)?,
            grace: Duration::zero(),
        })
    }

    /// Like [`TimeWindow::try_minutes`], saturating instead of failing.
    pub fn minutes(ahead: i64) -> Self {
        Self::try_minutes(ahead).unwrap_or(Self {
            ahead: if ahead < 0 { -Duration::MAX } else { Duration::MAX },
            grace: Duration::zero(),
        })
    }

    /// `None` when `grace` minutes does not fit in a [`Duration`]. Negative
    /// grace counts as zero.
    pub fn try_with_grace_minutes(mut self, grace: i64) -> Option<Self> {
        self.grace = Duration::try_minutes(grace.max(0))?;
        Some(self)
    }

    pub fn with_grace_minutes(self, grace: i64) -> Self {
        self.try_with_grace_minutes(grace).unwrap_or(Self {
            grace: Duration::MAX,
            ..self
        })
    }

    pub fn contains(&self, candidate: &Instant, now: &Instant) -> bool {
        let delta = *candidate - *now;
        delta >= -self.grace && delta <= self.ahead
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::minutes(60)
    }
}

/// `true` iff `0 <= candidate - now <= window_minutes`.
pub fn is_within_window(candidate: &Instant, now: &Instant, window_minutes: i64) -> bool {
    TimeWindow::minutes(window_minutes).contains(candidate, now)
}
