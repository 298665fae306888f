//! Records produced by the live normalizer, the timetable expander and
//! the resolver.

use serde::Serialize;

use crate::clock::{Instant, minutes_until};

/// A single live vehicle arrival, normalized from whatever shape the
/// ETA endpoint returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveArrival {
    pub route: String,
    pub time: Instant,
    pub is_real_time: bool,
    pub destination: Option<String>,
    pub vehicle_id: Option<String>,
    pub agency_name: Option<String>,
    /// Signed minutes; positive means late.
    pub delay_minutes: Option<i64>,
    pub data_timestamp: Option<Instant>,
}

/// Which data tier produced a [`Departure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepartureSource {
    Live,
    ScheduledToday,
    ScheduledTomorrow,
}

/// One row of a departure board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Departure {
    pub route: String,
    pub time: Instant,
    pub source: DepartureSource,
    pub destination: Option<String>,
    pub vehicle_id: Option<String>,
    pub agency_name: Option<String>,
    pub headway_minutes: Option<u32>,
    pub is_ac: Option<bool>,
    pub is_real_time: bool,
    pub delay_minutes: Option<i64>,
    pub is_next_day: bool,
}

impl Departure {
    pub fn minutes_until(&self, now: &Instant) -> i64 {
        minutes_until(&self.time, now)
    }

    /// Short label for the countdown column: minutes, "Due", or
    /// "Tomorrow" for next-day fallbacks.
    pub fn countdown_label(&self, now: &Instant) -> String {
        if self.is_next_day {
            return "Tomorrow".to_string();
        }
        match self.minutes_until(now) {
            m if m < 0 => format!("{} min ago", -m),
            0 => "Due".to_string(),
            m => format!("{m} min"),
        }
    }
}

impl From<LiveArrival> for Departure {
    fn from(a: LiveArrival) -> Self {
        Self {
            route: a.route,
            time: a.time,
            source: DepartureSource::Live,
            destination: a.destination,
            vehicle_id: a.vehicle_id,
            agency_name: a.agency_name,
            headway_minutes: None,
            is_ac: None,
            is_real_time: a.is_real_time,
            delay_minutes: a.delay_minutes,
            is_next_day: false,
        }
    }
}

/// Tag describing which tier of the fallback chain answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    Live,
    Scheduled,
    Tomorrow,
    NoData,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Live => "live",
            ResolutionSource::Scheduled => "scheduled",
            ResolutionSource::Tomorrow => "tomorrow",
            ResolutionSource::NoData => "no-data",
        }
    }
}

impl std::fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one resolver run for one stop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub stop_id: String,
    pub source: ResolutionSource,
    pub computed_at: Instant,
    pub departures: Vec<Departure>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.departures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn departure(h: u32, m: u32, is_next_day: bool) -> Departure {
        Departure {
            route: "A1".to_string(),
            time: Kolkata.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap(),
            source: DepartureSource::ScheduledToday,
            destination: None,
            vehicle_id: None,
            agency_name: None,
            headway_minutes: None,
            is_ac: None,
            is_real_time: false,
            delay_minutes: None,
            is_next_day,
        }
    }

    #[test]
    fn test_countdown_labels() {
        let now = Kolkata.with_ymd_and_hms(2024, 5, 1, 9, 5, 0).unwrap();
        assert_eq!(departure(9, 30, false).countdown_label(&now), "25 min");
        assert_eq!(departure(9, 5, false).countdown_label(&now), "Due");
        assert_eq!(departure(9, 2, false).countdown_label(&now), "3 min ago");
        assert_eq!(departure(6, 0, true).countdown_label(&now), "Tomorrow");
    }

    #[test]
    fn test_resolution_source_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ResolutionSource::NoData).unwrap(),
            "\"no-data\""
        );
        assert_eq!(
            serde_json::to_string(&DepartureSource::ScheduledTomorrow).unwrap(),
            "\"scheduled-tomorrow\""
        );
        assert_eq!(ResolutionSource::Scheduled.to_string(), "scheduled");
    }
}
