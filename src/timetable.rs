//! Embedded per-stop timetables and their expansion into departures.
//!
//! A stop feature carries its timetable as a JSON blob: an array of route
//! schedules, each listing `"HH:MM"` departure times. Expansion turns that
//! into absolute [`Departure`]s either for the rest of today (bounded by a
//! time window) or as a short preview of tomorrow's first trips.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clock::{Instant, TimeWindow, next_midnight, parse_schedule_time};
use crate::error::TimetableError;
use crate::types::{Departure, DepartureSource};

pub const MAX_TODAY_DEPARTURES: usize = 12;
pub const MAX_TOMORROW_DEPARTURES: usize = 6;
pub const TOMORROW_PER_ROUTE: usize = 2;

/// One route's departures from a stop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteSchedule {
    #[serde(alias = "route_name", alias = "routeName", alias = "route_id", deserialize_with = "route_text")]
    pub route: String,
    #[serde(default, alias = "times", alias = "stopTimes", deserialize_with = "string_items")]
    pub stop_times: Vec<String>,
    #[serde(default, alias = "dest")]
    pub destination: Option<String>,
    #[serde(default, alias = "agency_name", alias = "agencyName")]
    pub agency: Option<String>,
    #[serde(default, alias = "headway_min", deserialize_with = "lenient_u32")]
    pub headway: Option<u32>,
    #[serde(default, alias = "ac", alias = "fare_type", deserialize_with = "lenient_bool")]
    pub is_ac: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timetable {
    pub routes: Vec<RouteSchedule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOffset {
    Today,
    Tomorrow,
}

impl Timetable {
    /// Parses a serialized timetable blob.
    pub fn parse(blob: &str) -> Result<Self, TimetableError> {
        let value: Value = serde_json::from_str(blob)?;
        Self::from_value(value)
    }

    /// Accepts an array of schedules, an object with a `routes` array, or
    /// a string holding either of those.
    pub fn from_value(value: Value) -> Result<Self, TimetableError> {
        match value {
            Value::String(s) => Self::parse(&s),
            Value::Array(items) => Ok(Self::from_items(items)),
            Value::Object(mut map) => match map.remove("routes") {
                Some(Value::Array(items)) => Ok(Self::from_items(items)),
                _ => Err(TimetableError::UnexpectedType("object")),
            },
            Value::Null => Err(TimetableError::UnexpectedType("null")),
            Value::Bool(_) => Err(TimetableError::UnexpectedType("bool")),
            Value::Number(_) => Err(TimetableError::UnexpectedType("number")),
        }
    }

    /// Converts each schedule on its own; a malformed one is skipped
    /// without affecting the rest.
    fn from_items(items: Vec<Value>) -> Self {
        let routes = items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match RouteSchedule::deserialize(item) {
                Ok(route) => Some(route),
                Err(e) => {
                    warn!(index, error = %e, "Skipping malformed route schedule");
                    None
                }
            })
            .collect();
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.iter().all(|r| r.stop_times.is_empty())
    }

    /// Expands into departures for `day`, using `window` to bound today's
    /// results. Tomorrow's preview ignores the window.
    pub fn expand(&self, now: &Instant, day: DayOffset, window: &TimeWindow) -> Vec<Departure> {
        match day {
            DayOffset::Today => self.expand_today(now, window),
            DayOffset::Tomorrow => self.expand_tomorrow(now),
        }
    }

    fn expand_today(&self, now: &Instant, window: &TimeWindow) -> Vec<Departure> {
        let mut departures: Vec<Departure> = self
            .routes
            .iter()
            .flat_map(move |route| {
                parsed_times(route, now)
                    .filter(move |time| window.contains(time, now))
                    .map(move |time| route.departure(time, DepartureSource::ScheduledToday))
            })
            .collect();

        departures.sort_by_key(|d| d.time);
        departures.truncate(MAX_TODAY_DEPARTURES);
        departures
    }

    fn expand_tomorrow(&self, now: &Instant) -> Vec<Departure> {
        let Some(midnight) = next_midnight(now) else {
            return Vec::new();
        };
        let midnight = &midnight;

        let mut departures: Vec<Departure> = self
            .routes
            .iter()
            .flat_map(move |route| {
                parsed_times(route, midnight)
                    .take(TOMORROW_PER_ROUTE)
                    .map(move |time| route.departure(time, DepartureSource::ScheduledTomorrow))
            })
            .collect();

        departures.sort_by_key(|d| d.time);
        departures.truncate(MAX_TOMORROW_DEPARTURES);
        departures
    }
}

/// [`Timetable::expand`] with the default 60-minute window.
pub fn expand_timetable(timetable: &Timetable, now: &Instant, day: DayOffset) -> Vec<Departure> {
    timetable.expand(now, day, &TimeWindow::default())
}

fn parsed_times<'a>(route: &'a RouteSchedule, base: &'a Instant) -> impl Iterator<Item = Instant> + 'a {
    route
        .stop_times
        .iter()
        .filter_map(move |hhmm| match parse_schedule_time(hhmm, base) {
            Ok(time) => Some(time),
            Err(e) => {
                debug!(route = %route.route, error = %e, "Skipping unparseable schedule entry");
                None
            }
        })
}

impl RouteSchedule {
    fn departure(&self, time: Instant, source: DepartureSource) -> Departure {
        Departure {
            route: self.route.clone(),
            time,
            source,
            destination: self.destination.clone(),
            vehicle_id: None,
            agency_name: self.agency.clone(),
            headway_minutes: self.headway,
            is_ac: self.is_ac,
            is_real_time: false,
            delay_minutes: None,
            is_next_day: source == DepartureSource::ScheduledTomorrow,
        }
    }
}

fn route_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("route must be a string or number, got {other}"))),
    }
}

/// Keeps the string items of a list; anything else is dropped.
fn string_items<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                other => {
                    debug!(item = %other, "Skipping non-string schedule entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u32),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v.round() as u32),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "ac" | "true" | "yes" | "1" => Some(true),
            "non-ac" | "non ac" | "nonac" | "ordinary" | "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}
