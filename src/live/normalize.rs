//! Normalization of live ETA payloads.
//!
//! The provider has shipped several response layouts over time. Each
//! layout is a [`ResponseShape`] picked by sniffing the top-level keys;
//! every shape flattens to raw bus entries, and every entry goes through
//! the same arrival-time rules to become a [`LiveArrival`].

use chrono::Duration;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::clock::{Instant, TimeWindow, parse_live_time, parse_timestamp};
use crate::types::LiveArrival;

pub const MAX_LIVE_ARRIVALS: usize = 12;

const ROUTE_KEYS: &[&str] = &["rN", "routeName", "route_name", "route", "routeId", "route_id", "rId"];
const ETA_SECONDS_KEYS: &[&str] = &["eta", "etaSeconds", "eta_seconds"];
const ETA_MINUTES_KEYS: &[&str] = &["etaMinutes", "eta_minutes", "etaMin", "eta_min"];
const ARRIVAL_KEYS: &[&str] = &["arrivalTime", "arrival_time", "expectedArrival", "time"];
const TIMESTAMP_KEYS: &[&str] = &["tS", "timestamp", "lastUpdated", "last_updated", "ts"];
const VEHICLE_KEYS: &[&str] = &["vNo", "vehicleNo", "vehicle_no", "vehicleId", "vehicle_id", "vId"];
const DESTINATION_KEYS: &[&str] = &["dest", "destination", "headsign"];
const AGENCY_KEYS: &[&str] = &["ag", "agency", "agencyName", "agency_name"];
const DELAY_KEYS: &[&str] = &["delay", "dly", "delayMinutes"];

/// Nesting limit when unwrapping JSON-encoded strings inside `stopRouteEtas`.
const MAX_UNWRAP_DEPTH: usize = 4;

/// Tunables for turning raw entries into arrivals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    pub window: TimeWindow,
    /// Telemetry younger than this still yields an estimate when no ETA is given.
    pub fresh_for: Duration,
    /// How far ahead that estimate is placed.
    pub estimate_ahead: Duration,
    pub max_arrivals: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            window: TimeWindow::minutes(60).with_grace_minutes(5),
            fresh_for: Duration::minutes(10),
            estimate_ahead: Duration::minutes(2),
            max_arrivals: MAX_LIVE_ARRIVALS,
        }
    }
}

/// Known live payload layouts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseShape<'a> {
    /// `{"routes": [{"routeName": .., "arrivals": [..]}]}`
    NestedRoutes(&'a [Value]),
    /// `{"arrivals": [..]}` or a bare top-level array.
    FlatArrivals(&'a [Value]),
    /// `{"eta": [..]}`
    FlatEta(&'a [Value]),
    /// `{"stopRouteEtas": {"stop:route": <bus or JSON string>, ..}}`
    StopRouteEtas(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> ResponseShape<'a> {
    pub fn sniff(body: &'a Value) -> Self {
        if let Some(items) = body.as_array() {
            return ResponseShape::FlatArrivals(items);
        }
        let Some(obj) = body.as_object() else {
            return ResponseShape::Unrecognized;
        };

        if let Some(map) = obj.get("stopRouteEtas").and_then(Value::as_object) {
            return ResponseShape::StopRouteEtas(map);
        }
        if let Some(routes) = obj.get("routes").and_then(Value::as_array) {
            return ResponseShape::NestedRoutes(routes);
        }
        if let Some(items) = obj.get("arrivals").and_then(Value::as_array) {
            return ResponseShape::FlatArrivals(items);
        }
        if let Some(items) = obj.get("eta").and_then(Value::as_array) {
            return ResponseShape::FlatEta(items);
        }
        match obj.get("data") {
            Some(inner @ (Value::Object(_) | Value::Array(_))) => Self::sniff(inner),
            _ => ResponseShape::Unrecognized,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseShape::NestedRoutes(_) => "nested_routes",
            ResponseShape::FlatArrivals(_) => "flat_arrivals",
            ResponseShape::FlatEta(_) => "flat_eta",
            ResponseShape::StopRouteEtas(_) => "stop_route_etas",
            ResponseShape::Unrecognized => "unrecognized",
        }
    }

    /// Flattens the payload into bus entries, each with the route implied
    /// by its container when the entry itself may not name one.
    fn entries(&self) -> Vec<RawEntry> {
        let mut out = Vec::new();
        match self {
            ResponseShape::FlatArrivals(items) | ResponseShape::FlatEta(items) => {
                out.extend(items.iter().map(|v| RawEntry::new(v.clone(), None)));
            }
            ResponseShape::NestedRoutes(routes) => {
                for route in routes.iter() {
                    let hint = text(route, ROUTE_KEYS);
                    let Some(arrivals) = route.get("arrivals").and_then(Value::as_array) else {
                        continue;
                    };
                    out.extend(arrivals.iter().map(|v| RawEntry::new(v.clone(), hint.clone())));
                }
            }
            ResponseShape::StopRouteEtas(map) => {
                for (key, value) in map.iter() {
                    let hint = key
                        .split_once(':')
                        .map(|(_, route)| route.to_string())
                        .filter(|r| !r.is_empty());
                    unwrap_buses(value, &hint, 0, &mut out);
                }
            }
            ResponseShape::Unrecognized => {}
        }
        out
    }
}

struct RawEntry {
    value: Value,
    route_hint: Option<String>,
}

impl RawEntry {
    fn new(value: Value, route_hint: Option<String>) -> Self {
        Self { value, route_hint }
    }
}

/// `stopRouteEtas` values are a bus object, a JSON-encoded string of one,
/// an array of either, or a map keyed by bus.
fn unwrap_buses(value: &Value, hint: &Option<String>, depth: usize, out: &mut Vec<RawEntry>) {
    if depth > MAX_UNWRAP_DEPTH {
        return;
    }
    match value {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(decoded) => unwrap_buses(&decoded, hint, depth + 1, out),
            Err(e) => warn!(error = %e, "Skipping undecodable bus entry"),
        },
        Value::Array(items) => {
            for item in items {
                unwrap_buses(item, hint, depth + 1, out);
            }
        }
        Value::Object(obj) if looks_like_bus(obj) => out.push(RawEntry::new(value.clone(), hint.clone())),
        Value::Object(obj) => {
            for inner in obj.values() {
                unwrap_buses(inner, hint, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn looks_like_bus(obj: &Map<String, Value>) -> bool {
    [ETA_SECONDS_KEYS, ETA_MINUTES_KEYS, ARRIVAL_KEYS, TIMESTAMP_KEYS, VEHICLE_KEYS]
        .iter()
        .flat_map(|keys| keys.iter())
        .any(|k| obj.contains_key(*k))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    NotAnObject,
    NoRoute,
    NoTime,
    Stale,
}

/// Normalizes a decoded payload into window-filtered, sorted arrivals.
pub fn normalize(body: &Value, now: &Instant, options: &NormalizeOptions) -> Vec<LiveArrival> {
    let shape = ResponseShape::sniff(body);
    let entries = shape.entries();
    debug!(shape = shape.name(), entries = entries.len(), "Normalizing live payload");

    let mut arrivals: Vec<LiveArrival> = entries
        .iter()
        .filter_map(|raw| match normalize_entry(raw, now, options) {
            Ok(arrival) => Some(arrival),
            Err(reason) => {
                debug!(?reason, "Skipping live entry");
                None
            }
        })
        .filter(|a| options.window.contains(&a.time, now))
        .collect();

    arrivals.sort_by_key(|a| a.time);
    arrivals.truncate(options.max_arrivals);
    arrivals
}

fn normalize_entry(raw: &RawEntry, now: &Instant, options: &NormalizeOptions) -> Result<LiveArrival, SkipReason> {
    let entry = &raw.value;
    if !entry.is_object() {
        return Err(SkipReason::NotAnObject);
    }

    let route = text(entry, ROUTE_KEYS)
        .or_else(|| raw.route_hint.clone())
        .ok_or(SkipReason::NoRoute)?;

    let tz = now.timezone();
    let data_timestamp = field(entry, TIMESTAMP_KEYS).and_then(|v| parse_timestamp(v, &tz));

    let eta_seconds = number(entry, ETA_SECONDS_KEYS).or_else(|| number(entry, ETA_MINUTES_KEYS).map(|m| m * 60.0));

    let (time, is_real_time) = match eta_seconds {
        Some(secs) if secs == 0.0 => (*now, true),
        Some(secs) if secs > 0.0 => {
            let offset = Duration::try_seconds(secs.round() as i64).ok_or(SkipReason::NoTime)?;
            (now.checked_add_signed(offset).ok_or(SkipReason::NoTime)?, true)
        }
        _ => match field(entry, ARRIVAL_KEYS).and_then(|v| parse_live_time(v, now)) {
            Some(time) => (time, true),
            None => match data_timestamp {
                Some(ts) if *now - ts < options.fresh_for => (*now + options.estimate_ahead, false),
                Some(_) => return Err(SkipReason::Stale),
                None => return Err(SkipReason::NoTime),
            },
        },
    };

    Ok(LiveArrival {
        route,
        time,
        is_real_time,
        destination: text(entry, DESTINATION_KEYS),
        vehicle_id: text(entry, VEHICLE_KEYS),
        agency_name: text(entry, AGENCY_KEYS).map(|a| a.to_uppercase()),
        delay_minutes: number(entry, DELAY_KEYS).map(|d| d.round() as i64),
        data_timestamp,
    })
}

fn field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| v.get(*k).filter(|x| !x.is_null()))
}

fn text(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match v.get(*k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn number(v: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|k| match v.get(*k)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;
    use serde_json::json;

    fn now() -> Instant {
        Kolkata.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn run(body: Value) -> Vec<LiveArrival> {
        normalize(&body, &now(), &NormalizeOptions::default())
    }

    #[test]
    fn test_at_stop_sentinel_example() {
        let arrivals = run(json!({"eta": [
            {"eta": 0, "vNo": "MH01AB1234", "dest": "Panaji", "rN": "12", "ag": "kadamba"}
        ]}));
        assert_eq!(arrivals.len(), 1);
        let a = &arrivals[0];
        assert_eq!(a.time, now());
        assert!(a.is_real_time);
        assert_eq!(a.agency_name.as_deref(), Some("KADAMBA"));
        assert_eq!(a.vehicle_id.as_deref(), Some("MH01AB1234"));
        assert_eq!(a.destination.as_deref(), Some("Panaji"));
        assert_eq!(a.route, "12");
    }

    #[test]
    fn test_sniff_shapes() {
        assert!(matches!(ResponseShape::sniff(&json!({"routes": []})), ResponseShape::NestedRoutes(_)));
        assert!(matches!(ResponseShape::sniff(&json!({"arrivals": []})), ResponseShape::FlatArrivals(_)));
        assert!(matches!(ResponseShape::sniff(&json!([])), ResponseShape::FlatArrivals(_)));
        assert!(matches!(ResponseShape::sniff(&json!({"eta": []})), ResponseShape::FlatEta(_)));
        assert!(matches!(
            ResponseShape::sniff(&json!({"stopRouteEtas": {}})),
            ResponseShape::StopRouteEtas(_)
        ));
        assert!(matches!(
            ResponseShape::sniff(&json!({"data": {"arrivals": []}})),
            ResponseShape::FlatArrivals(_)
        ));
        assert_eq!(ResponseShape::sniff(&json!({"eta": 5})), ResponseShape::Unrecognized);
        assert_eq!(ResponseShape::sniff(&json!("nope")), ResponseShape::Unrecognized);
    }

    #[test]
    fn test_nested_routes_inherit_route_name() {
        let arrivals = run(json!({"routes": [
            {"routeName": "A1", "arrivals": [{"eta": 600, "vNo": "GA01"}, {"eta": 120}]},
            {"routeName": "B2", "arrivals": [{"etaMinutes": 5, "rN": "B2X"}]},
            {"routeName": "C3"}
        ]}));
        let got: Vec<(&str, i64)> = arrivals
            .iter()
            .map(|a| (a.route.as_str(), (a.time - now()).num_minutes()))
            .collect();
        assert_eq!(got, vec![("A1", 2), ("B2X", 5), ("A1", 10)]);
    }

    #[test]
    fn test_flat_arrivals_with_arrival_time_fields() {
        let arrivals = run(json!({"arrivals": [
            {"route": "7", "arrivalTime": "09:10"},
            {"route": "8", "arrivalTime": 15},
            {"route": "9", "arrivalTime": "2024-05-01T03:50:00Z"}
        ]}));
        let minutes: Vec<i64> = arrivals.iter().map(|a| (a.time - now()).num_minutes()).collect();
        assert_eq!(minutes, vec![10, 15, 20]);
        assert!(arrivals.iter().all(|a| a.is_real_time));
    }

    #[test]
    fn test_stop_route_etas_mixed_values() {
        let encoded = json!({"eta": 300, "vNo": "GA02"}).to_string();
        let arrivals = run(json!({"stopRouteEtas": {
            "S1:R10": encoded,
            "S1:R20": {"eta": 60, "vNo": "GA03"},
            "S1:R30": {"bus-1": {"eta": 900}, "bus-2": json!({"eta": 1200}).to_string()},
            "S1:R40": "{broken"
        }}));
        let got: Vec<(&str, i64)> = arrivals
            .iter()
            .map(|a| (a.route.as_str(), (a.time - now()).num_minutes()))
            .collect();
        assert_eq!(got, vec![("R20", 1), ("R10", 5), ("R30", 15), ("R30", 20)]);
    }

    #[test]
    fn test_missing_eta_uses_telemetry_freshness() {
        let fresh = (now() - Duration::minutes(3)).timestamp_millis();
        let stale = (now() - Duration::minutes(30)).timestamp_millis();
        let arrivals = run(json!({"eta": [
            {"rN": "1", "eta": -1, "tS": fresh},
            {"rN": "2", "tS": stale},
            {"rN": "3"}
        ]}));
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].route, "1");
        assert_eq!(arrivals[0].time, now() + Duration::minutes(2));
        assert!(!arrivals[0].is_real_time);
        assert_eq!(arrivals[0].data_timestamp, Some(now() - Duration::minutes(3)));
    }

    #[test]
    fn test_window_and_grace() {
        let arrivals = run(json!({"arrivals": [
            {"route": "past", "arrivalTime": "2024-05-01T03:26:00Z"},
            {"route": "too-old", "arrivalTime": "2024-05-01T03:20:00Z"},
            {"route": "too-far", "eta": 3700}
        ]}));
        let routes: Vec<&str> = arrivals.iter().map(|a| a.route.as_str()).collect();
        assert_eq!(routes, vec!["past"]);
    }

    #[test]
    fn test_truncates_to_twelve_sorted() {
        let entries: Vec<Value> = (0..20).rev().map(|i| json!({"rN": format!("{i}"), "eta": i * 60})).collect();
        let arrivals = run(json!({ "eta": entries }));
        assert_eq!(arrivals.len(), MAX_LIVE_ARRIVALS);
        assert!(arrivals.windows(2).all(|w| w[0].time <= w[1].time));
        assert_eq!(arrivals[0].route, "0");
    }

    #[test]
    fn test_bad_entries_are_skipped_not_fatal() {
        let arrivals = run(json!({"eta": [42, "x", {"eta": 60}, {"rN": "ok", "eta": "120", "delay": -2}]}));
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].route, "ok");
        assert_eq!(arrivals[0].delay_minutes, Some(-2));
    }

    #[test]
    fn test_unrecognized_is_empty() {
        assert!(run(json!({})).is_empty());
        assert!(run(json!(null)).is_empty());
        assert!(run(json!({"message": "no buses"})).is_empty());
    }
}
