use tracing::warn;

use crate::features::{Feature, FeatureSource};
use crate::geo::Coordinate;
use crate::timetable::Timetable;

/// A bus stop read from a map point feature.
///
/// The embedded timetable is parsed once here and reused by every
/// resolution for the lifetime of the stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    pub description: Option<String>,
    /// Identifier understood by the live ETA endpoint, when the stop has one.
    pub live_id: Option<String>,
    pub timetable: Option<Timetable>,
}

impl Stop {
    pub fn from_feature(feature: &Feature) -> Option<Self> {
        let id = feature.text(&["stop_id", "id", "stopId"])?;
        let name = feature
            .text(&["name", "stop_name", "stopName"])
            .unwrap_or_else(|| id.clone());

        let timetable = feature
            .value(&["timetable", "stop_times", "schedule"])
            .and_then(|raw| match Timetable::from_value(raw.clone()) {
                Ok(tt) => Some(tt),
                Err(e) => {
                    warn!(stop_id = %id, error = %e, "Ignoring malformed embedded timetable");
                    None
                }
            });

        Some(Self {
            name,
            coordinate: feature.coordinate,
            description: feature.text(&["description", "desc"]),
            live_id: feature.text(&["live_id", "live_stop_id", "liveStopId"]),
            timetable,
            id,
        })
    }

    /// Route identifiers known from the timetable, in first-seen order.
    /// Used as route context for the live ETA lookup.
    pub fn route_ids(&self) -> Vec<String> {
        let mut routes: Vec<String> = Vec::new();
        if let Some(tt) = &self.timetable {
            for r in &tt.routes {
                if !routes.contains(&r.route) {
                    routes.push(r.route.clone());
                }
            }
        }
        routes
    }
}

/// Builds every stop the source holds for `layer`, skipping features
/// without an identifier.
pub fn stops_from_source<S: FeatureSource + ?Sized>(source: &S, layer: &str) -> Vec<Stop> {
    source
        .query_source(layer, None)
        .iter()
        .filter_map(Stop::from_feature)
        .collect()
}

pub fn find_stop<S: FeatureSource + ?Sized>(source: &S, layer: &str, stop_id: &str) -> Option<Stop> {
    source
        .query_source(layer, None)
        .iter()
        .filter_map(Stop::from_feature)
        .find(|s| s.id == stop_id)
}
