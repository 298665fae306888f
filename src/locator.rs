//! Nearest-stop lookup around a user position.

use tracing::debug;

use crate::features::FeatureSource;
use crate::geo::{BoundingBox, Coordinate};
use crate::stop::Stop;

pub const DEFAULT_MAX_RADIUS_KM: f64 = 2.0;

/// Outcome of a nearest-stop search. `NearestTooFar` still carries the
/// stop so a caller can offer to show it anyway.
#[derive(Debug, Clone, PartialEq)]
pub enum NearestStop {
    Found { stop: Stop, distance_km: f64 },
    NearestTooFar { stop: Stop, distance_km: f64 },
    NoStopsFound,
}

impl NearestStop {
    /// The stop regardless of threshold.
    pub fn show_anyway(self) -> Option<(Stop, f64)> {
        match self {
            NearestStop::Found { stop, distance_km } | NearestStop::NearestTooFar { stop, distance_km } => {
                Some((stop, distance_km))
            }
            NearestStop::NoStopsFound => None,
        }
    }
}

/// Linear scan for the closest candidate. Ties keep the earlier candidate;
/// candidates with a non-comparable (NaN) distance are ignored.
pub fn find_nearest<I>(user: &Coordinate, candidates: I, max_radius_km: f64) -> NearestStop
where
    I: IntoIterator<Item = Stop>,
{
    let mut best: Option<(Stop, f64)> = None;

    for stop in candidates {
        let d = user.distance_km(&stop.coordinate);
        let closer = match &best {
            None => !d.is_nan(),
            Some((_, best_d)) => d < *best_d,
        };
        if closer {
            best = Some((stop, d));
        }
    }

    match best {
        None => NearestStop::NoStopsFound,
        Some((stop, distance_km)) if distance_km <= max_radius_km => NearestStop::Found { stop, distance_km },
        Some((stop, distance_km)) => NearestStop::NearestTooFar { stop, distance_km },
    }
}

/// Searches rendered stops first; when nothing of `layer` is rendered,
/// falls back to the source features within `max_radius_km`.
pub fn locate_nearest<S: FeatureSource + ?Sized>(
    source: &S,
    layer: &str,
    user: &Coordinate,
    max_radius_km: f64,
) -> NearestStop {
    let rendered: Vec<Stop> = source
        .query_rendered(layer)
        .iter()
        .filter_map(Stop::from_feature)
        .collect();

    if !rendered.is_empty() {
        debug!(candidates = rendered.len(), "Scanning rendered stops");
        return find_nearest(user, rendered, max_radius_km);
    }

    let bbox = BoundingBox::around(*user, max_radius_km);
    let nearby: Vec<Stop> = source
        .query_source(layer, Some(&bbox))
        .iter()
        .filter_map(Stop::from_feature)
        .filter(|s| user.distance_km(&s.coordinate) <= max_radius_km)
        .collect();

    debug!(candidates = nearby.len(), "Scanning source stops");
    find_nearest(user, nearby, max_radius_km)
}
