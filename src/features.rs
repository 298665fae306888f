//! Point features as exposed by a map's loaded data.
//!
//! The pipeline only needs two queries: what is currently rendered, and
//! what the underlying source holds (optionally inside a bounding box).
//! [`GeoJsonFeatureSource`] answers both from a GeoJSON file.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::error::FeatureError;
use crate::geo::{BoundingBox, Coordinate};

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub coordinate: Coordinate,
    pub properties: Map<String, Value>,
}

impl Feature {
    /// String-ish property lookup over several candidate keys. Numbers are
    /// rendered to strings; blank strings count as missing.
    pub fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.properties.get(*k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn value(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter()
            .find_map(|k| self.properties.get(*k).filter(|v| !v.is_null()))
    }
}

/// Query interface over a map's point layers.
pub trait FeatureSource {
    /// Features of `layer` currently drawn on screen.
    fn query_rendered(&self, layer: &str) -> Vec<Feature>;

    /// Features of `layer` held by the underlying source, whether drawn or
    /// not, optionally restricted to `bbox`.
    fn query_source(&self, layer: &str, bbox: Option<&BoundingBox>) -> Vec<Feature>;
}

/// A single-layer feature source backed by a GeoJSON `FeatureCollection`.
#[derive(Debug, Clone)]
pub struct GeoJsonFeatureSource {
    layer: String,
    features: Vec<Feature>,
    viewport: Option<BoundingBox>,
}

impl GeoJsonFeatureSource {
    pub fn load(path: impl AsRef<Path>, layer: &str) -> Result<Self, FeatureError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let source = Self::from_geojson(&content, layer)?;
        info!(
            path = %path.as_ref().display(),
            layer,
            features = source.features.len(),
            "Loaded stop features"
        );
        Ok(source)
    }

    pub fn from_geojson(content: &str, layer: &str) -> Result<Self, FeatureError> {
        let json: Value = serde_json::from_str(content)?;

        let kind = json["type"].as_str().unwrap_or_default();
        if kind != "FeatureCollection" {
            return Err(FeatureError::NotACollection(kind.to_string()));
        }

        let features = json["features"]
            .as_array()
            .map(|items| items.iter().filter_map(point_feature).collect())
            .unwrap_or_default();

        Ok(Self {
            layer: layer.to_string(),
            features,
            viewport: None,
        })
    }

    /// Restricts "rendered" features to those inside `viewport`. Without a
    /// viewport every feature counts as rendered.
    pub fn with_viewport(mut self, viewport: BoundingBox) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl FeatureSource for GeoJsonFeatureSource {
    fn query_rendered(&self, layer: &str) -> Vec<Feature> {
        if layer != self.layer {
            return Vec::new();
        }
        self.features
            .iter()
            .filter(|f| self.viewport.is_none_or(|v| v.contains(&f.coordinate)))
            .cloned()
            .collect()
    }

    fn query_source(&self, layer: &str, bbox: Option<&BoundingBox>) -> Vec<Feature> {
        if layer != self.layer {
            return Vec::new();
        }
        self.features
            .iter()
            .filter(|f| bbox.is_none_or(|b| b.contains(&f.coordinate)))
            .cloned()
            .collect()
    }
}

fn point_feature(item: &Value) -> Option<Feature> {
    let geometry = &item["geometry"];
    if geometry["type"].as_str() != Some("Point") {
        debug!("Skipping non-point feature");
        return None;
    }
    // GeoJSON positions are [lon, lat].
    let coords = geometry["coordinates"].as_array()?;
    let lon = coords.first()?.as_f64()?;
    let lat = coords.get(1)?.as_f64()?;

    let properties = item["properties"].as_object().cloned().unwrap_or_default();

    Some(Feature {
        coordinate: Coordinate::new(lat, lon),
        properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTION: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [73.8278, 15.4909]},
             "properties": {"stop_id": "S1", "name": "Panaji Bus Stand"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
             "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [73.9580, 15.2736]},
             "properties": {"stop_id": 42}}
        ]
    }"#;

    #[test]
    fn test_loads_only_points_with_lat_lon_order() {
        let source = GeoJsonFeatureSource::from_geojson(COLLECTION, "stops").unwrap();
        assert_eq!(source.len(), 2);
        let rendered = source.query_rendered("stops");
        assert_eq!(rendered[0].coordinate, Coordinate::new(15.4909, 73.8278));
        assert_eq!(rendered[1].text(&["stop_id"]).as_deref(), Some("42"));
    }

    #[test]
    fn test_rejects_non_collection() {
        let err = GeoJsonFeatureSource::from_geojson(r#"{"type": "Feature"}"#, "stops").unwrap_err();
        assert!(matches!(err, FeatureError::NotACollection(t) if t == "Feature"));
    }

    #[test]
    fn test_viewport_limits_rendered_not_source() {
        let viewport = BoundingBox::around(Coordinate::new(15.4909, 73.8278), 1.0);
        let source = GeoJsonFeatureSource::from_geojson(COLLECTION, "stops")
            .unwrap()
            .with_viewport(viewport);
        assert_eq!(source.query_rendered("stops").len(), 1);
        assert_eq!(source.query_source("stops", None).len(), 2);
        assert_eq!(source.query_source("stops", Some(&viewport)).len(), 1);
    }

    #[test]
    fn test_unknown_layer_is_empty() {
        let source = GeoJsonFeatureSource::from_geojson(COLLECTION, "stops").unwrap();
        assert!(source.query_rendered("parcels").is_empty());
        assert!(source.query_source("parcels", None).is_empty());
    }
}
