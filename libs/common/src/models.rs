//! Wire records exchanged with the UrbanShield API.
//!
//! Fields the backend may omit are optional so that a partially populated
//! record still decodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::Coordinates;

/// A hazard (disaster) record from `GET disasters/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    #[serde(default)]
    pub id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub disaster_type: Option<String>,
    #[serde(default)]
    pub severity: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Hazard {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A traffic observation from `GET traffic/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPoint {
    #[serde(default)]
    pub id: Option<i64>,
    pub latitude: f64,
    pub longitude: f64,
    /// 1 (free flow) to 10 (standstill).
    #[serde(default)]
    pub congestion_level: i64,
    #[serde(default)]
    pub is_blocked: bool,
}

impl TrafficPoint {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A geocoded place from `GET search/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceResult {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl PlaceResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// Counts of traffic and hazard records around a point (`GET search/info/`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchInfo {
    #[serde(default)]
    pub traffic_count: u64,
    #[serde(default)]
    pub disaster_count: u64,
}

/// A GeoJSON line geometry; coordinates are `[lon, lat]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineGeometry {
    #[serde(default)]
    pub coordinates: Vec<[f64; 2]>,
}

/// Response of `GET route/smart_route/`.
///
/// The backend answers `{ "message": "No route found" }` when the graph has no
/// path between the endpoints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteResponse {
    #[serde(default)]
    pub geojson_route: Option<LineGeometry>,
    /// Fallback path as `[lat, lon]` pairs.
    #[serde(default)]
    pub route_nodes: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A GeoJSON feature collection, as served for the facility layers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub geometry: Option<Geometry>,
    /// Arbitrary properties object; `null` when the source omits it.
    #[serde(default)]
    pub properties: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub coordinates: Value,
}

impl Feature {
    /// The feature's position when its geometry is a point (`[lon, lat]`).
    pub fn point(&self) -> Option<Coordinates> {
        let coords = self.geometry.as_ref()?.coordinates.as_array()?;
        let lon = coords.first()?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        Some(Coordinates::new(lat, lon))
    }

    /// The `name` property, when present.
    pub fn name(&self) -> Option<&str> {
        self.properties.get("name")?.as_str()
    }
}
