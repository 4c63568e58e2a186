//! Map data layers: independently toggleable sets of features, each with a
//! `Hidden → Loading → Visible` lifecycle.

pub mod assets;
pub mod orchestrator;
pub mod snapshot;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use urbanshield_common::{Coordinates, Feature, Hazard, RouteResponse, TrafficPoint};

pub use assets::{AssetError, AssetFetcher, DirectoryAssets};
pub use orchestrator::LayerOrchestrator;
pub use snapshot::{LayerEvent, LayerSnapshot, LayerView};

const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Traffic,
    Disasters,
    Police,
    Fire,
    Hospital,
    Route,
}

impl LayerKind {
    pub const ALL: [LayerKind; 6] = [
        LayerKind::Traffic,
        LayerKind::Disasters,
        LayerKind::Police,
        LayerKind::Fire,
        LayerKind::Hospital,
        LayerKind::Route,
    ];

    /// Layers backed by static GeoJSON documents.
    pub const FACILITIES: [LayerKind; 3] = [LayerKind::Police, LayerKind::Fire, LayerKind::Hospital];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerKind::Traffic => "traffic",
            LayerKind::Disasters => "disasters",
            LayerKind::Police => "police",
            LayerKind::Fire => "fire",
            LayerKind::Hospital => "hospital",
            LayerKind::Route => "route",
        }
    }

    /// How often a visible layer re-fetches, if at all.
    pub fn poll_interval(self) -> Option<Duration> {
        match self {
            LayerKind::Traffic | LayerKind::Disasters => Some(LIVE_POLL_INTERVAL),
            _ => None,
        }
    }

    /// Whether the layer is scoped to the focus area when one is set.
    pub fn is_focus_dependent(self) -> bool {
        matches!(self, LayerKind::Traffic | LayerKind::Disasters)
    }

    /// File name of the GeoJSON document for facility layers.
    pub fn asset_name(self) -> Option<&'static str> {
        match self {
            LayerKind::Police => Some("uttrakhand_police.geojson"),
            LayerKind::Fire => Some("uttarakhand_fire.geojson"),
            LayerKind::Hospital => Some("uttarakhand_hospitals.geojson"),
            _ => None,
        }
    }

    /// What the user is told when a fetch for this layer fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            LayerKind::Traffic => "Failed to fetch traffic data",
            LayerKind::Disasters => "Failed to fetch disaster data",
            LayerKind::Police => "Failed to load police stations",
            LayerKind::Fire => "Failed to load fire stations",
            LayerKind::Hospital => "Failed to load hospital data",
            LayerKind::Route => "Failed to fetch route. Please try again.",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerStatus {
    #[default]
    Hidden,
    Loading,
    Visible,
}

/// Whether a fetch first asks the server to pull its upstream sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Plain,
    RefreshSource,
}

/// A computed route between two endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    pub start: Coordinates,
    pub end: Coordinates,
    pub path: Vec<Coordinates>,
}

impl RouteGeometry {
    /// Build from a routing response: the GeoJSON line (`[lon, lat]`) when
    /// present, else the raw `[lat, lon]` nodes. `None` means no route.
    pub fn from_response(start: Coordinates, end: Coordinates, response: &RouteResponse) -> Option<Self> {
        let path: Vec<Coordinates> = match &response.geojson_route {
            Some(line) if !line.coordinates.is_empty() => line
                .coordinates
                .iter()
                .map(|pair| Coordinates::from_lon_lat(*pair))
                .collect(),
            _ => response
                .route_nodes
                .iter()
                .flatten()
                .map(|[lat, lon]| Coordinates::new(*lat, *lon))
                .collect(),
        };
        if path.is_empty() {
            return None;
        }
        Some(Self { start, end, path })
    }
}

/// The features a visible layer holds.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Traffic(Vec<TrafficPoint>),
    Hazards(Vec<Hazard>),
    Facilities(Vec<Feature>),
    Route(RouteGeometry),
}

impl LayerData {
    pub fn len(&self) -> usize {
        match self {
            LayerData::Traffic(points) => points.len(),
            LayerData::Hazards(hazards) => hazards.len(),
            LayerData::Facilities(features) => features.len(),
            LayerData::Route(route) => route.path.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locations of the individual features, for radius filtering.
    pub fn points(&self) -> Vec<Coordinates> {
        match self {
            LayerData::Traffic(points) => points.iter().map(TrafficPoint::coordinates).collect(),
            LayerData::Hazards(hazards) => hazards.iter().map(Hazard::coordinates).collect(),
            LayerData::Facilities(features) => features.iter().filter_map(Feature::point).collect(),
            LayerData::Route(route) => route.path.clone(),
        }
    }
}
