pub mod geo;
pub mod id;
pub mod models;

pub use geo::{Area, Coordinates};
pub use models::{
    Feature, FeatureCollection, Hazard, PlaceResult, RouteResponse, SearchInfo, TrafficPoint,
};
