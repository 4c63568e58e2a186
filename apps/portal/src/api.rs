//! Typed UrbanShield endpoints on top of the gateway.

use serde_json::json;
use urbanshield_common::{Area, Coordinates, Hazard, PlaceResult, RouteResponse, SearchInfo, TrafficPoint};

use crate::error::GatewayError;
use crate::gateway::{ApiRequest, ApiResponse, Gateway};
use crate::location::Position;

pub const DISASTERS_PATH: &str = "disasters/";
pub const FETCH_EARTHQUAKES_PATH: &str = "disasters/fetch_earthquakes/";
pub const FETCH_WEATHER_PATH: &str = "disasters/fetch_weather/";
pub const TRAFFIC_PATH: &str = "traffic/";
pub const FETCH_LIVE_TRAFFIC_PATH: &str = "traffic/fetch_real/";
pub const SEARCH_PATH: &str = "search/";
pub const SEARCH_INFO_PATH: &str = "search/info/";
pub const UPDATE_LOCATION_PATH: &str = "user-location/update_location/";
pub const SMART_ROUTE_PATH: &str = "route/smart_route/";

#[derive(Clone)]
pub struct PortalApi {
    gateway: Gateway,
}

impl PortalApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// All hazards, or only those inside `scope`.
    pub async fn hazards(&self, scope: Option<&Area>) -> Result<Vec<Hazard>, GatewayError> {
        self.send(scoped(ApiRequest::get(DISASTERS_PATH), scope))
            .await?
            .json_list()
    }

    pub async fn hazards_near(
        &self,
        point: Coordinates,
        radius_km: f64,
    ) -> Result<Vec<Hazard>, GatewayError> {
        self.hazards(Some(&Area::new(point, radius_km))).await
    }

    pub async fn traffic(&self, scope: Option<&Area>) -> Result<Vec<TrafficPoint>, GatewayError> {
        self.send(scoped(ApiRequest::get(TRAFFIC_PATH), scope))
            .await?
            .json_list()
    }

    /// Ask the server to pull fresh live traffic. The body is ignored.
    pub async fn refresh_live_traffic(&self) -> Result<(), GatewayError> {
        self.send(ApiRequest::get(FETCH_LIVE_TRAFFIC_PATH)).await?;
        Ok(())
    }

    pub async fn fetch_earthquakes(&self) -> Result<(), GatewayError> {
        self.send(ApiRequest::get(FETCH_EARTHQUAKES_PATH)).await?;
        Ok(())
    }

    pub async fn fetch_weather(&self) -> Result<(), GatewayError> {
        self.send(ApiRequest::get(FETCH_WEATHER_PATH)).await?;
        Ok(())
    }

    pub async fn search_places(&self, query: &str) -> Result<Vec<PlaceResult>, GatewayError> {
        self.send(ApiRequest::get(SEARCH_PATH).query("q", query))
            .await?
            .json_list()
    }

    pub async fn search_info(&self, area: &Area) -> Result<SearchInfo, GatewayError> {
        self.send(scoped(ApiRequest::get(SEARCH_INFO_PATH), Some(area)))
            .await?
            .json()
    }

    pub async fn update_location(&self, position: &Position) -> Result<(), GatewayError> {
        let body = json!({
            "latitude": position.lat,
            "longitude": position.lon,
            "accuracy": position.accuracy,
        });
        self.send(ApiRequest::post(UPDATE_LOCATION_PATH, body)).await?;
        Ok(())
    }

    pub async fn smart_route(
        &self,
        start: Coordinates,
        end: Coordinates,
    ) -> Result<RouteResponse, GatewayError> {
        let request = ApiRequest::get(SMART_ROUTE_PATH)
            .query("start_lat", start.lat)
            .query("start_lon", start.lon)
            .query("end_lat", end.lat)
            .query("end_lon", end.lon);
        self.send(request).await?.json()
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.gateway.send(request).await
    }
}

fn scoped(request: ApiRequest, scope: Option<&Area>) -> ApiRequest {
    match scope {
        Some(area) => request
            .query("lat", area.center.lat)
            .query("lon", area.center.lon)
            .query("radius", area.radius_km),
        None => request,
    }
}
