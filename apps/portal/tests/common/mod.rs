#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use urbanshield_portal::config::Config;
use urbanshield_portal::gateway::ReqwestTransport;
use urbanshield_portal::storage::{KeyValueStore, MemoryStore};
use urbanshield_portal::PortalContext;

pub const USERNAME: &str = "ravi";
pub const PASSWORD: &str = "secret";
pub const REFRESH_TOKEN: &str = "rt-1";

/// Server-side state of the mock UrbanShield API.
pub struct MockState {
    /// The one access token the API currently accepts.
    access: Mutex<String>,
    refresh_revoked: Mutex<bool>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    search_calls: AtomicUsize,
    /// Every request as `(path, raw query)`.
    hits: Mutex<Vec<(String, String)>>,
    reports: Mutex<Vec<Value>>,
}

pub struct MockApi {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockApi {
    /// Serve the mock API on an ephemeral port. The server runs in the
    /// background.
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            access: Mutex::new("access-0".to_string()),
            refresh_revoked: Mutex::new(false),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            hits: Mutex::new(Vec::new()),
            reports: Mutex::new(Vec::new()),
        });
        let app = router().with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    /// A fresh client context over an in-memory session store.
    pub fn context(&self) -> (PortalContext, Arc<MemoryStore>) {
        self.context_with(Config::from_lookup(|_| None))
    }

    pub fn context_with(&self, config: Config) -> (PortalContext, Arc<MemoryStore>) {
        let kv = Arc::new(MemoryStore::new());
        let transport =
            Arc::new(ReqwestTransport::new(&self.base_url(), Duration::from_secs(5)).unwrap());
        let context = PortalContext::new(config, kv.clone() as Arc<dyn KeyValueStore>, transport);
        (context, kv)
    }

    /// A context that is already logged in.
    pub async fn logged_in_context(&self) -> PortalContext {
        let (context, _) = self.context();
        context.auth.login(USERNAME, PASSWORD).await.unwrap();
        context
    }

    /// Rotate the accepted access token so clients hold a stale one.
    pub fn expire_access(&self) {
        let mut access = self.state.access.lock();
        *access = format!("{access}-expired");
    }

    pub fn revoke_refresh(&self) {
        *self.state.refresh_revoked.lock() = true;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.state.search_calls.load(Ordering::SeqCst)
    }

    pub fn hits_to(&self, path: &str) -> Vec<String> {
        self.state
            .hits
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, q)| q.clone())
            .collect()
    }

    pub fn reports(&self) -> Vec<Value> {
        self.state.reports.lock().clone()
    }
}

fn router() -> Router<Arc<MockState>> {
    Router::new()
        .route("/api/token/", post(login))
        .route("/api/token/refresh/", post(refresh))
        .route("/api/accounts/register/", post(register))
        .route("/api/disasters/", get(disasters))
        .route("/api/disasters/fetch_earthquakes/", get(source_refresh))
        .route("/api/disasters/fetch_weather/", get(source_refresh))
        .route("/api/traffic/", get(traffic))
        .route("/api/traffic/fetch_real/", get(source_refresh))
        .route("/api/search/", get(search))
        .route("/api/search/info/", get(search_info))
        .route("/api/route/smart_route/", get(smart_route))
        .route("/api/user-location/update_location/", post(update_location))
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

/// Record the hit and check the bearer token against the accepted one.
fn authorize(
    state: &MockState,
    headers: &HeaderMap,
    path: &str,
    query: Option<&str>,
) -> Result<(), Response> {
    state
        .hits
        .lock()
        .push((path.to_string(), query.unwrap_or_default().to_string()));
    let expected = format!("Bearer {}", state.access.lock());
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(header) if header == expected => Ok(()),
        _ => Err(detail(
            StatusCode::UNAUTHORIZED,
            "Given token not valid for any token type",
        )),
    }
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Credentials>) -> Response {
    if body.password == PASSWORD {
        let access = state.access.lock().clone();
        Json(json!({ "access": access, "refresh": REFRESH_TOKEN })).into_response()
    } else {
        detail(
            StatusCode::UNAUTHORIZED,
            "No active account found with the given credentials",
        )
    }
}

async fn register(Json(body): Json<Value>) -> Response {
    if body["username"] == USERNAME {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "username": ["A user with that username already exists."] })),
        )
            .into_response();
    }
    (StatusCode::CREATED, Json(json!({ "username": body["username"] }))).into_response()
}

async fn refresh(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let delay = *state.refresh_delay.lock();
    tokio::time::sleep(delay).await;
    let n = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if *state.refresh_revoked.lock() || body["refresh"] != REFRESH_TOKEN {
        return detail(StatusCode::UNAUTHORIZED, "Token is invalid or expired");
    }
    let access = format!("access-{n}");
    *state.access.lock() = access.clone();
    Json(json!({ "access": access })).into_response()
}

#[derive(Deserialize)]
struct Scope {
    lat: Option<f64>,
    lon: Option<f64>,
    radius: Option<f64>,
}

fn in_scope(scope: &Scope, lat: f64, lon: f64) -> bool {
    match (scope.lat, scope.lon, scope.radius) {
        (Some(clat), Some(clon), Some(radius)) => {
            urbanshield_common::geo::haversine_km(
                &urbanshield_common::Coordinates::new(clat, clon),
                &urbanshield_common::Coordinates::new(lat, lon),
            ) <= radius
        }
        _ => true,
    }
}

async fn disasters(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    axum::extract::RawQuery(raw): axum::extract::RawQuery,
    Query(scope): Query<Scope>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "disasters/", raw.as_deref()) {
        return rejection;
    }
    let all = [
        json!({ "id": 11, "latitude": 30.1205, "longitude": 78.2904, "disaster_type": "flood", "severity": 7, "title": "Ganga above danger mark", "created_at": "2025-07-01T10:00:00Z" }),
        json!({ "id": 12, "latitude": 30.3165, "longitude": 78.0322, "disaster_type": "landslide", "severity": 5 }),
    ];
    let hazards: Vec<Value> = all
        .into_iter()
        .filter(|h| in_scope(&scope, h["latitude"].as_f64().unwrap(), h["longitude"].as_f64().unwrap()))
        .collect();
    Json(hazards).into_response()
}

async fn traffic(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    axum::extract::RawQuery(raw): axum::extract::RawQuery,
    Query(scope): Query<Scope>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "traffic/", raw.as_deref()) {
        return rejection;
    }
    let all = [
        json!({ "id": 1, "latitude": 30.1100, "longitude": 78.2900, "congestion_level": 8 }),
        json!({ "id": 2, "latitude": 30.1300, "longitude": 78.3000, "congestion_level": 4 }),
        json!({ "id": 3, "latitude": 30.3200, "longitude": 78.0300, "congestion_level": 9, "is_blocked": true }),
    ];
    let points: Vec<Value> = all
        .into_iter()
        .filter(|p| in_scope(&scope, p["latitude"].as_f64().unwrap(), p["longitude"].as_f64().unwrap()))
        .collect();
    Json(points).into_response()
}

async fn source_refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "source-refresh", None) {
        return rejection;
    }
    Json(json!({ "status": "ok" })).into_response()
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(query): Query<SearchQuery>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "search/", None) {
        return rejection;
    }
    state.search_calls.fetch_add(1, Ordering::SeqCst);
    let places = [
        json!({ "name": "Rishikesh", "lat": 30.12, "lon": 78.29 }),
        json!({ "name": "Dehradun", "lat": 30.32, "lon": 78.03 }),
    ];
    let needle = query.q.to_lowercase();
    let matches: Vec<Value> = places
        .into_iter()
        .filter(|p| p["name"].as_str().unwrap().to_lowercase().starts_with(&needle))
        .collect();
    Json(matches).into_response()
}

async fn search_info(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(scope): Query<Scope>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "search/info/", None) {
        return rejection;
    }
    let near_rishikesh = in_scope(&scope, 30.12, 78.29);
    Json(json!({
        "traffic_count": if near_rishikesh { 2 } else { 0 },
        "disaster_count": if near_rishikesh { 1 } else { 0 },
    }))
    .into_response()
}

async fn smart_route(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "route/smart_route/", None) {
        return rejection;
    }
    Json(json!({
        "geojson_route": { "type": "LineString", "coordinates": [[78.29, 30.12], [78.16, 30.22], [78.03, 30.32]] },
        "route_nodes": [[30.12, 78.29], [30.32, 78.03]]
    }))
    .into_response()
}

async fn update_location(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&state, &headers, "user-location/update_location/", None) {
        return rejection;
    }
    state.reports.lock().push(body);
    Json(json!({ "status": "updated" })).into_response()
}

/// Facility GeoJSON documents in a temporary directory.
pub fn facility_assets() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let police = json!({
        "type": "FeatureCollection",
        "features": [
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [78.2910, 30.1190] }, "properties": { "name": "Rishikesh Kotwali" } },
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [78.0330, 30.3250] }, "properties": { "name": "Dehradun City Police" } }
        ]
    });
    std::fs::write(
        dir.path().join("uttrakhand_police.geojson"),
        serde_json::to_vec(&police).unwrap(),
    )
    .unwrap();
    dir
}
