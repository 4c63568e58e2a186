//! Owns every map layer's lifecycle: fetches, poll timers, focus scoping and
//! the published snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::future::{join_all, AbortHandle, AbortRegistration, Abortable, Aborted};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use urbanshield_common::{Area, Coordinates, SearchInfo};

use super::assets::{AssetError, AssetFetcher};
use super::snapshot::{LayerEvent, LayerSnapshot, LayerView};
use super::{FetchMode, LayerData, LayerKind, LayerStatus, RouteGeometry};
use crate::api::PortalApi;
use crate::error::GatewayError;

/// Radius of the area scoped by a focus point.
pub const FOCUS_RADIUS_KM: f64 = 10.0;
pub const PANEL_STATS_INTERVAL: Duration = Duration::from_secs(2 * 60);

const EVENT_CAPACITY: usize = 64;
const NO_ROUTE_MESSAGE: &str = "No route found";

#[derive(Debug, thiserror::Error)]
enum LoadError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("no route between the endpoints")]
    NoRoute,
    #[error("{0} layer has no fetch of its own")]
    Unsupported(LayerKind),
}

/// Identifies one fetch so its completion can be matched to the layer state
/// it was started for.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    kind: LayerKind,
    generation: u64,
    seq: u64,
}

struct LayerState {
    status: LayerStatus,
    data: Option<LayerData>,
    poll: Option<JoinHandle<()>>,
    /// Distinct per activation; a completion for an older activation is
    /// dropped.
    generation: u64,
    /// Distinct per fetch within an activation; only the newest fetch lands.
    fetch_seq: u64,
}

impl Drop for LayerState {
    fn drop(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
    }
}

#[derive(Default)]
struct State {
    /// Active layers only; absence means hidden.
    layers: BTreeMap<LayerKind, LayerState>,
    /// Last known feature counts, including panel statistics for hidden
    /// layers.
    counts: BTreeMap<LayerKind, usize>,
    focus: Option<Area>,
    focus_info: Option<SearchInfo>,
    focus_fetch: Option<AbortHandle>,
    next_generation: u64,
    closed: bool,
}

struct Inner {
    api: PortalApi,
    assets: Arc<dyn AssetFetcher>,
    state: Mutex<State>,
    snapshot: watch::Sender<LayerSnapshot>,
    events: broadcast::Sender<LayerEvent>,
    stats_task: Mutex<Option<JoinHandle<()>>>,
}

/// The map layer orchestrator. Dropping it tears every layer down.
pub struct LayerOrchestrator {
    inner: Arc<Inner>,
}

impl LayerOrchestrator {
    pub fn new(api: PortalApi, assets: Arc<dyn AssetFetcher>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Inner {
            api,
            assets,
            state: Mutex::new(State::default()),
            snapshot: watch::Sender::new(LayerSnapshot::default()),
            events,
            stats_task: Mutex::new(None),
        };
        inner.publish(&inner.state.lock());
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Show a hidden layer. Returns the resulting status; activating a layer
    /// that is already active changes nothing.
    pub async fn activate(&self, kind: LayerKind) -> LayerStatus {
        self.inner.activate(kind).await
    }

    /// Hide a layer, stop its poll timer and drop its data. Returns `false`
    /// if it was already hidden.
    pub fn deactivate(&self, kind: LayerKind) -> bool {
        self.inner.deactivate(kind)
    }

    pub async fn toggle(&self, kind: LayerKind) -> LayerStatus {
        let active = self.inner.state.lock().layers.contains_key(&kind);
        if active {
            self.deactivate(kind);
            LayerStatus::Hidden
        } else {
            self.activate(kind).await
        }
    }

    /// Re-fetch a visible layer.
    pub async fn refresh(&self, kind: LayerKind) -> LayerStatus {
        self.inner.refresh(kind, FetchMode::Plain).await
    }

    /// Re-fetch every visible layer. Visibility and poll timers are left as
    /// they are.
    pub async fn refresh_all(&self) {
        let visible: Vec<LayerKind> = {
            let state = self.inner.state.lock();
            state
                .layers
                .iter()
                .filter(|(kind, layer)| **kind != LayerKind::Route && layer.data.is_some())
                .map(|(kind, _)| *kind)
                .collect()
        };
        tracing::debug!(layers = visible.len(), "refreshing all visible layers");
        join_all(
            visible
                .into_iter()
                .map(|kind| self.inner.refresh(kind, FetchMode::Plain)),
        )
        .await;
    }

    /// Scope focus-dependent layers to [`FOCUS_RADIUS_KM`] around `point`,
    /// or lift the scope with `None`.
    pub async fn set_focus(&self, point: Option<Coordinates>) {
        match point {
            Some(center) => self.inner.focus_on(Area::new(center, FOCUS_RADIUS_KM)).await,
            None => self.inner.clear_focus().await,
        }
    }

    /// Compute a route and show it, replacing any previous one.
    pub async fn find_route(&self, start: Coordinates, end: Coordinates) -> LayerStatus {
        self.inner.find_route(start, end).await
    }

    pub fn clear_route(&self) -> bool {
        self.deactivate(LayerKind::Route)
    }

    /// Update traffic and disaster counts from unscoped lists. Skipped while a
    /// focus is set.
    pub async fn refresh_panel_stats(&self) -> bool {
        self.inner.refresh_panel_stats().await
    }

    pub async fn load_facility_stats(&self) {
        self.inner.load_facility_stats().await
    }

    /// Load facility counts once, then keep traffic and disaster counts fresh
    /// every [`PANEL_STATS_INTERVAL`].
    pub fn start_panel_stats(&self) {
        let owner = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = interval(PANEL_STATS_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            if let Some(inner) = owner.upgrade() {
                inner.load_facility_stats().await;
            }
            loop {
                ticker.tick().await;
                let Some(inner) = owner.upgrade() else { break };
                inner.refresh_panel_stats().await;
            }
        });
        if let Some(previous) = self.inner.stats_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Cancel every timer and in-flight focus lookup and hide all layers.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    pub fn subscribe(&self) -> watch::Receiver<LayerSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> LayerSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn events(&self) -> broadcast::Receiver<LayerEvent> {
        self.inner.events.subscribe()
    }

    pub fn layer_data(&self, kind: LayerKind) -> Option<LayerData> {
        self.inner
            .state
            .lock()
            .layers
            .get(&kind)
            .and_then(|layer| layer.data.clone())
    }
}

impl Drop for LayerOrchestrator {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl Inner {
    async fn activate(self: &Arc<Self>, kind: LayerKind) -> LayerStatus {
        if kind == LayerKind::Route {
            return self.status(kind);
        }
        let ticket = match self.begin_activation(kind, false) {
            Ok(ticket) => ticket,
            Err(status) => return status,
        };
        let outcome = self.load(kind, FetchMode::Plain).await;
        self.complete(ticket, outcome)
    }

    async fn refresh(self: &Arc<Self>, kind: LayerKind, mode: FetchMode) -> LayerStatus {
        let Some(ticket) = self.begin_refresh(kind) else {
            return self.status(kind);
        };
        let outcome = self.load(kind, mode).await;
        self.complete(ticket, outcome)
    }

    async fn find_route(self: &Arc<Self>, start: Coordinates, end: Coordinates) -> LayerStatus {
        let ticket = match self.begin_activation(LayerKind::Route, true) {
            Ok(ticket) => ticket,
            Err(status) => return status,
        };
        let outcome = match self.api.smart_route(start, end).await {
            Ok(response) => RouteGeometry::from_response(start, end, &response)
                .map(LayerData::Route)
                .ok_or(LoadError::NoRoute),
            Err(err) => Err(err.into()),
        };
        self.complete(ticket, outcome)
    }

    fn status(&self, kind: LayerKind) -> LayerStatus {
        self.state
            .lock()
            .layers
            .get(&kind)
            .map_or(LayerStatus::Hidden, |layer| layer.status)
    }

    /// Hidden → Loading. With `replace`, an active layer is torn down and
    /// started over instead of being left alone.
    fn begin_activation(&self, kind: LayerKind, replace: bool) -> Result<Ticket, LayerStatus> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LayerStatus::Hidden);
        }
        if let Some(layer) = state.layers.get(&kind) {
            if !replace {
                return Err(layer.status);
            }
            state.layers.remove(&kind);
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        state.layers.insert(
            kind,
            LayerState {
                status: LayerStatus::Loading,
                data: None,
                poll: None,
                generation,
                fetch_seq: 1,
            },
        );
        self.publish(&state);
        tracing::debug!(%kind, "layer loading");
        Ok(Ticket {
            kind,
            generation,
            seq: 1,
        })
    }

    /// Visible → Loading for a layer that already holds data.
    fn begin_refresh(&self, kind: LayerKind) -> Option<Ticket> {
        if kind == LayerKind::Route {
            return None;
        }
        let mut state = self.state.lock();
        let layer = state.layers.get_mut(&kind)?;
        layer.data.as_ref()?;
        layer.status = LayerStatus::Loading;
        layer.fetch_seq += 1;
        let ticket = Ticket {
            kind,
            generation: layer.generation,
            seq: layer.fetch_seq,
        };
        self.publish(&state);
        Some(ticket)
    }

    fn complete(self: &Arc<Self>, ticket: Ticket, outcome: Result<LayerData, LoadError>) -> LayerStatus {
        let kind = ticket.kind;
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(layer) = state.layers.get_mut(&kind) else {
            tracing::debug!(%kind, "discarding fetch for hidden layer");
            return LayerStatus::Hidden;
        };
        if layer.generation != ticket.generation || layer.fetch_seq != ticket.seq {
            tracing::debug!(%kind, "discarding superseded fetch");
            return layer.status;
        }

        let status = match outcome {
            Ok(data) => {
                if kind != LayerKind::Route {
                    state.counts.insert(kind, data.len());
                }
                tracing::info!(%kind, features = data.len(), "layer visible");
                layer.data = Some(data);
                layer.status = LayerStatus::Visible;
                if layer.poll.is_none() {
                    if let Some(period) = kind.poll_interval() {
                        layer.poll = Some(self.spawn_poll(kind, period));
                    }
                }
                LayerStatus::Visible
            }
            Err(err) => {
                let message = match err {
                    LoadError::NoRoute => NO_ROUTE_MESSAGE.to_string(),
                    _ => kind.failure_message().to_string(),
                };
                tracing::warn!(%kind, %err, "layer fetch failed");
                let status = if layer.data.is_some() {
                    layer.status = LayerStatus::Visible;
                    LayerStatus::Visible
                } else {
                    state.layers.remove(&kind);
                    LayerStatus::Hidden
                };
                let _ = self.events.send(LayerEvent::Failed { kind, message });
                status
            }
        };
        self.publish(state);
        status
    }

    fn spawn_poll(self: &Arc<Self>, kind: LayerKind, period: Duration) -> JoinHandle<()> {
        let owner: Weak<Inner> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = owner.upgrade() else { break };
                tracing::debug!(%kind, "poll tick");
                inner.refresh(kind, FetchMode::Plain).await;
            }
        })
    }

    fn deactivate(&self, kind: LayerKind) -> bool {
        let mut state = self.state.lock();
        let Some(layer) = state.layers.remove(&kind) else {
            return false;
        };
        drop(layer);
        self.publish(&state);
        tracing::info!(%kind, "layer hidden");
        true
    }

    async fn load(&self, kind: LayerKind, mode: FetchMode) -> Result<LayerData, LoadError> {
        let scope = self.state.lock().focus;
        match kind {
            LayerKind::Traffic => {
                if mode == FetchMode::RefreshSource {
                    if let Err(err) = self.api.refresh_live_traffic().await {
                        tracing::debug!(%err, "live traffic refresh failed");
                    }
                }
                Ok(LayerData::Traffic(self.api.traffic(scope.as_ref()).await?))
            }
            LayerKind::Disasters => {
                if mode == FetchMode::RefreshSource {
                    let (quakes, weather) =
                        tokio::join!(self.api.fetch_earthquakes(), self.api.fetch_weather());
                    if let Err(err) = quakes.and(weather) {
                        tracing::debug!(%err, "external hazard refresh failed");
                    }
                }
                Ok(LayerData::Hazards(self.api.hazards(scope.as_ref()).await?))
            }
            _ => match kind.asset_name() {
                Some(name) => Ok(LayerData::Facilities(self.assets.fetch(name).await?.features)),
                None => Err(LoadError::Unsupported(kind)),
            },
        }
    }

    async fn focus_on(self: &Arc<Self>, area: Area) {
        let registration = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.focus = Some(area);
            state.focus_info = None;
            if let Some(previous) = state.focus_fetch.take() {
                previous.abort();
            }
            let (handle, registration) = AbortHandle::new_pair();
            state.focus_fetch = Some(handle);
            self.publish(&state);
            registration
        };
        tracing::info!(lat = area.center.lat, lon = area.center.lon, "focus set");

        let layers = LayerKind::ALL
            .into_iter()
            .filter(|kind| kind.is_focus_dependent())
            .map(|kind| self.focus_layer(kind));
        tokio::join!(self.load_focus_info(area, registration), join_all(layers));
    }

    /// Bring a focus-dependent layer in line with a new focus: a visible
    /// layer refreshes its sources, a hidden one is shown.
    async fn focus_layer(self: &Arc<Self>, kind: LayerKind) -> LayerStatus {
        let active = self
            .state
            .lock()
            .layers
            .get(&kind)
            .map(|layer| layer.data.is_some());
        match active {
            Some(true) => self.refresh(kind, FetchMode::RefreshSource).await,
            Some(false) => {
                self.deactivate(kind);
                self.activate(kind).await
            }
            None => self.activate(kind).await,
        }
    }

    async fn load_focus_info(&self, area: Area, registration: AbortRegistration) {
        let fetched = match Abortable::new(self.api.search_info(&area), registration).await {
            Ok(fetched) => fetched,
            Err(Aborted) => {
                tracing::debug!("focus info lookup canceled");
                return;
            }
        };
        let mut state = self.state.lock();
        if state.focus != Some(area) {
            return;
        }
        state.focus_fetch = None;
        state.focus_info = match fetched {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!(%err, "focus info lookup failed");
                None
            }
        };
        self.publish(&state);
    }

    async fn clear_focus(&self) {
        {
            let mut state = self.state.lock();
            if state.focus.take().is_none() {
                return;
            }
            state.focus_info = None;
            if let Some(fetch) = state.focus_fetch.take() {
                fetch.abort();
            }
            self.publish(&state);
        }
        tracing::info!("focus cleared");
        self.refresh_panel_stats().await;
    }

    async fn refresh_panel_stats(&self) -> bool {
        let focused = self.state.lock().focus.is_some();
        if focused {
            return false;
        }
        let (traffic, hazards) = tokio::join!(self.api.traffic(None), self.api.hazards(None));
        let (traffic, hazards) = match (traffic, hazards) {
            (Ok(traffic), Ok(hazards)) => (traffic.len(), hazards.len()),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(%err, "panel stats fetch failed");
                return false;
            }
        };

        let mut state = self.state.lock();
        if state.focus.is_some() || state.closed {
            return false;
        }
        state.counts.insert(LayerKind::Traffic, traffic);
        state.counts.insert(LayerKind::Disasters, hazards);
        self.publish(&state);
        true
    }

    async fn load_facility_stats(&self) {
        let loads = LayerKind::FACILITIES.into_iter().filter_map(|kind| {
            let name = kind.asset_name()?;
            Some(async move { (kind, self.assets.fetch(name).await) })
        });
        let loaded = join_all(loads).await;

        let mut state = self.state.lock();
        for (kind, result) in loaded {
            match result {
                Ok(collection) => {
                    state.counts.insert(kind, collection.features.len());
                }
                Err(err) => tracing::debug!(%kind, %err, "facility stats unavailable"),
            }
        }
        self.publish(&state);
    }

    fn shutdown(&self) {
        if let Some(task) = self.stats_task.lock().take() {
            task.abort();
        }
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.layers.clear();
        if let Some(fetch) = state.focus_fetch.take() {
            fetch.abort();
        }
        self.publish(&state);
        tracing::debug!("layer orchestrator shut down");
    }

    fn publish(&self, state: &State) {
        let mut layers = BTreeMap::new();
        for kind in LayerKind::ALL {
            let layer = state.layers.get(&kind);
            let data = layer.and_then(|layer| layer.data.as_ref());
            let in_focus = match (state.focus.as_ref(), data) {
                (Some(area), Some(data)) if kind != LayerKind::Route => {
                    Some(data.points().iter().filter(|p| area.contains(p)).count())
                }
                _ => None,
            };
            layers.insert(
                kind,
                LayerView {
                    status: layer.map_or(LayerStatus::Hidden, |layer| layer.status),
                    count: data
                        .map(LayerData::len)
                        .or_else(|| state.counts.get(&kind).copied())
                        .unwrap_or(0),
                    in_focus,
                    polling: layer.is_some_and(|layer| layer.poll.is_some()),
                },
            );
        }
        let route = match state
            .layers
            .get(&LayerKind::Route)
            .and_then(|layer| layer.data.as_ref())
        {
            Some(LayerData::Route(route)) => Some(route.clone()),
            _ => None,
        };
        self.snapshot.send_replace(LayerSnapshot {
            layers,
            focus: state.focus,
            focus_info: state.focus_info,
            route,
        });
    }
}
