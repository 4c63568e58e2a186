use std::collections::BTreeMap;

use serde::Serialize;
use urbanshield_common::{Area, SearchInfo};

use super::{LayerKind, LayerStatus, RouteGeometry};

/// What presentation renders for one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerView {
    pub status: LayerStatus,
    /// Last known feature count. Panel statistics keep this populated for
    /// hidden layers too.
    pub count: usize,
    /// Features inside the focus area, when a focus is set and the layer
    /// holds data.
    pub in_focus: Option<usize>,
    pub polling: bool,
}

/// Aggregated state of every layer, republished on each change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerSnapshot {
    pub layers: BTreeMap<LayerKind, LayerView>,
    pub focus: Option<Area>,
    pub focus_info: Option<SearchInfo>,
    pub route: Option<RouteGeometry>,
}

impl LayerSnapshot {
    pub fn view(&self, kind: LayerKind) -> LayerView {
        self.layers.get(&kind).cloned().unwrap_or_default()
    }

    pub fn status(&self, kind: LayerKind) -> LayerStatus {
        self.view(kind).status
    }

    pub fn count(&self, kind: LayerKind) -> usize {
        self.view(kind).count
    }

    pub fn visible(&self) -> impl Iterator<Item = LayerKind> + '_ {
        self.layers
            .iter()
            .filter(|(_, view)| view.status == LayerStatus::Visible)
            .map(|(kind, _)| *kind)
    }
}

/// Non-blocking notices for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerEvent {
    Failed { kind: LayerKind, message: String },
}
