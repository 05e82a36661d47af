use crate::{
    core::geo::LngLat,
    engine::{MapEngine, MarkerId},
};
use serde::{Deserialize, Serialize};

/// A DOM marker placed on the map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub lng_lat: LngLat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup: Option<String>,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub rotation: f64,
}

impl MarkerSpec {
    pub fn new(lng_lat: LngLat) -> Self {
        Self {
            id: None,
            lng_lat,
            color: None,
            popup: None,
            draggable: false,
            rotation: 0.0,
        }
    }

    pub fn with_popup(mut self, text: String) -> Self {
        self.popup = Some(text);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

struct PlacedMarker {
    spec: MarkerSpec,
    handle: MarkerId,
}

/// Markers in placement order
#[derive(Default)]
pub struct MarkerRegistry {
    markers: Vec<PlacedMarker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, engine: &mut dyn MapEngine, spec: MarkerSpec) -> MarkerId {
        let handle = engine.add_marker(&spec);
        self.markers.push(PlacedMarker { spec, handle });
        handle
    }

    /// Removes every marker from the map
    pub fn clear(&mut self, engine: &mut dyn MapEngine) {
        for marker in self.markers.drain(..) {
            engine.remove_marker(marker.handle);
        }
    }

    /// Records a drag; returns the host-facing id of the moved marker
    pub fn moved(&mut self, handle: MarkerId, lng_lat: LngLat) -> Option<String> {
        let marker = self.markers.iter_mut().find(|m| m.handle == handle)?;
        marker.spec.lng_lat = lng_lat;
        Some(
            marker
                .spec
                .id
                .clone()
                .unwrap_or_else(|| handle.0.to_string()),
        )
    }

    pub fn position(&self, id: &str) -> Option<LngLat> {
        self.markers
            .iter()
            .find(|m| m.spec.id.as_deref() == Some(id))
            .map(|m| m.spec.lng_lat)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
