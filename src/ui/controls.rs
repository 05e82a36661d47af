use crate::{
    engine::{ControlId, EngineResult, MapEngine},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Controls the runtime knows how to install
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Scale,
    Geocoder,
    Draw,
    Fullscreen,
    Navigation,
    Geolocate,
    Reset,
    Custom,
    #[serde(alias = "layers-list", alias = "layers_control")]
    LayersList,
    Globe,
}

impl ControlKind {
    /// Position in the initial installation order
    pub fn install_rank(&self) -> u8 {
        match self {
            Self::Scale => 0,
            Self::Geocoder => 1,
            Self::Draw => 2,
            Self::Fullscreen => 3,
            Self::Navigation => 4,
            Self::Geolocate => 5,
            Self::Reset => 6,
            Self::Custom => 7,
            Self::LayersList => 8,
            Self::Globe => 9,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scale => "scale",
            Self::Geocoder => "geocoder",
            Self::Draw => "draw",
            Self::Fullscreen => "fullscreen",
            Self::Navigation => "navigation",
            Self::Geolocate => "geolocate",
            Self::Reset => "reset",
            Self::Custom => "custom",
            Self::LayersList => "layers_list",
            Self::Globe => "globe",
        }
    }
}

fn default_position() -> String {
    "top-right".to_string()
}

/// A control as described by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSpec {
    #[serde(rename = "type")]
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_position")]
    pub position: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl ControlSpec {
    pub fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            id: None,
            position: default_position(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    /// Registry key: the explicit id, or the kind name
    pub fn key(&self) -> String {
        self.id.clone().unwrap_or_else(|| self.kind.name().to_string())
    }
}

/// Installed controls keyed by id, in installation order
#[derive(Debug, Default)]
pub struct ControlRegistry {
    entries: Vec<(String, ControlKind, ControlId)>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a control; a control with the same key is replaced
    pub fn add(&mut self, engine: &mut dyn MapEngine, spec: &ControlSpec) -> EngineResult<ControlId> {
        let key = spec.key();
        self.remove(engine, &key);
        let id = engine.add_control(spec)?;
        self.entries.push((key, spec.kind, id));
        Ok(id)
    }

    /// Registers a control installed through another engine call (the draw plugin)
    pub fn track(&mut self, key: &str, kind: ControlKind, id: ControlId) {
        self.entries.push((key.to_string(), kind, id));
    }

    /// Removes a control by key. Unknown keys are ignored.
    pub fn remove(&mut self, engine: &mut dyn MapEngine, key: &str) -> bool {
        let Some(index) = self.entries.iter().position(|(k, _, _)| k == key) else {
            return false;
        };
        let (_, _, id) = self.entries.remove(index);
        if let Err(e) = engine.remove_control(id) {
            log::warn!("removing control '{}': {}", key, e);
        }
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _, _)| k == key)
    }

    pub fn has_kind(&self, kind: ControlKind) -> bool {
        self.entries.iter().any(|(_, k, _)| *k == kind)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(k, _, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sorts controls into installation order, keeping host order within a kind
pub fn install_order(controls: &[ControlSpec]) -> Vec<ControlSpec> {
    let mut sorted = controls.to_vec();
    sorted.sort_by_key(|c| c.kind.install_rank());
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_spec_parsing() {
        let spec: ControlSpec = serde_json::from_value(json!({
            "type": "layers-list",
            "position": "top-left",
            "collapsible": true
        }))
        .unwrap();
        assert_eq!(spec.kind, ControlKind::LayersList);
        assert_eq!(spec.key(), "layers_list");
        assert_eq!(spec.options["collapsible"], json!(true));

        let nav: ControlSpec = serde_json::from_value(json!({"type": "navigation"})).unwrap();
        assert_eq!(nav.position, "top-right");
    }

    #[test]
    fn test_install_order_is_stable() {
        let controls = vec![
            ControlSpec::new(ControlKind::Reset),
            ControlSpec::new(ControlKind::Navigation),
            ControlSpec {
                id: Some("a".into()),
                ..ControlSpec::new(ControlKind::Custom)
            },
            ControlSpec::new(ControlKind::Scale),
            ControlSpec {
                id: Some("b".into()),
                ..ControlSpec::new(ControlKind::Custom)
            },
        ];
        let keys: Vec<String> = install_order(&controls).iter().map(|c| c.key()).collect();
        assert_eq!(keys, vec!["scale", "navigation", "reset", "a", "b"]);
    }
}
