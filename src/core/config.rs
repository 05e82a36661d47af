//! Configuration system for widget behaviour
//!
//! Configuration is hierarchical: a [`WidgetConfig`] groups the style-swap,
//! interaction, query and geocoder settings. Presets are resolved per engine
//! flavour, and any part can be overridden from the `widget` key of a render bundle.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::prelude::HashSet;

/// Which GL engine backs the widget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineFlavor {
    #[default]
    Mapbox,
    Maplibre,
}

static MAPBOX_RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["composite", "mapbox", "mapbox-dem", "mapbox-terrain", "mapbox-satellite"]
        .into_iter()
        .collect()
});

static MAPLIBRE_RESERVED: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "openmaptiles",
        "carto",
        "maptiler_planet",
        "protomaps",
        "versatiles-shortbread",
        "terrain",
        "hillshade",
    ]
    .into_iter()
    .collect()
});

impl EngineFlavor {
    /// Source ids that belong to base styles of this flavour and are never treated as user content
    pub fn reserved_sources(&self) -> &'static HashSet<&'static str> {
        match self {
            Self::Mapbox => &MAPBOX_RESERVED,
            Self::Maplibre => &MAPLIBRE_RESERVED,
        }
    }

    /// Id prefixes reserved by base styles
    pub fn reserved_prefixes(&self) -> &'static [&'static str] {
        match self {
            Self::Mapbox => &["mapbox://", "mapbox-"],
            Self::Maplibre => &["maptiler"],
        }
    }
}

/// Style-swap behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Queue mutations that arrive while a swap is pending instead of applying them to a half-loaded style
    pub queue_during_swap: bool,
    /// Default `diff` flag passed to the engine when the message does not carry one
    pub diff: bool,
    /// Additional source ids to treat as base-style content
    pub extra_reserved_sources: Vec<String>,
    /// Send the restoration report to the host after every swap
    pub report_restore: bool,
    /// Re-render legend DOM nodes after restoration
    pub rebuild_legends: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            queue_during_swap: true,
            diff: true,
            extra_reserved_sources: Vec::new(),
            report_restore: true,
            rebuild_legends: true,
        }
    }
}

/// Pointer interaction behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Feature-state key toggled while a feature is hovered
    pub hover_state_key: String,
    /// Report feature hovers to the host
    pub report_hover: bool,
    /// Report feature and map clicks to the host
    pub report_click: bool,
    pub popup_max_width: String,
    pub tooltip_offset: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            hover_state_key: "hover".to_string(),
            report_hover: true,
            report_click: true,
            popup_max_width: "240px".to_string(),
            tooltip_offset: 10.0,
        }
    }
}

/// Rendered-feature query behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Pixel tolerance used for point queries
    pub point_tolerance_px: f64,
    /// Group results per layer unless the request says otherwise
    pub group_by_layer: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            point_tolerance_px: 3.0,
            group_by_layer: false,
        }
    }
}

/// Forward geocoding against a Nominatim-compatible endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub endpoint: String,
    pub limit: usize,
    pub cache_size: usize,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org".to_string(),
            limit: 5,
            cache_size: 128,
            timeout_ms: 5_000,
            user_agent: concat!("mapgl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WidgetConfig {
    pub flavor: EngineFlavor,
    pub swap: SwapConfig,
    pub interaction: InteractionConfig,
    pub query: QueryConfig,
    pub geocoder: GeocoderConfig,
}

impl WidgetConfig {
    /// Preset for a given engine flavour
    pub fn for_flavor(flavor: EngineFlavor) -> Self {
        match flavor {
            EngineFlavor::Mapbox => Self {
                flavor,
                ..Default::default()
            },
            EngineFlavor::Maplibre => Self {
                flavor,
                swap: SwapConfig {
                    diff: false,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Whether a source id belongs to the base style rather than to the host
    pub fn is_reserved_source(&self, id: &str) -> bool {
        self.flavor.reserved_sources().contains(id)
            || self
                .flavor
                .reserved_prefixes()
                .iter()
                .any(|prefix| id.starts_with(prefix))
            || self.swap.extra_reserved_sources.iter().any(|s| s == id)
    }
}
