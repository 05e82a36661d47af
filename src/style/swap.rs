//! Style swap state preservation.
//!
//! Replacing the style drops every source, layer, image and feature state the
//! host added. The swap manager captures user content before the style call,
//! waits for the new style to load, and replays it:
//!
//! 1. sources (skipping any that already exist)
//! 2. layers in their captured order (skipping existing ones)
//! 3. event listeners of re-added layers
//! 4. images added by the host
//! 5. the layer state snapshot: filters, paint, layout, tooltips, popups
//! 6. legend overlays
//!
//! Each swap carries a generation number. A `set_style` that arrives before
//! the previous swap finished supersedes it: the old load listener is detached,
//! the first capture is kept and a new generation starts. Load events for
//! anything but the current generation's listener are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    core::context::MapContext,
    engine::{EngineResult, InteractionKind, LayerSpec, ListenerId, MapEngine, SourceSpec, StyleRequest},
    input::events::now_millis,
    Result,
};

/// Where a widget is in the swap cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapPhase {
    Idle,
    /// Waiting for the new style to load
    Swapping { generation: u64, listener: ListenerId },
    /// Replaying captured content onto the loaded style
    Restoring { generation: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedLayer {
    pub spec: LayerSpec,
    /// First non-captured layer above this one in the outgoing style
    pub before: Option<String>,
    pub handlers: Vec<InteractionKind>,
}

/// User content captured from the outgoing style
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SwapCapture {
    pub sources: Vec<(String, SourceSpec)>,
    pub layers: Vec<CapturedLayer>,
}

impl SwapCapture {
    /// Captures every source the host added and every layer drawing from one
    pub fn take(engine: &dyn MapEngine, context: &MapContext) -> Self {
        let style_sources = engine.style_source_ids();
        let sources: Vec<(String, SourceSpec)> = engine
            .source_ids()
            .into_iter()
            .filter(|id| !style_sources.contains(id) && !context.config.is_reserved_source(id))
            .filter_map(|id| engine.source(&id).map(|spec| (id, spec)))
            .collect();

        let layer_ids = engine.layer_ids();
        let is_user = |layer: &LayerSpec| {
            layer
                .source
                .as_ref()
                .is_some_and(|s| sources.iter().any(|(id, _)| id == s))
        };
        let specs: Vec<Option<LayerSpec>> = layer_ids.iter().map(|id| engine.layer(id)).collect();

        let mut layers = Vec::new();
        for (index, spec) in specs.iter().enumerate() {
            let Some(spec) = spec.as_ref().filter(|s| is_user(*s)) else {
                continue;
            };
            let before = specs[index + 1..]
                .iter()
                .flatten()
                .find(|above| !is_user(*above))
                .map(|above| above.id.clone());
            layers.push(CapturedLayer {
                spec: spec.clone(),
                before,
                handlers: context.binder.handlers().kinds(&spec.id),
            });
        }

        Self { sources, layers }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.layers.is_empty()
    }
}

/// What a restoration step touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStep {
    Source,
    Layer,
    Handlers,
    Image,
    Filter,
    Paint,
    Layout,
    Tooltip,
    Popup,
    Legends,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreItem {
    pub step: RestoreStep,
    pub id: String,
    pub outcome: RestoreOutcome,
}

/// Per-item results of one restoration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub generation: u64,
    pub items: Vec<RestoreItem>,
}

impl RestoreReport {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            items: Vec::new(),
        }
    }

    fn record(&mut self, step: RestoreStep, id: &str, outcome: RestoreOutcome) {
        if let RestoreOutcome::Failed(reason) = &outcome {
            log::warn!("restoring {:?} '{}' failed: {}", step, id, reason);
        }
        self.items.push(RestoreItem {
            step,
            id: id.to_string(),
            outcome,
        });
    }

    fn record_result(&mut self, step: RestoreStep, id: &str, result: EngineResult<()>) {
        let outcome = match result {
            Ok(()) => RestoreOutcome::Restored,
            Err(e) => RestoreOutcome::Failed(e.to_string()),
        };
        self.record(step, id, outcome);
    }

    pub fn failures(&self) -> Vec<&RestoreItem> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, RestoreOutcome::Failed(_)))
            .collect()
    }

    pub fn restored_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == RestoreOutcome::Restored)
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn outcome(&self, step: RestoreStep, id: &str) -> Option<&RestoreOutcome> {
        self.items
            .iter()
            .find(|i| i.step == step && i.id == id)
            .map(|i| &i.outcome)
    }

    /// Payload sent to the host after a swap
    pub fn to_host_value(&self) -> Value {
        json!({
            "generation": self.generation,
            "complete": self.is_complete(),
            "restored": self.restored_count(),
            "failed": self.failures().len(),
            "items": self.items,
            "time": now_millis(),
        })
    }
}

/// Drives the Idle → Swapping → Restoring → Idle cycle
#[derive(Debug)]
pub struct StyleSwapManager {
    phase: SwapPhase,
    generation: u64,
    capture: Option<SwapCapture>,
    last_report: Option<RestoreReport>,
}

impl Default for StyleSwapManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleSwapManager {
    pub fn new() -> Self {
        Self {
            phase: SwapPhase::Idle,
            generation: 0,
            capture: None,
            last_report: None,
        }
    }

    pub fn phase(&self) -> SwapPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// A swap is pending or being restored
    pub fn is_busy(&self) -> bool {
        self.phase != SwapPhase::Idle
    }

    pub fn last_report(&self) -> Option<&RestoreReport> {
        self.last_report.as_ref()
    }

    pub fn pending_capture(&self) -> Option<&SwapCapture> {
        self.capture.as_ref()
    }

    /// Starts a swap with an already taken capture. A pending swap is superseded
    /// and its capture kept in place of `capture`.
    pub fn begin(
        &mut self,
        engine: &mut dyn MapEngine,
        request: &StyleRequest,
        capture: SwapCapture,
    ) -> Result<u64> {
        let superseded = match self.phase {
            SwapPhase::Swapping { generation, listener } => Some((generation, listener)),
            _ => None,
        };

        engine.set_style(request)?;

        if let Some((generation, listener)) = superseded {
            log::info!("style swap {} superseded before its style loaded", generation);
            engine.off(listener);
        } else {
            log::debug!(
                "captured {} sources and {} layers for style swap",
                capture.sources.len(),
                capture.layers.len()
            );
            self.capture = Some(capture);
        }
        self.generation += 1;
        let listener = engine.once_style_load();
        self.phase = SwapPhase::Swapping {
            generation: self.generation,
            listener,
        };
        Ok(self.generation)
    }

    /// Handles a style-load signal. Returns the capture to restore when the
    /// signal belongs to the current swap; stale signals are ignored.
    pub fn style_loaded(&mut self, engine: &mut dyn MapEngine, listener: ListenerId) -> Option<(u64, SwapCapture)> {
        match self.phase {
            SwapPhase::Swapping {
                generation,
                listener: current,
            } if current == listener => {
                engine.off(listener);
                self.phase = SwapPhase::Restoring { generation };
                Some((generation, self.capture.take().unwrap_or_default()))
            }
            _ => {
                log::debug!("ignoring stale style load listener {:?}", listener);
                engine.off(listener);
                None
            }
        }
    }

    /// Ends restoration
    pub fn finish(&mut self, report: RestoreReport) {
        self.phase = SwapPhase::Idle;
        self.last_report = Some(report);
    }
}

/// Replays captured content and the layer state snapshot onto a freshly loaded style
pub fn restore(
    engine: &mut dyn MapEngine,
    context: &mut MapContext,
    capture: &SwapCapture,
    generation: u64,
) -> RestoreReport {
    let mut report = RestoreReport::new(generation);

    for (id, spec) in &capture.sources {
        if engine.source(id).is_some() {
            report.record(RestoreStep::Source, id, RestoreOutcome::Skipped("already present".into()));
            continue;
        }
        report.record_result(RestoreStep::Source, id, engine.add_source(id, spec));
    }

    let mut readded = Vec::new();
    for layer in &capture.layers {
        let id = layer.spec.id.as_str();
        if engine.layer(id).is_some() {
            report.record(RestoreStep::Layer, id, RestoreOutcome::Skipped("already present".into()));
            continue;
        }
        let before = layer
            .before
            .as_deref()
            .filter(|b| engine.layer(b).is_some());
        let result = engine.add_layer(&layer.spec, before);
        if result.is_ok() {
            readded.push(layer);
        }
        report.record_result(RestoreStep::Layer, id, result);
    }

    context.binder.reset_hover_state();
    for layer in readded {
        if layer.handlers.is_empty() {
            continue;
        }
        let attached = context.binder.reattach(engine, &layer.spec.id);
        let outcome = if attached == layer.handlers.len() {
            RestoreOutcome::Restored
        } else {
            RestoreOutcome::Failed(format!(
                "{} of {} listeners reattached",
                attached,
                layer.handlers.len()
            ))
        };
        report.record(RestoreStep::Handlers, &layer.spec.id, outcome);
    }

    for image in &context.images {
        if engine.has_image(&image.id) {
            report.record(RestoreStep::Image, &image.id, RestoreOutcome::Skipped("already present".into()));
            continue;
        }
        report.record_result(
            RestoreStep::Image,
            &image.id,
            engine.add_image(&image.id, &image.data, &image.options),
        );
    }

    replay_snapshot(engine, context, &mut report);

    if context.config.swap.rebuild_legends && !context.legends.is_empty() {
        let count = context.legends.rebuild(engine);
        log::debug!("rebuilt {} legends", count);
        report.record(RestoreStep::Legends, "legends", RestoreOutcome::Restored);
    }

    log::info!(
        "style swap {} restored {} items ({} failed)",
        generation,
        report.restored_count(),
        report.failures().len()
    );
    report
}

/// Filters, then paint, then layout and zoom ranges, then tooltips, then popups
fn replay_snapshot(engine: &mut dyn MapEngine, context: &mut MapContext, report: &mut RestoreReport) {
    let states: Vec<(String, crate::layers::state::LayerState)> = context
        .layer_state
        .iter()
        .map(|(id, state)| (id.to_string(), state.clone()))
        .collect();
    let present: Vec<&(String, _)> = states
        .iter()
        .filter(|(id, _)| {
            let exists = engine.layer(id).is_some();
            if !exists {
                report.record(RestoreStep::Layer, id, RestoreOutcome::Skipped("not in the new style".into()));
            }
            exists
        })
        .collect();

    for (id, state) in &present {
        if let Some(filter) = &state.filter {
            let filter = Some(filter).filter(|f| !f.is_null());
            report.record_result(RestoreStep::Filter, id, engine.set_filter(id, filter));
        }
    }

    for (id, state) in &present {
        for (name, base) in &state.paint {
            let value = context.binder.paint_for_write(id, name, base);
            report.record_result(
                RestoreStep::Paint,
                &format!("{}.{}", id, name),
                engine.set_paint_property(id, name, &value),
            );
        }
        if let Err(e) = context.binder.rewrap(engine, id) {
            report.record(RestoreStep::Paint, id, RestoreOutcome::Failed(e.to_string()));
        }
    }

    for (id, state) in &present {
        for (name, value) in &state.layout {
            report.record_result(
                RestoreStep::Layout,
                &format!("{}.{}", id, name),
                engine.set_layout_property(id, name, value),
            );
        }
        if let Some((min, max)) = state.zoom_range {
            report.record_result(
                RestoreStep::Layout,
                &format!("{}.zoom_range", id),
                engine.set_layer_zoom_range(id, min, max),
            );
        }
    }

    for (id, state) in &present {
        if let Some(binding) = &state.tooltip {
            context.binder.attach_tooltip(engine, id, Some(binding.clone()));
            report.record(RestoreStep::Tooltip, id, RestoreOutcome::Restored);
        }
    }

    for (id, state) in &present {
        if let Some(binding) = &state.popup {
            context.binder.attach_popup(engine, id, Some(binding.clone()));
            report.record(RestoreStep::Popup, id, RestoreOutcome::Restored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    fn request(style: &str) -> StyleRequest {
        StyleRequest {
            style: json!(style),
            diff: true,
            config: None,
        }
    }

    fn capture_of(source: &str) -> SwapCapture {
        SwapCapture {
            sources: vec![(source.to_string(), SourceSpec::geojson(json!({"type": "FeatureCollection", "features": []})))],
            layers: Vec::new(),
        }
    }

    #[test]
    fn test_generation_guards_stale_listener() {
        let mut engine = MemoryEngine::new().with_manual_style_load();
        let mut swap = StyleSwapManager::new();

        let first = swap.begin(&mut engine, &request("dark"), capture_of("a")).unwrap();
        let stale = match swap.phase() {
            SwapPhase::Swapping { listener, .. } => listener,
            other => panic!("unexpected phase {:?}", other),
        };
        let second = swap.begin(&mut engine, &request("light"), capture_of("b")).unwrap();
        assert_eq!(second, first + 1);
        assert_eq!(engine.style_listener_count(), 1);

        assert!(swap.style_loaded(&mut engine, stale).is_none());
        assert!(swap.is_busy());

        let current = match swap.phase() {
            SwapPhase::Swapping { listener, .. } => listener,
            other => panic!("unexpected phase {:?}", other),
        };
        let (generation, capture) = swap.style_loaded(&mut engine, current).unwrap();
        assert_eq!(generation, second);
        assert_eq!(capture.sources[0].0, "a");
        assert_eq!(swap.phase(), SwapPhase::Restoring { generation });

        swap.finish(RestoreReport::new(generation));
        assert!(!swap.is_busy());
        assert_eq!(engine.style_listener_count(), 0);
    }

    #[test]
    fn test_report_counts() {
        let mut report = RestoreReport::new(3);
        report.record(RestoreStep::Source, "s", RestoreOutcome::Restored);
        report.record(RestoreStep::Layer, "l", RestoreOutcome::Failed("boom".into()));
        report.record(RestoreStep::Layer, "m", RestoreOutcome::Skipped("already present".into()));
        assert_eq!(report.restored_count(), 1);
        assert!(!report.is_complete());

        let value = report.to_host_value();
        assert_eq!(value["failed"], json!(1));
        assert_eq!(value["items"][1]["outcome"]["status"], json!("failed"));
        assert_eq!(value["items"][1]["outcome"]["reason"], json!("boom"));
    }
}
