use std::collections::VecDeque;

use serde_json::{json, Value};

use crate::{
    core::{
        bundle::RenderBundle,
        context::{MapContext, UserImage},
        config::WidgetConfig,
    },
    engine::{Effect, EngineEvent, InteractionKind, ListenerId, MapEngine, RenderedFeature},
    input::events::{names, now_millis, HostChannel},
    plugins::geocoder::{selection_value, Geocoder},
    prelude::Arc,
    proxy::{dispatch, message::Mutation},
    style::swap::{restore, StyleSwapManager},
    ui::controls::install_order,
    MapError, Result,
};

/// Upper bound on poll rounds per [`MapWidget::pump`]; handling one event can queue more
const MAX_PUMP_ROUNDS: usize = 32;

fn warn_failed(what: &str, id: &str, error: &dyn std::fmt::Display) {
    log::warn!("initial {} '{}' failed: {}", what, id, error);
}

/// Lifecycle of a widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetPhase {
    /// No bundle rendered yet
    Created,
    /// The map exists and its first style is loading
    Loading { listener: ListenerId },
    Ready,
    /// The engine library is missing or the map could not be created
    Unusable,
}

/// One map instance driven by a host.
///
/// Mutations that arrive before the first style load, or while a style swap
/// is in flight, are queued and applied in arrival order once the map is ready.
pub struct MapWidget<E: MapEngine, H: HostChannel> {
    pub(crate) id: String,
    pub(crate) engine: E,
    pub(crate) host: H,
    pub(crate) context: MapContext,
    pub(crate) swap: StyleSwapManager,
    pub(crate) phase: WidgetPhase,
    pub(crate) bundle: Option<RenderBundle>,
    pub(crate) queue: VecDeque<Mutation>,
}

impl<E: MapEngine, H: HostChannel> MapWidget<E, H> {
    pub fn new(id: &str, engine: E, host: H) -> Self {
        Self {
            id: id.to_string(),
            engine,
            host,
            context: MapContext::new(id, WidgetConfig::default()),
            swap: StyleSwapManager::new(),
            phase: WidgetPhase::Created,
            bundle: None,
            queue: VecDeque::new(),
        }
    }

    /// Creates the map from a bundle. Content is added once the initial style has loaded.
    pub fn render(&mut self, bundle: RenderBundle) -> Result<()> {
        if !self.engine.is_available() {
            log::error!("map '{}': the GL library is not available", self.id);
            self.phase = WidgetPhase::Unusable;
            return Err(MapError::MissingLibrary("mapbox-gl / maplibre-gl".to_string()));
        }
        self.context = MapContext::new(&self.id, bundle.widget.clone());
        if let Err(e) = self.engine.create_map(&bundle.map_options()) {
            log::error!("map '{}' could not be created: {}", self.id, e);
            self.phase = WidgetPhase::Unusable;
            return Err(e.into());
        }
        let listener = self.engine.once_style_load();
        self.phase = WidgetPhase::Loading { listener };
        self.bundle = Some(bundle);
        log::debug!("map '{}' created, waiting for its style", self.id);
        Ok(())
    }

    /// Drains engine events until none are left. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        for _ in 0..MAX_PUMP_ROUNDS {
            let events = self.engine.poll_events();
            if events.is_empty() {
                break;
            }
            handled += events.len();
            for event in events {
                self.handle_engine_event(event);
            }
        }
        handled
    }

    /// Applies a mutation now, or queues it while the map is not ready for it
    pub fn dispatch(&mut self, mutation: Mutation) -> Result<()> {
        match self.phase {
            WidgetPhase::Unusable => return Err(MapError::Unusable(self.id.clone())),
            WidgetPhase::Created | WidgetPhase::Loading { .. } => {
                log::debug!("map '{}' not loaded, queueing {}", self.id, mutation.name());
                self.queue.push_back(mutation);
                return Ok(());
            }
            WidgetPhase::Ready => {}
        }
        // set_style during a swap supersedes it instead of waiting behind it.
        // Mutations queued before it are replayed after the newer style restores,
        // which ends in the same state as applying everything in arrival order.
        let is_style = matches!(mutation, Mutation::SetStyle { .. });
        if self.swap.is_busy() && self.context.config.swap.queue_during_swap && !is_style {
            log::debug!("map '{}' swapping styles, queueing {}", self.id, mutation.name());
            self.queue.push_back(mutation);
            return Ok(());
        }
        self.drain_queue();
        self.apply(mutation)
    }

    /// Decodes and dispatches a raw message
    pub fn dispatch_value(&mut self, message: Value) -> Result<()> {
        let mutation = Mutation::from_value(message)?;
        self.dispatch(mutation)
    }

    fn apply(&mut self, mutation: Mutation) -> Result<()> {
        let name = mutation.name();
        let result = dispatch::apply(
            &mut self.engine,
            &mut self.host,
            &mut self.context,
            &mut self.swap,
            mutation,
        );
        if let Err(e) = &result {
            log::warn!("map '{}': {} failed: {}", self.id, name, e);
        }
        result
    }

    /// Applies queued mutations in order, stopping if one of them starts a swap
    fn drain_queue(&mut self) {
        while self.phase == WidgetPhase::Ready {
            if self.swap.is_busy() && self.context.config.swap.queue_during_swap {
                break;
            }
            let Some(mutation) = self.queue.pop_front() else {
                break;
            };
            // failures are already logged
            let _ = self.apply(mutation);
        }
    }

    fn report(&mut self, event: &str, value: Value) {
        dispatch::report(&mut self.host, &self.id, event, value);
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StyleLoaded { listener } => self.on_style_loaded(listener),
            EngineEvent::Pointer {
                listener,
                kind,
                lng_lat,
                features,
            } => {
                if self
                    .context
                    .binder
                    .handle_pointer(&mut self.engine, listener, lng_lat, &features)
                {
                    return;
                }
                if self.context.map_listener_kind(listener) == Some(kind) {
                    self.report_pointer(kind, lng_lat.lng, lng_lat.lat, &features);
                }
            }
            EngineEvent::ImageLoaded { listener, result } => {
                let Some(pending) = self.context.pending_images.remove(&listener) else {
                    return;
                };
                match result {
                    Ok(data) => match self.engine.add_image(&pending.id, &data, &pending.options) {
                        Ok(()) => self.context.remember_image(UserImage {
                            id: pending.id,
                            data,
                            options: pending.options,
                        }),
                        Err(e) => log::warn!("image '{}' could not be added: {}", pending.id, e),
                    },
                    Err(e) => log::warn!("image '{}' from {} failed to load: {}", pending.id, pending.url, e),
                }
            }
            EngineEvent::Draw { action } => {
                log::trace!("draw {:?}", action);
                let text = self.context.draw.snapshot(&self.engine).to_json_string();
                self.report(names::DRAWN_FEATURES, Value::String(text));
            }
            EngineEvent::Geolocate { coords } => {
                self.report(names::GEOLOCATE, json!({"coords": coords, "time": now_millis()}));
            }
            EngineEvent::GeocoderResult { result } => {
                self.report(names::GEOCODER, selection_value(&result));
            }
            EngineEvent::MarkerDragEnd { marker, lng_lat } => {
                let Some(id) = self.context.markers.moved(marker, lng_lat) else {
                    return;
                };
                let event = format!("{}{}", names::MARKER_PREFIX, id);
                self.report(
                    &event,
                    json!({"id": id, "lng": lng_lat.lng, "lat": lng_lat.lat, "time": now_millis()}),
                );
            }
        }
    }

    fn report_pointer(&mut self, kind: InteractionKind, lng: f64, lat: f64, features: &[RenderedFeature]) {
        let feature_value = |feature: &RenderedFeature| {
            json!({
                "id": feature.feature.id,
                "properties": feature.feature.properties_or_empty(),
                "layer": feature.layer,
                "lng": lng,
                "lat": lat,
                "time": now_millis(),
            })
        };
        match kind {
            InteractionKind::Click => {
                self.report(names::CLICK, json!({"lng": lng, "lat": lat, "time": now_millis()}));
                if let Some(first) = features.first() {
                    self.report(names::FEATURE_CLICK, feature_value(first));
                }
            }
            InteractionKind::HoverMove => {
                if let Some(first) = features.first() {
                    self.report(names::FEATURE_HOVER, feature_value(first));
                }
            }
            InteractionKind::HoverLeave => {}
        }
    }

    fn on_style_loaded(&mut self, listener: ListenerId) {
        if self.phase == (WidgetPhase::Loading { listener }) {
            self.initial_load();
            self.phase = WidgetPhase::Ready;
            log::info!("map '{}' ready", self.id);
            self.drain_queue();
            return;
        }
        let Some((generation, capture)) = self.swap.style_loaded(&mut self.engine, listener) else {
            return;
        };
        let report = restore(&mut self.engine, &mut self.context, &capture, generation);
        if self.context.config.swap.report_restore {
            self.report(names::STYLE_RESTORED, report.to_host_value());
        }
        self.swap.finish(report);
        self.drain_queue();
    }

    /// Adds the bundle's content to the freshly loaded style. A failing item is
    /// logged and skipped.
    fn initial_load(&mut self) {
        let Some(bundle) = self.bundle.take() else {
            return;
        };
        let engine: &mut dyn MapEngine = &mut self.engine;
        let context = &mut self.context;

        for property in &bundle.config_properties {
            if let Err(e) = engine.set_config_property(&property.import_id, &property.name, &property.value) {
                warn_failed("config property", &property.name, &e);
            }
        }
        for marker in &bundle.markers {
            context.markers.add(engine, marker.clone());
        }
        for image in &bundle.images {
            dispatch::request_image(engine, context, &image.id, &image.url, &image.options);
        }
        for source in &bundle.sources {
            if let Err(e) = engine.add_source(&source.id, &source.source) {
                warn_failed("source", &source.id, &e);
            }
        }
        for layer in &bundle.layers {
            if let Err(e) = dispatch::add_layer(engine, context, layer) {
                warn_failed("layer", &layer.id, &e);
            }
        }

        let effects = [
            (Effect::Terrain, &bundle.terrain),
            (Effect::Fog, &bundle.fog),
            (Effect::Rain, &bundle.rain),
            (Effect::Snow, &bundle.snow),
        ];
        for (effect, value) in effects {
            if let Some(value) = value {
                if let Err(e) = engine.set_effect(effect, Some(value)) {
                    warn_failed("effect", &format!("{:?}", effect), &e);
                }
            }
        }

        for movement in bundle.view_moves() {
            if let Err(e) = engine.move_camera(&movement) {
                warn_failed("camera move", "view", &e);
            }
        }

        for control in install_order(&bundle.controls) {
            if let Err(e) = dispatch::add_control(engine, context, &control) {
                warn_failed("control", &control.key(), &e);
            }
        }

        for legend in &bundle.legends {
            context.legends.add(engine, &legend.id, legend.entry.clone(), true);
        }

        let interaction = context.config.interaction.clone();
        if interaction.report_click {
            let listener = engine.on(InteractionKind::Click, None);
            context.map_listeners.push((InteractionKind::Click, listener));
        }
        if interaction.report_hover {
            let listener = engine.on(InteractionKind::HoverMove, None);
            context.map_listeners.push((InteractionKind::HoverMove, listener));
        }

        self.bundle = Some(bundle);
    }

    /// Uses `geocoder` for the geocoder control's lookups
    pub fn set_geocoder(&mut self, geocoder: Geocoder) {
        self.context.geocoder = Some(Arc::new(geocoder));
    }

    /// Answers the geocoder control's `forwardGeocode`; empty when no geocoder is set
    pub async fn forward_geocode(&self, query: &str) -> Value {
        match self.context.geocoder.clone() {
            Some(geocoder) => geocoder.forward_response(query).await,
            None => json!({ "features": [] }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> WidgetPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == WidgetPhase::Ready
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn context(&self) -> &MapContext {
        &self.context
    }

    pub fn swap(&self) -> &StyleSwapManager {
        &self.swap
    }

    pub fn bundle(&self) -> Option<&RenderBundle> {
        self.bundle.as_ref()
    }
}
