//! Applies host mutations to a live map.
//!
//! Every mutation that changes layer state also records it in the widget's
//! [`LayerStateStore`](crate::layers::state::LayerStateStore) so a later style
//! swap can replay it. Removals of things that are not on the map are no-ops.

use serde_json::{json, Map, Value};

use crate::{
    core::{
        config::EngineFlavor,
        context::{MapContext, PendingImage},
    },
    data::geojson::{FeatureCollection, GeoJson},
    engine::{Effect, MapEngine, StyleRequest},
    input::events::{input_name, names, HostChannel},
    layers::definition::LayerDefinition,
    plugins::{
        draw::DrawOptions,
        geocoder::Geocoder,
        query::query,
        turf::{self, TurfRequest},
    },
    prelude::Arc,
    proxy::message::Mutation,
    style::swap::{StyleSwapManager, SwapCapture, SwapPhase},
    ui::{
        controls::{ControlKind, ControlSpec},
        legend::LegendEntry,
    },
    MapError, Result,
};

/// Sends `<map_id>_<event>` to the host
pub(crate) fn report(host: &mut dyn HostChannel, map_id: &str, event: &str, value: Value) {
    host.set_input_value(&input_name(map_id, event), value);
}

fn report_drawn(host: &mut dyn HostChannel, context: &MapContext) {
    report(
        host,
        &context.map_id,
        names::DRAWN_FEATURES,
        Value::String(context.draw.features().to_json_string()),
    );
}

fn source_in_use(engine: &dyn MapEngine, source_id: &str) -> bool {
    engine
        .layer_ids()
        .iter()
        .filter_map(|id| engine.layer(id))
        .any(|layer| layer.source.as_deref() == Some(source_id))
}

/// Inline GeoJSON of an existing source
fn source_features(engine: &dyn MapEngine, source_id: &str) -> Result<FeatureCollection> {
    engine
        .source(source_id)
        .and_then(|spec| spec.geojson_data())
        .map(GeoJson::into_collection)
        .ok_or_else(|| MapError::Plugin(format!("source '{}' has no inline GeoJSON", source_id)))
}

/// Adds a layer with its inline source, anchoring and interaction bindings
pub(crate) fn add_layer(
    engine: &mut dyn MapEngine,
    context: &mut MapContext,
    definition: &LayerDefinition,
) -> Result<()> {
    let id = definition.id.as_str();
    if let Some(spec) = definition.inline_source() {
        if engine.source(id).is_none() {
            engine.add_source(id, spec)?;
        }
    }

    let before = match definition.before_id.as_deref() {
        Some(before) if engine.layer(before).is_some() => Some(before),
        Some(before) => {
            log::warn!("layer '{}' added on top: '{}' does not exist", id, before);
            None
        }
        None => None,
    };
    engine.add_layer(&definition.to_spec(), before)?;

    if let Some(binding) = &definition.popup {
        context.binder.attach_popup(engine, id, Some(binding.clone()));
    }
    if let Some(binding) = &definition.tooltip {
        context.binder.attach_tooltip(engine, id, Some(binding.clone()));
    }
    if let Some(overrides) = &definition.hover_options {
        let paint = definition.paint.clone();
        let wrapped = context
            .binder
            .attach_hover(engine, id, overrides, |name| paint.get(name).cloned())?;
        log::debug!("layer '{}' has {} hover paint properties", id, wrapped);
    }
    Ok(())
}

fn remove_layer_entry(engine: &mut dyn MapEngine, context: &mut MapContext, layer_id: &str) -> Result<()> {
    context.binder.detach_layer(engine, layer_id);
    context.layer_state.remove(layer_id);
    engine.remove_layer(layer_id)?;
    Ok(())
}

/// Installs the drawing control under `key`, replacing an earlier one
pub(crate) fn install_draw(
    engine: &mut dyn MapEngine,
    context: &mut MapContext,
    key: &str,
    options: &DrawOptions,
) -> Result<()> {
    context.controls.remove(engine, key);
    context.draw.uninstall();
    let id = context.draw.install(engine, options)?;
    context.controls.track(key, ControlKind::Draw, id);
    if let Some(source) = &options.source {
        let features = source_features(engine, source)?;
        context.draw.add_features(engine, &features.features)?;
    }
    Ok(())
}

/// Installs a control. Draw controls go through the drawing plugin; reset
/// controls remember the current camera.
pub(crate) fn add_control(engine: &mut dyn MapEngine, context: &mut MapContext, spec: &ControlSpec) -> Result<()> {
    match spec.kind {
        ControlKind::Draw => {
            let mut options: DrawOptions = serde_json::from_value(Value::Object(spec.options.clone()))?;
            options.position = spec.position.clone();
            install_draw(engine, context, &spec.key(), &options)
        }
        ControlKind::Reset => {
            let camera = engine.camera();
            let mut spec = spec.clone();
            let initial = [
                ("center", json!([camera.center.lng, camera.center.lat])),
                ("zoom", json!(camera.zoom)),
                ("bearing", json!(camera.bearing)),
                ("pitch", json!(camera.pitch)),
            ];
            for (key, value) in initial {
                spec.options.entry(key).or_insert(value);
            }
            context.controls.add(engine, &spec)?;
            Ok(())
        }
        ControlKind::Geocoder => {
            context.controls.add(engine, spec)?;
            if context.config.flavor == EngineFlavor::Maplibre && context.geocoder.is_none() {
                match Geocoder::new(&context.config.geocoder) {
                    Ok(geocoder) => context.geocoder = Some(Arc::new(geocoder)),
                    Err(e) => log::warn!("geocoder control has no lookup backend: {}", e),
                }
            }
            Ok(())
        }
        _ => {
            context.controls.add(engine, spec)?;
            Ok(())
        }
    }
}

/// Starts an image load; the image is added when the load finishes
pub(crate) fn request_image(
    engine: &mut dyn MapEngine,
    context: &mut MapContext,
    id: &str,
    url: &str,
    options: &Map<String, Value>,
) {
    let listener = engine.load_image(url);
    context.pending_images.insert(
        listener,
        PendingImage {
            id: id.to_string(),
            url: url.to_string(),
            options: options.clone(),
        },
    );
}

fn run_turf(
    engine: &mut dyn MapEngine,
    host: &mut dyn HostChannel,
    context: &MapContext,
    request: &TurfRequest,
) -> Result<()> {
    let result = turf::execute(engine, request).and_then(|outcome| {
        if let Some(source_id) = &request.source_id {
            turf::write_output(engine, source_id, &outcome)?;
        }
        Ok(outcome)
    });
    match result {
        Ok(outcome) => {
            if request.reports_to_host() {
                report(host, &context.map_id, names::TURF_RESULT, outcome.host_value());
            }
            Ok(())
        }
        Err(e) => {
            if request.reports_to_host() {
                report(
                    host,
                    &context.map_id,
                    names::TURF_ERROR,
                    turf::error_value(request.operation, &e),
                );
            }
            Err(e)
        }
    }
}

/// Applies one mutation
pub fn apply(
    engine: &mut dyn MapEngine,
    host: &mut dyn HostChannel,
    context: &mut MapContext,
    swap: &mut StyleSwapManager,
    mutation: Mutation,
) -> Result<()> {
    match mutation {
        Mutation::AddSource { id, source } => engine.add_source(&id, &source)?,
        Mutation::RemoveSource { source } => {
            if engine.source(&source).is_none() {
                log::debug!("remove_source: '{}' is not on the map", source);
                return Ok(());
            }
            let dependents: Vec<String> = engine
                .layer_ids()
                .into_iter()
                .filter(|id| engine.layer(id).and_then(|l| l.source).as_deref() == Some(source.as_str()))
                .collect();
            for layer in dependents {
                log::warn!("removing layer '{}' together with its source '{}'", layer, source);
                remove_layer_entry(engine, context, &layer)?;
            }
            engine.remove_source(&source)?;
        }
        Mutation::SetSource { source, data } => engine.set_source_data(&source, &data)?,
        Mutation::AddLayer { layer } => add_layer(engine, context, &layer)?,
        Mutation::RemoveLayer { layer } => {
            if engine.layer(&layer).is_none() {
                context.binder.detach_layer(engine, &layer);
                context.layer_state.remove(&layer);
                log::debug!("remove_layer: '{}' is not on the map", layer);
                return Ok(());
            }
            remove_layer_entry(engine, context, &layer)?;
            if engine.source(&layer).is_some()
                && !source_in_use(engine, &layer)
                && !engine.style_source_ids().contains(&layer)
            {
                engine.remove_source(&layer)?;
            }
        }
        Mutation::MoveLayer { layer, before } => {
            let before = before.filter(|b| {
                let exists = engine.layer(b).is_some();
                if !exists {
                    log::warn!("move_layer: '{}' does not exist, moving '{}' to the top", b, layer);
                }
                exists
            });
            engine.move_layer(&layer, before.as_deref())?;
        }
        Mutation::SetFilter { layer, filter } => {
            engine.set_filter(&layer, filter.as_ref())?;
            context.layer_state.record_filter(&layer, filter.as_ref());
        }
        Mutation::SetPaintProperty { layer, name, value } => {
            if engine.layer(&layer).is_none() {
                return Err(crate::engine::EngineError::MissingLayer(layer).into());
            }
            let written = context.binder.paint_for_write(&layer, &name, &value);
            engine.set_paint_property(&layer, &name, &written)?;
            context.layer_state.record_paint(&layer, &name, &value);
        }
        Mutation::SetLayoutProperty { layer, name, value } => {
            engine.set_layout_property(&layer, &name, &value)?;
            context.layer_state.record_layout(&layer, &name, &value);
        }
        Mutation::SetLayerZoomRange {
            layer,
            min_zoom,
            max_zoom,
        } => {
            engine.set_layer_zoom_range(&layer, min_zoom, max_zoom)?;
            context.layer_state.record_zoom_range(&layer, min_zoom, max_zoom);
        }
        Mutation::SetStyle { style, diff, config } => {
            let request = StyleRequest {
                style,
                diff: diff.unwrap_or(context.config.swap.diff),
                config,
            };
            let capture = match swap.phase() {
                SwapPhase::Swapping { .. } => SwapCapture::default(),
                _ => SwapCapture::take(engine, context),
            };
            let generation = swap.begin(engine, &request, capture)?;
            log::info!("style swap {} started", generation);
        }
        Mutation::SetConfigProperty { import_id, name, value } => {
            engine.set_config_property(&import_id, &name, &value)?
        }
        Mutation::SetProjection { projection } => engine.set_effect(Effect::Projection, Some(&projection))?,
        Mutation::SetTerrain { terrain } => engine.set_effect(Effect::Terrain, terrain.as_ref())?,
        Mutation::SetFog { fog } => engine.set_effect(Effect::Fog, fog.as_ref())?,
        Mutation::SetRain { rain } => engine.set_effect(Effect::Rain, rain.as_ref())?,
        Mutation::SetSnow { snow } => engine.set_effect(Effect::Snow, snow.as_ref())?,
        m @ (Mutation::FitBounds { .. }
        | Mutation::FlyTo(_)
        | Mutation::EaseTo(_)
        | Mutation::JumpTo(_)
        | Mutation::SetView { .. }) => {
            if let Some(movement) = m.camera_move() {
                engine.move_camera(&movement)?;
            }
        }
        Mutation::AddControl { control } => add_control(engine, context, &control)?,
        Mutation::RemoveControl { control } => {
            if !context.controls.remove(engine, &control) {
                log::debug!("remove_control: no control '{}'", control);
                return Ok(());
            }
            if context.draw.is_installed() && !context.controls.has_kind(ControlKind::Draw) {
                context.draw.uninstall();
            }
        }
        Mutation::AddDrawControl { options } => {
            install_draw(engine, context, ControlKind::Draw.name(), &options)?;
            report_drawn(host, context);
        }
        Mutation::GetDrawnFeatures => {
            context.draw.snapshot(engine);
            report_drawn(host, context);
        }
        Mutation::ClearDrawnFeatures => {
            context.draw.clear(engine)?;
            report_drawn(host, context);
        }
        Mutation::AddFeaturesToDraw { data, source, replace } => {
            let features = match (data, source) {
                (Some(data), _) => GeoJson::from_value(data)?.into_collection(),
                (None, Some(source)) => source_features(engine, &source)?,
                (None, None) => {
                    return Err(MapError::InvalidMessage(
                        "add_features_to_draw needs data or a source".to_string(),
                    ))
                }
            };
            if replace {
                context.draw.clear(engine)?;
            }
            let ids = context.draw.add_features(engine, &features.features)?;
            log::debug!("added {} features to the draw control", ids.len());
            report_drawn(host, context);
        }
        Mutation::AddMarkers { markers } => {
            for marker in markers {
                context.markers.add(engine, marker);
            }
        }
        Mutation::ClearMarkers => context.markers.clear(engine),
        Mutation::SetPopup { layer, popup } => {
            context.binder.attach_popup(engine, &layer, popup.clone());
            context.layer_state.record_popup(&layer, popup.as_ref());
        }
        Mutation::SetTooltip { layer, tooltip } => {
            context.binder.attach_tooltip(engine, &layer, tooltip.clone());
            context.layer_state.record_tooltip(&layer, tooltip.as_ref());
        }
        Mutation::AddLegend { id, html, css, add } => {
            context
                .legends
                .add(engine, &id, LegendEntry::new(&html, css.as_deref()), add);
        }
        Mutation::ClearLegend { legend_ids } => {
            let removed = context.legends.clear(engine, legend_ids.as_deref());
            log::debug!("cleared legends {:?}", removed);
        }
        Mutation::QueryRenderedFeatures(request) => {
            let result = query(engine, &context.config.query, &request);
            log::debug!("query matched {} features", result.len());
            report(host, &context.map_id, names::QUERIED_FEATURES, result.host_value());
            context.last_query = Some(result);
        }
        Mutation::ClearQueriedFeatures => {
            context.last_query = None;
            report(host, &context.map_id, names::QUERIED_FEATURES, Value::Null);
        }
        Mutation::AddImage { id, url, options } => request_image(engine, context, &id, &url, &options),
        Mutation::Turf(request) => run_turf(engine, host, context, &request)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::config::WidgetConfig,
        data::expression::Binding,
        engine::{memory::MemoryEngine, InteractionKind, SourceSpec},
        input::events::RecordingHost,
    };

    struct Fixture {
        engine: MemoryEngine,
        host: RecordingHost,
        context: MapContext,
        swap: StyleSwapManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: MemoryEngine::loaded("streets").unwrap(),
                host: RecordingHost::new(),
                context: MapContext::new("map", WidgetConfig::default()),
                swap: StyleSwapManager::new(),
            }
        }

        fn apply(&mut self, message: Value) -> Result<()> {
            let mutation = Mutation::from_value(message)?;
            apply(
                &mut self.engine,
                &mut self.host,
                &mut self.context,
                &mut self.swap,
                mutation,
            )
        }
    }

    fn points() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 1, "properties": {"name": "a"}, "geometry": {"type": "Point", "coordinates": [0, 0]}}
            ]
        })
    }

    #[test]
    fn test_remove_source_takes_dependent_layers() {
        let mut fx = Fixture::new();
        fx.apply(json!({"type": "add_source", "id": "pts", "source": {"type": "geojson", "data": points()}}))
            .unwrap();
        fx.apply(json!({"type": "add_layer", "layer": {"id": "pts-circle", "type": "circle", "source": "pts", "tooltip": "name"}}))
            .unwrap();
        assert_eq!(fx.engine.listener_count(InteractionKind::HoverMove, Some("pts-circle")), 1);

        fx.apply(json!({"type": "remove_source", "source": "pts"})).unwrap();
        assert!(fx.engine.layer("pts-circle").is_none());
        assert!(fx.engine.source("pts").is_none());
        assert_eq!(fx.engine.listener_count(InteractionKind::HoverMove, Some("pts-circle")), 0);

        fx.apply(json!({"type": "remove_source", "source": "pts"})).unwrap();
        fx.apply(json!({"type": "remove_layer", "layer": "pts-circle"})).unwrap();
    }

    #[test]
    fn test_remove_layer_drops_inline_source() {
        let mut fx = Fixture::new();
        fx.apply(json!({"type": "add_layer", "layer": {
            "id": "inline",
            "type": "circle",
            "source": {"type": "geojson", "data": points()}
        }}))
        .unwrap();
        assert!(fx.engine.source("inline").is_some());
        fx.apply(json!({"type": "remove_layer", "layer": "inline"})).unwrap();
        assert!(fx.engine.source("inline").is_none());
    }

    #[test]
    fn test_layer_state_is_recorded() {
        let mut fx = Fixture::new();
        fx.engine
            .add_source("pts", &SourceSpec::geojson(points()))
            .unwrap();
        fx.apply(json!({"type": "add_layer", "layer": {"id": "c", "type": "circle", "source": "pts"}}))
            .unwrap();
        fx.apply(json!({"type": "set_paint_property", "layer": "c", "name": "circle-color", "value": "red"}))
            .unwrap();
        fx.apply(json!({"type": "set_filter", "layer": "c", "filter": ["==", ["get", "name"], "a"]}))
            .unwrap();
        fx.apply(json!({"type": "set_filter", "layer": "c"})).unwrap();
        fx.apply(json!({"type": "set_popup", "layer": "c", "popup": "name"})).unwrap();

        let state = fx.context.layer_state.get("c").unwrap();
        assert_eq!(state.paint["circle-color"], json!("red"));
        assert_eq!(state.filter, Some(Value::Null));
        assert_eq!(state.popup, Some(Binding::Property("name".into())));

        let missing = fx.apply(json!({"type": "set_paint_property", "layer": "nope", "name": "circle-color", "value": "red"}));
        assert!(missing.is_err());
        assert!(fx.context.layer_state.get("nope").is_none());
    }

    #[test]
    fn test_query_reports_to_host() {
        let mut fx = Fixture::new();
        fx.engine
            .add_source("pts", &SourceSpec::geojson(points()))
            .unwrap();
        fx.apply(json!({"type": "add_layer", "layer": {"id": "c", "type": "circle", "source": "pts"}}))
            .unwrap();
        fx.apply(json!({"type": "query_rendered_features", "layers": ["c", "missing"]}))
            .unwrap();
        let reported = fx.host.last("map_queried_features").and_then(Value::as_str).unwrap();
        let value: Value = serde_json::from_str(reported).unwrap();
        assert_eq!(value["features"][0]["properties"]["layer_id"], json!("c"));
        assert_eq!(fx.context.last_query.as_ref().map(|q| q.len()), Some(1));

        fx.apply(json!({"type": "clear_queried_features"})).unwrap();
        assert_eq!(fx.host.last("map_queried_features"), Some(&Value::Null));
        assert!(fx.context.last_query.is_none());
    }

    #[test]
    fn test_turf_failure_reports_error() {
        let mut fx = Fixture::new();
        let result = fx.apply(json!({"type": "turf", "operation": "area", "layer_id": "missing"}));
        assert!(result.is_err());
        let error = fx.host.last("map_turf_error").unwrap();
        assert_eq!(error["operation"], json!("area"));
    }

    #[test]
    fn test_control_replacement_and_removal() {
        let mut fx = Fixture::new();
        fx.apply(json!({"type": "add_control", "control": {"type": "navigation"}})).unwrap();
        fx.apply(json!({"type": "add_control", "control": {"type": "navigation", "position": "top-left"}}))
            .unwrap();
        assert_eq!(fx.engine.controls().len(), 1);
        assert_eq!(fx.engine.controls()[0].position, "top-left");

        fx.apply(json!({"type": "add_control", "control": {"type": "reset"}})).unwrap();
        let reset = fx.engine.controls()[1];
        assert_eq!(reset.options["zoom"], json!(4.0));

        fx.apply(json!({"type": "remove_control", "control": "navigation"})).unwrap();
        fx.apply(json!({"type": "remove_control", "control": "navigation"})).unwrap();
        assert_eq!(fx.engine.controls().len(), 1);
    }

    #[test]
    fn test_draw_control_loads_source_features() {
        let mut fx = Fixture::new();
        fx.engine
            .add_source("pts", &SourceSpec::geojson(points()))
            .unwrap();
        fx.apply(json!({"type": "add_draw_control", "options": {"source": "pts"}})).unwrap();
        assert_eq!(fx.context.draw.features().len(), 1);
        let drawn = fx.host.last("map_drawn_features").unwrap();
        assert!(drawn.as_str().unwrap().contains("FeatureCollection"));

        fx.apply(json!({"type": "clear_drawn_features"})).unwrap();
        assert!(fx.context.draw.features().is_empty());

        fx.apply(json!({"type": "remove_control", "control": "draw"})).unwrap();
        assert!(!fx.context.draw.is_installed());
    }
}
