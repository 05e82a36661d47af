use mapgl::engine::FeatureTarget;
use mapgl::prelude::*;
use serde_json::{json, Value};

type Widget = MapWidget<MemoryEngine, RecordingHost>;

fn pois() -> Value {
    json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 5, "properties": {"name": "five"}, "geometry": {"type": "Point", "coordinates": [0, 0]}},
            {"type": "Feature", "id": 7, "properties": {"name": "seven"}, "geometry": {"type": "Point", "coordinates": [3, 3]}}
        ]
    })
}

fn widget_with(layers: Value) -> Widget {
    let bundle = RenderBundle::from_value(json!({
        "style": "streets",
        "center": [0, 0],
        "zoom": 4,
        "sources": [{"id": "poi-src", "type": "geojson", "data": pois()}],
        "layers": layers
    }))
    .unwrap();
    let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
    widget.render(bundle).unwrap();
    widget.pump();
    widget
}

fn hover_state(widget: &Widget, id: &str) -> Option<Value> {
    let target = FeatureTarget {
        source: "poi-src".to_string(),
        source_layer: None,
        id: id.to_string(),
    };
    widget.engine().feature_state(&target).get("hover").cloned()
}

fn hover_to(widget: &mut Widget, lng: f64, lat: f64) {
    widget.engine_mut().pointer_move(LngLat::new(lng, lat));
    widget.pump();
}

#[test]
fn test_hover_moves_between_features() {
    let mut widget = widget_with(json!([{
        "id": "poi",
        "type": "circle",
        "source": "poi-src",
        "paint": {"circle-color": "#3388ff"},
        "hover_options": {"circle-color": "#ffff99"}
    }]));

    hover_to(&mut widget, 0.0, 0.0);
    assert_eq!(hover_state(&widget, "5"), Some(json!(true)));
    assert_eq!(hover_state(&widget, "7"), None);

    hover_to(&mut widget, 3.0, 3.0);
    assert_eq!(hover_state(&widget, "5"), Some(json!(false)));
    assert_eq!(hover_state(&widget, "7"), Some(json!(true)));

    widget.engine_mut().pointer_out();
    widget.pump();
    assert_eq!(hover_state(&widget, "7"), Some(json!(false)));
}

#[test]
fn test_hover_value_survives_paint_update() {
    let mut widget = widget_with(json!([{
        "id": "poi",
        "type": "circle",
        "source": "poi-src",
        "paint": {"circle-color": "#3388ff"},
        "hover_options": {"circle-color": "#ffff99"}
    }]));
    widget
        .dispatch_value(json!({"type": "set_paint_property", "layer": "poi", "name": "circle-color", "value": "#ff0000"}))
        .unwrap();
    hover_to(&mut widget, 0.0, 0.0);

    let engine = widget.engine();
    assert_eq!(
        engine.evaluated_paint("poi", "circle-color", &json!(5)),
        Some(json!("#ffff99"))
    );
    assert_eq!(
        engine.evaluated_paint("poi", "circle-color", &json!(7)),
        Some(json!("#ff0000"))
    );
    assert_eq!(
        widget.context().layer_state.paint_base("poi", "circle-color"),
        Some(&json!("#ff0000"))
    );
}

#[test]
fn test_hover_wrapper_is_rebuilt_after_swap() {
    let mut widget = widget_with(json!([{
        "id": "poi",
        "type": "circle",
        "source": "poi-src",
        "paint": {"circle-color": "#3388ff"},
        "hover_options": {"circle-color": "#ffff99"}
    }]));
    widget
        .dispatch_value(json!({"type": "set_paint_property", "layer": "poi", "name": "circle-color", "value": "#00ff00"}))
        .unwrap();
    widget
        .dispatch_value(json!({"type": "set_style", "style": "dark"}))
        .unwrap();
    widget.pump();

    assert_eq!(hover_state(&widget, "5"), None);
    hover_to(&mut widget, 0.0, 0.0);
    let engine = widget.engine();
    assert_eq!(
        engine.evaluated_paint("poi", "circle-color", &json!(5)),
        Some(json!("#ffff99"))
    );
    assert_eq!(
        engine.evaluated_paint("poi", "circle-color", &json!(7)),
        Some(json!("#00ff00"))
    );
    assert_eq!(engine.listener_count(InteractionKind::HoverMove, Some("poi")), 1);
}

#[test]
fn test_hover_without_paint_block_sets_feature_state() {
    let mut widget = widget_with(json!([{
        "id": "poi",
        "type": "circle",
        "source": "poi-src",
        "hover_options": {"circle-color": "#ffff99"}
    }]));

    hover_to(&mut widget, 0.0, 0.0);
    assert_eq!(hover_state(&widget, "5"), Some(json!(true)));
    assert_eq!(
        widget.engine().evaluated_paint("poi", "circle-color", &json!(5)),
        Some(json!("#ffff99"))
    );

    hover_to(&mut widget, 3.0, 3.0);
    assert_eq!(hover_state(&widget, "5"), Some(json!(false)));
    assert_eq!(hover_state(&widget, "7"), Some(json!(true)));
    assert_eq!(
        widget.engine().evaluated_paint("poi", "circle-color", &json!(5)),
        Some(json!("#000000"))
    );
}

#[test]
fn test_cleared_hover_paint_is_unchanged_by_swap() {
    let mut widget = widget_with(json!([{
        "id": "poi",
        "type": "circle",
        "source": "poi-src",
        "paint": {"circle-color": "#3388ff"},
        "hover_options": {"circle-color": "#ffff99"}
    }]));
    widget
        .dispatch_value(json!({"type": "set_paint_property", "layer": "poi", "name": "circle-color", "value": null}))
        .unwrap();
    let before = widget.engine().paint_property("poi", "circle-color");
    assert_eq!(
        widget.engine().evaluated_paint("poi", "circle-color", &json!(7)),
        Some(json!("#000000"))
    );

    widget
        .dispatch_value(json!({"type": "set_style", "style": "dark"}))
        .unwrap();
    widget.pump();

    assert_eq!(widget.engine().paint_property("poi", "circle-color"), before);
    hover_to(&mut widget, 0.0, 0.0);
    assert_eq!(
        widget.engine().evaluated_paint("poi", "circle-color", &json!(5)),
        Some(json!("#ffff99"))
    );
}

#[test]
fn test_only_one_tooltip_is_visible() {
    let mut widget = widget_with(json!([
        {"id": "a", "type": "circle", "source": "poi-src", "filter": ["==", ["id"], 5], "tooltip": "name"},
        {"id": "b", "type": "circle", "source": "poi-src", "filter": ["==", ["id"], 7], "tooltip": "name"}
    ]));

    hover_to(&mut widget, 0.0, 0.0);
    assert_eq!(widget.engine().tooltips().len(), 1);
    assert_eq!(widget.engine().tooltips()[0].html, "five");

    hover_to(&mut widget, 3.0, 3.0);
    let tooltips = widget.engine().tooltips();
    assert_eq!(tooltips.len(), 1);
    assert_eq!(tooltips[0].html, "seven");

    widget.engine_mut().pointer_out();
    widget.pump();
    assert!(widget.engine().tooltips().is_empty());
}

#[test]
fn test_rebinding_tooltip_keeps_one_listener() {
    let mut widget = widget_with(json!([{"id": "poi", "type": "circle", "source": "poi-src", "tooltip": "name"}]));
    widget
        .dispatch_value(json!({"type": "set_tooltip", "layer": "poi", "tooltip": "id"}))
        .unwrap();
    widget
        .dispatch_value(json!({"type": "set_popup", "layer": "poi", "popup": "name"}))
        .unwrap();
    let engine = widget.engine();
    assert_eq!(engine.listener_count(InteractionKind::HoverMove, Some("poi")), 1);
    assert_eq!(engine.listener_count(InteractionKind::Click, Some("poi")), 1);

    widget.engine_mut().click(LngLat::new(3.0, 3.0));
    widget.pump();
    assert_eq!(widget.engine().popups().len(), 1);
    assert_eq!(widget.engine().popups()[0].html, "seven");
}

#[test]
fn test_feature_hover_is_reported() {
    let mut widget = widget_with(json!([{"id": "poi", "type": "circle", "source": "poi-src"}]));
    hover_to(&mut widget, 3.0, 3.0);
    let hover = widget.host().last("map_feature_hover").unwrap();
    assert_eq!(hover["id"], json!(7));
    assert_eq!(hover["properties"]["name"], json!("seven"));

    hover_to(&mut widget, -40.0, 20.0);
    assert_eq!(widget.host().count("map_feature_hover"), 1);
}

#[test]
fn test_drawn_features_are_mirrored_to_host() {
    let bundle = RenderBundle::from_value(json!({
        "style": "streets",
        "controls": [{"type": "draw", "freehand": true}]
    }))
    .unwrap();
    let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
    widget.render(bundle).unwrap();
    widget.pump();
    assert!(widget.context().draw.is_installed());

    let id = widget
        .engine_mut()
        .draw_create(Feature::new(Geometry::point(2.0, 48.0)))
        .unwrap();
    widget.pump();
    let drawn: FeatureCollection =
        serde_json::from_str(widget.host().last("map_drawn_features").unwrap().as_str().unwrap()).unwrap();
    assert_eq!(drawn.len(), 1);

    widget.engine_mut().draw_delete(&id);
    widget.pump();
    let drawn: FeatureCollection =
        serde_json::from_str(widget.host().last("map_drawn_features").unwrap().as_str().unwrap()).unwrap();
    assert!(drawn.is_empty());
}

#[test]
fn test_missing_draw_plugin_is_isolated() {
    let engine = MemoryEngine::new().without_plugin(mapgl::engine::Plugin::Draw);
    let mut widget = MapWidget::new("map", engine, RecordingHost::new());
    widget
        .render(RenderBundle::new("streets", LngLat::new(0.0, 0.0), 2.0))
        .unwrap();
    widget.pump();

    let result = widget.dispatch_value(json!({"type": "add_draw_control"}));
    assert!(matches!(result, Err(MapError::MissingLibrary(_))));
    assert!(widget
        .dispatch_value(json!({"type": "add_control", "control": {"type": "fullscreen"}}))
        .is_ok());
    assert!(widget.is_ready());
}

#[test]
fn test_marker_drag_is_reported() {
    let mut widget = widget_with(json!([]));
    widget
        .dispatch_value(json!({"type": "add_markers", "markers": [
            {"id": "depot", "lng_lat": [10, 10], "draggable": true}
        ]}))
        .unwrap();
    let handle = widget.engine().markers()[0].0;
    assert!(widget.engine_mut().drag_marker(handle, LngLat::new(11.0, 12.0)));
    widget.pump();

    let moved = widget.host().last("map_marker_depot").unwrap();
    assert_eq!(moved["lng"], json!(11.0));
    assert_eq!(moved["lat"], json!(12.0));
    assert_eq!(
        widget.context().markers.position("depot"),
        Some(LngLat::new(11.0, 12.0))
    );
}

#[test]
fn test_geolocate_and_geocoder_selection_are_reported() {
    let bundle = RenderBundle::from_value(json!({
        "style": "streets",
        "controls": [{"type": "geolocate"}, {"type": "geocoder"}]
    }))
    .unwrap();
    let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
    widget.render(bundle).unwrap();
    widget.pump();

    assert!(widget
        .engine_mut()
        .geolocate(json!({"latitude": 48.85, "longitude": 2.35})));
    assert!(widget
        .engine_mut()
        .select_geocoder_result(json!({"place_name": "Paris"})));
    widget.pump();

    assert_eq!(
        widget.host().last("map_geolocate").unwrap()["coords"]["latitude"],
        json!(48.85)
    );
    assert_eq!(
        widget.host().last("map_geocoder").unwrap()["result"]["place_name"],
        json!("Paris")
    );
}
