use geo_types::Geometry as GeoGeometry;
use mapgl::plugins::geometry;
use mapgl::prelude::*;
use serde_json::{json, Value};

type Widget = MapWidget<MemoryEngine, RecordingHost>;

fn ready_widget() -> Widget {
    let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
    widget
        .render(RenderBundle::new("streets", LngLat::new(-122.4, 37.7), 12.0))
        .unwrap();
    widget.pump();
    widget
}

fn source_collection(widget: &Widget, id: &str) -> FeatureCollection {
    widget
        .engine()
        .source(id)
        .and_then(|s| s.geojson_data())
        .map(GeoJson::into_collection)
        .unwrap()
}

fn queried(widget: &Widget) -> Value {
    let reported = widget.host().last("map_queried_features").and_then(Value::as_str).unwrap();
    serde_json::from_str(reported).unwrap()
}

#[test]
fn test_point_buffer_is_centred_on_the_point() {
    let mut widget = ready_widget();
    widget
        .dispatch_value(json!({
            "type": "turf",
            "operation": "buffer",
            "coordinates": [-122.4, 37.7],
            "radius": 500,
            "units": "meters",
            "source_id": "buf"
        }))
        .unwrap();

    let collection = source_collection(&widget, "buf");
    assert_eq!(collection.len(), 1);
    let polygon = collection.features[0].geometry.as_ref().unwrap();
    assert_eq!(polygon.type_name(), "Polygon");

    let center = geometry::centroid(&GeoGeometry::from(polygon)).unwrap();
    let offset = geometry::distance(center, geo_types::Coord { x: -122.4, y: 37.7 });
    assert!(offset < 1.0, "centroid is {} m away", offset);

    // written to a source and not explicitly requested, so nothing is reported
    assert_eq!(widget.host().count("map_turf_result"), 0);
}

#[test]
fn test_buffer_rewrites_existing_source() {
    let mut widget = ready_widget();
    for radius in [200, 800] {
        widget
            .dispatch_value(json!({
                "type": "turf",
                "operation": "buffer",
                "coordinates": [-122.4, 37.7],
                "radius": radius,
                "source_id": "buf",
                "send_to_shiny": true
            }))
            .unwrap();
    }
    assert_eq!(source_collection(&widget, "buf").len(), 1);
    assert_eq!(widget.host().count("map_turf_result"), 2);
    let last = widget.host().last("map_turf_result").unwrap();
    assert_eq!(last["metadata"]["radius"], json!(800.0));
}

#[test]
fn test_concave_hull_falls_back_to_convex() {
    let mut widget = ready_widget();
    widget
        .dispatch_value(json!({
            "type": "turf",
            "operation": "concave_hull",
            "coordinates": [[-122.5, 37.6], [-122.3, 37.6], [-122.3, 37.8], [-122.5, 37.8], [-122.4, 37.7]],
            "max_edge": 0.001,
            "units": "kilometers"
        }))
        .unwrap();

    let result = widget.host().last("map_turf_result").unwrap();
    assert_eq!(result["operation"], json!("concave_hull"));
    assert_eq!(result["metadata"]["fallback"], json!("convex_hull"));
    let hull = &result["result"]["features"][0]["geometry"];
    assert_eq!(hull["type"], json!("Polygon"));
    assert_eq!(hull["coordinates"][0].as_array().map(Vec::len), Some(5));
}

#[test]
fn test_geometry_errors_are_reported_and_isolated() {
    let mut widget = ready_widget();
    let result = widget.dispatch_value(json!({
        "type": "turf",
        "operation": "buffer",
        "coordinates": [-122.4, 37.7],
        "radius": -10
    }));
    assert!(result.is_err());
    let error = widget.host().last("map_turf_error").unwrap();
    assert_eq!(error["operation"], json!("buffer"));

    widget
        .dispatch_value(json!({"type": "turf", "operation": "area", "data": {
            "type": "Polygon",
            "coordinates": [[[-122.41, 37.69], [-122.39, 37.69], [-122.39, 37.71], [-122.41, 37.71], [-122.41, 37.69]]]
        }}))
        .unwrap();
    let area = widget.host().last("map_turf_result").unwrap()["result"].as_f64().unwrap();
    assert!(area > 3.5e6 && area < 4.3e6, "area was {}", area);
}

#[test]
fn test_turf_reads_layer_input() {
    let mut widget = ready_widget();
    let points = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [-122.41, 37.69]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [-122.39, 37.69]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [-122.40, 37.71]}}
        ]
    });
    widget
        .dispatch_value(json!({"type": "add_source", "id": "pts", "source": {"type": "geojson", "data": points}}))
        .unwrap();
    widget
        .dispatch_value(json!({"type": "add_layer", "layer": {"id": "pts", "type": "circle", "source": "pts"}}))
        .unwrap();
    widget
        .dispatch_value(json!({"type": "turf", "operation": "convex_hull", "layer_id": "pts", "source_id": "hull"}))
        .unwrap();
    let hull = source_collection(&widget, "hull");
    assert_eq!(hull.features[0].geometry.as_ref().map(|g| g.type_name()), Some("Polygon"));
}

#[test]
fn test_query_returns_one_entry_per_feature_id() {
    let mut widget = ready_widget();
    let data = json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 1, "properties": {"part": "a"}, "geometry": {"type": "Point", "coordinates": [-122.40, 37.70]}},
            {"type": "Feature", "id": 1, "properties": {"part": "b"}, "geometry": {"type": "Point", "coordinates": [-122.41, 37.70]}},
            {"type": "Feature", "id": 2, "properties": {"part": "c"}, "geometry": {"type": "Point", "coordinates": [-122.39, 37.70]}}
        ]
    });
    widget
        .dispatch_value(json!({"type": "add_source", "id": "dupes", "source": {"type": "geojson", "data": data}}))
        .unwrap();
    for layer in ["dupes-a", "dupes-b"] {
        widget
            .dispatch_value(json!({"type": "add_layer", "layer": {"id": layer, "type": "circle", "source": "dupes"}}))
            .unwrap();
    }
    widget
        .dispatch_value(json!({"type": "query_rendered_features"}))
        .unwrap();

    let features = queried(&widget)["features"].as_array().cloned().unwrap();
    let mut ids: Vec<i64> = features.iter().filter_map(|f| f["id"].as_i64()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_grouped_query_on_missing_layers_is_empty() {
    let mut widget = ready_widget();
    widget
        .dispatch_value(json!({"type": "query_rendered_features", "layers": ["nope"], "group_by_layer": true}))
        .unwrap();
    assert_eq!(queried(&widget), json!({}));
}
