use mapgl::prelude::*;
use mapgl::engine::memory::StyleDocument;
use mapgl::style::swap::RestoreStep;
use serde_json::{json, Value};

/// Widget lifecycle and style swap scenarios, driven the way a host drives a map:
/// render a bundle, stream messages, pump engine events.
#[cfg(test)]
mod integration_tests {
    use super::*;

    type Widget = MapWidget<MemoryEngine, RecordingHost>;

    fn polygons() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 1, "properties": {"name": "north"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2], [0, 0]]]}},
                {"type": "Feature", "id": 2, "properties": {"name": "south"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0, -3], [2, -3], [2, -1], [0, -1], [0, -3]]]}}
            ]
        })
    }

    fn ready_widget(engine: MemoryEngine) -> Widget {
        let mut widget = MapWidget::new("map", engine, RecordingHost::new());
        widget
            .render(RenderBundle::new("streets", LngLat::new(0.0, 0.0), 4.0))
            .unwrap();
        widget.engine_mut().finish_style_load();
        widget.pump();
        assert!(widget.is_ready());
        widget
    }

    fn send(widget: &mut Widget, message: Value) {
        widget.dispatch_value(message).unwrap();
        widget.pump();
    }

    #[test]
    fn test_paint_survives_style_swap() {
        let mut widget = ready_widget(MemoryEngine::new());
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "counties", "type": "fill", "source": "s1"}}));
        send(&mut widget, json!({"type": "set_paint_property", "layer": "counties", "name": "fill-color", "value": "#ff0000"}));
        send(&mut widget, json!({"type": "set_style", "style": "dark"}));

        assert!(!widget.swap().is_busy());
        assert_eq!(widget.engine().current_style(), &json!("dark"));
        assert_eq!(
            widget.engine().paint_property("counties", "fill-color"),
            Some(json!("#ff0000"))
        );
        let report = widget.host().last("map_style_restored").unwrap();
        assert_eq!(report["complete"], json!(true));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut widget = ready_widget(MemoryEngine::new());
        let filter = json!(["==", ["get", "name"], "north"]);
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1"}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "lines", "type": "line", "source": "s1"}}));
        send(&mut widget, json!({"type": "set_filter", "layer": "fills", "filter": filter}));
        send(&mut widget, json!({"type": "set_paint_property", "layer": "lines", "name": "line-width", "value": 3}));
        send(&mut widget, json!({"type": "set_layout_property", "layer": "lines", "name": "visibility", "value": "none"}));

        let before: Vec<String> = widget.engine().layer_ids();
        send(&mut widget, json!({"type": "set_style", "style": "light"}));

        let engine = widget.engine();
        assert!(engine.source("s1").is_some());
        assert_eq!(engine.filter("fills"), Some(filter));
        assert_eq!(engine.paint_property("lines", "line-width"), Some(json!(3)));
        assert_eq!(engine.layout_property("lines", "visibility"), Some(json!("none")));

        let user_layers = |ids: &[String]| -> Vec<String> {
            ids.iter().filter(|id| *id == "fills" || *id == "lines").cloned().collect()
        };
        assert_eq!(user_layers(&engine.layer_ids()), user_layers(&before));
    }

    #[test]
    fn test_cleared_filter_stays_cleared() {
        let mut widget = ready_widget(MemoryEngine::new());
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {
            "id": "fills", "type": "fill", "source": "s1", "filter": ["==", ["get", "name"], "north"]
        }}));
        send(&mut widget, json!({"type": "set_filter", "layer": "fills", "filter": null}));
        send(&mut widget, json!({"type": "set_style", "style": "light"}));
        assert_eq!(widget.engine().filter("fills"), None);
    }

    #[test]
    fn test_zoom_range_survives_style_swap() {
        let mut widget = ready_widget(MemoryEngine::new());
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1"}}));
        send(&mut widget, json!({"type": "set_layer_zoom_range", "layer": "fills", "min_zoom": 3, "max_zoom": 9}));
        send(&mut widget, json!({"type": "set_style", "style": "dark"}));

        let layer = widget.engine().layer("fills").unwrap();
        assert_eq!(layer.minzoom, Some(3.0));
        assert_eq!(layer.maxzoom, Some(9.0));
    }

    #[test]
    fn test_restore_continues_past_a_failed_layer() {
        // the new style owns a raster source under the id of a user source
        let satellite = StyleDocument {
            sources: vec![(
                "s1".to_string(),
                serde_json::from_value(json!({"type": "raster", "tiles": ["https://tiles.example/{z}/{x}/{y}.png"]})).unwrap(),
            )],
            layers: vec![LayerSpec::new("imagery", "raster", Some("s1"))],
        };
        let mut widget = ready_widget(MemoryEngine::new().with_style("satellite", satellite));
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_source", "id": "s2", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1"}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "outlines", "type": "line", "source": "s2"}}));
        send(&mut widget, json!({"type": "set_paint_property", "layer": "outlines", "name": "line-width", "value": 4}));
        send(&mut widget, json!({"type": "set_paint_property", "layer": "fills", "name": "fill-opacity", "value": 0.5}));
        send(&mut widget, json!({"type": "set_style", "style": "satellite"}));

        assert!(!widget.swap().is_busy());
        let engine = widget.engine();
        assert!(engine.layer("fills").is_none());
        assert!(engine.layer("outlines").is_some());
        assert!(engine.source("s2").is_some());
        assert_eq!(engine.paint_property("outlines", "line-width"), Some(json!(4)));

        let report = widget.host().last("map_style_restored").unwrap();
        assert_eq!(report["complete"], json!(false));
        assert!(report["failed"].as_u64().unwrap() >= 1);
        let last = widget.swap().last_report().unwrap();
        assert!(matches!(
            last.outcome(RestoreStep::Layer, "fills"),
            Some(RestoreOutcome::Failed(_))
        ));
        assert_eq!(
            last.outcome(RestoreStep::Layer, "outlines"),
            Some(&RestoreOutcome::Restored)
        );
    }

    #[test]
    fn test_basemap_layer_zoom_range_survives_style_swap() {
        let mut widget = ready_widget(MemoryEngine::new());
        send(&mut widget, json!({"type": "set_layer_zoom_range", "layer": "water", "min_zoom": 5, "max_zoom": 14}));
        send(&mut widget, json!({"type": "set_style", "style": "dark"}));

        let water = widget.engine().layer("water").unwrap();
        assert_eq!(water.minzoom, Some(5.0));
        assert_eq!(water.maxzoom, Some(14.0));
        assert_eq!(
            widget.swap().last_report().unwrap().outcome(RestoreStep::Layout, "water.zoom_range"),
            Some(&RestoreOutcome::Restored)
        );
    }

    #[test]
    fn test_removing_missing_layer_is_a_no_op() {
        let mut widget = ready_widget(MemoryEngine::new());
        assert!(widget
            .dispatch_value(json!({"type": "remove_layer", "layer": "never-added"}))
            .is_ok());
        assert!(widget
            .dispatch_value(json!({"type": "remove_source", "source": "never-added"}))
            .is_ok());
        assert!(widget
            .dispatch_value(json!({"type": "remove_control", "control": "never-added"}))
            .is_ok());
    }

    #[test]
    fn test_superseded_swap_restores_once() {
        let mut widget = ready_widget(MemoryEngine::new().with_manual_style_load());
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1"}}));

        send(&mut widget, json!({"type": "set_style", "style": "dark"}));
        send(&mut widget, json!({"type": "set_style", "style": "light"}));
        assert_eq!(widget.swap().generation(), 2);
        assert_eq!(widget.engine().style_listener_count(), 1);

        widget.engine_mut().finish_style_load();
        widget.pump();

        assert_eq!(widget.host().count("map_style_restored"), 1);
        let report = widget.host().last("map_style_restored").unwrap();
        assert_eq!(report["generation"], json!(2));
        assert_eq!(widget.engine().current_style(), &json!("light"));
        assert!(widget.engine().layer("fills").is_some());
        assert!(!widget.swap().is_busy());
    }

    #[test]
    fn test_mutations_queue_during_swap() {
        let mut widget = ready_widget(MemoryEngine::new().with_manual_style_load());
        send(&mut widget, json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1"}}));
        send(&mut widget, json!({"type": "set_style", "style": "dark"}));

        send(&mut widget, json!({"type": "set_paint_property", "layer": "fills", "name": "fill-opacity", "value": 0.4}));
        send(&mut widget, json!({"type": "add_layer", "layer": {"id": "outline", "type": "line", "source": "s1"}}));
        assert_eq!(widget.queued(), 2);
        assert!(widget.engine().layer("outline").is_none());

        widget.engine_mut().finish_style_load();
        widget.pump();

        assert_eq!(widget.queued(), 0);
        assert_eq!(widget.engine().paint_property("fills", "fill-opacity"), Some(json!(0.4)));
        assert!(widget.engine().layer("outline").is_some());
    }

    #[test]
    fn test_legends_are_rebuilt_after_swap() {
        let mut widget = ready_widget(MemoryEngine::new());
        send(&mut widget, json!({"type": "add_legend", "id": "l1", "html": "<div>one</div>"}));
        send(&mut widget, json!({"type": "add_legend", "id": "l2", "html": "<div>two</div>", "add": true}));
        send(&mut widget, json!({"type": "set_style", "style": "dark"}));

        assert_eq!(widget.engine().legend_ids(), vec!["l1", "l2"]);
        let report = widget.swap().last_report().unwrap();
        assert_eq!(
            report.outcome(RestoreStep::Legends, "legends"),
            Some(&RestoreOutcome::Restored)
        );

        send(&mut widget, json!({"type": "clear_legend", "legend_ids": ["l1"]}));
        assert_eq!(widget.engine().legend_ids(), vec!["l2"]);
    }

    #[test]
    fn test_initial_bundle_is_applied_in_order() {
        let bundle = RenderBundle::from_value(json!({
            "style": "streets",
            "center": [1, 1],
            "zoom": 5,
            "sources": [{"id": "s1", "type": "geojson", "data": polygons()}],
            "layers": [
                {"id": "fills", "type": "fill", "source": "s1", "paint": {"fill-color": "#00f"},
                 "hover_options": {"fill-color": "#ff0"}, "tooltip": "name"},
                {"id": "below", "type": "line", "source": "s1", "before_id": "fills"},
                {"id": "broken", "type": "fill", "source": "missing"}
            ],
            "controls": [{"type": "reset"}, {"type": "navigation"}, {"type": "scale"}],
            "legends": [{"id": "legend", "html": "<p>legend</p>"}],
            "config_properties": [{"name": "lightPreset", "value": "dusk"}],
            "fog": {"range": [1, 10]},
            "jump_to": {"zoom": 6}
        }))
        .unwrap();

        let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
        widget.render(bundle).unwrap();
        widget.pump();
        assert!(widget.is_ready());

        let engine = widget.engine();
        let ids = engine.layer_ids();
        let position = |id: &str| ids.iter().position(|l| l == id);
        assert!(position("below") < position("fills"));
        assert!(position("broken").is_none());

        let kinds: Vec<&str> = engine.controls().iter().map(|c| c.kind.name()).collect();
        assert_eq!(kinds, vec!["scale", "navigation", "reset"]);
        assert_eq!(engine.controls()[2].options["zoom"], json!(6.0));
        assert_eq!(engine.config_value("basemap", "lightPreset"), Some(&json!("dusk")));
        assert_eq!(engine.legend_ids(), vec!["legend"]);
        assert_eq!(engine.camera().zoom, 6.0);
    }

    #[test]
    fn test_widgets_do_not_share_state() {
        let mut registry: WidgetRegistry<MemoryEngine, RecordingHost> = WidgetRegistry::new();
        for id in ["left", "right"] {
            let mut widget = MapWidget::new(id, MemoryEngine::new(), RecordingHost::new());
            widget
                .render(RenderBundle::new("streets", LngLat::new(0.0, 0.0), 4.0))
                .unwrap();
            registry.insert(widget);
        }
        registry.pump_all();

        registry
            .dispatch_value("left", json!({"type": "add_source", "id": "s1", "source": {"type": "geojson", "data": polygons()}}))
            .unwrap();
        registry
            .dispatch_value("left", json!({"type": "add_layer", "layer": {"id": "fills", "type": "fill", "source": "s1", "popup": "name"}}))
            .unwrap();

        let left = registry.get("left").unwrap();
        let right = registry.get("right").unwrap();
        assert!(left.context().binder.is_bound("fills"));
        assert!(!right.context().binder.is_bound("fills"));
        assert!(right.engine().layer("fills").is_none());
    }
}
