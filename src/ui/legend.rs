//! Legend overlays.
//!
//! Legends are DOM overlays that live outside the style, so a style swap does
//! not remove them from the registry. They are still rebuilt afterwards because
//! hosts may have rearranged the map container.

use crate::engine::MapEngine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
}

impl LegendEntry {
    pub fn new(html: &str, css: Option<&str>) -> Self {
        Self {
            html: html.to_string(),
            css: css.map(str::to_string),
        }
    }
}

/// Legends by id, in insertion order
#[derive(Debug, Default, Clone)]
pub struct LegendRegistry {
    entries: Vec<(String, LegendEntry)>,
}

impl LegendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a legend. Without `additive` every existing legend is removed first;
    /// an existing id is overwritten in place.
    pub fn add(&mut self, engine: &mut dyn MapEngine, id: &str, entry: LegendEntry, additive: bool) {
        if !additive {
            self.clear(engine, None);
        }
        engine.render_legend(id, &entry.html, entry.css.as_deref());
        match self.entries.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, slot)) => *slot = entry,
            None => self.entries.push((id.to_string(), entry)),
        }
    }

    /// Removes the given legends, or all of them. Returns the ids removed.
    pub fn clear(&mut self, engine: &mut dyn MapEngine, ids: Option<&[String]>) -> Vec<String> {
        let mut removed = Vec::new();
        self.entries.retain(|(id, _)| {
            let drop = ids.map_or(true, |ids| ids.contains(id));
            if drop {
                removed.push(id.clone());
            }
            !drop
        });
        for id in &removed {
            engine.remove_legend(id);
        }
        removed
    }

    /// Clears and re-renders every legend node in registry order
    pub fn rebuild(&self, engine: &mut dyn MapEngine) -> usize {
        for (id, _) in &self.entries {
            engine.remove_legend(id);
        }
        for (id, entry) in &self.entries {
            engine.render_legend(id, &entry.html, entry.css.as_deref());
        }
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<&LegendEntry> {
        self.entries.iter().find(|(l, _)| l == id).map(|(_, e)| e)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;

    #[test]
    fn test_collision_overwrites_in_place() {
        let mut engine = MemoryEngine::new();
        let mut legends = LegendRegistry::new();
        legends.add(&mut engine, "a", LegendEntry::new("<p>a</p>", None), true);
        legends.add(&mut engine, "b", LegendEntry::new("<p>b</p>", None), true);
        legends.add(&mut engine, "a", LegendEntry::new("<p>a2</p>", Some(".x{}")), true);

        assert_eq!(legends.ids(), vec!["a", "b"]);
        assert_eq!(legends.get("a").unwrap().html, "<p>a2</p>");
        assert_eq!(engine.legend_html("a"), Some("<p>a2</p>"));
    }

    #[test]
    fn test_non_additive_add_replaces_all() {
        let mut engine = MemoryEngine::new();
        let mut legends = LegendRegistry::new();
        legends.add(&mut engine, "a", LegendEntry::new("a", None), true);
        legends.add(&mut engine, "b", LegendEntry::new("b", None), false);
        assert_eq!(legends.ids(), vec!["b"]);
        assert_eq!(engine.legend_ids(), vec!["b"]);
    }

    #[test]
    fn test_selective_clear_and_rebuild() {
        let mut engine = MemoryEngine::new();
        let mut legends = LegendRegistry::new();
        for id in ["a", "b", "c"] {
            legends.add(&mut engine, id, LegendEntry::new(id, None), true);
        }
        let removed = legends.clear(&mut engine, Some(&["b".to_string(), "zzz".to_string()]));
        assert_eq!(removed, vec!["b"]);

        engine.remove_legend("a");
        assert_eq!(legends.rebuild(&mut engine), 2);
        assert_eq!(engine.legend_ids(), vec!["a", "c"]);
    }
}
