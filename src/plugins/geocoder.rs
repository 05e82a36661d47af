//! Forward geocoding for the MapLibre geocoder control.
//!
//! Lookups go to a Nominatim-compatible `/search` endpoint. A failed lookup is
//! logged and yields no results; successful lookups are cached per query.

use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    core::{
        config::GeocoderConfig,
        geo::{LngLat, LngLatBounds},
    },
    data::geojson::Geometry,
    input::events::now_millis,
    prelude::{Arc, Mutex},
    MapError, Result,
};

/// One geocoding match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub place_name: String,
    pub center: LngLat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl GeocodeResult {
    /// Carmen-style feature the geocoder control expects
    pub fn to_feature(&self) -> Value {
        let mut feature = json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [self.center.lng, self.center.lat]},
            "place_name": self.place_name,
            "text": self.place_name,
            "place_type": ["place"],
            "center": [self.center.lng, self.center.lat],
            "properties": self.properties,
        });
        if let (Some(bbox), Some(object)) = (self.bbox, feature.as_object_mut()) {
            object.insert("bbox".to_string(), json!(bbox));
        }
        feature
    }
}

/// `{result, time}` reported when the user picks a result
pub fn selection_value(result: &Value) -> Value {
    json!({
        "result": result,
        "time": now_millis(),
    })
}

/// A geocoding backend
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodeResult>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<SearchFeature>,
}

#[derive(Debug, Deserialize)]
struct SearchFeature {
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    bbox: Option<[f64; 4]>,
}

impl SearchFeature {
    fn into_result(self) -> Option<GeocodeResult> {
        let bounds: LngLatBounds = self.geometry.as_ref()?.bounds()?;
        let place_name = self
            .properties
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some(GeocodeResult {
            place_name,
            center: bounds.center(),
            bbox: self.bbox,
            properties: self.properties,
        })
    }
}

/// Nominatim `/search?format=geojson`
pub struct NominatimProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl NominatimProvider {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodeResult>> {
        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[
                ("q", query),
                ("format", "geojson"),
                ("limit", limit.as_str()),
                ("addressdetails", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = response.json().await?;
        Ok(body
            .features
            .into_iter()
            .filter_map(SearchFeature::into_result)
            .collect())
    }
}

/// Cached forward geocoder
pub struct Geocoder {
    provider: Arc<dyn GeocodeProvider>,
    cache: Arc<Mutex<LruCache<String, Vec<GeocodeResult>>>>,
    limit: usize,
}

impl Geocoder {
    /// Geocoder backed by the configured Nominatim endpoint
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        Ok(Self::with_provider(Arc::new(NominatimProvider::new(config)?), config))
    }

    pub fn with_provider(provider: Arc<dyn GeocodeProvider>, config: &GeocoderConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            limit: config.limit,
        }
    }

    fn cache_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    fn cached(&self, key: &str) -> Option<Vec<GeocodeResult>> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    /// Results for `query`. Failures are logged and give an empty list.
    pub async fn forward(&self, query: &str) -> Vec<GeocodeResult> {
        let key = Self::cache_key(query);
        if key.is_empty() {
            return Vec::new();
        }
        if let Some(results) = self.cached(&key) {
            log::debug!("geocoder cache hit for '{}'", key);
            return results;
        }
        match self.provider.search(query.trim(), self.limit).await {
            Ok(results) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.put(key, results.clone());
                }
                results
            }
            Err(e) => {
                log::warn!("geocoding '{}' failed: {}", query, e);
                Vec::new()
            }
        }
    }

    /// Runs several lookups concurrently, results in query order
    pub async fn forward_batch(&self, queries: &[&str]) -> Vec<Vec<GeocodeResult>> {
        futures::future::join_all(queries.iter().map(|q| self.forward(q))).await
    }

    /// Response body for the control's `forwardGeocode`: `{features: [...]}`
    pub async fn forward_response(&self, query: &str) -> Value {
        let features: Vec<Value> = self
            .forward(query)
            .await
            .iter()
            .map(GeocodeResult::to_feature)
            .collect();
        json!({ "features": features })
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

/// Provider that always fails, for hosts without network access
pub struct OfflineProvider;

#[async_trait]
impl GeocodeProvider for OfflineProvider {
    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<GeocodeResult>> {
        Err(MapError::Plugin(format!("geocoding is offline, cannot look up '{}'", query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodeProvider for CountingProvider {
        async fn search(&self, query: &str, limit: usize) -> Result<Vec<GeocodeResult>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![GeocodeResult {
                place_name: query.to_string(),
                center: LngLat::new(2.35, 48.85),
                bbox: None,
                properties: Map::new(),
            }]
            .into_iter()
            .take(limit)
            .collect())
        }
    }

    #[tokio::test]
    async fn test_results_are_cached_per_query() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
        });
        let geocoder = Geocoder::with_provider(provider.clone(), &GeocoderConfig::default());

        assert_eq!(geocoder.forward("Paris").await.len(), 1);
        assert_eq!(geocoder.forward("  paris ").await.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let batch = geocoder.forward_batch(&["Lyon", "Paris", ""]).await;
        assert_eq!(batch.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 1, 0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(geocoder.cached_queries(), 2);
    }

    #[tokio::test]
    async fn test_failures_give_empty_results() {
        let geocoder = Geocoder::with_provider(Arc::new(OfflineProvider), &GeocoderConfig::default());
        assert!(geocoder.forward("Paris").await.is_empty());
        assert_eq!(geocoder.cached_queries(), 0);
        assert_eq!(geocoder.forward_response("Paris").await, json!({"features": []}));
    }

    #[test]
    fn test_search_feature_conversion() {
        let feature: SearchFeature = serde_json::from_value(json!({
            "type": "Feature",
            "bbox": [2.2, 48.8, 2.5, 48.9],
            "properties": {"display_name": "Paris, France"},
            "geometry": {"type": "Point", "coordinates": [2.35, 48.85]}
        }))
        .unwrap();
        let result = feature.into_result().unwrap();
        assert_eq!(result.place_name, "Paris, France");
        assert_eq!(result.center, LngLat::new(2.35, 48.85));
        assert_eq!(result.to_feature()["bbox"], json!([2.2, 48.8, 2.5, 48.9]));
    }
}
