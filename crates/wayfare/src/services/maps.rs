use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use wayfare_core::{ApiResponse, CompositeKey, RequestKey, RequestOpts, Result};
use wayfare_storage::MemoryStore;

use super::backend::{require_str, row_f64, row_str, Query, QueryExecutor, Row};
use crate::client::{ClientConfig, RequestClient};
use crate::geo::{priority_score, Bounds, CachedPoi, GeoConfig, GeographicCache, LatLng, Poi, TileId};

/// The maps backend is flakier than the rest; trip its breaker sooner
pub const MAPS_FAILURE_THRESHOLD: u32 = 3;

impl Poi {
    /// Map a `pois` row; `id`, `name`, `latitude` and `longitude` are required
    pub fn from_row(row: &Row) -> Result<Self> {
        let coordinate = |column: &str| {
            row_f64(row, column).ok_or_else(|| {
                wayfare_core::ApiError::invalid_response(format!("row is missing `{column}`"))
            })
        };
        let location = LatLng::new(coordinate("latitude")?, coordinate("longitude")?);
        let poi = Poi::new(
            require_str(row, "id")?,
            require_str(row, "name")?,
            location,
            row_f64(row, "rating").unwrap_or(0.0),
        );
        Ok(match row_str(row, "category") {
            Some(category) => poi.with_category(category),
            None => poi,
        })
    }
}

/// POIs around a location, nearest-and-best first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyPois {
    pub pois: Vec<CachedPoi>,
    /// Answered from the geographic cache without a request
    pub from_cache: bool,
    /// Answered from an expired response after a failure
    pub stale: bool,
}

/// Nearby POIs backed by the geographic cache
#[derive(Clone)]
pub struct MapsService {
    client: RequestClient,
    geo: GeographicCache,
    executor: Arc<dyn QueryExecutor>,
}

impl MapsService {
    /// Service with its own client and a default geographic cache
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self::with_parts(
            RequestClient::with_config(
                MemoryStore::default(),
                ClientConfig::with_failure_threshold(MAPS_FAILURE_THRESHOLD),
            ),
            GeographicCache::new(GeoConfig::default()),
            executor,
        )
    }

    pub fn with_parts(
        client: RequestClient,
        geo: GeographicCache,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            client,
            geo,
            executor,
        }
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    pub fn geo_cache(&self) -> &GeographicCache {
        &self.geo
    }

    /// POIs within `radius_km` of `location`
    ///
    /// Served from the geographic cache while every tile under the search
    /// box is fresh. Otherwise the box is fetched; live results refill the
    /// geographic cache, fallback results are ranked without being stored.
    pub async fn nearby(&self, location: LatLng, radius_km: f64) -> Result<NearbyPois> {
        self.geo.record_position(location);
        let bounds = Bounds::around(location, radius_km);

        if !self.geo.needs_fresh_data(&bounds) {
            return Ok(NearbyPois {
                pois: self.geo.get_cached_pois(location, Some(radius_km)),
                from_cache: true,
                stale: false,
            });
        }

        let response = self.fetch_area(bounds).await?;
        if response.stale || response.recovered {
            warn!(
                target: "wayfare",
                lat = location.lat,
                lng = location.lng,
                stale = response.stale,
                "Ranking fallback POIs outside the geographic cache"
            );
            return Ok(NearbyPois {
                pois: self.rank(response.data, location, radius_km),
                from_cache: false,
                stale: true,
            });
        }

        self.geo.store_pois(response.data, bounds);
        Ok(NearbyPois {
            pois: self.geo.get_cached_pois(location, Some(radius_km)),
            from_cache: false,
            stale: false,
        })
    }

    /// Warm the tiles the user is heading towards; returns the tiles filled
    pub async fn prefetch_ahead(&self, location: LatLng) -> Vec<TileId> {
        let deg = self.geo.config().tile_deg();
        let tiles = self.geo.tiles_to_prefetch(location);
        if tiles.is_empty() {
            return tiles;
        }
        debug!(target: "wayfare", count = tiles.len(), "Prefetching tiles ahead");

        let fetches = tiles.iter().map(|tile| {
            let bounds = tile.bounds(deg);
            async move { (*tile, bounds, self.fetch_area(bounds).await) }
        });

        let mut filled = Vec::new();
        for (tile, bounds, result) in join_all(fetches).await {
            match result {
                Ok(response) if !response.stale && !response.recovered => {
                    self.geo.store_pois(response.data, bounds);
                    filled.push(tile);
                }
                Ok(_) => {}
                Err(e) => debug!(target: "wayfare", tile = %tile, error = %e, "Prefetch failed"),
            }
        }
        filled
    }

    async fn fetch_area(&self, bounds: Bounds) -> Result<ApiResponse<Vec<Poi>>> {
        let key = area_key(&bounds);
        let executor = self.executor.clone();
        let query = Query::table("pois")
            .gte("latitude", bounds.south)
            .lte("latitude", bounds.north)
            .gte("longitude", bounds.west)
            .lte("longitude", bounds.east);
        let ttl = self.geo.config().cache_ttl;

        self.client
            .request(
                move || {
                    let executor = executor.clone();
                    let query = query.clone();
                    async move {
                        let rows = executor.execute(query).await?;
                        rows.iter().map(Poi::from_row).collect()
                    }
                },
                RequestOpts::new()
                    .ttl(ttl)
                    .endpoint("maps")
                    .empty_state(&Vec::<Poi>::new()),
                Some(&key),
            )
            .await
    }

    fn rank(&self, pois: Vec<Poi>, location: LatLng, radius_km: f64) -> Vec<CachedPoi> {
        let mut ranked: Vec<CachedPoi> = pois
            .into_iter()
            .filter_map(|poi| {
                let distance = location.distance_km(&poi.location);
                (distance <= radius_km).then(|| CachedPoi {
                    tile_id: self.geo.tile_id(&poi.location),
                    priority: priority_score(distance, poi.rating),
                    distance_km: Some(distance),
                    poi,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        ranked
    }
}

fn area_key(bounds: &Bounds) -> String {
    CompositeKey::new()
        .with_prefix("maps-pois")
        .part(format!("{:.3}", bounds.north))
        .part(format!("{:.3}", bounds.south))
        .part(format!("{:.3}", bounds.east))
        .part(format!("{:.3}", bounds.west))
        .full_key()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryExecutor;
    use serde_json::json;
    use wayfare_core::ApiError;

    const PLAZA: LatLng = LatLng {
        lat: 41.3874,
        lng: 2.1686,
    };

    fn executor() -> InMemoryExecutor {
        let executor = InMemoryExecutor::new();
        executor
            .insert(
                "pois",
                &[
                    json!({"id": "sagrada", "name": "Sagrada Família", "latitude": 41.4036, "longitude": 2.1744, "rating": 4.8}),
                    json!({"id": "picasso", "name": "Museu Picasso", "latitude": 41.3852, "longitude": 2.1809, "rating": 4.5}),
                    json!({"id": "tibidabo", "name": "Tibidabo", "latitude": 41.4225, "longitude": 2.1186, "rating": 4.3}),
                ],
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_nearby_fills_then_serves_geo_cache() {
        let executor = executor();
        let service = MapsService::new(Arc::new(executor.clone()));

        let first = service.nearby(PLAZA, 3.0).await.unwrap();
        assert!(!first.from_cache);
        let ids: Vec<&str> = first.pois.iter().map(|p| p.poi.id.as_str()).collect();
        assert_eq!(ids, vec!["picasso", "sagrada"]);
        assert_eq!(executor.calls(), 1);

        let second = service.nearby(PLAZA, 3.0).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.pois.len(), 2);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_radius_served_from_geo_cache() {
        let executor = executor();
        let service = MapsService::new(Arc::new(executor.clone()));
        let radius = service.geo_cache().config().default_max_distance_km;

        let first = service.nearby(PLAZA, radius).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.pois.len(), 3);

        let second = service.nearby(PLAZA, radius).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.pois, first.pois);
        assert_eq!(executor.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trips_after_three_failures() {
        let executor = executor();
        executor.fail_with(Some(ApiError::invalid_response("bad payload")));
        let service = MapsService::new(Arc::new(executor.clone()));

        for _ in 0..MAPS_FAILURE_THRESHOLD {
            assert!(service.nearby(PLAZA, 3.0).await.is_err());
        }
        let key = area_key(&Bounds::around(PLAZA, 3.0));
        assert!(service.client().is_circuit_open(&key));

        let calls = executor.calls();
        assert!(service.nearby(PLAZA, 3.0).await.is_err());
        assert_eq!(executor.calls(), calls);
    }

    #[test]
    fn test_poi_from_row() {
        let row = json!({"id": 9, "name": "Park Güell", "latitude": "41.4145", "longitude": 2.1527, "category": "park"});
        let poi = Poi::from_row(row.as_object().unwrap()).unwrap();
        assert_eq!(poi.id, "9");
        assert_eq!(poi.rating, 0.0);
        assert_eq!(poi.category.as_deref(), Some("park"));

        let missing = json!({"id": 1, "name": "Nowhere"});
        assert!(Poi::from_row(missing.as_object().unwrap()).is_err());
    }
}
