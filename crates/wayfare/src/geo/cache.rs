use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use wayfare_core::{ClientMetrics, EvictionReason, NoopMetrics};

use super::types::{priority_score, Bounds, CachedPoi, GeoTile, LatLng, Poi, TileId, KM_PER_DEGREE};

/// Slack, in tiles, for box edges that sit on a tile boundary
const EDGE_EPSILON: f64 = 1e-9;

/// Configuration for the geographic cache
#[derive(Debug, Clone)]
pub struct GeoConfig {
    /// Edge length of a tile
    pub tile_size_km: f64,
    pub max_pois: usize,
    /// Bound on tiles holding POIs
    pub max_tiles: usize,
    /// Bound on tiles remembered as fetched. A store whose box spans more
    /// tiles than this keeps its POIs but marks nothing fetched.
    pub max_coverage_tiles: usize,
    /// Tiles older than this are stale
    pub cache_ttl: Duration,
    /// Radius used by `get_cached_pois` when none is given
    pub default_max_distance_km: f64,
    /// Identical lookups served before throttling kicks in
    pub throttle_limit: u32,
    /// Neighbour tiles returned by `tiles_to_prefetch`
    pub prefetch_limit: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            tile_size_km: 5.0,
            max_pois: 50,
            max_tiles: 12,
            max_coverage_tiles: 4_096,
            cache_ttl: Duration::from_secs(15 * 60),
            default_max_distance_km: 15.0,
            throttle_limit: 5,
            prefetch_limit: 3,
        }
    }
}

impl GeoConfig {
    pub fn with_limits(max_pois: usize, max_tiles: usize) -> Self {
        Self {
            max_pois,
            max_tiles,
            ..Default::default()
        }
    }

    pub fn tile_deg(&self) -> f64 {
        self.tile_size_km / KM_PER_DEGREE
    }
}

/// Counters for the geographic cache
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoStats {
    /// Tiles holding at least one POI
    pub tiles: usize,
    pub pois: usize,
    /// Tiles remembered as fetched, with or without POIs
    pub covered_tiles: usize,
    pub stale_tiles: usize,
    pub evictions: u64,
    pub throttled_lookups: u64,
}

/// Rounded location plus the bit pattern of the search radius
type LookupKey = (i64, i64, u64);

#[derive(Default)]
struct Throttle {
    last_key: Option<LookupKey>,
    count: u32,
    last_result: Vec<CachedPoi>,
}

#[derive(Default)]
struct GeoState {
    pois: HashMap<String, CachedPoi>,
    /// Only tiles with POIs in them
    tiles: HashMap<TileId, GeoTile>,
    /// When each tile was last covered by a stored search box
    coverage: HashMap<TileId, Instant>,
    /// Latest known user location, the origin for priorities
    reference: Option<LatLng>,
    /// Last position seen by prefetch / `record_position`
    last_position: Option<LatLng>,
    /// (dlng, dlat) between the last two positions
    movement: (f64, f64),
    throttle: Throttle,
    evictions: u64,
    throttled_lookups: u64,
}

impl GeoState {
    fn reprioritize(&mut self, origin: LatLng) {
        for cached in self.pois.values_mut() {
            let distance = origin.distance_km(&cached.poi.location);
            cached.priority = priority_score(distance, cached.poi.rating);
        }
        self.refresh_tile_priorities();
    }

    fn refresh_tile_priorities(&mut self) {
        for tile in self.tiles.values_mut() {
            tile.priority = mean_priority(&self.pois, &tile.poi_ids);
        }
    }

    fn remove_poi(&mut self, id: &str) -> Option<CachedPoi> {
        let cached = self.pois.remove(id)?;
        if let Some(tile) = self.tiles.get_mut(&cached.tile_id) {
            tile.poi_ids.retain(|p| p != id);
        }
        Some(cached)
    }

    fn move_to(&mut self, position: LatLng) {
        if let Some(prev) = self.last_position {
            self.movement = (position.lng - prev.lng, position.lat - prev.lat);
        }
        self.last_position = Some(position);
    }
}

fn mean_priority(pois: &HashMap<String, CachedPoi>, ids: &[String]) -> f64 {
    let scores: Vec<f64> = ids
        .iter()
        .filter_map(|id| pois.get(id))
        .map(|p| p.priority)
        .collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Highest priority first, nearer first on ties
fn by_rank(a: &CachedPoi, b: &CachedPoi) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| {
            a.distance_km
                .unwrap_or(f64::MAX)
                .total_cmp(&b.distance_km.unwrap_or(f64::MAX))
        })
        .then_with(|| a.poi.id.cmp(&b.poi.id))
}

/// Tile-indexed cache of POI query results
///
/// POIs are bounded by `max_pois` and POI-holding tiles by `max_tiles`;
/// the lowest priority goes first when either bound is exceeded. Which
/// tiles were fetched is tracked apart from the POI tiles, so a search
/// box wider than `max_tiles` stays fresh after it is stored. Cloning
/// creates a new handle to the SAME cache.
#[derive(Clone)]
pub struct GeographicCache {
    state: Arc<Mutex<GeoState>>,
    config: GeoConfig,
    metrics: Arc<dyn ClientMetrics>,
}

impl Default for GeographicCache {
    fn default() -> Self {
        Self::new(GeoConfig::default())
    }
}

impl GeographicCache {
    pub fn new(config: GeoConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(GeoState::default())),
            config,
            metrics: Arc::new(NoopMetrics),
        }
    }

    /// Report priority evictions to `metrics`
    pub fn with_metrics(mut self, metrics: impl ClientMetrics) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    pub fn config(&self) -> &GeoConfig {
        &self.config
    }

    /// Tile containing `location`
    pub fn tile_id(&self, location: &LatLng) -> TileId {
        TileId::containing(location, self.config.tile_deg())
    }

    /// South-west and north-east tiles under `bounds`
    ///
    /// North and east edges are exclusive: a box that matches one tile
    /// exactly covers that tile only.
    fn tile_range(&self, bounds: &Bounds) -> (TileId, TileId) {
        let deg = self.config.tile_deg();
        let low = |edge: f64| (edge / deg + EDGE_EPSILON).floor() as i64;
        let high = |edge: f64, min: i64| {
            ((edge / deg - EDGE_EPSILON).ceil() as i64)
                .saturating_sub(1)
                .max(min)
        };

        let (west, south) = (low(bounds.west), low(bounds.south));
        (
            TileId::new(west, south),
            TileId::new(high(bounds.east, west), high(bounds.north, south)),
        )
    }

    fn covering(&self, bounds: &Bounds) -> impl Iterator<Item = TileId> + use<> {
        let (sw, ne) = self.tile_range(bounds);
        (sw.y..=ne.y).flat_map(move |y| (sw.x..=ne.x).map(move |x| TileId::new(x, y)))
    }

    fn covering_count(&self, bounds: &Bounds) -> u64 {
        let (sw, ne) = self.tile_range(bounds);
        let columns = ne.x.abs_diff(sw.x).saturating_add(1);
        let rows = ne.y.abs_diff(sw.y).saturating_add(1);
        columns.saturating_mul(rows)
    }

    /// Every tile intersecting `bounds`
    pub fn tiles_covering(&self, bounds: &Bounds) -> Vec<TileId> {
        self.covering(bounds).collect()
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() <= self.config.cache_ttl
    }

    fn new_tile(&self, id: TileId, now: Instant) -> GeoTile {
        let bounds = id.bounds(self.config.tile_deg());
        GeoTile {
            id,
            bounds,
            center: bounds.center(),
            poi_ids: Vec::new(),
            fetched_at: now,
            priority: 0.0,
        }
    }

    /// Store backend results for `bounds`
    ///
    /// Every tile covering `bounds` is marked fetched, even if no POI
    /// landed in it. A POI id already cached is replaced. Returns how many
    /// POIs and tiles were evicted to stay within bounds.
    pub fn store_pois(&self, pois: Vec<Poi>, bounds: Bounds) -> u64 {
        let now = Instant::now();
        let evicted = {
            let mut state = self.state.lock();
            let origin = state.reference.unwrap_or_else(|| bounds.center());
            self.mark_fetched(&mut state, &bounds, now);

            let stored = pois.len();
            for poi in pois {
                state.remove_poi(&poi.id);
                let tile_id = self.tile_id(&poi.location);
                let tile = state
                    .tiles
                    .entry(tile_id)
                    .or_insert_with(|| self.new_tile(tile_id, now));
                tile.poi_ids.push(poi.id.clone());
                tile.fetched_at = now;

                state.pois.insert(
                    poi.id.clone(),
                    CachedPoi {
                        poi,
                        tile_id,
                        priority: 0.0,
                        distance_km: None,
                    },
                );
            }

            // Scores every POI, old and new, against the same origin
            state.reprioritize(origin);
            let evicted = self.evict(&mut state);
            // New data invalidates whatever the throttle would replay
            state.throttle = Throttle::default();

            debug!(
                target: "wayfare",
                stored,
                evicted,
                pois = state.pois.len(),
                tiles = state.tiles.len(),
                "Stored POIs"
            );
            evicted
        };

        for _ in 0..evicted {
            self.metrics.record_eviction(EvictionReason::Priority);
        }
        evicted
    }

    fn mark_fetched(&self, state: &mut GeoState, bounds: &Bounds, now: Instant) {
        let ttl = self.config.cache_ttl;
        state
            .coverage
            .retain(|_, fetched_at| now.duration_since(*fetched_at) <= ttl);

        let limit = self.config.max_coverage_tiles;
        let count = self.covering_count(bounds);
        if count > limit as u64 {
            debug!(target: "wayfare", tiles = count, "Search box too wide to mark fetched");
            return;
        }
        for id in self.covering(bounds) {
            state.coverage.insert(id, now);
        }

        if state.coverage.len() > limit {
            let mut oldest: Vec<(TileId, Instant)> =
                state.coverage.iter().map(|(id, at)| (*id, *at)).collect();
            oldest.sort_by_key(|&(_, at)| at);
            let excess = state.coverage.len() - limit;
            for (id, _) in oldest.into_iter().take(excess) {
                state.coverage.remove(&id);
            }
        }
    }

    fn evict(&self, state: &mut GeoState) -> u64 {
        let mut evicted = 0;

        if state.pois.len() > self.config.max_pois {
            let mut ranked: Vec<(String, f64)> = state
                .pois
                .values()
                .map(|p| (p.poi.id.clone(), p.priority))
                .collect();
            ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));
            let excess = state.pois.len() - self.config.max_pois;
            for (id, _) in ranked.into_iter().take(excess) {
                state.remove_poi(&id);
                evicted += 1;
            }
            state.refresh_tile_priorities();
        }

        // Replaced or evicted POIs can leave a tile empty
        state.tiles.retain(|_, tile| !tile.poi_ids.is_empty());

        if state.tiles.len() > self.config.max_tiles {
            let mut ranked: Vec<(TileId, f64, Instant)> = state
                .tiles
                .values()
                .map(|t| (t.id, t.priority, t.fetched_at))
                .collect();
            ranked.sort_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| a.2.cmp(&b.2))
                    .then_with(|| a.0.cmp(&b.0))
            });
            let excess = state.tiles.len() - self.config.max_tiles;
            for (id, _, _) in ranked.into_iter().take(excess) {
                if let Some(tile) = state.tiles.remove(&id) {
                    for poi in &tile.poi_ids {
                        state.pois.remove(poi);
                    }
                    evicted += 1;
                }
            }
        }

        state.evictions += evicted;
        evicted
    }

    /// Cached POIs within `max_distance_km` (default 15) of `location`,
    /// highest priority first
    ///
    /// Repeated lookups with the same radius at the same spot (to 3
    /// decimals) past the throttle limit replay the previous result
    /// without rescanning.
    pub fn get_cached_pois(&self, location: LatLng, max_distance_km: Option<f64>) -> Vec<CachedPoi> {
        let max_distance = max_distance_km.unwrap_or(self.config.default_max_distance_km);
        let mut state = self.state.lock();

        let (lat, lng) = location.rounded();
        let key = (lat, lng, max_distance.to_bits());
        if state.throttle.last_key == Some(key) {
            state.throttle.count += 1;
        } else {
            state.throttle = Throttle {
                last_key: Some(key),
                count: 1,
                last_result: Vec::new(),
            };
        }
        if state.throttle.count > self.config.throttle_limit {
            state.throttled_lookups += 1;
            if state.throttle.count == self.config.throttle_limit + 1 {
                debug!(target: "wayfare", lat = location.lat, lng = location.lng, "Throttling repeated POI lookups");
            }
            return state.throttle.last_result.clone();
        }

        state.reference = Some(location);
        state.reprioritize(location);

        let mut found: Vec<CachedPoi> = state
            .pois
            .values()
            .filter_map(|cached| {
                let distance = location.distance_km(&cached.poi.location);
                (distance <= max_distance).then(|| CachedPoi {
                    distance_km: Some(distance),
                    ..cached.clone()
                })
            })
            .collect();
        found.sort_by(by_rank);

        state.throttle.last_result = found.clone();
        found
    }

    /// Whether any tile covering `bounds` was never fetched or is stale
    pub fn needs_fresh_data(&self, bounds: &Bounds) -> bool {
        let state = self.state.lock();
        self.covering(bounds).any(|id| {
            !state
                .coverage
                .get(&id)
                .is_some_and(|fetched_at| self.is_fresh(*fetched_at))
        })
    }

    /// Note a user position for movement tracking and priorities
    pub fn record_position(&self, location: LatLng) {
        let mut state = self.state.lock();
        state.move_to(location);
        state.reference = Some(location);
        state.reprioritize(location);
    }

    /// Up to `prefetch_limit` missing or stale neighbour tiles, the ones
    /// ahead of the current movement first
    pub fn tiles_to_prefetch(&self, location: LatLng) -> Vec<TileId> {
        let mut state = self.state.lock();
        state.move_to(location);
        let (mv_x, mv_y) = state.movement;

        let mut neighbours: Vec<(TileId, f64)> = self
            .tile_id(&location)
            .neighbours()
            .map(|(id, (dx, dy))| (id, dx as f64 * mv_x + dy as f64 * mv_y))
            .collect();
        // Stable: equal alignment keeps neighbour order
        neighbours.sort_by(|a, b| b.1.total_cmp(&a.1));

        neighbours
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| {
                !state
                    .coverage
                    .get(id)
                    .is_some_and(|fetched_at| self.is_fresh(*fetched_at))
            })
            .take(self.config.prefetch_limit)
            .collect()
    }

    pub fn stats(&self) -> GeoStats {
        let state = self.state.lock();
        GeoStats {
            tiles: state.tiles.len(),
            pois: state.pois.len(),
            covered_tiles: state.coverage.len(),
            stale_tiles: state.coverage.values().filter(|at| !self.is_fresh(**at)).count(),
            evictions: state.evictions,
            throttled_lookups: state.throttled_lookups,
        }
    }

    /// Drop every tile and POI, keeping movement history
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pois.clear();
        state.tiles.clear();
        state.coverage.clear();
        state.throttle = Throttle::default();
    }
}
