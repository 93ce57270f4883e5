//! Tile-indexed geographic cache of points of interest

mod cache;
mod types;

pub use cache::{GeoConfig, GeoStats, GeographicCache};
pub use types::{priority_score, Bounds, CachedPoi, GeoTile, LatLng, Poi, TileId, KM_PER_DEGREE};
