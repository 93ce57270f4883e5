use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Kilometres per degree of latitude
pub const KM_PER_DEGREE: f64 = 111.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in kilometres
    pub fn distance_km(&self, other: &LatLng) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// Rounded to 3 decimal degrees (~100 m), as integer thousandths
    pub fn rounded(&self) -> (i64, i64) {
        (
            (self.lat * 1000.0).round() as i64,
            (self.lng * 1000.0).round() as i64,
        )
    }
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Square box of `radius_km` around `center`
    pub fn around(center: LatLng, radius_km: f64) -> Self {
        let d = radius_km / KM_PER_DEGREE;
        Self::new(center.lat + d, center.lat - d, center.lng + d, center.lng - d)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new((self.north + self.south) / 2.0, (self.east + self.west) / 2.0)
    }

    pub fn contains(&self, point: &LatLng) -> bool {
        point.lat <= self.north
            && point.lat >= self.south
            && point.lng <= self.east
            && point.lng >= self.west
    }
}

/// Grid cell id, rendered as `"x,y"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    /// Longitude index
    pub x: i64,
    /// Latitude index
    pub y: i64,
}

impl TileId {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Tile containing `point` for tiles of `tile_deg` degrees
    pub fn containing(point: &LatLng, tile_deg: f64) -> Self {
        Self {
            x: (point.lng / tile_deg).floor() as i64,
            y: (point.lat / tile_deg).floor() as i64,
        }
    }

    pub fn bounds(&self, tile_deg: f64) -> Bounds {
        let west = self.x as f64 * tile_deg;
        let south = self.y as f64 * tile_deg;
        Bounds::new(south + tile_deg, south, west + tile_deg, west)
    }

    /// The 8 surrounding tiles with their (dx, dy) offsets
    pub fn neighbours(&self) -> impl Iterator<Item = (TileId, (i64, i64))> + '_ {
        (-1..=1)
            .flat_map(|dy| (-1..=1).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .map(|(dx, dy)| (TileId::new(self.x + dx, self.y + dy), (dx, dy)))
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for TileId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("tile id {s:?} is not \"x,y\""))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<i64>()
                .map_err(|e| format!("tile id {s:?}: {e}"))
        };
        Ok(Self::new(parse(x)?, parse(y)?))
    }
}

/// A point of interest as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub location: LatLng,
    /// 0 to 5
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub category: Option<String>,
}

impl Poi {
    pub fn new(id: impl Into<String>, name: impl Into<String>, location: LatLng, rating: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            location,
            rating,
            category: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A cached POI with its placement and score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPoi {
    pub poi: Poi,
    pub tile_id: TileId,
    pub priority: f64,
    /// Distance from the querying location, set on lookups
    pub distance_km: Option<f64>,
}

/// Ranking score: `max(0, 20 - distance_km) + 2 * rating`
pub fn priority_score(distance_km: f64, rating: f64) -> f64 {
    (20.0 - distance_km).max(0.0) + rating * 2.0
}

#[derive(Debug, Clone)]
pub struct GeoTile {
    pub id: TileId,
    pub bounds: Bounds,
    pub center: LatLng,
    pub poi_ids: Vec<String>,
    pub fetched_at: Instant,
    /// Mean priority of the tile's POIs
    pub priority: f64,
}
