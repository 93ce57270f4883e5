use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use wayfare_core::{ApiResponse, RequestKey, RequestOpts, Result};
use wayfare_derive::RequestKey;

use super::backend::{require_str, row_bool, row_f64, row_str, Query, QueryExecutor, Row};
use crate::client::RequestClient;
use crate::geo::LatLng;

/// Carousel lists go stale quickly enough that five minutes is plenty
pub const CAROUSEL_TTL: Duration = Duration::from_secs(5 * 60);

/// Category value meaning "no category filter"
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarouselKind {
    #[default]
    Place,
    Event,
}

impl CarouselKind {
    fn table(&self) -> &'static str {
        match self {
            CarouselKind::Place => "pois",
            CarouselKind::Event => "events",
        }
    }
}

impl fmt::Display for CarouselKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CarouselKind::Place => "place",
            CarouselKind::Event => "event",
        })
    }
}

/// Optional narrowing of a carousel; part of the cache key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarouselFilters {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub free_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One carousel's worth of items
///
/// Keys render as `carousel-poi-<kind>-<category>-<json(filters)>`.
#[derive(Debug, Clone, PartialEq, RequestKey)]
#[request_key(prefix = "carousel-poi")]
pub struct CarouselRequest {
    pub kind: CarouselKind,
    pub category: String,
    #[request_key(json)]
    pub filters: CarouselFilters,
}

impl CarouselRequest {
    pub fn new(kind: CarouselKind, category: impl Into<String>) -> Self {
        Self {
            kind,
            category: category.into(),
            filters: CarouselFilters::default(),
        }
    }

    pub fn with_filters(mut self, filters: CarouselFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Backend query for this carousel
    pub fn query(&self) -> Query {
        let mut query = Query::table(self.kind.table());
        if self.category != ALL_CATEGORIES {
            query = query.eq("category", self.category.as_str());
        }
        if self.filters.free_only {
            query = query.eq("is_free", true);
        }
        if let Some(min) = self.filters.min_rating {
            query = query.gte("rating", min);
        }
        if let Some(district) = &self.filters.district {
            query = query.eq("district", district.as_str());
        }
        let order = match self.kind {
            CarouselKind::Place => "rating",
            CarouselKind::Event => "start_date",
        };
        query
            .order_by_desc(order)
            .limit(self.filters.limit.unwrap_or(20))
    }
}

/// View model for one carousel card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarouselItem {
    pub id: String,
    pub title: String,
    pub category: Option<String>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub starts_at: Option<String>,
    pub location: Option<LatLng>,
    pub is_free: bool,
}

impl CarouselItem {
    /// Map a backend row; `id` and one of `name`/`title` are required
    pub fn from_row(row: &Row) -> Result<Self> {
        let title = match row_str(row, "name") {
            Some(name) => name,
            None => require_str(row, "title")?,
        };
        let location = match (row_f64(row, "latitude"), row_f64(row, "longitude")) {
            (Some(lat), Some(lng)) => Some(LatLng::new(lat, lng)),
            _ => None,
        };
        Ok(Self {
            id: require_str(row, "id")?,
            title,
            category: row_str(row, "category"),
            image_url: row_str(row, "image_url"),
            rating: row_f64(row, "rating"),
            starts_at: row_str(row, "start_date"),
            location,
            is_free: row_bool(row, "is_free").unwrap_or(false),
        })
    }
}

/// Fetches carousel contents through the resilient client
#[derive(Clone)]
pub struct CarouselService {
    client: RequestClient,
    executor: Arc<dyn QueryExecutor>,
    ttl: Duration,
}

impl CarouselService {
    pub fn new(client: RequestClient, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            client,
            executor,
            ttl: CAROUSEL_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn client(&self) -> &RequestClient {
        &self.client
    }

    /// Items for one carousel, empty when the backend is down and
    /// nothing was ever cached
    pub async fn fetch(&self, request: &CarouselRequest) -> Result<ApiResponse<Vec<CarouselItem>>> {
        let key = request.full_key();
        let executor = self.executor.clone();
        let query = request.query();

        self.client
            .request(
                move || {
                    let executor = executor.clone();
                    let query = query.clone();
                    async move {
                        let rows = executor.execute(query).await?;
                        rows.iter().map(CarouselItem::from_row).collect()
                    }
                },
                RequestOpts::new()
                    .ttl(self.ttl)
                    .endpoint("carousel")
                    .empty_state(&Vec::<CarouselItem>::new()),
                Some(&key),
            )
            .await
    }
}
