//! Domain services built on the request client

mod backend;
mod carousel;
mod maps;
mod weather;

pub use backend::{
    require_str, row_bool, row_f64, row_str, Filter, FilterOp, InMemoryExecutor, Query,
    QueryExecutor, Row,
};
pub use carousel::{
    CarouselFilters, CarouselItem, CarouselKind, CarouselRequest, CarouselService,
    ALL_CATEGORIES, CAROUSEL_TTL,
};
pub use maps::{MapsService, NearbyPois, MAPS_FAILURE_THRESHOLD};
pub use weather::{weather_key, WeatherReport, WeatherService, WEATHER_TTL};
