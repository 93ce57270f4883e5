use serde::Serialize;
use wayfare::RequestKey;

#[derive(Debug, Serialize)]
struct Filters {
    free_only: bool,
    min_rating: f64,
}

#[derive(RequestKey)]
#[request_key(prefix = "carousel-poi")]
struct CarouselKey {
    kind: &'static str,
    category: String,
    #[request_key(json)]
    filters: Filters,
}

#[derive(RequestKey)]
#[request_key(prefix = "weather", separator = ":")]
struct WeatherKey {
    lat: String,
    lng: String,
    #[request_key(skip)]
    _requested_by: u64,
}

fn main() {
    let carousel = CarouselKey {
        kind: "event",
        category: "music".to_string(),
        filters: Filters {
            free_only: true,
            min_rating: 4.0,
        },
    };
    println!("{}", carousel.full_key());
    // carousel-poi-event-music-{"free_only":true,"min_rating":4.0}

    let weather = WeatherKey {
        lat: format!("{:.2}", 41.3874),
        lng: format!("{:.2}", 2.1686),
        _requested_by: 7,
    };
    println!("{}", weather.full_key());
    // weather-41.39:2.17
}
