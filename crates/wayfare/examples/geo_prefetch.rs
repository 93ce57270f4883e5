use std::sync::Arc;
use wayfare::geo::LatLng;
use wayfare::services::{InMemoryExecutor, MapsService};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let backend = InMemoryExecutor::new();
    backend.insert(
        "pois",
        &[
            serde_json::json!({"id": "sagrada", "name": "Sagrada Família", "latitude": 41.4036, "longitude": 2.1744, "rating": 4.8}),
            serde_json::json!({"id": "picasso", "name": "Museu Picasso", "latitude": 41.3852, "longitude": 2.1809, "rating": 4.5}),
            serde_json::json!({"id": "guell", "name": "Park Güell", "latitude": 41.4145, "longitude": 2.1527, "rating": 4.6}),
            serde_json::json!({"id": "montjuic", "name": "Castell de Montjuïc", "latitude": 41.3634, "longitude": 2.1664, "rating": 4.4}),
        ],
    )?;
    let maps = MapsService::new(Arc::new(backend.clone()));

    // Walking north-east along the Passeig de Gràcia
    let route = [
        LatLng::new(41.3870, 2.1700),
        LatLng::new(41.3920, 2.1650),
        LatLng::new(41.3970, 2.1600),
    ];
    for position in route {
        let nearby = maps.nearby(position, 3.0).await?;
        let names: Vec<&str> = nearby.pois.iter().map(|p| p.poi.name.as_str()).collect();
        println!(
            "({:.4}, {:.4}) from_cache={} -> {:?}",
            position.lat, position.lng, nearby.from_cache, names
        );

        let warmed = maps.prefetch_ahead(position).await;
        println!("  prefetched tiles: {:?}", warmed.iter().map(ToString::to_string).collect::<Vec<_>>());
    }

    let stats = maps.geo_cache().stats();
    println!(
        "tiles={} pois={} evictions={} backend calls={}",
        stats.tiles,
        stats.pois,
        stats.evictions,
        backend.calls()
    );
    Ok(())
}
