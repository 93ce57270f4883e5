use std::time::Duration;
use wayfare::prelude::*;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct Museum {
    name: String,
    district: String,
}

async fn fetch_museums() -> Result<Vec<Museum>> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(vec![
        Museum {
            name: "MNAC".to_string(),
            district: "Sants-Montjuïc".to_string(),
        },
        Museum {
            name: "Museu Picasso".to_string(),
            district: "Ciutat Vella".to_string(),
        },
    ])
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = RequestClient::default();
    let opts = RequestOpts::new().ttl_mins(5).endpoint("museums");

    // First call runs the operation
    let live = client
        .request(fetch_museums, opts.clone(), Some("museums-barcelona"))
        .await?;
    println!(
        "live: {} museums in {:?}",
        live.data.len(),
        live.response_time.unwrap_or_default()
    );

    // Second call is answered from the cache
    let cached = client
        .request(fetch_museums, opts, Some("museums-barcelona"))
        .await?;
    println!("cached: {} (cached = {})", cached.data[0].name, cached.cached);

    let health = client.get_health_status();
    println!(
        "health: {} requests, {:.0}% cache hits, overall {}",
        health.total_requests,
        health.cache_hit_rate * 100.0,
        health.overall.as_str()
    );

    Ok(())
}
