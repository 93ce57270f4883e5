use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use wayfare::prelude::*;
use wayfare::{MemoryStore, TracingMetrics};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::TRACE)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let metrics = TracingMetrics::new().with_service_name("wayfare-example");
    let client = RequestClient::with_serializer_and_metrics(
        MemoryStore::default(),
        JsonSerializer,
        metrics,
        ClientConfig::default().base_delay(std::time::Duration::from_millis(10)),
    )
    .with_recovery(RecoveryService::new());

    println!("Live request...");
    client
        .request(
            || async { Ok(21.5f64) },
            RequestOpts::new().endpoint("weather"),
            Some("weather-41.39-2.17"),
        )
        .await?;

    println!("Cache hit...");
    client
        .request(
            || async { Ok(0.0f64) },
            RequestOpts::new().endpoint("weather"),
            Some("weather-41.39-2.17"),
        )
        .await?;

    println!("Failing request, recovered through the fallback...");
    let recovered = client
        .request(
            || async { Err::<Vec<String>, _>(ApiError::from_status(502, "bad gateway")) },
            RequestOpts::new()
                .retries(1)
                .endpoint("events")
                .empty_state(&Vec::<String>::new()),
            Some("events-today"),
        )
        .await?;
    println!("recovered = {}, items = {}", recovered.recovered, recovered.data.len());

    let summary = client.error_logger().summary();
    println!("Logged errors: {} ({} unresolved)", summary.total, summary.unresolved);
    println!("Check your console output for structured logs!");

    Ok(())
}
