use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use wayfare::prelude::*;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let client = RequestClient::default();

    // Counts how often the backend is actually hit
    let fetches = Arc::new(AtomicU32::new(0));
    let key = "events-this-weekend";

    println!("Spawning 10 concurrent requests for key '{}'...", key);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let fetches = fetches.clone();

        handles.push(tokio::spawn(async move {
            client
                .request(
                    move || {
                        let fetches = fetches.clone();
                        async move {
                            sleep(Duration::from_millis(100)).await;
                            let n = fetches.fetch_add(1, Ordering::SeqCst) + 1;
                            println!("Fetching... (count: {})", n);
                            Ok(vec!["Primavera Sound".to_string(), "Grec".to_string()])
                        }
                    },
                    RequestOpts::new().endpoint("events"),
                    Some(key),
                )
                .await
        }));
    }

    for handle in handles {
        let response = handle.await??;
        assert_eq!(response.data.len(), 2);
    }

    let total = fetches.load(Ordering::SeqCst);
    println!("Total backend fetches: {}", total);
    if total != 1 {
        return Err(format!("expected 1 fetch, got {}", total).into());
    }
    println!("SUCCESS: concurrent requests shared one fetch.");

    Ok(())
}
