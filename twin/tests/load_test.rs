use rand::Rng;
use serde_json::json;
use std::time::{Duration, Instant};

fn base_url() -> String {
    std::env::var("TWIN_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn random_reading(machine_id: &str) -> serde_json::Value {
    let mut rng = rand::thread_rng();
    json!({
        "machine_id": machine_id,
        "temperature": rng.gen_range(60.0..80.0),
        "pressure": rng.gen_range(90.0..110.0),
        "vibration": rng.gen_range(0.2..0.8),
        "power_consumption": rng.gen_range(140.0..160.0),
    })
}

/// Needs a running server: `cargo test --test load_test -- --ignored`.
#[tokio::test]
#[ignore]
async fn test_sustained_updates_and_predictions() {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap();
    let base = base_url();

    let machines = 10;
    let total = 2_000;

    let start = Instant::now();
    let mut sent = 0;
    let mut errors = 0;

    for i in 0..total {
        let machine_id = format!("load-test-machine-{}", i % machines);
        let response = client
            .post(format!("{}/update_state", base))
            .json(&random_reading(&machine_id))
            .send()
            .await;

        match response {
            Ok(r) if r.status().is_success() => sent += 1,
            Ok(r) => {
                errors += 1;
                eprintln!("Unexpected status: {}", r.status());
            }
            Err(e) => {
                errors += 1;
                eprintln!("Send error: {}", e);
            }
        }
    }

    let elapsed = start.elapsed();
    println!(
        "Sent {} readings in {:.2}s ({:.0} req/s), {} errors",
        sent,
        elapsed.as_secs_f64(),
        sent as f64 / elapsed.as_secs_f64(),
        errors
    );

    // Each machine now holds total / machines readings; every prediction refits on all of them.
    let start = Instant::now();
    for m in 0..machines {
        let response = client
            .get(format!("{}/maintenance/load-test-machine-{}", base, m))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["maintenance_needed"].is_boolean());
    }
    println!(
        "{} predictions in {:.2}s",
        machines,
        start.elapsed().as_secs_f64()
    );

    assert_eq!(errors, 0, "Too many errors: {}", errors);
}
