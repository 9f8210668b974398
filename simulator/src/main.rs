mod reading;

use clap::Parser;
use rand::Rng;
use reading::Baseline;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Posts synthetic machine readings to the digital twin service")]
struct Args {
    /// Base URL of the twin service
    #[arg(long, env = "TWIN_URL", default_value = "http://localhost:8000")]
    url: String,

    /// Readings per second across all machines
    #[arg(long, env = "RATE", default_value_t = 20)]
    rate: u64,

    /// Number of simulated machines
    #[arg(long, env = "MACHINES", default_value_t = 5)]
    machines: usize,

    /// Probability that a reading is anomalous
    #[arg(long, env = "ANOMALY_RATE", default_value_t = 0.02)]
    anomaly_rate: f64,

    /// Ask for a maintenance prediction every N readings
    #[arg(long, env = "PREDICT_EVERY", default_value_t = 50)]
    predict_every: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    anyhow::ensure!(args.rate > 0, "rate must be positive");
    anyhow::ensure!(args.machines > 0, "at least one machine is required");
    anyhow::ensure!(
        (0.0..=1.0).contains(&args.anomaly_rate),
        "anomaly rate must be within [0, 1]"
    );

    info!("Starting machine simulator");
    info!(
        "Target: {}, Rate: {} readings/s, Machines: {}, Anomaly rate: {}",
        args.url, args.rate, args.machines, args.anomaly_rate
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let mut rng = rand::thread_rng();
    let baselines: Vec<Baseline> = (0..args.machines)
        .map(|_| Baseline::random(&mut rng))
        .collect();

    let mut ticker = tokio::time::interval(Duration::from_micros((1_000_000 / args.rate).max(1)));
    let mut tick = 0u64;
    let mut posted = 0u64;
    let mut failures = 0u64;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Received shutdown signal");
                break;
            }
        }

        let index = machine_index(tick, args.machines);
        tick += 1;
        let machine_id = format!("machine-{:03}", index);
        let baseline = &baselines[index];
        let update = if rng.gen_bool(args.anomaly_rate) {
            baseline.anomalous(&mut rng, &machine_id)
        } else {
            baseline.normal(&mut rng, &machine_id)
        };

        match client
            .post(format!("{}/update_state", args.url))
            .json(&update)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => posted += 1,
            Ok(response) => {
                failures += 1;
                warn!("Update for {} rejected: {}", machine_id, response.status());
            }
            Err(e) => {
                failures += 1;
                error!("Failed to post update: {}", e);
            }
        }

        if tick % args.predict_every.max(1) == 0 {
            check_maintenance(&client, &args.url, &machine_id).await;
        }

        if tick % 1000 == 0 {
            info!("Posted {} readings ({} failures)", posted, failures);
        }
    }

    info!("Posted {} readings ({} failures)", posted, failures);
    Ok(())
}

/// Round-robin slot for the reading sent on `tick`, starting at machine 0.
fn machine_index(tick: u64, machines: usize) -> usize {
    (tick % machines as u64) as usize
}

async fn check_maintenance(client: &reqwest::Client, base: &str, machine_id: &str) {
    let response = match client
        .get(format!("{}/maintenance/{}", base, machine_id))
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            error!("Prediction request failed: {}", e);
            return;
        }
    };

    match response.json::<serde_json::Value>().await {
        Ok(body) if body["maintenance_needed"] == true => {
            warn!("{} needs maintenance", machine_id)
        }
        Ok(_) => info!("{} looks healthy", machine_id),
        Err(e) => error!("Unreadable prediction for {}: {}", machine_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_starts_at_first_machine() {
        let order: Vec<usize> = (0..7).map(|tick| machine_index(tick, 3)).collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }
}
