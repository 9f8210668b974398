use rand::Rng;
use serde::{Deserialize, Serialize};

/// Body accepted by `POST /update_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingUpdate {
    pub machine_id: String,
    pub temperature: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub power_consumption: f64,
}

/// Operating point a simulated machine hovers around.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub temperature: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub power_consumption: f64,
}

impl Baseline {
    pub fn random(rng: &mut impl Rng) -> Self {
        Self {
            temperature: rng.gen_range(55.0..85.0),
            pressure: rng.gen_range(80.0..400.0),
            vibration: rng.gen_range(0.2..1.5),
            power_consumption: rng.gen_range(100.0..500.0),
        }
    }

    /// Small jitter around the baseline.
    pub fn normal(&self, rng: &mut impl Rng, machine_id: &str) -> ReadingUpdate {
        ReadingUpdate {
            machine_id: machine_id.to_string(),
            temperature: self.temperature + rng.gen_range(-1.0..1.0),
            pressure: self.pressure + rng.gen_range(-5.0..5.0),
            vibration: (self.vibration + rng.gen_range(-0.05..0.05)).max(0.0),
            power_consumption: self.power_consumption + rng.gen_range(-5.0..5.0),
        }
    }

    /// Overheating, shaking machine that is still within the accepted physical ranges.
    pub fn anomalous(&self, rng: &mut impl Rng, machine_id: &str) -> ReadingUpdate {
        ReadingUpdate {
            machine_id: machine_id.to_string(),
            temperature: rng.gen_range(130.0..150.0),
            pressure: (self.pressure * rng.gen_range(1.5..2.5)).min(1000.0),
            vibration: rng.gen_range(6.0..10.0),
            power_consumption: self.power_consumption * rng.gen_range(2.0..3.0),
        }
    }
}
