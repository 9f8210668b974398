use crate::anomaly::{IsolationForest, Prediction, OUTLIER};
use crate::errors::{Error, Result};
use crate::model::Reading;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Twin shared between request handlers. Writers are serialized, readers share.
pub type SharedTwin = Arc<RwLock<DigitalTwin>>;

/// Outcome of a maintenance prediction for one machine.
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceSignal {
    pub maintenance_needed: bool,
    /// One label per history row, oldest first. Empty for unknown machines.
    pub labels: Vec<i8>,
    pub last_score: Option<f64>,
}

impl MaintenanceSignal {
    pub fn neutral() -> Self {
        Self {
            maintenance_needed: false,
            labels: Vec::new(),
            last_score: None,
        }
    }

    fn from_prediction(prediction: Prediction) -> Self {
        Self {
            maintenance_needed: prediction.labels.last() == Some(&OUTLIER),
            last_score: prediction.scores.last().copied(),
            labels: prediction.labels,
        }
    }
}

/// Per-machine reading histories plus the detector used to score them.
#[derive(Debug)]
pub struct DigitalTwin {
    histories: HashMap<String, Vec<Reading>>,
    // First-seen order of machine ids.
    order: Vec<String>,
    detector: IsolationForest,
}

impl DigitalTwin {
    pub fn new(detector: IsolationForest) -> Self {
        Self {
            histories: HashMap::new(),
            order: Vec::new(),
            detector,
        }
    }

    pub fn into_shared(self) -> SharedTwin {
        Arc::new(RwLock::new(self))
    }

    pub fn detector(&self) -> &IsolationForest {
        &self.detector
    }

    pub fn update_state(&mut self, reading: Reading) {
        match self.histories.get_mut(&reading.machine_id) {
            Some(history) => history.push(reading),
            None => {
                self.order.push(reading.machine_id.clone());
                self.histories
                    .insert(reading.machine_id.clone(), vec![reading]);
            }
        }
    }

    /// Feature matrix of a machine's history, oldest row first.
    pub fn feature_rows(&self, machine_id: &str) -> Option<Vec<[f64; 4]>> {
        self.histories
            .get(machine_id)
            .map(|history| history.iter().map(Reading::features).collect())
    }

    /// Refits the detector on the whole history and reports on the latest row.
    pub fn predict_maintenance(&self, machine_id: &str) -> Result<MaintenanceSignal> {
        match self.feature_rows(machine_id) {
            Some(rows) => score_rows(&self.detector, machine_id, &rows),
            None => Ok(MaintenanceSignal::neutral()),
        }
    }

    pub fn history(&self, machine_id: &str) -> Result<&[Reading]> {
        self.histories
            .get(machine_id)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(machine_id.to_string()))
    }

    pub fn machines(&self) -> &[String] {
        &self.order
    }

    pub fn machine_count(&self) -> usize {
        self.order.len()
    }

    /// Drops the in-memory history. Durable rows are left alone.
    pub fn remove(&mut self, machine_id: &str) -> Result<Vec<Reading>> {
        let removed = self
            .histories
            .remove(machine_id)
            .ok_or_else(|| Error::NotFound(machine_id.to_string()))?;
        self.order.retain(|id| id != machine_id);
        Ok(removed)
    }
}

/// Fits `detector` on `rows` and derives the maintenance flag from the last label.
///
/// Kept separate from [`DigitalTwin`] so callers can fit without holding the twin lock.
pub fn score_rows(
    detector: &IsolationForest,
    machine_id: &str,
    rows: &[[f64; 4]],
) -> Result<MaintenanceSignal> {
    let prediction = detector.fit_predict(rows)?;
    let threshold = prediction.threshold;
    let signal = MaintenanceSignal::from_prediction(prediction);
    debug!(
        machine_id,
        rows = rows.len(),
        last_score = ?signal.last_score,
        threshold,
        maintenance_needed = signal.maintenance_needed,
        "Scored machine history"
    );
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{ForestConfig, INLIER};
    use chrono::{Duration, Utc};

    fn twin() -> DigitalTwin {
        let detector = IsolationForest::new(ForestConfig {
            seed: Some(7),
            ..ForestConfig::default()
        })
        .unwrap();
        DigitalTwin::new(detector)
    }

    fn reading(machine_id: &str, temperature: f64, minute: i64) -> Reading {
        Reading {
            machine_id: machine_id.to_string(),
            temperature,
            pressure: 100.0,
            vibration: 0.5,
            power_consumption: 150.0,
            timestamp: Utc::now() + Duration::minutes(minute),
        }
    }

    /// Temperatures spread evenly over 69..=71 around 70.
    fn tight_history(twin: &mut DigitalTwin, machine_id: &str, n: usize) {
        for i in 0..n {
            let offset = (i as f64 / (n - 1) as f64) * 2.0 - 1.0;
            twin.update_state(reading(machine_id, 70.0 + offset, i as i64));
        }
    }

    #[test]
    fn test_update_appends_in_order() {
        let mut twin = twin();
        twin.update_state(reading("press_1", 70.0, 0));
        twin.update_state(reading("press_1", 71.0, 1));

        let history = twin.history("press_1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].temperature, 71.0);
        assert!(history.iter().all(|r| r.machine_id == "press_1"));
    }

    #[test]
    fn test_machines_listed_in_first_seen_order() {
        let mut twin = twin();
        twin.update_state(reading("zeta", 70.0, 0));
        twin.update_state(reading("alpha", 70.0, 0));
        twin.update_state(reading("zeta", 70.0, 1));

        assert_eq!(twin.machines(), ["zeta".to_string(), "alpha".to_string()]);
        assert_eq!(twin.machine_count(), 2);
    }

    #[test]
    fn test_unknown_machine_is_neutral() {
        let twin = twin();
        let signal = twin.predict_maintenance("ghost").unwrap();
        assert_eq!(signal, MaintenanceSignal::neutral());
        assert!(matches!(twin.history("ghost"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_single_reading_not_flagged() {
        let mut twin = twin();
        twin.update_state(reading("m", 70.0, 0));
        let signal = twin.predict_maintenance("m").unwrap();
        assert!(!signal.maintenance_needed);
        assert_eq!(signal.labels, vec![INLIER]);
    }

    #[test]
    fn test_spike_after_stable_history_needs_maintenance() {
        let mut twin = twin();
        tight_history(&mut twin, "m", 20);
        let mut spike = reading("m", 149.0, 30);
        spike.vibration = 9.0;
        twin.update_state(spike);

        let signal = twin.predict_maintenance("m").unwrap();
        assert!(signal.maintenance_needed);
        assert_eq!(signal.labels.len(), 21);
    }

    #[test]
    fn test_stable_history_needs_no_maintenance() {
        let mut twin = twin();
        tight_history(&mut twin, "m", 20);
        twin.update_state(reading("m", 70.0, 30));

        let signal = twin.predict_maintenance("m").unwrap();
        assert!(!signal.maintenance_needed);
        // Contamination still marks a share of the history.
        assert!(signal.labels.iter().any(|&l| l == OUTLIER));
    }

    #[test]
    fn test_shared_twin_serializes_writers() {
        tokio_test::block_on(async {
            let shared = twin().into_shared();

            let writers: Vec<_> = (0..8)
                .map(|w| {
                    let shared = shared.clone();
                    tokio::spawn(async move {
                        for i in 0..25 {
                            shared.write().await.update_state(reading("m", 70.0, w * 100 + i));
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.await.unwrap();
            }

            assert_eq!(shared.read().await.history("m").unwrap().len(), 200);
        });
    }

    #[test]
    fn test_remove_forgets_machine() {
        let mut twin = twin();
        twin.update_state(reading("a", 70.0, 0));
        twin.update_state(reading("b", 70.0, 0));

        let removed = twin.remove("a").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(twin.machines(), ["b".to_string()]);
        assert!(twin.history("a").is_err());
        assert!(matches!(twin.remove("a"), Err(Error::NotFound(_))));
    }
}
