use crate::errors::{Error, Result};
use crate::model::{Reading, ReadingUpdate};
use chrono::{DateTime, Utc};

pub const MACHINE_ID_MAX_LEN: usize = 50;
pub const TEMP_MIN: f64 = 0.0;
pub const TEMP_MAX: f64 = 150.0;
pub const PRESSURE_MIN: f64 = 0.0;
pub const PRESSURE_MAX: f64 = 1000.0;
pub const VIBRATION_MIN: f64 = 0.0;
pub const VIBRATION_MAX: f64 = 10.0;
pub const POWER_MIN: f64 = 0.0;

/// Validates an incoming update and stamps it with the current time.
pub fn validate(update: ReadingUpdate) -> Result<Reading> {
    validate_at(update, Utc::now())
}

/// Same as [`validate`] with an explicit timestamp.
pub fn validate_at(update: ReadingUpdate, timestamp: DateTime<Utc>) -> Result<Reading> {
    let id_len = update.machine_id.chars().count();
    if id_len == 0 {
        return Err(Error::validation("machine_id", "Machine ID cannot be empty"));
    }
    if id_len > MACHINE_ID_MAX_LEN {
        return Err(Error::validation(
            "machine_id",
            format!(
                "Machine ID has {} characters, at most {} allowed",
                id_len, MACHINE_ID_MAX_LEN
            ),
        ));
    }

    check_range("temperature", update.temperature, TEMP_MIN, TEMP_MAX)?;
    check_range("pressure", update.pressure, PRESSURE_MIN, PRESSURE_MAX)?;
    check_range("vibration", update.vibration, VIBRATION_MIN, VIBRATION_MAX)?;

    // Power has no upper bound but must still be a real number.
    if !update.power_consumption.is_finite() || update.power_consumption < POWER_MIN {
        return Err(Error::validation(
            "power_consumption",
            format!(
                "Power consumption {} must be >= {}",
                update.power_consumption, POWER_MIN
            ),
        ));
    }

    Ok(Reading {
        machine_id: update.machine_id,
        temperature: update.temperature,
        pressure: update.pressure,
        vibration: update.vibration,
        power_consumption: update.power_consumption,
        timestamp,
    })
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    // NaN fails `contains`, so it is rejected along with out-of-range values.
    if !(min..=max).contains(&value) {
        return Err(Error::validation(
            field,
            format!("{} {} out of range [{}, {}]", field, value, min, max),
        ));
    }
    Ok(())
}
