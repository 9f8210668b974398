use crate::errors::Result;
use crate::metrics::DB_FAILURES_TOTAL;
use crate::model::{PersistedReading, Reading};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use tracing::{error, info};

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    info!("Connecting to database...");
    // No idle reaping: an in-memory database lives only as long as its connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Appends one reading to `machine_readings` under a fresh id.
pub async fn insert_reading(pool: &SqlitePool, reading: &Reading) -> Result<PersistedReading> {
    let row = PersistedReading {
        id: uuid::Uuid::new_v4().to_string(),
        machine_id: reading.machine_id.clone(),
        temperature: reading.temperature,
        pressure: reading.pressure,
        vibration: reading.vibration,
        power_consumption: reading.power_consumption,
        timestamp: reading.timestamp,
    };

    let query = r#"
        INSERT INTO machine_readings
            (id, machine_id, temperature, pressure, vibration, power_consumption, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;

    let result = sqlx::query(query)
        .bind(&row.id)
        .bind(&row.machine_id)
        .bind(row.temperature)
        .bind(row.pressure)
        .bind(row.vibration)
        .bind(row.power_consumption)
        .bind(row.timestamp)
        .execute(pool)
        .await;

    if let Err(e) = result {
        DB_FAILURES_TOTAL.inc();
        error!(machine_id = %row.machine_id, "Failed to persist reading: {}", e);
        return Err(e.into());
    }

    Ok(row)
}

/// Every durable row for a machine, oldest first.
pub async fn readings_for_machine(
    pool: &SqlitePool,
    machine_id: &str,
) -> Result<Vec<PersistedReading>> {
    let rows = sqlx::query_as::<_, PersistedReading>(
        r#"
        SELECT id, machine_id, temperature, pressure, vibration, power_consumption, timestamp
        FROM machine_readings
        WHERE machine_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(machine_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
