use crate::db;
use crate::errors::Error;
use crate::metrics::{
    INVALID_READINGS_TOTAL, MAINTENANCE_FLAGS_TOTAL, MODEL_FIT_SECONDS, PREDICTIONS_TOTAL,
    READINGS_TOTAL, VALID_READINGS_TOTAL,
};
use crate::model::{
    DeleteResponse, ErrorResponse, HistoryResponse, MachinesResponse, MaintenanceResponse,
    Reading, ReadingUpdate, ServiceInfo, UpdateResponse,
};
use crate::twin::{score_rows, MaintenanceSignal, SharedTwin};
use crate::validate::validate;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use sqlx::SqlitePool;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub const SERVICE_TITLE: &str = "Industrial Digital Twin Platform";
pub const DOCS_PATH: &str = "/docs";

#[derive(OpenApi)]
#[openapi(
    paths(
        root,
        update_state,
        get_maintenance,
        get_history,
        list_machines,
        delete_machine,
    ),
    components(
        schemas(
            Reading,
            ReadingUpdate,
            UpdateResponse,
            MaintenanceResponse,
            HistoryResponse,
            MachinesResponse,
            DeleteResponse,
            ServiceInfo,
            ErrorResponse,
        )
    ),
    tags(
        (name = "twin", description = "Machine state updates and maintenance predictions"),
        (name = "machines", description = "In-memory machine histories"),
        (name = "service", description = "Service metadata"),
    ),
    info(
        title = "Industrial Digital Twin Platform",
        description = "Sensor ingestion and anomaly-based maintenance prediction for industrial machines"
    )
)]
pub struct ApiDoc;

#[derive(Debug, Clone)]
pub struct AppState {
    pub twin: SharedTwin,
    pub pool: SqlitePool,
}

pub fn create_router(twin: SharedTwin, pool: SqlitePool) -> Router {
    let state = AppState { twin, pool };

    Router::new()
        .route("/", get(root))
        .route("/update_state", post(update_state))
        .route("/maintenance/:machine_id", get(get_maintenance))
        .route("/machine/:machine_id/history", get(get_history))
        .route("/machine/:machine_id", delete(delete_machine))
        .route("/machines", get(list_machines))
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        .merge(Scalar::with_url(DOCS_PATH, ApiDoc::openapi()))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Service metadata and endpoint list
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service is online", body = ServiceInfo),
    ),
    tag = "service"
)]
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        status: "online".to_string(),
        title: SERVICE_TITLE.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documentation: DOCS_PATH.to_string(),
        available_endpoints: [
            "/update_state",
            "/maintenance/{machine_id}",
            "/machine/{machine_id}/history",
            "/machine/{machine_id}",
            "/machines",
            DOCS_PATH,
            "/metrics",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect(),
    })
}

/// Update the state of a machine in the digital twin
#[utoipa::path(
    post,
    path = "/update_state",
    request_body = ReadingUpdate,
    responses(
        (status = 200, description = "Reading accepted and stored", body = UpdateResponse),
        (status = 422, description = "Reading failed validation", body = ErrorResponse),
        (status = 500, description = "Reading could not be persisted", body = ErrorResponse),
    ),
    tag = "twin"
)]
async fn update_state(
    State(state): State<AppState>,
    payload: Result<Json<ReadingUpdate>, JsonRejection>,
) -> Result<Json<UpdateResponse>, ApiError> {
    READINGS_TOTAL.inc();

    let reading = payload
        .map_err(|rejection| Error::validation("body", rejection.body_text()))
        .and_then(|Json(update)| validate(update))
        .map_err(|e| {
            INVALID_READINGS_TOTAL.inc();
            warn!("Rejected state update: {}", e);
            e
        })?;
    VALID_READINGS_TOTAL.inc();

    // Memory first, then storage; a failed insert leaves the in-memory append in place.
    state.twin.write().await.update_state(reading.clone());
    db::insert_reading(&state.pool, &reading).await?;

    Ok(Json(UpdateResponse {
        status: "success".to_string(),
        timestamp: reading.timestamp,
    }))
}

/// Get maintenance prediction for a specific machine
///
/// Refits the anomaly model on the machine's full history. Unknown machines
/// report no maintenance needed.
#[utoipa::path(
    get,
    path = "/maintenance/{machine_id}",
    params(("machine_id" = String, Path, description = "Machine identifier")),
    responses(
        (status = 200, description = "Prediction for the latest reading", body = MaintenanceResponse),
        (status = 500, description = "Model fitting failed", body = ErrorResponse),
    ),
    tag = "twin"
)]
async fn get_maintenance(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> Result<Json<MaintenanceResponse>, ApiError> {
    let (detector, rows) = {
        let twin = state.twin.read().await;
        (twin.detector().clone(), twin.feature_rows(&machine_id))
    };

    let signal = match rows {
        Some(rows) => {
            let id = machine_id.clone();
            let timer = MODEL_FIT_SECONDS.start_timer();
            let signal =
                tokio::task::spawn_blocking(move || score_rows(&detector, &id, &rows)).await??;
            timer.observe_duration();
            signal
        }
        None => MaintenanceSignal::neutral(),
    };

    PREDICTIONS_TOTAL.inc();
    if signal.maintenance_needed {
        MAINTENANCE_FLAGS_TOTAL.inc();
        info!(machine_id = %machine_id, last_score = ?signal.last_score, "Maintenance needed");
    }

    Ok(Json(MaintenanceResponse {
        machine_id,
        maintenance_needed: signal.maintenance_needed,
    }))
}

/// Get historical data for a specific machine
#[utoipa::path(
    get,
    path = "/machine/{machine_id}/history",
    params(("machine_id" = String, Path, description = "Machine identifier")),
    responses(
        (status = 200, description = "Readings in arrival order", body = HistoryResponse),
        (status = 404, description = "Machine not found", body = ErrorResponse),
    ),
    tag = "machines"
)]
async fn get_history(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let history = state.twin.read().await.history(&machine_id)?.to_vec();

    Ok(Json(HistoryResponse {
        machine_id,
        data_points: history.len(),
        history,
    }))
}

/// List all machines in the digital twin
#[utoipa::path(
    get,
    path = "/machines",
    responses(
        (status = 200, description = "Known machines in first-seen order", body = MachinesResponse),
    ),
    tag = "machines"
)]
async fn list_machines(State(state): State<AppState>) -> Json<MachinesResponse> {
    let twin = state.twin.read().await;
    Json(MachinesResponse {
        machines: twin.machines().to_vec(),
        total_count: twin.machine_count(),
    })
}

/// Delete all in-memory data for a specific machine
///
/// Rows already written to the database are kept.
#[utoipa::path(
    delete,
    path = "/machine/{machine_id}",
    params(("machine_id" = String, Path, description = "Machine identifier")),
    responses(
        (status = 200, description = "History removed", body = DeleteResponse),
        (status = 404, description = "Machine not found", body = ErrorResponse),
    ),
    tag = "machines"
)]
async fn delete_machine(
    State(state): State<AppState>,
    Path(machine_id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let removed = state.twin.write().await.remove(&machine_id)?;
    info!(machine_id = %machine_id, readings = removed.len(), "Deleted in-memory history");

    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Deleted all data for machine {}", machine_id),
    }))
}

#[derive(Debug)]
pub struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, field) = match self.0 {
            Error::Validation { field, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, Some(field))
            }
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Machine not found".to_string(), None),
            other => {
                error!("API error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        let body = ErrorResponse { error, field };

        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
