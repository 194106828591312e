// src/server.rs
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::export::export_file_name;
use crate::ledger::{EditRequest, LedgerError, ScanRequest};
use crate::models::AuditEntry;
use crate::payroll::current_month;
use crate::system::{PointageSystem, SystemError};

// --- Error Handling ---

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    System(#[from] SystemError),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::System(e) => match e {
                SystemError::AgentNotFound(_) | SystemError::HolidayNotFound(_) => StatusCode::NOT_FOUND,
                SystemError::InvalidRange { .. } | SystemError::InvalidPeriod(_) => StatusCode::BAD_REQUEST,
                SystemError::Payroll(_) => StatusCode::UNPROCESSABLE_ENTITY,
                SystemError::Ledger(l) => match l {
                    LedgerError::JustificationRequired => StatusCode::BAD_REQUEST,
                    LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::AlreadyCancelled(_)
                    | LedgerError::NotCancelled(_)
                    | LedgerError::QuickExitNeedsConfirmation { .. } => StatusCode::CONFLICT,
                    LedgerError::AuditLogFailed(_) | LedgerError::LockError => StatusCode::INTERNAL_SERVER_ERROR,
                },
                SystemError::Export(_) | SystemError::LockError => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Error occurred: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        let message = if status.is_server_error() {
            "Internal server error. Check logs.".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// --- State & Router ---

#[derive(Clone)]
pub struct AppState {
    pub system: PointageSystem,
}

pub fn app(system: PointageSystem) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/api/pointages", post(handle_record_scan))
        .route(
            "/api/admin/pointages/{id}",
            put(handle_edit_pointage).delete(handle_cancel_pointage),
        )
        .route("/api/admin/pointages/{id}/restore", post(handle_restore_pointage))
        .route("/api/admin/audit-logs", get(handle_audit_logs))
        .route("/api/suivi/{agent_id}", get(handle_suivi))
        .route("/api/paie", get(handle_compute_all))
        .route("/api/paie/export", get(handle_export))
        .route("/api/paie/{agent_id}", get(handle_compute_pay))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { system })
}

// --- Request bodies / queries ---

#[derive(Debug, Deserialize)]
pub struct AdminEditBody {
    #[serde(flatten)]
    pub changes: EditRequest,
    pub actor: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminActionBody {
    pub actor: String,
    #[serde(default)]
    pub justification: String,
}

#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub mois: Option<u32>,
    pub annee: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub debut: Option<NaiveDate>,
    pub fin: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub pointage_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
    now: String,
    agents: usize,
    holidays: usize,
}

impl AppState {
    fn period(&self, query: &PeriodQuery) -> (u32, i32) {
        let (mois, annee) = current_month(self.system.clock().today());
        (query.mois.unwrap_or(mois), query.annee.unwrap_or(annee))
    }
}

// --- Handlers ---

async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusBody>, AppError> {
    info!("Handling /status request");
    Ok(Json(StatusBody {
        status: "ok",
        now: state.system.clock().now_dt().format("%Y-%m-%dT%H:%M:%S").to_string(),
        agents: state.system.agents()?.len(),
        holidays: state.system.holidays()?.len(),
    }))
}

async fn handle_record_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError> {
    info!(
        "Handling scan: Emp={}, Date={}, Heure={}, Type={}",
        request.agent_id, request.date, request.heure, request.type_
    );
    let outcome = state.system.record_scan(request)?;
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)).into_response())
}

async fn handle_edit_pointage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AdminEditBody>,
) -> Result<Response, AppError> {
    let updated = state
        .system
        .edit_pointage(&id, body.changes, &body.actor, &body.justification)?;
    Ok(Json(updated).into_response())
}

async fn handle_cancel_pointage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AdminActionBody>,
) -> Result<Response, AppError> {
    let updated = state.system.cancel_pointage(&id, &body.actor, &body.justification)?;
    Ok(Json(updated).into_response())
}

async fn handle_restore_pointage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AdminActionBody>,
) -> Result<Response, AppError> {
    let updated = state.system.restore_pointage(&id, &body.actor, &body.justification)?;
    Ok(Json(updated).into_response())
}

async fn handle_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, AppError> {
    let entries = state
        .system
        .audit_log()?
        .into_iter()
        .filter(|e| query.pointage_id.as_deref().map_or(true, |id| e.pointage_id == id))
        .collect();
    Ok(Json(entries))
}

async fn handle_suivi(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> Result<Response, AppError> {
    let today = state.system.clock().today();
    let fin = query.fin.unwrap_or(today);
    let debut = match query.debut {
        Some(debut) => debut,
        None => fin
            .with_day(1)
            .ok_or_else(|| AppError::BadRequest(format!("invalid end date {}", fin)))?,
    };
    let suivi = state.system.suivi(&agent_id, debut, fin)?;
    Ok(Json(suivi).into_response())
}

async fn handle_compute_all(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    let (mois, annee) = state.period(&query);
    info!("Handling payroll batch for {:02}/{}", mois, annee);
    let batch = state.system.compute_all(mois, annee)?;
    Ok(Json(batch).into_response())
}

async fn handle_compute_pay(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    let (mois, annee) = state.period(&query);
    let pay = state.system.compute_pay(&agent_id, mois, annee)?;
    Ok(Json(pay).into_response())
}

async fn handle_export(
    State(state): State<AppState>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    let (mois, annee) = state.period(&query);
    let body = state.system.export_csv(mois, annee)?;
    let disposition = format!("attachment; filename=\"{}\"", export_file_name(mois, annee));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
