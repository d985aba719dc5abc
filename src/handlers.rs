use crate::batch::BatchLookupWorkflow;
use crate::cpf::{self, Cpf};
use crate::errors::{AppError, ResultExt};
use crate::jobs::BatchQueue;
use crate::models::*;
use crate::report::{self, ReportFormat};
use crate::storage::EntryRepository;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lookup workflow used for single lookups; batches run on the queue worker.
    pub workflow: BatchLookupWorkflow,
    /// Registered entries backend (Postgres or JSON file).
    pub repository: Arc<dyn EntryRepository>,
    /// Batch job queue and registry.
    pub batches: BatchQueue,
}

/// API routes without the rate limiter, which `main` layers on top.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/consulta-cpf", get(consulta_cpf))
        .route("/api/v1/cadastro", post(register_entry).get(list_entries))
        .route("/api/v1/batch", post(submit_batch))
        .route("/api/v1/batch/registered", post(submit_registered_batch))
        .route("/api/v1/batch/:id", get(get_batch).delete(cancel_batch))
        .route("/api/v1/batch/:id/report", get(batch_report))
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-cpf-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/consulta-cpf?cpf=...
///
/// Looks up a single CPF and returns the mapped record. Check digits are not
/// verified, matching the batch path.
///
/// # Returns
///
/// * `Result<Json<LookupRecord>, AppError>` - The record, 400 for bad input, or
///   the upstream failure mapped to 502/504.
pub async fn consulta_cpf(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LookupQueryParams>,
) -> Result<Json<LookupRecord>, AppError> {
    let raw = params
        .cpf
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("CPF é obrigatório".to_string()))?;

    let cpf = Cpf::from_lookup_input(&raw)
        .ok_or_else(|| AppError::BadRequest("CPF deve conter 11 dígitos".to_string()))?;

    tracing::info!("GET /api/consulta-cpf - cpf: {}", cpf);

    let raw_record = state
        .workflow
        .fetch(&cpf)
        .await
        .with_context(|| format!("Lookup failed for CPF {}", cpf))?;

    Ok(Json(LookupRecord::from_upstream(&cpf, &raw_record)))
}

/// POST /api/v1/cadastro
///
/// Registers a person, replacing any existing entry with the same CPF.
pub async fn register_entry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let entry = RegisteredEntry::from_request(request)?;
    tracing::info!("POST /api/v1/cadastro - cpf: {}", entry.cpf);

    state.repository.save(entry.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            success: true,
            message: "Cadastro realizado com sucesso".to_string(),
            entry,
        }),
    ))
}

/// GET /api/v1/cadastro
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RegisteredEntry>>, AppError> {
    let entries = state.repository.get_all().await?;
    Ok(Json(entries))
}

/// POST /api/v1/batch
///
/// Accepts `{"cpfs": [...]}`, `{"text": "..."}` (one CPF per line), or both.
/// Entries that do not have 11 digits are dropped silently.
pub async fn submit_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    let mut cpfs = BatchLookupWorkflow::prepare(&request.cpfs);
    if let Some(text) = request.text.as_deref() {
        cpfs.extend(cpf::parse_lookup_list(text));
    }

    if cpfs.is_empty() {
        return Err(AppError::BadRequest(
            "Nenhum CPF válido encontrado".to_string(),
        ));
    }

    enqueue(&state, cpfs).await
}

/// POST /api/v1/batch/registered
///
/// Queues a batch over every registered CPF, in registration order.
pub async fn submit_registered_batch(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    let entries = state.repository.get_all().await?;
    let cpfs = BatchLookupWorkflow::prepare(entries.iter().map(|e| e.cpf.as_str()));

    if cpfs.is_empty() {
        return Err(AppError::BadRequest(
            "Nenhum CPF cadastrado para consultar".to_string(),
        ));
    }

    enqueue(&state, cpfs).await
}

async fn enqueue(
    state: &AppState,
    cpfs: Vec<Cpf>,
) -> Result<(StatusCode, Json<BatchAccepted>), AppError> {
    let total = cpfs.len();
    let job = state.batches.submit(cpfs).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchAccepted {
            id: job.id(),
            total,
            status: job.status(),
        }),
    ))
}

/// GET /api/v1/batch/:id
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchJobView>, AppError> {
    let job = state
        .batches
        .registry()
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", id)))?;

    Ok(Json(job.view()))
}

/// DELETE /api/v1/batch/:id
///
/// Requests cancellation. The batch stops before its next CPF and keeps the
/// results produced so far.
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<BatchJobView>), AppError> {
    let job = state
        .batches
        .cancel(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", id)))?;

    Ok((StatusCode::ACCEPTED, Json(job.view())))
}

/// GET /api/v1/batch/:id/report?format=txt|text
///
/// Exports a finished batch as plain text. `txt` (default) is served as a
/// download, `text` is the compact form meant for copying.
pub async fn batch_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<ReportQueryParams>,
) -> Result<impl IntoResponse, AppError> {
    let format = ReportFormat::parse(params.format.as_deref())
        .ok_or_else(|| AppError::BadRequest("format must be txt or text".to_string()))?;

    let job = state
        .batches
        .registry()
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Batch {} not found", id)))?;

    if matches!(job.status(), JobStatus::Queued | JobStatus::Running) {
        return Err(AppError::BadRequest(
            "Lote ainda em processamento".to_string(),
        ));
    }

    let body = report::render(&job.results(), format);
    let disposition = match format {
        ReportFormat::Txt => format!(
            "attachment; filename=\"consulta-cpf-{}.txt\"",
            chrono::Utc::now().timestamp_millis()
        ),
        ReportFormat::Text => "inline".to_string(),
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
