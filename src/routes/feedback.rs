use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::AppError,
    models::{ClassifiedRow, Dataset},
    services::{
        analytics::{
            aggregator::unique_dates, AggregateOptions, AnalyticsSummary, ColumnRole,
            ColumnRoleResolver, DateRange, MetricAggregator, RoleMap,
        },
        categories::{
            self, CategoryCount, CategorySummary, RowSortKey, SortDirection, SummarySortKey,
        },
        classifier::{classify_batch, feedback_items, BatchStatus},
        export, file_processor,
        file_processor::SourceFormat,
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/feedback/upload", post(upload_from_url))
        .route("/feedback/upload/raw", post(upload_raw))
        .route("/feedback/reset", post(reset))
        .route("/feedback/roles", get(roles))
        .route("/feedback/analytics", post(analytics))
        .route("/feedback/dates", get(dates))
        .route("/feedback/classify", post(classify))
        .route("/feedback/classify/cancel", post(cancel_classification))
        .route("/feedback/categories", get(category_summary))
        .route("/feedback/rows", get(classified_rows))
        .route("/feedback/export/csv", get(export_csv))
        .route("/feedback/export/xlsx", get(export_workbook))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "type")]
    file_type: String,
    signed_url: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawUploadParams {
    #[serde(rename = "type")]
    file_type: Option<String>,
    file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    file_name: String,
    row_count: usize,
    headers: Vec<String>,
    roles: Vec<ColumnRole>,
    preview: Vec<Vec<String>>,
}

#[axum::debug_handler]
async fn upload_from_url(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    tracing::info!(
        "Processing file type: {}, URL length: {}",
        request.file_type,
        request.signed_url.len()
    );
    let format: SourceFormat = request.file_type.parse()?;

    tracing::info!("Downloading file from URL...");
    let download_start = std::time::Instant::now();
    let file_data =
        file_processor::load_file_from_url(&request.signed_url, state.config.max_file_size).await?;
    tracing::info!(
        "File downloaded, size: {}KB, took: {:?}",
        file_data.len() / 1024,
        download_start.elapsed()
    );

    let file_name = request
        .file_name
        .unwrap_or_else(|| default_file_name(format).to_string());
    install_dataset(&state, file_name, &file_data, format)
}

async fn upload_raw(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RawUploadParams>,
    body: Bytes,
) -> Result<Json<UploadResponse>, AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidInput("No file provided".to_string()));
    }
    file_processor::check_size(body.len(), state.config.max_file_size)?;

    let format = match (&params.file_type, &params.file_name) {
        (Some(file_type), _) => file_type.parse::<SourceFormat>()?,
        (None, Some(name)) => SourceFormat::from_file_name(name).ok_or_else(|| {
            AppError::InvalidInput(format!("Cannot tell the file type of {}", name))
        })?,
        (None, None) => {
            return Err(AppError::InvalidInput(
                "Either type or file_name is required".to_string(),
            ))
        }
    };

    let file_name = params
        .file_name
        .unwrap_or_else(|| default_file_name(format).to_string());
    install_dataset(&state, file_name, &body, format)
}

fn default_file_name(format: SourceFormat) -> &'static str {
    match format {
        SourceFormat::Xlsx => "upload.xlsx",
        SourceFormat::Csv => "upload.csv",
    }
}

fn install_dataset(
    state: &AppState,
    file_name: String,
    data: &[u8],
    format: SourceFormat,
) -> Result<Json<UploadResponse>, AppError> {
    let start = std::time::Instant::now();
    let dataset = file_processor::parse_dataset(data, format)?;
    let roles = ColumnRoleResolver::new(state.config.resolve_options()).resolve_dataset(&dataset);

    let response = UploadResponse {
        file_name: file_name.clone(),
        row_count: dataset.row_count(),
        headers: dataset.headers.clone(),
        roles: roles.roles(),
        preview: file_processor::preview(&dataset, file_processor::PREVIEW_ROWS),
    };
    state.sessions.replace(file_name, dataset, roles);

    tracing::info!(
        "Upload of {} completed in {:?}: {} rows, {} columns",
        response.file_name,
        start.elapsed(),
        response.row_count,
        response.headers.len()
    );
    Ok(Json(response))
}

async fn reset(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cleared = state.sessions.clear();
    tracing::info!("Session reset (had dataset: {})", cleared);
    Json(serde_json::json!({ "cleared": cleared }))
}

#[derive(Debug, Serialize)]
pub struct ColumnEntry {
    name: String,
    role: ColumnRole,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    file_name: String,
    uploaded_at: DateTime<Utc>,
    roles: Vec<ColumnEntry>,
    #[serde(flatten)]
    map: RoleMap,
}

async fn roles(State(state): State<Arc<AppState>>) -> Result<Json<RolesResponse>, AppError> {
    let response = state.sessions.read(|session| RolesResponse {
        file_name: session.file_name.clone(),
        uploaded_at: session.uploaded_at,
        roles: session
            .dataset
            .headers
            .iter()
            .enumerate()
            .map(|(index, name)| ColumnEntry {
                name: name.clone(),
                role: session.roles.role_of(index),
            })
            .collect(),
        map: session.roles.clone(),
    })?;
    Ok(Json(response))
}

#[derive(Debug, Default, Deserialize)]
pub struct DateFilter {
    date_start: Option<String>,
    date_end: Option<String>,
}

impl DateFilter {
    fn range(&self) -> Option<DateRange> {
        Some(DateRange::new(
            self.date_start.clone().unwrap_or_default(),
            self.date_end.clone().unwrap_or_default(),
        ))
        .filter(DateRange::is_active)
    }
}

fn snapshot(state: &AppState) -> Result<(Arc<Dataset>, RoleMap), AppError> {
    state
        .sessions
        .read(|session| (Arc::clone(&session.dataset), session.roles.clone()))
}

fn summarize(
    state: &AppState,
    dataset: &Dataset,
    roles: &RoleMap,
    filter: &DateFilter,
) -> AnalyticsSummary {
    MetricAggregator::new(AggregateOptions {
        date_range: filter.range(),
        correlation_mode: state.config.correlation_mode,
    })
    .aggregate(dataset, roles)
}

async fn analytics(
    State(state): State<Arc<AppState>>,
    filter: Option<Json<DateFilter>>,
) -> Result<Json<AnalyticsSummary>, AppError> {
    let filter = filter.map(|Json(f)| f).unwrap_or_default();
    let (dataset, roles) = snapshot(&state)?;
    Ok(Json(summarize(&state, &dataset, &roles, &filter)))
}

async fn dates(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, AppError> {
    let (dataset, roles) = snapshot(&state)?;
    Ok(Json(unique_dates(&dataset, &roles)))
}

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    column: String,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    status: BatchStatus,
    classified: usize,
    categories: CategorySummary,
    rows: Vec<ClassifiedRow>,
}

#[axum::debug_handler]
async fn classify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, AppError> {
    let start = std::time::Instant::now();
    let (generation, column, items) = state
        .sessions
        .read(|session| {
            session
                .dataset
                .column_index(&request.column)
                .map(|column| {
                    let items = feedback_items(&session.dataset, column);
                    (session.generation, column, items)
                })
        })?
        .ok_or_else(|| AppError::UnknownColumn(request.column.clone()))?;

    tracing::info!(
        "Starting classification of column {} ({} non-blank rows)",
        request.column,
        items.len()
    );

    let ticket = state.sessions.begin_batch(generation, column)?;
    let result = classify_batch(
        state.classifier.as_ref(),
        items,
        &state.config.batch_policy(),
        &ticket.token,
    )
    .await;
    state.sessions.finish_batch(&ticket);
    let outcome = result?;

    if !state.sessions.store_classification(&ticket, outcome.rows.clone()) {
        return Err(AppError::Cancelled);
    }

    let categories = CategorySummary::from_rows(&outcome.rows);
    tracing::info!(
        "Classification finished in {:?}: {} rows, {} categories, status {:?}",
        start.elapsed(),
        outcome.rows.len(),
        categories.len(),
        outcome.status
    );

    Ok(Json(ClassifyResponse {
        status: outcome.status,
        classified: outcome.rows.len(),
        categories,
        rows: outcome.rows,
    }))
}

async fn cancel_classification(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cancelled = state.sessions.cancel_batch();
    Json(serde_json::json!({ "cancelled": cancelled }))
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    sort: SummarySortKey,
    direction: Option<SortDirection>,
}

async fn category_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<CategoryCount>>, AppError> {
    let direction = query.direction.unwrap_or(match query.sort {
        SummarySortKey::Count => SortDirection::Desc,
        SummarySortKey::Name => SortDirection::Asc,
    });
    let sorted = state
        .sessions
        .read(|session| session.categories.sorted(query.sort, direction))?;
    Ok(Json(sorted))
}

#[derive(Debug, Default, Deserialize)]
pub struct RowsQuery {
    category: Option<String>,
    #[serde(default)]
    sort: RowSortKey,
    #[serde(default)]
    direction: SortDirection,
}

async fn classified_rows(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RowsQuery>,
) -> Result<Json<Vec<ClassifiedRow>>, AppError> {
    let rows = state.sessions.read(|session| {
        categories::view(
            &session.classified,
            query.category.as_deref(),
            query.sort,
            query.direction,
        )
        .into_iter()
        .cloned()
        .collect::<Vec<_>>()
    })?;
    Ok(Json(rows))
}

fn attachment(content_type: &'static str, file_name: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

async fn export_csv(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let body = state
        .sessions
        .read(|session| export::classification_csv(&session.classified))??;
    tracing::info!("Exported classification CSV ({} bytes)", body.len());
    Ok(attachment(
        "text/csv; charset=utf-8",
        export::CSV_FILE_NAME,
        body,
    ))
}

async fn export_workbook(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DateFilter>,
) -> Result<Response, AppError> {
    let (dataset, roles, classified, categories) = state.sessions.read(|session| {
        (
            Arc::clone(&session.dataset),
            session.roles.clone(),
            session.classified.clone(),
            session.categories.clone(),
        )
    })?;

    let summary = summarize(&state, &dataset, &roles, &filter);
    let sheet = export::compose_analysis_sheet(&dataset, &classified, &summary, &categories);
    let body = export::analysis_workbook(&sheet)?;

    Ok(attachment(
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        export::WORKBOOK_FILE_NAME,
        body,
    ))
}
