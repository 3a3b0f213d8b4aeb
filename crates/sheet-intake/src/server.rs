use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::IntakeConfig;
use crate::error::{IntakeError, IntakeResult};
use crate::mapping::{RowContext, Submission};
use crate::sheets::{cell_range, column_range, SheetsClient};

pub const LIVENESS_BODY: &str = "Backend is Live";

#[derive(Debug)]
pub struct AppState {
    pub config: Arc<IntakeConfig>,
    pub http: reqwest::Client,
    append_lock: Option<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Arc<IntakeConfig>) -> IntakeResult<Self> {
        let http = config.http_client()?;
        let append_lock = config.serialize_appends().then(|| Mutex::new(()));
        Ok(Self {
            config,
            http,
            append_lock,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub entry_no: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/api/submit", post(submit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> IntakeResult<()> {
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        %addr,
        sheet = state.config.sheet_name(),
        columns = state.config.mapping().len(),
        "sheet-intake listening"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

pub async fn liveness() -> &'static str {
    LIVENESS_BODY
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let submission = match decode_submission(&headers, &body) {
        Ok(submission) => submission,
        Err((status, reason)) => {
            warn!(%status, reason, "submission rejected");
            return (status, reason).into_response();
        }
    };
    let name = submission.applicant_name().unwrap_or("-").to_string();
    info!(name = %name, "submission received");

    match record_submission(&state, &submission).await {
        Ok(entry_no) => {
            info!(entry_no, name = %name, "submission recorded");
            Json(SubmitResponse {
                success: true,
                entry_no,
            })
            .into_response()
        }
        Err(err) => {
            match diagnose(&err) {
                Some(hint) => error!(error = %err, hint, "submission failed"),
                None => error!(error = %err, "submission failed"),
            }
            err.into_response()
        }
    }
}

// A missing content type or an empty body reads as `{}`. Anything else must
// be a JSON object sent as JSON.
pub fn decode_submission(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Submission, (StatusCode, String)> {
    if let Some(content_type) = headers.get(CONTENT_TYPE) {
        let mime = content_type
            .to_str()
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime != "application/json" && !mime.ends_with("+json") {
            return Err((
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("expected a json body, got content type '{mime}'"),
            ));
        }
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Submission::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid json body: {e}")))
}

// Count and append are separate remote calls. Without the append lock,
// concurrent submissions can share an entry number.
pub async fn record_submission(state: &AppState, submission: &Submission) -> IntakeResult<u64> {
    let config = &state.config;
    let client = SheetsClient::connect(config, &state.http).await?;

    let _guard = match &state.append_lock {
        Some(lock) => Some(lock.lock().await),
        None => None,
    };

    let existing = client
        .row_count(&column_range(config.sheet_name(), "A"))
        .await?;
    let entry_no = next_entry_no(existing);

    let ctx = RowContext {
        entry_no,
        received_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };
    let row = config.mapping().build_row(submission, &ctx);
    client
        .append_row(&cell_range(config.sheet_name(), "A2"), &row)
        .await?;

    Ok(entry_no)
}

// The header row counts toward the entry number.
pub fn next_entry_no(existing_rows: usize) -> u64 {
    if existing_rows == 0 {
        1
    } else {
        existing_rows as u64
    }
}

pub fn diagnose(err: &IntakeError) -> Option<&'static str> {
    let message = err.to_string();
    if message.contains("unregistered callers") || message.contains("No key") {
        return Some("the service account key is invalid or the Sheets API is not enabled");
    }
    if let IntakeError::Authentication(m) = err {
        if m.contains("malformed") {
            return Some("GOOGLE_PRIVATE_KEY must be the PEM key from the service account json");
        }
    }
    if matches!(err, IntakeError::Configuration(_)) {
        return Some("set GOOGLE_SERVICE_ACCOUNT_EMAIL, GOOGLE_PRIVATE_KEY and SPREADSHEET_ID");
    }
    match err.remote_status() {
        Some(403) => Some("share the spreadsheet with the service account email"),
        Some(404) => Some("check SPREADSHEET_ID and the sheet tab name"),
        Some(429) => Some("sheets api quota exceeded"),
        _ if message.contains("PERMISSION_DENIED") => {
            Some("share the spreadsheet with the service account email")
        }
        _ if message.contains("invalid_grant") => {
            Some("the private key does not match the service account or was revoked")
        }
        _ => None,
    }
}
