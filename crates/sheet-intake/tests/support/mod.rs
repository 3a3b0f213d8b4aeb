#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use sheet_intake::cli::ServiceArgs;
use sheet_intake::config::IntakeConfig;
use sheet_intake::server::{router, AppState};

pub const TEST_KEY_PEM: &str = include_str!("../fixtures/test_service_account_key.pem");
pub const TEST_EMAIL: &str = "intake@test-project.iam.gserviceaccount.com";
pub const TEST_SPREADSHEET_ID: &str = "test-spreadsheet";
pub const TEST_TOKEN: &str = "ya29.test-token";

/// The key as it usually appears in an env var: one line, escaped newlines.
pub fn escaped_test_key() -> String {
    format!("\"{}\"", TEST_KEY_PEM.trim().replace('\n', "\\n"))
}

#[derive(Debug, Clone)]
pub struct AppendCall {
    pub range: String,
    pub value_input_option: Option<String>,
    pub authorization: Option<String>,
    pub body: Value,
}

/// In-process stand-in for the token endpoint and the Sheets values API.
#[derive(Debug, Default)]
pub struct MockGoogle {
    pub existing_rows: AtomicUsize,
    pub reject_token: bool,
    pub read_status: Option<u16>,
    pub append_status: Option<u16>,
    pub token_calls: AtomicUsize,
    pub read_calls: AtomicUsize,
    pub read_ranges: Mutex<Vec<String>>,
    pub appends: Mutex<Vec<AppendCall>>,
}

impl MockGoogle {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            existing_rows: AtomicUsize::new(rows),
            ..Self::default()
        }
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn appends(&self) -> Vec<AppendCall> {
        self.appends.lock().expect("appends lock").clone()
    }
}

async fn token(State(mock): State<Arc<MockGoogle>>, body: String) -> impl IntoResponse {
    mock.token_calls.fetch_add(1, Ordering::SeqCst);
    if mock.reject_token
        || !body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer")
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Invalid JWT Signature."})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"access_token": TEST_TOKEN, "expires_in": 3599, "token_type": "Bearer"})),
    )
}

fn google_error(code: u16) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(code).expect("valid status");
    let label = match code {
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        429 => "RESOURCE_EXHAUSTED",
        _ => "INTERNAL",
    };
    (
        status,
        Json(json!({"error": {"code": code, "message": "mock failure", "status": label}})),
    )
}

async fn read_values(
    State(mock): State<Arc<MockGoogle>>,
    Path((_id, range)): Path<(String, String)>,
) -> impl IntoResponse {
    mock.read_calls.fetch_add(1, Ordering::SeqCst);
    mock.read_ranges.lock().expect("ranges lock").push(range.clone());
    if let Some(code) = mock.read_status {
        return google_error(code);
    }
    let rows = mock.existing_rows.load(Ordering::SeqCst);
    if rows == 0 {
        return (StatusCode::OK, Json(json!({"range": range, "majorDimension": "ROWS"})));
    }
    let values: Vec<Value> = (0..rows).map(|i| json!([i.to_string()])).collect();
    (
        StatusCode::OK,
        Json(json!({"range": range, "majorDimension": "ROWS", "values": values})),
    )
}

async fn append_values(
    State(mock): State<Arc<MockGoogle>>,
    Path((id, range)): Path<(String, String)>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if let Some(code) = mock.append_status {
        return google_error(code);
    }
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    mock.appends.lock().expect("appends lock").push(AppendCall {
        range: range.clone(),
        value_input_option: query.get("valueInputOption").cloned(),
        authorization,
        body,
    });
    let row = mock.existing_rows.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "spreadsheetId": id,
            "tableRange": "sheet1!A1:Y1",
            "updates": {"updatedRange": format!("sheet1!A{row}:Y{row}"), "updatedRows": 1}
        })),
    )
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock server");
    });
    addr
}

pub async fn spawn_mock_google(mock: Arc<MockGoogle>) -> SocketAddr {
    let app = Router::new()
        .route("/token", post(token))
        .route(
            "/v4/spreadsheets/:id/values/:range",
            get(read_values).post(append_values),
        )
        .with_state(mock);
    spawn(app).await
}

pub fn service_args(google: SocketAddr) -> ServiceArgs {
    ServiceArgs {
        port: 0,
        bind: "127.0.0.1".to_string(),
        service_account_email: Some(TEST_EMAIL.to_string()),
        private_key: Some(escaped_test_key()),
        spreadsheet_id: Some(TEST_SPREADSHEET_ID.to_string()),
        sheet_name: "sheet1".to_string(),
        column_map: None,
        token_uri: format!("http://{google}/token"),
        sheets_api_base: format!("http://{google}/v4/"),
        serialize_appends: false,
        request_timeout_secs: Some(10),
    }
}

/// Starts the intake service and returns its base URL.
pub async fn spawn_intake(args: ServiceArgs) -> String {
    let config = Arc::new(IntakeConfig::new(&args).expect("valid config"));
    let state = Arc::new(AppState::new(config).expect("app state"));
    let addr = spawn(router(state)).await;
    format!("http://{addr}")
}
