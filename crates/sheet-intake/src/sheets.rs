use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::AccessToken;
use crate::config::IntakeConfig;
use crate::error::{IntakeError, IntakeResult};
use crate::mapping::Row;

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/";
pub const DEFAULT_SHEET_NAME: &str = "sheet1";

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Option<Vec<Vec<Value>>>,
}

#[derive(Serialize)]
struct AppendBody<'a> {
    values: [&'a Row; 1],
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: reqwest::Client,
    base: Url,
    spreadsheet_id: String,
    token: String,
}

impl SheetsClient {
    pub async fn connect(config: &IntakeConfig, http: &reqwest::Client) -> IntakeResult<Self> {
        let credentials = config.credentials()?;
        let spreadsheet_id = config.require_spreadsheet_id()?.to_string();
        let AccessToken { access_token } = credentials
            .fetch_access_token(http, config.token_uri())
            .await?;
        debug!(email = credentials.email(), "obtained sheets access token");

        Ok(Self::with_token(
            http.clone(),
            config.sheets_api_base().clone(),
            spreadsheet_id,
            access_token,
        ))
    }

    pub fn with_token(
        http: reqwest::Client,
        base: Url,
        spreadsheet_id: String,
        token: String,
    ) -> Self {
        Self {
            http,
            base,
            spreadsheet_id,
            token,
        }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    fn values_url(&self, range: &str, verb: Option<&str>) -> IntakeResult<Url> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                IntakeError::InvalidArgument(format!(
                    "sheets api base '{}' cannot be a base",
                    self.base
                ))
            })?;
            segments.pop_if_empty();
            let last = match verb {
                Some(verb) => format!("{range}:{verb}"),
                None => range.to_string(),
            };
            segments.extend([
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                last.as_str(),
            ]);
        }
        Ok(url)
    }

    pub async fn row_count(&self, range: &str) -> IntakeResult<usize> {
        let url = self.values_url(range, None)?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let body = check_status(response).await?;
        let range: ValueRange = serde_json::from_slice(&body)?;
        Ok(range.values.map(|rows| rows.len()).unwrap_or(0))
    }

    pub async fn append_row(&self, range: &str, row: &Row) -> IntakeResult<()> {
        let url = self.values_url(range, Some("append"))?;
        let response = self
            .http
            .post(url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(&self.token)
            .json(&AppendBody { values: [row] })
            .send()
            .await?;
        let body = check_status(response).await?;
        serde_json::from_slice::<IgnoredAny>(&body)?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> IntakeResult<Vec<u8>> {
    let status = response.status();
    let body = response.bytes().await?;
    if status.is_success() {
        return Ok(body.to_vec());
    }

    let message = match serde_json::from_slice::<GoogleErrorBody>(&body) {
        Ok(GoogleErrorBody { error }) => match error.status {
            Some(code) => format!("{} ({code})", error.message),
            None => error.message,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(&body).trim().to_string();
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        }
    };
    Err(IntakeError::RemoteApi {
        status: Some(status.as_u16()),
        message,
    })
}

pub fn column_range(sheet: &str, column: &str) -> String {
    format!("{}!{column}:{column}", quote_sheet_name(sheet))
}

pub fn cell_range(sheet: &str, cell: &str) -> String {
    format!("{}!{cell}", quote_sheet_name(sheet))
}

fn quote_sheet_name(sheet: &str) -> String {
    if sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}
