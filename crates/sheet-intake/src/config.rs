use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use url::Url;

use crate::auth::Credentials;
use crate::cli::ServiceArgs;
use crate::error::{IntakeError, IntakeResult};
use crate::mapping::ColumnMapping;

#[derive(Clone)]
pub struct IntakeConfig {
    bind_addr: SocketAddr,
    service_account_email: Option<String>,
    private_key: Option<String>,
    spreadsheet_id: Option<String>,
    sheet_name: String,
    token_uri: Url,
    sheets_api_base: Url,
    mapping: ColumnMapping,
    serialize_appends: bool,
    request_timeout: Option<Duration>,
}

impl std::fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("bind_addr", &self.bind_addr)
            .field("service_account_email", &self.service_account_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("token_uri", &self.token_uri.as_str())
            .field("sheets_api_base", &self.sheets_api_base.as_str())
            .field("mapping", &self.mapping.name)
            .field("serialize_appends", &self.serialize_appends)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl IntakeConfig {
    // Missing credentials are not an error here. Submissions report them.
    pub fn new(args: &ServiceArgs) -> IntakeResult<Self> {
        let ip = args.bind.trim().parse::<IpAddr>().map_err(|e| {
            IntakeError::InvalidArgument(format!("invalid bind address '{}': {e}", args.bind))
        })?;
        let bind_addr = SocketAddr::new(ip, args.port);
        let sheet_name = args.sheet_name.trim();
        if sheet_name.is_empty() {
            return Err(IntakeError::InvalidArgument(
                "sheet name must not be empty".to_string(),
            ));
        }

        let mapping = match &args.column_map {
            Some(path) => ColumnMapping::from_yaml_file(path)?,
            None => ColumnMapping::default(),
        };

        Ok(Self {
            bind_addr,
            service_account_email: non_empty(args.service_account_email.as_deref()),
            private_key: non_empty(args.private_key.as_deref()),
            spreadsheet_id: non_empty(args.spreadsheet_id.as_deref()),
            sheet_name: sheet_name.to_string(),
            token_uri: parse_endpoint("token uri", &args.token_uri)?,
            sheets_api_base: parse_endpoint("sheets api base", &args.sheets_api_base)?,
            mapping,
            serialize_appends: args.serialize_appends,
            request_timeout: args
                .request_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn token_uri(&self) -> &Url {
        &self.token_uri
    }

    pub fn sheets_api_base(&self) -> &Url {
        &self.sheets_api_base
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn serialize_appends(&self) -> bool {
        self.serialize_appends
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn has_service_account_email(&self) -> bool {
        self.service_account_email.is_some()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn spreadsheet_id(&self) -> Option<&str> {
        self.spreadsheet_id.as_deref()
    }

    pub fn require_spreadsheet_id(&self) -> IntakeResult<&str> {
        self.spreadsheet_id().ok_or_else(|| {
            IntakeError::Configuration("SPREADSHEET_ID is not set".to_string())
        })
    }

    pub fn credentials(&self) -> IntakeResult<Credentials> {
        Credentials::from_parts(
            self.service_account_email.as_deref(),
            self.private_key.as_deref(),
        )
    }

    pub fn http_client(&self) -> IntakeResult<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_endpoint(label: &str, raw: &str) -> IntakeResult<Url> {
    let parsed = Url::parse(raw)
        .map_err(|e| IntakeError::InvalidArgument(format!("invalid {label} '{raw}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IntakeError::InvalidArgument(format!(
            "{label} '{raw}' must use http:// or https://"
        )));
    }
    Ok(parsed)
}

pub fn load_env_file(file: &Path) -> IntakeResult<HashMap<String, String>> {
    if !file.exists() {
        return Ok(HashMap::new());
    }
    parse_env_file(file)
}

fn parse_env_file(file: &Path) -> IntakeResult<HashMap<String, String>> {
    let content = fs::read_to_string(file)?;
    let invalid = |line_no: usize, reason: &str| {
        IntakeError::InvalidArgument(format!(
            "invalid env file line {line_no} in '{}': {reason}",
            file.display()
        ))
    };

    let mut vars = HashMap::new();
    let mut lines = content.lines().enumerate();
    while let Some((idx, line)) = lines.next() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, raw)) = trimmed.split_once('=') else {
            return Err(invalid(line_no, "expected KEY=VALUE"));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid(line_no, "key must not be empty"));
        }

        let raw = raw.trim_start();
        let value = match raw.chars().next() {
            Some(quote @ ('"' | '\'' | '`')) => {
                let mut body = raw[1..].to_string();
                loop {
                    if let Some(end) = closing_quote(&body, quote) {
                        body.truncate(end);
                        break;
                    }
                    let Some((_, next)) = lines.next() else {
                        return Err(invalid(line_no, "unterminated quoted value"));
                    };
                    body.push('\n');
                    body.push_str(next);
                }
                if quote == '"' {
                    body.replace("\\n", "\n").replace("\\r", "\r")
                } else {
                    body
                }
            }
            _ => strip_inline_comment(raw).trim().to_string(),
        };
        vars.insert(key.to_string(), value);
    }
    Ok(vars)
}

fn closing_quote(body: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in body.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(idx);
        }
    }
    None
}

fn strip_inline_comment(raw: &str) -> &str {
    match raw.find(" #") {
        Some(pos) => &raw[..pos],
        None => raw,
    }
}

// Must run before any other thread is started.
pub fn apply_env_file(file: &Path) -> IntakeResult<usize> {
    let mut applied = 0;
    for (key, value) in load_env_file(file)? {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    Ok(applied)
}
