use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("sheets api error: {message}")]
    RemoteApi {
        status: Option<u16>,
        message: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl IntakeError {
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => *status,
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type IntakeResult<T> = Result<T, IntakeError>;
