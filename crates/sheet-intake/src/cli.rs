use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::auth::DEFAULT_TOKEN_URI;
use crate::sheets::{DEFAULT_SHEETS_API_BASE, DEFAULT_SHEET_NAME};

#[derive(Debug, Parser)]
#[command(
    name = "sheet-intake",
    about = "Append form submissions to a Google spreadsheet"
)]
pub struct Args {
    /// Dotenv-style file loaded before the environment is read.
    #[arg(long, env = "SHEET_INTAKE_ENV_FILE", default_value = ".env")]
    pub env_file: PathBuf,
    #[command(flatten)]
    pub service: ServiceArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct ServiceArgs {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
    #[arg(long, env = "SHEET_INTAKE_BIND", default_value = "0.0.0.0")]
    pub bind: String,
    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_EMAIL", hide_env_values = true)]
    pub service_account_email: Option<String>,
    #[arg(long, env = "GOOGLE_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,
    #[arg(long, env = "SPREADSHEET_ID")]
    pub spreadsheet_id: Option<String>,
    #[arg(long, env = "SHEET_NAME", default_value = DEFAULT_SHEET_NAME)]
    pub sheet_name: String,
    /// YAML column mapping; the built-in layout is used when absent.
    #[arg(long, env = "SHEET_INTAKE_COLUMN_MAP")]
    pub column_map: Option<PathBuf>,
    #[arg(long, env = "GOOGLE_TOKEN_URI", default_value = DEFAULT_TOKEN_URI)]
    pub token_uri: String,
    #[arg(long, env = "SHEETS_API_BASE", default_value = DEFAULT_SHEETS_API_BASE)]
    pub sheets_api_base: String,
    /// Hold a process-wide lock across the row count and the append.
    #[arg(long, env = "SHEET_INTAKE_SERIALIZE_APPENDS")]
    pub serialize_appends: bool,
    #[arg(long, env = "SHEET_INTAKE_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default).
    Serve,
    /// Report configuration state.
    Doctor {
        /// Also exchange the credential for an access token.
        #[arg(long)]
        probe: bool,
    },
    /// Print the active column layout.
    Columns,
}
