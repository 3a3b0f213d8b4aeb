use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sheet_intake::cli::{Args, Command};
use sheet_intake::config::{apply_env_file, IntakeConfig};
use sheet_intake::error::IntakeResult;
use sheet_intake::server::{self, diagnose, AppState};

fn main() -> IntakeResult<()> {
    // The env file can only be located once the arguments are known, and its
    // entries must be visible to the second parse.
    let first = Args::parse();
    let env_file = apply_env_file(&first.env_file);
    let args = match env_file {
        Ok(applied) if applied > 0 => Args::parse(),
        _ => first,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    match env_file {
        Ok(0) => {}
        Ok(applied) => info!(file = %args.env_file.display(), vars = applied, "loaded env file"),
        Err(err) => warn!(file = %args.env_file.display(), error = %err, "ignoring env file"),
    }

    let config = Arc::new(IntakeConfig::new(&args.service)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => runtime.block_on(run_server(config)),
        Command::Doctor { probe } => runtime.block_on(doctor(&config, probe)),
        Command::Columns => {
            for (letter, header) in config.mapping().layout() {
                println!("{letter}\t{header}");
            }
            Ok(())
        }
    }
}

async fn run_server(config: Arc<IntakeConfig>) -> IntakeResult<()> {
    log_config_presence(&config);
    let state = Arc::new(AppState::new(config)?);

    // Startup probe: a failure is reported but does not stop the service.
    match probe_token(&state.config, &state.http).await {
        Ok(()) => info!("credential probe succeeded"),
        Err(err) => match diagnose(&err) {
            Some(hint) => warn!(error = %err, hint, "credential probe failed"),
            None => warn!(error = %err, "credential probe failed"),
        },
    }

    server::serve(state).await
}

fn log_config_presence(config: &IntakeConfig) {
    info!(
        account = present(config.has_service_account_email()),
        key = present(config.has_private_key()),
        spreadsheet_id = present(config.spreadsheet_id().is_some()),
        sheet = config.sheet_name(),
        mapping = %config.mapping().name,
        serialize_appends = config.serialize_appends(),
        "configuration"
    );
}

fn present(flag: bool) -> &'static str {
    if flag {
        "loaded"
    } else {
        "missing"
    }
}

async fn probe_token(config: &IntakeConfig, http: &reqwest::Client) -> IntakeResult<()> {
    let credentials = config.credentials()?;
    credentials
        .fetch_access_token(http, config.token_uri())
        .await?;
    Ok(())
}

async fn doctor(config: &IntakeConfig, probe: bool) -> IntakeResult<()> {
    println!("sheet-intake doctor");
    println!("bind_addr={}", config.bind_addr());
    println!(
        "service_account_email={}",
        present(config.has_service_account_email())
    );
    println!("private_key={}", present(config.has_private_key()));
    match config.credentials() {
        Ok(creds) => println!("credential_shape=ok email={}", creds.email()),
        Err(err) => println!("credential_shape=error ({err})"),
    }
    println!(
        "spreadsheet_id={}",
        config.spreadsheet_id().unwrap_or("missing")
    );
    println!("sheet_name={}", config.sheet_name());
    println!("token_uri={}", config.token_uri());
    println!("sheets_api_base={}", config.sheets_api_base());
    println!(
        "column_map={} ({} columns, A..{})",
        config.mapping().name,
        config.mapping().len(),
        config.mapping().last_column_letter()
    );
    println!("serialize_appends={}", config.serialize_appends());
    println!(
        "request_timeout={}",
        config
            .request_timeout()
            .map(|t| format!("{}s", t.as_secs()))
            .unwrap_or_else(|| "default".to_string())
    );

    if probe {
        let http = config.http_client()?;
        match probe_token(config, &http).await {
            Ok(()) => println!("token_probe=ok"),
            Err(err) => {
                println!("token_probe=error ({err})");
                if let Some(hint) = diagnose(&err) {
                    println!("hint={hint}");
                }
            }
        }
    }
    Ok(())
}
