use newsportal::configuration::get_configuration;
use newsportal::telemetry::init_telemetry;
use newsportal::{AppError, AuthClient};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    init_telemetry();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_session_expired() => {
            eprintln!("Session expired, log in again");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let configuration = get_configuration().map_err(|e| {
        tracing::error!("Failed to read configuration: {}", e);
        AppError::from(e)
    })?;
    tracing::info!(base_url = %configuration.api.base_url, "Configuration loaded successfully");

    let store = configuration.session.build_store()?;
    let client = AuthClient::from_settings(&configuration.api, store)?;

    if !client.is_authenticated()? {
        let credentials = configuration.credentials.as_ref().ok_or_else(|| {
            tracing::error!("No stored session and no credentials configured");
            AppError::from(newsportal::AuthError::NotAuthenticated)
        })?;
        client.login(&credentials.email, &credentials.password).await?;
    }

    if let Some(expires_at) = client.access_token_expires_at()? {
        tracing::info!(expires_at = %expires_at.to_rfc3339(), "Access token expiry");
    }

    let response = client.get(&configuration.application.resource_path).await?;
    let status = response.status();
    let body = response.text().await?;

    println!("{} {}", status.as_u16(), configuration.application.resource_path);
    println!("{}", body);

    if status.is_success() {
        Ok(())
    } else {
        Err(AppError::http_status(status, "Resource request failed"))
    }
}
