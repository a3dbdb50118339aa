use anyhow::Context;
use ner_service::{shutdown, LogFormat, NerService, ServiceConfig};
use tracing::info;

const SERVICE_NAME: &str = "ner-service";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env();

    match config.as_ref().map_or(LogFormat::default(), |c| c.log_format) {
        LogFormat::Pretty => ner_core::init_tracing(SERVICE_NAME),
        LogFormat::Json => ner_core::init_tracing_json(SERVICE_NAME),
    }

    let config = config.context("Failed to read configuration")?;
    info!(
        address = %config.bind_address,
        backend = ?config.backend,
        "Starting NER service"
    );

    let mut shutdown = shutdown::install_signal_handlers();

    let Some(service) = NerService::start(&config, &mut shutdown)
        .await
        .context("Failed to start NER service")?
    else {
        info!("NER service stopped before it was ready");
        return Ok(());
    };

    let stats = service.run(shutdown).await?;

    info!(
        requests = stats.requests,
        organizations_found = stats.organizations_found,
        "NER service exited cleanly"
    );
    Ok(())
}
