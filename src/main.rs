/// Agora - social media API server binary
use agora::{
    config::{LogFormat, ServerConfig},
    context::AppContext,
    error::ApiResult,
    jobs::JobScheduler,
    server,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration first so the log format is known
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info", LogFormat::Pretty);
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    init_tracing(&config.logging.level, config.logging.format);

    tracing::info!("Agora v{} starting", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::new(config)
        .await
        .inspect_err(|e| tracing::error!("Failed to initialize: {}", e))?;

    // Start background jobs
    let scheduler = Arc::new(JobScheduler::new(Arc::new(ctx.clone())));
    scheduler.start();

    server::serve(ctx)
        .await
        .inspect_err(|e| tracing::error!("Server failed: {}", e))?;

    Ok(())
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
