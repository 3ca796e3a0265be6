use isp_nexus::{config, is_production, router, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, IDENTITY_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    tracing::info!("Starting ISP Nexus in {:?} mode", config.environment);
    if is_production!() && config.identity.jwt_secret.is_empty() {
        tracing::warn!("IDENTITY_JWT_SECRET is not set; every token will be checked against the identity provider");
    }

    let state = AppState::from_config(config.clone()).await?;
    let app = router(state);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("ISP Nexus portal listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
