use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coordinator::handlers::build_router;
use coordinator::launcher::run_sweep_loop;
use coordinator::settings::Settings;
use coordinator::state::AppState;
use coordinator::DEFAULT_LOG_FILTER;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let settings = Settings::from_env();
    let state = AppState::new(&settings)?;

    // limpieza periódica del registro de ejecuciones
    tokio::spawn(run_sweep_loop(state.registry.clone(), settings.registry_sweep));

    let app = build_router(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", settings.bind_addr))?;
    info!(
        "coordinator escuchando en {} (concurrencia {})",
        listener.local_addr()?,
        settings.pipeline_concurrency
    );

    axum::serve(listener, app).await?;
    Ok(())
}
