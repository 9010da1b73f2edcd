use common::{TelemetryGuard, setup_logging};
use gateway::{AppState, build_router, config::get_configuration};
use inference::PredictionService;
use tokio::signal;

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend as Backend;

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to build the gateway binary");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "urdu-gateway",
            endpoint,
            config.environment,
            config.log_level,
        )?),
        None => {
            setup_logging(config.log_level, config.environment);
            None
        }
    };

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let service = PredictionService::<Backend>::new(config.service_config());
    let state = AppState::new(service);

    let loader = state.clone();
    tokio::task::spawn_blocking(move || loader.service.load_models()).await?;

    let app = build_router(state.clone(), &config.router_config());

    let address = config.bind_address()?;
    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!(%address, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, unloading models");
    state.service.unload_models();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
