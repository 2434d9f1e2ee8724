//! Anemia Classification Server binary

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anemia_classifier::{
    AppState, create_router,
    config::{Config, LogFormat},
    inference::ModelPackage,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.default_log_filter().into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    tracing::info!("Anemia Classification Server starting...");
    tracing::info!("Environment: {}", config.environment);
    if config.is_production() && config.debug {
        tracing::warn!("DEBUG is enabled in production");
    }

    // Load model package
    let state = match ModelPackage::load(&config.model_path, config.model_sha256.as_deref()) {
        Ok(package) => {
            tracing::info!("Model loaded successfully from: {}", package.path.display());
            tracing::info!("Features: {:?}", package.metadata.features);
            tracing::info!("Class names: {:?}", package.metadata.class_names);
            tracing::info!("Checksum: {}", package.checksum);
            AppState::loaded(config.clone(), package)
        }
        Err(e) => {
            tracing::error!("Failed to load model: {}", e);
            tracing::warn!("Using fallback mode - model predictions will not work");
            AppState::degraded(config.clone())
        }
    };

    if let Some(engine) = &state.engine {
        let classifier = engine.classifier();
        tracing::info!(
            "Classifier: {} ({} features, {} classes)",
            classifier.name(),
            classifier.n_features(),
            classifier.n_classes()
        );
    }

    tracing::info!("Port: {}", config.port);
    tracing::info!("Debug: {}", config.debug);
    tracing::info!(
        "Model status: {}",
        if state.model_loaded() { "loaded" } else { "failed" }
    );

    let app = create_router(state);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
