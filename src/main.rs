// Photo strip service: collects photos per session and composites them into a
// single decorated strip.

use actix_files as fs;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};

use photo_strip::camera::{self, FrameSource};
use photo_strip::compositor::{StripCompositor, StripFonts};
use photo_strip::config::Config;
use photo_strip::routes;
use photo_strip::session::{self, SessionStore};

// ============================================================================
// Application State
// ============================================================================

/// Centralized application state container
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionStore>,
    pub compositor: Arc<StripCompositor>,
    pub camera: Arc<dyn FrameSource>,
}

impl AppState {
    fn new(config: Config) -> Self {
        info!("Initializing application state");

        let sessions = Arc::new(SessionStore::new(
            config.strip.tile_width,
            config.strip.tile_height,
        ));

        // Fonts are non-critical: strips render without text if missing
        let fonts = StripFonts::load(&config.strip);
        let compositor = Arc::new(StripCompositor::new(fonts));

        // Camera is non-critical: uploads keep working without it
        let camera = camera::camera_from_config(&config.camera);
        info!("Frame source: {}", camera.describe());

        Self::check_static_path(&config);

        Self {
            config,
            sessions,
            compositor,
            camera,
        }
    }

    fn check_static_path(config: &Config) {
        if !config.storage.static_path.is_dir() {
            warn!(
                "Static path {:?} does not exist; /static will return 404",
                config.storage.static_path
            );
        }
    }
}

// ============================================================================
// Shutdown Handling
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutdown signal received");
}

async fn cleanup_resources(state: AppState) {
    info!("Beginning resource cleanup");
    info!(
        "Discarding {} in-memory session(s)",
        state.sessions.len().await
    );
    info!("Resource cleanup complete");
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ========================================
    // Phase 1: Basic Initialization
    // ========================================

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting photo strip service");

    // ========================================
    // Phase 2: Configuration & State Setup
    // ========================================

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Failed to load configuration: {}", e),
        )
    })?;

    let socket_addr = config.socket_addr().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;
    info!("Configuration loaded successfully");
    info!("Server will bind to: {}", socket_addr);

    let app_state = AppState::new(config);

    let idle_ttl = app_state.config.session.idle_ttl();
    let sweep = session::spawn_idle_sweep(app_state.sessions.clone(), idle_ttl);
    info!("Idle sessions expire after {:?}", idle_ttl);

    // ========================================
    // Phase 3: HTTP Server Setup
    // ========================================

    let app_state_for_server = app_state.clone();

    let server = HttpServer::new(move || {
        let state = app_state_for_server.clone();
        App::new()
            // Middleware
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            // Application state
            .app_data(web::Data::new(state.config.clone()))
            .app_data(web::Data::from(state.sessions.clone()))
            .app_data(web::Data::from(state.compositor.clone()))
            .app_data(web::Data::from(state.camera.clone()))
            // API routes
            .configure(routes::configure)
            // Front-end assets
            .service(fs::Files::new("/static", state.config.storage.static_path.clone()))
    })
    .bind(socket_addr)?
    .shutdown_timeout(5)
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    info!("Photo strip server started on {}", socket_addr);

    // ========================================
    // Phase 4: Run Until Shutdown
    // ========================================

    shutdown_signal().await;

    // ========================================
    // Phase 5: Graceful Shutdown
    // ========================================

    info!("Initiating graceful shutdown...");

    server_handle.stop(true).await;
    sweep.abort();

    cleanup_resources(app_state).await;

    server_task.await.map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("Server task error: {}", e),
        )
    })??;

    info!("Graceful shutdown complete");
    Ok(())
}
