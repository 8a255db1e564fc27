mod core;
mod features;
mod modules;
mod shared;

use crate::core::config::Config;
use crate::core::openapi::{ApiDoc, SwaggerInfoModifier};
use crate::core::{database, middleware};
use crate::features::files::repositories::PgFileRepository;
use crate::features::files::services::{FileService, UploadService, UploadSettings};
use crate::features::files::{self, FilesState};
use crate::modules::file_handling::ScriptRegistry;
use crate::modules::naming::PatternNameGenerator;
use crate::modules::storage::{DiskRegistry, StorageAdapter};
use crate::shared::flash::FlashStore;
use crate::shared::views::ViewRenderer;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::Router;
use std::sync::Arc;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::Modify;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and the text fields next to the file
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

fn main() -> anyhow::Result<()> {
    // Build Tokio runtime with configurable worker threads
    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .max_blocking_threads(worker_threads * 4)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(worker_threads))
}

async fn async_main(worker_threads: usize) -> anyhow::Result<()> {
    // Load .env file BEFORE initializing logger so RUST_LOG is available
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(
        "System info: tokio_worker_threads={}, pid={}",
        worker_threads,
        std::process::id()
    );
    tracing::info!("Configuration loaded successfully");

    // Create database connection pool
    let pool = database::create_pool(&config.database).await?;
    tracing::info!("Database connection pool created");

    tracing::info!("Running database migrations...");
    database::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;
    tracing::info!("Database migrations completed successfully");

    // Storage disks
    let disks = DiskRegistry::from_config(&config.storage);
    disks
        .ensure_directories()
        .map_err(|e| anyhow::anyhow!("Failed to prepare storage: {}", e))?;
    if !disks.has_disk(&config.files.disk) {
        anyhow::bail!("FILES_DISK '{}' is not a configured disk", config.files.disk);
    }
    let served_disks = disks.served_disks();
    let storage: Arc<dyn StorageAdapter> = Arc::new(disks);

    // Upload pipeline collaborators
    let names = PatternNameGenerator::new(&config.files.filename_pattern)
        .map_err(|e| anyhow::anyhow!("Invalid FILES_FILENAME_PATTERN: {}", e))?;
    tracing::info!("Name generator initialized with pattern {}", names.pattern());

    let scripts = ScriptRegistry::builtin();
    scripts
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid handling script: {}", e))?;
    scripts
        .get(&config.files.handling_script)
        .map_err(|e| anyhow::anyhow!("Invalid FILES_HANDLING_SCRIPT: {}", e))?;
    tracing::info!(
        "Uploads use handling script '{}' on disk '{}'",
        config.files.handling_script,
        config.files.disk
    );

    let views = ViewRenderer::new().map_err(|e| anyhow::anyhow!("Failed to load views: {}", e))?;

    // Files services
    let repository = Arc::new(PgFileRepository::new(pool.clone()));
    let file_service = Arc::new(FileService::new(repository.clone(), Arc::clone(&storage)));
    let upload_service = Arc::new(UploadService::new(
        repository,
        Arc::clone(&storage),
        Arc::new(names),
        Arc::new(scripts),
        UploadSettings {
            disk: config.files.disk.clone(),
            handling_script: config.files.handling_script.clone(),
            author_id: config.files.author_id,
        },
    ));
    tracing::info!("File services initialized");

    let files_state = FilesState {
        files: file_service,
        uploads: upload_service,
        views: Arc::new(views),
        flashes: Arc::new(FlashStore::new()),
    };

    // Build application router with dynamic swagger config
    let swagger_modifier = SwaggerInfoModifier {
        title: config.swagger.title.clone(),
        version: config.swagger.version.clone(),
        description: config.swagger.description.clone(),
    };

    let mut openapi = ApiDoc::openapi();
    swagger_modifier.modify(&mut openapi);

    // Admin pages, JSON API and Swagger UI share the admin credentials
    let admin_routes = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi))
        .merge(files::admin_routes(files_state.clone()))
        .layer(DefaultBodyLimit::max(
            config.files.max_upload_size + MULTIPART_OVERHEAD,
        ));

    let admin_routes = if let Some(credentials) = config.admin.credentials() {
        tracing::info!("Admin basic auth enabled");
        admin_routes.route_layer(from_fn_with_state(
            Arc::new(credentials),
            middleware::admin_basic_auth,
        ))
    } else {
        tracing::warn!("Admin basic auth disabled (no credentials configured)");
        admin_routes
    };

    // Simple health check endpoint (no auth required)
    async fn health_check() -> axum::http::StatusCode {
        axum::http::StatusCode::OK
    }

    // Public routes (no auth required)
    let mut public_routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route(
            "/",
            axum::routing::get(|| async { Redirect::to("/files") }),
        )
        .merge(files::public_routes(files_state));

    for (url, root) in served_disks {
        tracing::info!("Serving {} at {}", root.display(), url);
        public_routes = public_routes.nest_service(&url, ServeDir::new(root));
    }

    let app = Router::new()
        .merge(admin_routes)
        .merge(public_routes)
        .layer(middleware::cors_layer(
            config.app.cors_allowed_origins.clone(),
        ))
        // Propagate X-Request-Id to response headers
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(middleware::MakeSpanWithRequestId)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Generate X-Request-Id using UUID v7 (or use client-provided one)
        .layer(SetRequestIdLayer::x_request_id(middleware::MakeRequestUuid));

    // Start server
    let addr = config.app.server_address();
    let socket_addr: std::net::SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    // Use socket2 for TCP listener configuration
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(socket_addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;

    #[cfg(target_os = "linux")]
    {
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(60))
            .with_interval(std::time::Duration::from_secs(10))
            .with_retries(3);
        socket.set_tcp_keepalive(&keepalive)?;
    }
    #[cfg(not(target_os = "linux"))]
    {
        let keepalive = socket2::TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
        socket.set_tcp_keepalive(&keepalive)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;

    let listener = tokio::net::TcpListener::from_std(socket.into())?;
    tracing::info!("Server listening on {}", format!("http://{}", addr));
    tracing::info!("Admin pages available at {}", format!("http://{}/files", addr));
    tracing::info!(
        "Swagger UI available at {}",
        format!("http://{}/swagger-ui/", addr)
    );

    axum::serve(listener, app).await?;

    Ok(())
}
