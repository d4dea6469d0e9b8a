pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::broadcaster::ProgressBroadcaster;
use crate::services::intake::IntakeService;
use crate::services::registry::RecordRegistry;
use crate::services::storage::StorageService;
use axum::{
    Router,
    http::HeaderValue,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_video,
        api::handlers::stream::stream_file,
        api::handlers::videos::list_videos,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::UploadRecord,
            models::UploadStatus,
            models::ProgressEvent,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "videos", description = "Upload intake and playback"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn StorageService>,
    pub registry: RecordRegistry,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub intake: Arc<IntakeService>,
}

impl AppState {
    /// Wires the registry, broadcaster and intake service around `storage`.
    pub fn new(config: AppConfig, storage: Arc<dyn StorageService>) -> Self {
        let registry = RecordRegistry::new();
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            registry.clone(),
            config.tick_interval(),
            config.progress_step,
            config.event_buffer,
        ));
        let intake = Arc::new(IntakeService::new(
            storage.clone(),
            registry.clone(),
            broadcaster.clone(),
        ));

        Self {
            config,
            storage,
            registry,
            broadcaster,
            intake,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload",
            post(api::handlers::upload::upload_video).layer(
                axum::extract::DefaultBodyLimit::max(
                    state.config.max_file_size + 10 * 1024 * 1024, // Add 10MB buffer for multipart overhead
                ),
            ),
        )
        .route("/stream/:file", get(api::handlers::stream::stream_file))
        .route("/videos", get(api::handlers::videos::list_videos))
        .route("/ws", get(api::handlers::events::progress_socket))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(cors_layer(&state.config))
        .with_state(state)
}
