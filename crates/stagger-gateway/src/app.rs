use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use stagger_agent::ContentGenerator;
use stagger_channels::Dispatcher;
use stagger_core::config::StaggerConfig;
use stagger_scheduler::StaggerController;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::warn;

/// Shared state handed to every Axum handler as `Arc<AppState>`.
pub struct AppState {
    pub config: StaggerConfig,
    pub controller: Arc<StaggerController>,
    /// Same generator and dispatcher the controller uses; one-off sends go
    /// straight through them.
    pub generator: Arc<dyn ContentGenerator>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

impl AppState {
    pub fn new(
        config: StaggerConfig,
        controller: Arc<StaggerController>,
        generator: Arc<dyn ContentGenerator>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            config,
            controller,
            generator,
            dispatcher,
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.gateway.cors_origins);
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/generate-and-send-email",
            post(crate::http::email::generate_and_send),
        )
        .route(
            "/schedule-staggered-email-job",
            post(crate::http::jobs::schedule_staggered),
        )
        .route("/jobs", get(crate::http::jobs::list_jobs))
        .route("/jobs/{id}", get(crate::http::jobs::get_job))
        .with_state(state)
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
