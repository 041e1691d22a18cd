use axum::{
    http::{header, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod generator;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::AppError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        // Public endpoints
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/courses", course_routes(app_state.clone()))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn course_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Reads of a course and its public quiz need no identity
    let public_routes = Router::new()
        .route("/{course_id}", get(handlers::courses::get_course))
        .route("/{course_id}/quiz", get(handlers::quizzes::get_quiz));

    let protected_routes = Router::new()
        .route("/", get(handlers::courses::list_courses))
        .route("/generate", post(handlers::courses::generate_course))
        .route("/{course_id}", delete(handlers::courses::delete_course))
        .route(
            "/{course_id}/quiz/generate",
            post(handlers::quizzes::generate_quiz),
        )
        .route(
            "/{course_id}/quiz/submit",
            post(handlers::quizzes::submit_quiz),
        )
        .route(
            "/{course_id}/quiz/review",
            get(handlers::quizzes::review_quiz),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}
