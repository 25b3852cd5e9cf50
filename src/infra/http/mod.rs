mod error;
mod handlers;
mod middleware;
mod state;

pub use error::ApiError;
pub use middleware::RequestContext;
pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use middleware::{log_responses, set_request_context};

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/render/{target}", post(handlers::submit_render))
        .route("/status/{identifier}", get(handlers::job_status))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
