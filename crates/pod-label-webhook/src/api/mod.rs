use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handler::AdmissionHandler;
use crate::pod_label::MUTATE_POD_PATH;

pub mod admission_review;
pub mod api_error;
pub(crate) mod handlers;
pub(crate) mod state;

use handlers::{mutate_handler, readiness_handler};
use state::ApiServerState;

pub(crate) fn router(handler: Arc<dyn AdmissionHandler>) -> Router {
    let state = Arc::new(ApiServerState { handler });

    Router::new()
        .route(MUTATE_POD_PATH, post(mutate_handler))
        .route("/readiness", get(readiness_handler))
        .with_state(state)
}
