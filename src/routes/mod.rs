// HTTP routes: monitor page, live plot data, version

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::datastore::{SampleStore, StatusFeed};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) samples: Arc<dyn SampleStore>,
    pub(crate) feed: Arc<dyn StatusFeed>,
    pub(crate) recent_samples: usize,
}

pub fn app(
    samples: Arc<dyn SampleStore>,
    feed: Arc<dyn StatusFeed>,
    recent_samples: usize,
) -> Router {
    let state = AppState {
        samples,
        feed,
        recent_samples,
    };
    Router::new()
        .route("/", get(http::index_handler)) // GET /
        .route("/get_plots", get(http::plots_handler)) // GET /get_plots
        .route("/version", get(http::version_handler)) // GET /version
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
