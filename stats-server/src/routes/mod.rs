mod query;
mod stats_events;
mod stats_xml;
mod streams;

use axum::routing::get;
use axum::Router;

use crate::infra::app_state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/stats.xml", get(stats_xml::stats_xml))
        .route("/admin/streams", get(streams::streams))
        .route("/admin/stats-events", get(stats_events::stats_events))
}
