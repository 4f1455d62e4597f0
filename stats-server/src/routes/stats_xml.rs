//! `GET /admin/stats.xml` (`spec.md` §6 expansion).

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use stats_core::{SnapshotFilter, StatFlags};

use crate::infra::app_state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatsXmlQuery {
    pub mount: Option<String>,
    #[serde(default, deserialize_with = "super::query::truthy_flag")]
    pub admin: bool,
    pub secret: Option<String>,
}

pub async fn stats_xml(State(state): State<AppState>, Query(query): Query<StatsXmlQuery>) -> Response {
    let admin = state.is_admin_request(query.admin, query.secret.as_deref());
    let filter = SnapshotFilter {
        flags: if admin { StatFlags::HIDDEN } else { StatFlags::empty() },
        show_mount: query.mount,
    };
    let body = state.engine.snapshot_xml(&filter);
    (
        [("content-type", "application/xml; charset=utf-8")],
        body,
    )
        .into_response()
}
