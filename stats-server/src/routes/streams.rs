//! `GET /admin/streams` (`spec.md` §6 expansion): plain-text streamlist.

use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::infra::app_state::AppState;

pub async fn streams(State(state): State<AppState>) -> Response {
    let body = state.engine.streamlist(None);
    ([("content-type", "text/plain; charset=utf-8")], body).into_response()
}
