//! `GET /admin/stats-events` (`spec.md` §4.4/§6 expansion): the live
//! line-oriented event stream, served as a chunked `text/plain` body.
//!
//! Grounded on `ferrex-server`'s scan-progress handler
//! (`handlers/scan/handle_scan.rs`), which also splices a history replay
//! onto a live broadcast via `async_stream`; the registration burst here
//! plays the part of that history replay, already spliced onto the
//! subscriber's own queue by `StatsEngine::add_listener`, so this handler
//! only has to drain one queue rather than chain two streams. Served as a
//! raw chunked body rather than that handler's `Sse` wrapper, since
//! `spec.md` specifies a plain-text capability stream, not a browser-style
//! event source.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::Response;
use serde::Deserialize;
use stats_core::{StatFlags, StatsEngine, SubscriberId};

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct StatsEventsQuery {
    /// Raw subscriber mask bits (`StatFlags`), defaulting to `PUBLIC`.
    pub mask: Option<u32>,
    #[serde(default, deserialize_with = "super::query::truthy_flag")]
    pub admin: bool,
    pub secret: Option<String>,
}

struct RemoveOnDrop {
    engine: Arc<StatsEngine>,
    id: SubscriberId,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        self.engine.remove_listener(self.id);
    }
}

pub async fn stats_events(State(state): State<AppState>, Query(query): Query<StatsEventsQuery>) -> AppResult<Response> {
    let mut mask = query
        .mask
        .map(StatFlags::from_bits_truncate)
        .unwrap_or(StatFlags::PUBLIC);
    if state.is_admin_request(query.admin, query.secret.as_deref()) {
        mask |= StatFlags::HIDDEN;
    } else if query.admin {
        return Err(AppError::forbidden("admin subscription requires a valid secret"));
    }

    let now = chrono::Utc::now().timestamp();
    let subscriber = state.engine.add_listener(mask, now);
    let shutdown = state.engine.shutdown_token();
    let engine = Arc::clone(&state.engine);
    let id = subscriber.id;

    let body_stream = async_stream::stream! {
        let _guard = RemoveOnDrop { engine, id };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = subscriber.wait_for_data() => {}
            }
            let had_error = subscriber.has_error();
            while let Some(batch) = subscriber.drain_batch() {
                yield Ok::<_, std::io::Error>(batch);
            }
            if had_error {
                break;
            }
        }
    };

    let mut response = Response::new(Body::from_stream(body_stream));
    response
        .headers_mut()
        .insert("Capability", HeaderValue::from_static("streamlist stats"));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    Ok(response)
}
