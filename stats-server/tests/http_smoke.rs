//! HTTP-level smoke tests (`spec.md` §10 expansion), using `axum-test`
//! against the router built the same way `main` builds it.

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use stats_core::{IdentityConfig, StatsEngine};

#[path = "../src/infra/mod.rs"]
mod infra;
#[path = "../src/routes/mod.rs"]
mod routes;

fn test_app() -> (Router, Arc<StatsEngine>) {
    let engine = StatsEngine::standalone();
    engine.initialize(0, None);
    engine.global(
        &IdentityConfig {
            server_id: "test".into(),
            host: "localhost".into(),
            location: "nowhere".into(),
            admin: "admin@localhost".into(),
            build: None,
        },
        0,
    );

    let config = Arc::new(infra::config::ServerConfig::default());
    let state = infra::app_state::AppState::new(Arc::clone(&engine), config);
    let app = routes::router().with_state(state);
    (app, engine)
}

#[tokio::test]
async fn stats_xml_omits_hidden_without_admin() {
    let (app, engine) = test_app();
    engine.event_flags(Some("/secret"), None, None, stats_core::StatFlags::HIDDEN, 0);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/admin/stats.xml").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("<icestats>"));
    assert!(!body.contains("/secret"));
}

#[tokio::test]
async fn stats_xml_admin_requires_configured_secret() {
    let (app, _engine) = test_app();
    let server = TestServer::new(app).unwrap();

    // No admin_secret configured in test_app's default config, so a bare
    // admin=1 request is accepted (matches ServerConfig::default's None).
    let response = server.get("/admin/stats.xml?admin=1").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn streams_lists_visible_mounts_only() {
    let (app, engine) = test_app();
    engine.event(Some("/public"), Some("server_type"), Some("audio/mpeg"), 0);
    // Sources default to HIDDEN on creation; announce /public explicitly.
    engine.event_flags(Some("/public"), None, None, stats_core::StatFlags::PUBLIC, 0);
    engine.event(Some("/hidden"), Some("server_type"), Some("audio/mpeg"), 0);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/admin/streams").await;
    response.assert_status_ok();
    let body = response.text();
    assert!(body.contains("/public"));
    assert!(!body.contains("/hidden"));
}

#[tokio::test]
async fn stats_events_rejects_admin_without_secret_when_configured() {
    let engine = StatsEngine::standalone();
    engine.initialize(0, None);
    let mut config = infra::config::ServerConfig::default();
    config.admin_secret = Some("s3cret".into());
    let state = infra::app_state::AppState::new(Arc::clone(&engine), Arc::new(config));
    let app = routes::router().with_state(state);
    let server = TestServer::new(app).unwrap();

    let response = server.get("/admin/stats-events?admin=1").await;
    response.assert_status(axum::http::StatusCode::FORBIDDEN);
}
