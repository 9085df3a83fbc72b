use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use libcourier::client::ClientFactory;
use libcourier::{
    ConnectionSupervisor, DiscoveryConfig, DiscoveryService, DispatchService, EventBroker,
    SessionRegistry, StatusService, SupervisorConfig,
};

use crate::config::ServerConfig;
use crate::{routes, ws};

/// Composition root: the shared registry and broker plus every service built
/// over them, owned for the process lifetime.
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub broker: Arc<EventBroker>,
    pub supervisor: Arc<ConnectionSupervisor>,
    pub status: StatusService,
    pub discovery: DiscoveryService,
    pub dispatch: DispatchService,
}

pub fn build_state(config: &ServerConfig, factory: Arc<dyn ClientFactory>) -> Arc<AppState> {
    let registry = Arc::new(SessionRegistry::new());
    let broker = Arc::new(EventBroker::new(config.event_capacity));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        Arc::clone(&registry),
        Arc::clone(&broker),
        factory,
        SupervisorConfig {
            verify_delay: Duration::from_millis(config.session.verify_delay_ms),
        },
    ));
    let status = StatusService::new(Arc::clone(&registry));
    let discovery = DiscoveryService::new(
        Arc::clone(&registry),
        Arc::clone(&supervisor),
        DiscoveryConfig {
            settle_delay: Duration::from_millis(config.session.settle_delay_ms),
        },
    );
    let dispatch = DispatchService::new(Arc::clone(&registry));

    Arc::new(AppState {
        registry,
        broker,
        supervisor,
        status,
        discovery,
        dispatch,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session/init", post(routes::init_session))
        .route("/session/list", get(routes::list_sessions))
        .route("/session/status/{tenant_id}", get(routes::session_status))
        .route("/session/groups/{tenant_id}", get(routes::session_groups))
        .route(
            "/session/contacts/{tenant_id}",
            get(routes::session_contacts),
        )
        .route("/session/send/{tenant_id}", post(routes::send_message))
        .route("/session/send-file/{tenant_id}", post(routes::send_file))
        .route(
            "/session/disconnect/{tenant_id}",
            post(routes::disconnect_session),
        )
        .route("/session/events", get(ws::events))
        .with_state(state)
}

pub async fn serve(config: ServerConfig, factory: Arc<dyn ClientFactory>) -> Result<()> {
    let cors = build_cors(&config.allow_origins)?;
    let state = build_state(&config, factory);
    let app = router(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.listen))?;

    info!("courier-web listening on http://{}", config.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down...");
        })
        .await?;
    Ok(())
}

fn build_cors(origins: &[String]) -> Result<CorsLayer> {
    if origins.iter().any(|origin| origin == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any));
    }

    let mut headers = Vec::with_capacity(origins.len());
    for origin in origins {
        headers.push(
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid allow-origin value: {origin}"))?,
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_cors_accepts_wildcard() {
        assert!(build_cors(&["*".to_string()]).is_ok());
    }

    #[test]
    fn build_cors_rejects_invalid_origin() {
        assert!(build_cors(&["bad\norigin".to_string()]).is_err());
    }
}
