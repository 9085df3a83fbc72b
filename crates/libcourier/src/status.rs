use std::sync::Arc;

use tracing::{debug, warn};

use courier_protocol::SessionStatus;

use crate::session::SessionRegistry;

/// Answers "is tenant X connected, and what is its pairing code".
///
/// The cached flag in the registry is an event-driven optimization; this
/// service always prefers a direct probe of the client and reconciles the
/// cache with what it observes. It never returns an error: an unconfirmable
/// session is reported disconnected.
#[derive(Clone)]
pub struct StatusService {
    registry: Arc<SessionRegistry>,
}

impl StatusService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn get_status(&self, tenant_id: &str) -> SessionStatus {
        let Some(snapshot) = self.registry.snapshot(tenant_id).await else {
            return SessionStatus::default();
        };

        // Client still being created: nothing to probe yet.
        let Some(handle) = self.registry.handle(tenant_id).await else {
            return SessionStatus {
                connected: false,
                pairing_code: snapshot.pairing_code,
            };
        };

        let live = match handle.is_connected().await {
            Ok(live) => live,
            Err(err) => {
                debug!(tenant_id, %err, "liveness probe failed, querying state");
                match handle.state().await {
                    Ok(state) => state.is_online(),
                    Err(err) => {
                        warn!(tenant_id, %err, "state query failed, reporting disconnected");
                        false
                    }
                }
            }
        };

        self.registry.reconcile(tenant_id, live).await
    }
}
