use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_protocol::{SessionSummary, TenantId};

use crate::client::ChatClient;

/// One tenant's session state.
///
/// `handle` is `None` between `insert_pending` and `attach_handle`, while the
/// underlying client is still being created. `pairing_code` and
/// `connected == true` are never set together: marking connected clears the
/// code, and a code arriving for a connected session is dropped.
struct SessionEntry {
    handle: Option<Arc<dyn ChatClient>>,
    pairing_code: Option<String>,
    connected: bool,
    pump: Option<JoinHandle<()>>,
}

/// What `remove` hands back so the caller can finish teardown outside the
/// registry lock.
pub struct RemovedSession {
    pub handle: Option<Arc<dyn ChatClient>>,
    pub pump: Option<JoinHandle<()>>,
}

/// Point-in-time view of one entry.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub connected: bool,
    pub pairing_code: Option<String>,
    pub has_handle: bool,
}

/// The shared session store: one entry per tenant, owned by the composition
/// root and passed by reference to every component.
///
/// Readers must tolerate entries appearing and disappearing between check and
/// use; the lock is never held across client I/O.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<TenantId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Reserve an entry for `tenant_id`. Returns false (and changes nothing)
    /// if the tenant is already registered; initialization is idempotent.
    pub async fn insert_pending(&self, tenant_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(tenant_id) {
            return false;
        }
        sessions.insert(
            tenant_id.to_string(),
            SessionEntry {
                handle: None,
                pairing_code: None,
                connected: false,
                pump: None,
            },
        );
        debug!(tenant_id, "session entry reserved");
        true
    }

    pub async fn contains(&self, tenant_id: &str) -> bool {
        self.sessions.read().await.contains_key(tenant_id)
    }

    /// Record the event-pump task so disconnect can abort it.
    pub async fn attach_pump(&self, tenant_id: &str, pump: JoinHandle<()>) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(tenant_id) {
            Some(entry) => entry.pump = Some(pump),
            // Entry vanished (disconnect raced the init); nothing should keep
            // pumping for it.
            None => pump.abort(),
        }
    }

    /// Register the created client. Returns false if the entry is gone or
    /// already has a handle.
    pub async fn attach_handle(&self, tenant_id: &str, handle: Arc<dyn ChatClient>) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(tenant_id) {
            Some(entry) if entry.handle.is_none() => {
                entry.handle = Some(handle);
                true
            }
            Some(_) => {
                warn!(tenant_id, "refusing to replace an existing client handle");
                false
            }
            None => false,
        }
    }

    /// Current handle for the tenant, if the client has been created.
    ///
    /// Callers re-resolve after every suspension point instead of caching the
    /// result.
    pub async fn handle(&self, tenant_id: &str) -> Option<Arc<dyn ChatClient>> {
        self.sessions
            .read()
            .await
            .get(tenant_id)
            .and_then(|entry| entry.handle.clone())
    }

    pub async fn snapshot(&self, tenant_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(tenant_id)
            .map(|entry| SessionSnapshot {
                connected: entry.connected,
                pairing_code: entry.pairing_code.clone(),
                has_handle: entry.handle.is_some(),
            })
    }

    /// Store a pairing code. Dropped if the session is already connected: a
    /// connected session never reports a code.
    pub async fn set_pairing_code(&self, tenant_id: &str, code: String) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(tenant_id) {
            if entry.connected {
                warn!(tenant_id, "dropping pairing code for connected session");
                return;
            }
            entry.pairing_code = Some(code);
        }
    }

    /// Update the cached connection flag. Marking connected clears any pending
    /// pairing code. Returns true when the flag actually changed.
    pub async fn mark_connected(&self, tenant_id: &str, connected: bool) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(tenant_id) else {
            return false;
        };
        if connected {
            entry.pairing_code = None;
        }
        let changed = entry.connected != connected;
        entry.connected = connected;
        changed
    }

    /// Reconcile the cached flag with a directly-observed liveness result and
    /// return the resulting status. The live result always wins.
    pub async fn reconcile(&self, tenant_id: &str, live: bool) -> courier_protocol::SessionStatus {
        let mut sessions = self.sessions.write().await;
        let Some(entry) = sessions.get_mut(tenant_id) else {
            return courier_protocol::SessionStatus::default();
        };
        if entry.connected != live {
            debug!(
                tenant_id,
                cached = entry.connected,
                live,
                "cached connection flag overridden by live check"
            );
        }
        entry.connected = live;
        if live {
            entry.pairing_code = None;
        }
        courier_protocol::SessionStatus {
            connected: entry.connected,
            pairing_code: entry.pairing_code.clone(),
        }
    }

    /// Drop the entry, handing back the handle and pump for teardown.
    pub async fn remove(&self, tenant_id: &str) -> Option<RemovedSession> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(tenant_id).map(|entry| RemovedSession {
            handle: entry.handle,
            pump: entry.pump,
        })
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(tenant_id, entry)| SessionSummary {
                tenant_id: tenant_id.clone(),
                connected: entry.connected,
                pairing: entry.pairing_code.is_some(),
            })
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_pending_is_idempotent() {
        let registry = SessionRegistry::new();
        assert!(registry.insert_pending("t1").await);
        assert!(!registry.insert_pending("t1").await);
        assert!(registry.contains("t1").await);
    }

    #[tokio::test]
    async fn mark_connected_clears_pairing_code() {
        let registry = SessionRegistry::new();
        registry.insert_pending("t1").await;
        registry.set_pairing_code("t1", "ABC123".to_string()).await;

        let snap = registry.snapshot("t1").await.unwrap();
        assert!(!snap.connected);
        assert_eq!(snap.pairing_code.as_deref(), Some("ABC123"));

        assert!(registry.mark_connected("t1", true).await);
        let snap = registry.snapshot("t1").await.unwrap();
        assert!(snap.connected);
        assert!(snap.pairing_code.is_none());
    }

    #[tokio::test]
    async fn pairing_code_dropped_while_connected() {
        let registry = SessionRegistry::new();
        registry.insert_pending("t1").await;
        registry.mark_connected("t1", true).await;
        registry.set_pairing_code("t1", "LATE".to_string()).await;

        let snap = registry.snapshot("t1").await.unwrap();
        assert!(snap.connected);
        assert!(snap.pairing_code.is_none());
    }

    #[tokio::test]
    async fn disconnect_does_not_clear_code() {
        let registry = SessionRegistry::new();
        registry.insert_pending("t1").await;
        registry.set_pairing_code("t1", "ABC".to_string()).await;

        // Going (or staying) offline keeps the pending code.
        registry.mark_connected("t1", false).await;
        let snap = registry.snapshot("t1").await.unwrap();
        assert_eq!(snap.pairing_code.as_deref(), Some("ABC"));
    }

    #[tokio::test]
    async fn reconcile_overrides_cached_flag() {
        let registry = SessionRegistry::new();
        registry.insert_pending("t1").await;
        registry.mark_connected("t1", true).await;

        let status = registry.reconcile("t1", false).await;
        assert!(!status.connected);
        let snap = registry.snapshot("t1").await.unwrap();
        assert!(!snap.connected);
    }

    #[tokio::test]
    async fn remove_unknown_tenant_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.remove("ghost").await.is_none());
    }

    #[tokio::test]
    async fn list_reports_pairing_state() {
        let registry = SessionRegistry::new();
        registry.insert_pending("a").await;
        registry.set_pairing_code("a", "X".to_string()).await;
        registry.insert_pending("b").await;
        registry.mark_connected("b", true).await;

        let mut list = registry.list().await;
        list.sort_by(|l, r| l.tenant_id.cmp(&r.tenant_id));
        assert_eq!(list.len(), 2);
        assert!(list[0].pairing && !list[0].connected);
        assert!(!list[1].pairing && list[1].connected);
    }
}
