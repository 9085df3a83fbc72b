use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use courier_protocol::{Contact, Group};

use crate::client::ChatClient;
use crate::error::CourierError;
use crate::retry::RetryPolicy;
use crate::session::SessionRegistry;
use crate::supervisor::ConnectionSupervisor;

/// Phone numbers shorter than this are treated as implausible and the raw
/// protocol id is used as the dedup key instead.
const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Grace period before scanning: the client's store is eventually
    /// consistent right after a fresh connection.
    pub settle_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(2000),
        }
    }
}

/// Enumerates groups and builds the deduplicated contact list for a tenant.
#[derive(Clone)]
pub struct DiscoveryService {
    registry: Arc<SessionRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
    config: DiscoveryConfig,
}

impl DiscoveryService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        supervisor: Arc<ConnectionSupervisor>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            registry,
            supervisor,
            config,
        }
    }

    /// All group chats for the tenant. Member counts and invite links are
    /// best-effort; no sort order is guaranteed.
    pub async fn list_groups(&self, tenant_id: &str) -> Result<Vec<Group>, CourierError> {
        let handle = self.resolve_handle(tenant_id).await?;

        let chats = handle.list_chats().await?;
        let mut groups = Vec::new();
        for chat in chats.into_iter().filter(|chat| chat.is_group) {
            let (member_count, description) = match handle.group_metadata(&chat.id).await {
                Ok(meta) => (meta.participants.len() as u32, meta.description),
                Err(err) => {
                    warn!(tenant_id, group = %chat.id, %err, "group metadata unavailable");
                    (0, None)
                }
            };
            // Typically fails when the caller is not a group admin.
            let invite_link = match handle.group_invite_link(&chat.id).await {
                Ok(link) => Some(link),
                Err(err) => {
                    debug!(tenant_id, group = %chat.id, %err, "no invite link");
                    None
                }
            };
            groups.push(Group {
                id: chat.id,
                name: chat.name,
                member_count,
                invite_link,
                description,
            });
        }
        Ok(groups)
    }

    /// One discovery pass: every group's participants, merged into a contact
    /// map keyed by resolved identifier. A failed group contributes nothing;
    /// only a session without a client is a hard error.
    pub async fn group_contacts(
        &self,
        tenant_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<Contact>, CourierError> {
        let handle = self.resolve_handle(tenant_id).await?;

        if force_refresh {
            debug!(tenant_id, "forced refresh: bypassing external caches");
        }
        tokio::time::sleep(self.config.settle_delay).await;

        let own_id = match handle.own_id().await {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(tenant_id, %err, "own id unavailable, self-exclusion degraded");
                None
            }
        };
        let own_phone = own_id.as_deref().and_then(resolve_phone);

        let chats = handle.list_chats().await?;
        let mut contacts: HashMap<String, Contact> = HashMap::new();
        for chat in chats.into_iter().filter(|chat| chat.is_group) {
            let meta = match handle.group_metadata(&chat.id).await {
                Ok(meta) => meta,
                Err(err) => {
                    warn!(tenant_id, group = %chat.id, %err, "skipping group");
                    continue;
                }
            };
            for participant in meta.participants {
                if own_id.as_deref() == Some(participant.id.as_str()) {
                    continue;
                }
                let phone = resolve_phone(&participant.id);
                if phone.is_some() && phone == own_phone {
                    continue;
                }

                let key = phone.clone().unwrap_or_else(|| participant.id.clone());
                let display_name = participant
                    .display_name
                    .clone()
                    .or_else(|| phone.clone())
                    .unwrap_or_else(|| participant.id.clone());

                let entry = contacts.entry(key.clone()).or_insert_with(|| Contact {
                    identifier: key,
                    display_name,
                    groups: Vec::new(),
                });
                if !entry.groups.contains(&chat.name) {
                    entry.groups.push(chat.name.clone());
                }
            }
        }

        let contacts: Vec<Contact> = contacts.into_values().collect();
        info!(
            tenant_id,
            total = contacts.len(),
            force_refresh,
            "discovery pass complete"
        );
        Ok(contacts)
    }

    /// The documented consumer contract for eventual consistency: poll
    /// `group_contacts` under `policy` until a non-empty result appears.
    /// Once attempts are exhausted the final outcome is returned as-is, an
    /// empty result included; callers accept it rather than retry forever.
    pub async fn poll_contacts(
        &self,
        tenant_id: &str,
        policy: RetryPolicy,
    ) -> Result<Vec<Contact>, CourierError> {
        policy
            .run_until(
                || self.group_contacts(tenant_id, false),
                |outcome| matches!(outcome, Ok(contacts) if !contacts.is_empty()),
            )
            .await
    }

    /// Resolve the tenant's client, kicking off initialization when the
    /// session does not exist yet. Never waits for pairing: callers that need
    /// a ready session poll the status service first.
    async fn resolve_handle(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn ChatClient>, CourierError> {
        if let Some(handle) = self.registry.handle(tenant_id).await {
            return Ok(handle);
        }
        if !self.registry.contains(tenant_id).await {
            self.supervisor.initialize(tenant_id).await?;
        }
        // Re-resolve: creation runs in the background and has usually not
        // produced a handle yet.
        self.registry
            .handle(tenant_id)
            .await
            .ok_or_else(|| CourierError::ClientUnavailable(tenant_id.to_string()))
    }
}

/// Extract a plausible phone number from a protocol id such as
/// `491701234567@c.us` or `12345:2@s.whatsapp.net`. Returns `None` when the
/// user part is not all digits or is too short to be a phone number.
fn resolve_phone(protocol_id: &str) -> Option<String> {
    let user = protocol_id.split('@').next().unwrap_or_default();
    // Strip a device suffix if present.
    let user = user.split(':').next().unwrap_or_default();
    if user.len() >= MIN_PHONE_DIGITS && user.chars().all(|c| c.is_ascii_digit()) {
        Some(user.to_string())
    } else {
        None
    }
}
