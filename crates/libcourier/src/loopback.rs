//! In-process chat transport.
//!
//! Implements the [`ChatClient`]/[`ClientFactory`] seam without any network:
//! fixture-backed groups, a scripted pairing flow, and failure injection for
//! probes and send primitives. The dev server runs on it, and every test in
//! the workspace uses it as its harness. A per-tenant marker file stands in
//! for the protocol library's credential cache: a tenant with a marker
//! restores as already-authenticated and emits no transition event.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::mpsc;
use tracing::debug;

use courier_protocol::FileOptions;

use crate::client::{
    ChatClient, ChatInfo, ClientError, ClientEvent, ClientFactory, ClientState, GroupMetadata,
    Participant,
};

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Emit a pairing code and complete the "scan" automatically.
    pub auto_pair: bool,
    pub pairing_delay: Duration,
    /// Time between the pairing code and the simulated scan.
    pub connect_delay: Duration,
    pub own_id: String,
    pub groups: Vec<GroupFixture>,
    /// Where pairing markers live; `None` disables restoration.
    pub credential_dir: Option<PathBuf>,
    /// Fail client creation with this message (tests the auth-failed path).
    pub create_error: Option<String>,
    /// Artificial client-creation latency.
    pub create_delay: Duration,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            auto_pair: true,
            pairing_delay: Duration::from_millis(500),
            connect_delay: Duration::from_millis(1500),
            own_id: "15550000000@c.us".to_string(),
            groups: Vec::new(),
            credential_dir: None,
            create_error: None,
            create_delay: Duration::ZERO,
        }
    }
}

impl LoopbackConfig {
    /// No automatic pairing: tests drive the client explicitly.
    pub fn manual() -> Self {
        Self {
            auto_pair: false,
            ..Self::default()
        }
    }

    pub fn with_own_id(mut self, own_id: &str) -> Self {
        self.own_id = own_id.to_string();
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupFixture>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_credential_dir(mut self, dir: &Path) -> Self {
        self.credential_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_create_error(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct GroupFixture {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub invite_link: Option<String>,
    pub participants: Vec<ParticipantFixture>,
}

impl GroupFixture {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            invite_link: None,
            participants: Vec::new(),
        }
    }

    pub fn with_participant(mut self, participant: ParticipantFixture) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn with_invite_link(mut self, link: &str) -> Self {
        self.invite_link = Some(link.to_string());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantFixture {
    pub id: String,
    pub display_name: Option<String>,
}

impl ParticipantFixture {
    pub fn new(id: &str, display_name: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.map(str::to_string),
        }
    }
}

/// A message accepted by one of the send primitives.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub to: String,
    pub primitive: String,
    pub body: String,
}

pub struct LoopbackFactory {
    config: LoopbackConfig,
    clients: Mutex<HashMap<String, Arc<LoopbackClient>>>,
    created: AtomicUsize,
}

impl LoopbackFactory {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// How many clients this factory has created.
    pub fn create_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The live client for a tenant, for test scripting.
    pub fn client(&self, tenant_id: &str) -> Option<Arc<LoopbackClient>> {
        self.clients.lock().unwrap().get(tenant_id).cloned()
    }

    /// Pre-seed the credential cache so the tenant restores without pairing.
    pub fn mark_paired(dir: &Path, tenant_id: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(Self::marker_path(dir, tenant_id), b"paired\n")
    }

    fn marker_path(dir: &Path, tenant_id: &str) -> PathBuf {
        dir.join(format!("{tenant_id}.paired"))
    }
}

#[async_trait]
impl ClientFactory for LoopbackFactory {
    async fn create(
        &self,
        tenant_id: &str,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<Arc<dyn ChatClient>, ClientError> {
        if !self.config.create_delay.is_zero() {
            tokio::time::sleep(self.config.create_delay).await;
        }
        if let Some(message) = &self.config.create_error {
            return Err(ClientError::Transport(message.clone()));
        }

        let marker = self
            .config
            .credential_dir
            .as_deref()
            .map(|dir| Self::marker_path(dir, tenant_id));
        let restored = marker.as_deref().is_some_and(Path::exists);

        let client = Arc::new(LoopbackClient {
            tenant_id: tenant_id.to_string(),
            own_id: self.config.own_id.clone(),
            connected: AtomicBool::new(restored),
            fail_liveness: AtomicBool::new(false),
            events,
            groups: Mutex::new(self.config.groups.clone()),
            failed_groups: Mutex::new(HashSet::new()),
            failed_primitives: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            credential_marker: marker,
        });
        self.clients
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), Arc::clone(&client));
        self.created.fetch_add(1, Ordering::SeqCst);
        debug!(tenant_id, restored, "loopback client created");

        if self.config.auto_pair && !restored {
            let scripted = Arc::clone(&client);
            let pairing_delay = self.config.pairing_delay;
            let connect_delay = self.config.connect_delay;
            tokio::spawn(async move {
                tokio::time::sleep(pairing_delay).await;
                if scripted.connected_flag() {
                    return;
                }
                let code: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(8)
                    .map(char::from)
                    .collect::<String>()
                    .to_uppercase();
                scripted.emit_pairing_code(&code);
                tokio::time::sleep(connect_delay).await;
                // Simulated scan completes the pairing.
                scripted.go_online();
            });
        }

        Ok(client)
    }
}

pub struct LoopbackClient {
    tenant_id: String,
    own_id: String,
    connected: AtomicBool,
    fail_liveness: AtomicBool,
    events: mpsc::UnboundedSender<ClientEvent>,
    groups: Mutex<Vec<GroupFixture>>,
    failed_groups: Mutex<HashSet<String>>,
    failed_primitives: Mutex<HashSet<String>>,
    sent: Mutex<Vec<SentMessage>>,
    credential_marker: Option<PathBuf>,
}

impl LoopbackClient {
    pub fn connected_flag(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Flip the connection flag without emitting a state event.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make the liveness probe and state query fail, as a dead handle would.
    pub fn set_fail_liveness(&self, fail: bool) {
        self.fail_liveness.store(fail, Ordering::SeqCst);
    }

    pub fn emit_pairing_code(&self, code: &str) {
        let _ = self.events.send(ClientEvent::PairingCode {
            code: code.to_string(),
        });
    }

    /// Connect: persists the pairing marker and emits the state change.
    pub fn go_online(&self) {
        self.connected.store(true, Ordering::SeqCst);
        if let Some(marker) = &self.credential_marker {
            if let Some(dir) = marker.parent() {
                let _ = std::fs::create_dir_all(dir);
            }
            let _ = std::fs::write(marker, b"paired\n");
        }
        debug!(tenant_id = %self.tenant_id, "loopback client online");
        let _ = self
            .events
            .send(ClientEvent::StateChange(ClientState::Connected));
    }

    pub fn go_offline(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(ClientEvent::StateChange(ClientState::Disconnected));
    }

    pub fn emit_message(&self, payload: serde_json::Value) {
        let _ = self.events.send(ClientEvent::Message(payload));
    }

    pub fn emit_call(&self, payload: serde_json::Value) {
        let _ = self.events.send(ClientEvent::Call(payload));
    }

    pub fn set_groups(&self, groups: Vec<GroupFixture>) {
        *self.groups.lock().unwrap() = groups;
    }

    /// Make metadata and invite-link fetches fail for one group.
    pub fn fail_group(&self, group_id: &str) {
        self.failed_groups
            .lock()
            .unwrap()
            .insert(group_id.to_string());
    }

    /// Make one send primitive (`text`, `image`, `file`, `media`) fail.
    pub fn fail_primitive(&self, primitive: &str) {
        self.failed_primitives
            .lock()
            .unwrap()
            .insert(primitive.to_string());
    }

    /// Everything accepted by a send primitive, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn send_via(&self, primitive: &str, to: &str, body: &str) -> Result<String, ClientError> {
        if !self.connected_flag() {
            return Err(ClientError::NotConnected);
        }
        if self.failed_primitives.lock().unwrap().contains(primitive) {
            return Err(ClientError::Send(format!(
                "{primitive} send rejected by loopback"
            )));
        }
        self.sent.lock().unwrap().push(SentMessage {
            to: to.to_string(),
            primitive: primitive.to_string(),
            body: body.to_string(),
        });
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl ChatClient for LoopbackClient {
    async fn is_connected(&self) -> Result<bool, ClientError> {
        if self.fail_liveness.load(Ordering::SeqCst) {
            return Err(ClientError::Query("liveness probe unavailable".to_string()));
        }
        Ok(self.connected_flag())
    }

    async fn state(&self) -> Result<ClientState, ClientError> {
        if self.fail_liveness.load(Ordering::SeqCst) {
            return Err(ClientError::Query("state query unavailable".to_string()));
        }
        Ok(if self.connected_flag() {
            ClientState::Connected
        } else {
            ClientState::AwaitingPairing
        })
    }

    async fn own_id(&self) -> Result<String, ClientError> {
        Ok(self.own_id.clone())
    }

    async fn list_chats(&self) -> Result<Vec<ChatInfo>, ClientError> {
        if !self.connected_flag() {
            return Err(ClientError::NotConnected);
        }
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .map(|group| ChatInfo {
                id: group.id.clone(),
                name: group.name.clone(),
                is_group: true,
            })
            .collect())
    }

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, ClientError> {
        if self.failed_groups.lock().unwrap().contains(group_id) {
            return Err(ClientError::Query(format!(
                "metadata fetch failed for {group_id}"
            )));
        }
        let groups = self.groups.lock().unwrap();
        let group = groups
            .iter()
            .find(|group| group.id == group_id)
            .ok_or_else(|| ClientError::Query(format!("unknown group {group_id}")))?;
        Ok(GroupMetadata {
            id: group.id.clone(),
            subject: group.name.clone(),
            description: group.description.clone(),
            participants: group
                .participants
                .iter()
                .map(|participant| Participant {
                    id: participant.id.clone(),
                    display_name: participant.display_name.clone(),
                })
                .collect(),
        })
    }

    async fn group_invite_link(&self, group_id: &str) -> Result<String, ClientError> {
        if self.failed_groups.lock().unwrap().contains(group_id) {
            return Err(ClientError::Query(format!(
                "invite link fetch failed for {group_id}"
            )));
        }
        self.groups
            .lock()
            .unwrap()
            .iter()
            .find(|group| group.id == group_id)
            .and_then(|group| group.invite_link.clone())
            .ok_or_else(|| ClientError::Query("requester is not a group admin".to_string()))
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<String, ClientError> {
        self.send_via("text", to, text)
    }

    async fn send_image_url(
        &self,
        to: &str,
        url: &str,
        _caption: Option<&str>,
    ) -> Result<String, ClientError> {
        self.send_via("image", to, url)
    }

    async fn send_file_url(
        &self,
        to: &str,
        url: &str,
        _options: &FileOptions,
    ) -> Result<String, ClientError> {
        self.send_via("file", to, url)
    }

    async fn send_media_url(
        &self,
        to: &str,
        url: &str,
        _caption: Option<&str>,
    ) -> Result<String, ClientError> {
        self.send_via("media", to, url)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        debug!(tenant_id = %self.tenant_id, "loopback client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (
        mpsc::UnboundedSender<ClientEvent>,
        mpsc::UnboundedReceiver<ClientEvent>,
    ) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn auto_pairing_script_emits_code_then_connects() {
        let factory = LoopbackFactory::new(LoopbackConfig {
            pairing_delay: Duration::from_millis(5),
            connect_delay: Duration::from_millis(5),
            ..LoopbackConfig::default()
        });
        let (tx, mut rx) = channel();
        let client = factory.create("t1", tx).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ClientEvent::PairingCode { ref code } if code.len() == 8));

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            ClientEvent::StateChange(ClientState::Connected)
        ));
        assert!(client.is_connected().await.unwrap());
    }

    #[tokio::test]
    async fn restored_tenant_skips_pairing() {
        let dir = tempfile::tempdir().unwrap();
        LoopbackFactory::mark_paired(dir.path(), "t1").unwrap();

        let factory = LoopbackFactory::new(
            LoopbackConfig::default().with_credential_dir(dir.path()),
        );
        let (tx, mut rx) = channel();
        let client = factory.create("t1", tx).await.unwrap();

        assert!(client.is_connected().await.unwrap());
        assert!(rx.try_recv().is_err(), "no events for a restored session");
    }

    #[tokio::test]
    async fn going_online_persists_the_marker() {
        let dir = tempfile::tempdir().unwrap();
        let factory = LoopbackFactory::new(
            LoopbackConfig::manual().with_credential_dir(dir.path()),
        );
        let (tx, _rx) = channel();
        factory.create("t1", tx).await.unwrap();

        factory.client("t1").unwrap().go_online();
        assert!(dir.path().join("t1.paired").exists());
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let factory = LoopbackFactory::new(LoopbackConfig::manual());
        let (tx, _rx) = channel();
        let client = factory.create("t1", tx).await.unwrap();

        assert!(matches!(
            client.send_text("123@c.us", "hi").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn primitive_failure_injection() {
        let factory = LoopbackFactory::new(LoopbackConfig::manual());
        let (tx, _rx) = channel();
        let handle = factory.create("t1", tx).await.unwrap();
        let client = factory.client("t1").unwrap();
        client.go_online();
        client.fail_primitive("image");

        assert!(handle
            .send_image_url("123@c.us", "u", None)
            .await
            .is_err());
        assert!(handle.send_media_url("123@c.us", "u", None).await.is_ok());
        assert_eq!(client.sent().len(), 1);
        assert_eq!(client.sent()[0].primitive, "media");
    }
}
