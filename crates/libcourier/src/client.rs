//! The seam to the underlying chat-protocol library.
//!
//! The wire protocol itself is out of scope: a deployment provides a
//! [`ChatClient`] implementation over whatever protocol library it uses, and a
//! [`ClientFactory`] that builds one client per tenant. Everything above this
//! module (supervisor, status, discovery, dispatch) is written against these
//! traits. The bundled [`crate::loopback`] transport implements them
//! in-process for development and tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use courier_protocol::FileOptions;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// Connection lifecycle states reported by the underlying client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Initializing,
    AwaitingPairing,
    Connected,
    Disconnected,
    LoggedOut,
}

impl ClientState {
    /// States meaning "fully connected".
    pub fn is_online(&self) -> bool {
        matches!(self, ClientState::Connected)
    }

    /// States meaning "logged out / disconnected / unpaired".
    pub fn is_offline(&self) -> bool {
        matches!(self, ClientState::Disconnected | ClientState::LoggedOut)
    }
}

/// Lifecycle callbacks from the underlying client, delivered over the channel
/// handed to [`ClientFactory::create`].
#[derive(Debug, Clone)]
pub enum ClientEvent {
    PairingCode { code: String },
    StateChange(ClientState),
    Message(serde_json::Value),
    Call(serde_json::Value),
}

/// One chat as enumerated by the client.
#[derive(Debug, Clone)]
pub struct ChatInfo {
    pub id: String,
    pub name: String,
    pub is_group: bool,
}

/// Metadata for a group chat, including its membership.
#[derive(Debug, Clone)]
pub struct GroupMetadata {
    pub id: String,
    pub subject: String,
    pub description: Option<String>,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone)]
pub struct Participant {
    /// Protocol-level id, e.g. `491701234567@c.us` or `12345:2@s.whatsapp.net`.
    pub id: String,
    pub display_name: Option<String>,
}

/// A live connection to the chat network for one tenant.
///
/// Implementations serialize their own operations internally; callers may
/// invoke methods from multiple request paths without external locking.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Direct liveness probe. Preferred ground truth for status queries.
    async fn is_connected(&self) -> Result<bool, ClientError>;

    /// State query, used as a fallback when the boolean probe fails.
    async fn state(&self) -> Result<ClientState, ClientError>;

    /// The caller's own protocol-level identifier.
    async fn own_id(&self) -> Result<String, ClientError>;

    async fn list_chats(&self) -> Result<Vec<ChatInfo>, ClientError>;

    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, ClientError>;

    /// Fails when the caller is not an admin of the group.
    async fn group_invite_link(&self, group_id: &str) -> Result<String, ClientError>;

    /// Returns the protocol message id on success.
    async fn send_text(&self, to: &str, text: &str) -> Result<String, ClientError>;

    async fn send_image_url(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<String, ClientError>;

    async fn send_file_url(
        &self,
        to: &str,
        url: &str,
        options: &FileOptions,
    ) -> Result<String, ClientError>;

    async fn send_media_url(
        &self,
        to: &str,
        url: &str,
        caption: Option<&str>,
    ) -> Result<String, ClientError>;

    /// Close the connection. Idempotent.
    async fn disconnect(&self);
}

/// Builds one client per tenant.
///
/// The factory owns transport configuration and the per-tenant credential
/// cache; passing the same `tenant_id` again must reuse that tenant's cached
/// credentials so a previously paired session restores without a new pairing
/// round. Lifecycle events must flow into `events` from before the connection
/// attempt starts, so no pairing code is lost.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(
        &self,
        tenant_id: &str,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Result<Arc<dyn ChatClient>, ClientError>;
}
