use serde::{Deserialize, Serialize};

/// Opaque identifier for a tenant (one business account, one session).
pub type TenantId = String;

/// Events fanned out by the relay to every subscriber.
///
/// Events for the same tenant preserve emission order; there is no ordering
/// guarantee across tenants and no replay for late subscribers.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    /// A pairing artifact is ready for the end user to scan.
    PairingCode { tenant_id: TenantId, code: String },
    /// The session is fully connected; any pairing code is now void.
    Ready { tenant_id: TenantId },
    /// The underlying client could not be created or authenticated.
    AuthFailed { tenant_id: TenantId, error: String },
    /// The session dropped offline (logged out, unpaired, or explicit
    /// disconnect).
    Disconnected { tenant_id: TenantId },
    /// Inbound message, republished untransformed.
    Message {
        tenant_id: TenantId,
        payload: serde_json::Value,
    },
    /// Inbound call notification, republished untransformed.
    Call {
        tenant_id: TenantId,
        payload: serde_json::Value,
    },
}

impl Event {
    pub fn tenant_id(&self) -> &str {
        match self {
            Event::PairingCode { tenant_id, .. }
            | Event::Ready { tenant_id }
            | Event::AuthFailed { tenant_id, .. }
            | Event::Disconnected { tenant_id }
            | Event::Message { tenant_id, .. }
            | Event::Call { tenant_id, .. } => tenant_id,
        }
    }
}

/// Snapshot answer to "is this tenant connected, and what code is pending".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub connected: bool,
    pub pairing_code: Option<String>,
}

/// A group chat discovered for a tenant. Ephemeral, never persisted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub member_count: u32,
    /// Absent when the caller lacks admin rights on the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A contact deduplicated across all groups scanned in one discovery pass.
///
/// `identifier` is the dedup key: a resolved phone number, or the raw
/// protocol-level id when resolution fails.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Contact {
    pub identifier: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

/// Outcome of one dispatch attempt chain.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchResult {
    /// The named primitive accepted the message.
    Sent {
        primitive: String,
        message_id: String,
    },
    /// Every primitive in the chain failed; `error` is the last failure.
    Failed { error: String },
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchResult::Sent { .. })
    }
}

/// Structured error codes carried on HTTP error bodies.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SessionNotFound,
    ClientUnavailable,
    InvalidRequest,
    ServerError,
}

// ---------------------------------------------------------------------------
// HTTP request/response bodies
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InitSessionRequest {
    pub tenant_id: TenantId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct InitSessionResponse {
    pub status: String,
    pub tenant_id: TenantId,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GroupsResponse {
    pub groups: Vec<Group>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContactsResponse {
    pub contacts: Vec<Contact>,
    pub total: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendMessageRequest {
    pub destination: String,
    #[serde(default)]
    pub text: Option<String>,
    /// URL (or data URI) of an image to send.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendMessageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_result: Option<DispatchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_result: Option<DispatchResult>,
}

/// Caller-supplied options for a generic file send.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct FileOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendFileRequest {
    pub destination: String,
    pub file_url: String,
    #[serde(default)]
    pub options: FileOptions,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SendFileResponse {
    pub success: bool,
    pub result: DispatchResult,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// One row of the session listing.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionSummary {
    pub tenant_id: TenantId,
    pub connected: bool,
    /// True while a pairing code is pending for this tenant.
    pub pairing: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tag_format() {
        let event = Event::PairingCode {
            tenant_id: "t1".to_string(),
            code: "ABC123".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"pairing-code","tenant_id":"t1","code":"ABC123"}"#
        );

        let json = serde_json::to_string(&Event::Ready {
            tenant_id: "t1".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"ready","tenant_id":"t1"}"#);

        let json = serde_json::to_string(&Event::AuthFailed {
            tenant_id: "t1".to_string(),
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"auth-failed","tenant_id":"t1","error":"boom"}"#
        );
    }

    #[test]
    fn event_roundtrip_with_payload() {
        let event = Event::Message {
            tenant_id: "acme".to_string(),
            payload: serde_json::json!({"from": "123@c.us", "body": "hi"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        match parsed {
            Event::Message { tenant_id, payload } => {
                assert_eq!(tenant_id, "acme");
                assert_eq!(payload["body"], "hi");
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn event_tenant_id_accessor() {
        let event = Event::Disconnected {
            tenant_id: "t9".to_string(),
        };
        assert_eq!(event.tenant_id(), "t9");
    }

    #[test]
    fn dispatch_result_tags() {
        let sent = DispatchResult::Sent {
            primitive: "image".to_string(),
            message_id: "m1".to_string(),
        };
        let json = serde_json::to_string(&sent).unwrap();
        assert_eq!(
            json,
            r#"{"status":"sent","primitive":"image","message_id":"m1"}"#
        );
        assert!(sent.is_sent());

        let failed = DispatchResult::Failed {
            error: "no route".to_string(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert_eq!(json, r#"{"status":"failed","error":"no route"}"#);
        assert!(!failed.is_sent());
    }

    #[test]
    fn send_request_optional_parts() {
        let req: SendMessageRequest =
            serde_json::from_str(r#"{"destination":"123@c.us","text":"hi"}"#).unwrap();
        assert_eq!(req.destination, "123@c.us");
        assert_eq!(req.text.as_deref(), Some("hi"));
        assert!(req.image.is_none());
    }

    #[test]
    fn file_request_defaults_options() {
        let req: SendFileRequest = serde_json::from_str(
            r#"{"destination":"42@g.us","file_url":"https://example.test/report.pdf"}"#,
        )
        .unwrap();
        assert!(req.options.caption.is_none());
        assert!(req.options.file_name.is_none());
    }

    #[test]
    fn session_status_default_is_disconnected() {
        let status = SessionStatus::default();
        assert!(!status.connected);
        assert!(status.pairing_code.is_none());
    }

    #[test]
    fn group_omits_absent_invite_link() {
        let group = Group {
            id: "1@g.us".to_string(),
            name: "Sales".to_string(),
            member_count: 2,
            invite_link: None,
            description: None,
        };
        let json = serde_json::to_string(&group).unwrap();
        assert!(!json.contains("invite_link"));
    }
}
