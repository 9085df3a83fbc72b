use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use courier_protocol::{DispatchResult, FileOptions};

use crate::client::{ChatClient, ClientError};
use crate::error::CourierError;
use crate::session::SessionRegistry;

type SendAttempt<'a> = Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>>;

/// Outcome of one `send_message` call: each requested part reported
/// independently.
#[derive(Debug, Clone)]
pub struct MessageOutcome {
    pub text: Option<DispatchResult>,
    pub image: Option<DispatchResult>,
}

/// Sends outbound messages, falling back across overlapping underlying
/// primitives until one succeeds.
#[derive(Clone)]
pub struct DispatchService {
    registry: Arc<SessionRegistry>,
}

impl DispatchService {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch a text and/or image message. The two parts are independent:
    /// a failure in one never aborts or masks the other.
    pub async fn send_message(
        &self,
        tenant_id: &str,
        destination: &str,
        text: Option<&str>,
        image: Option<&str>,
    ) -> Result<MessageOutcome, CourierError> {
        if destination.is_empty() {
            return Err(CourierError::InvalidRequest(
                "destination must not be empty".to_string(),
            ));
        }
        if text.is_none() && image.is_none() {
            return Err(CourierError::InvalidRequest(
                "at least one of text or image is required".to_string(),
            ));
        }
        let handle = self.resolve_handle(tenant_id).await?;

        // The suffix only classifies the destination for logging; dispatch
        // does not branch on it.
        let kind = if destination.ends_with("@g.us") {
            "group"
        } else {
            "individual"
        };
        debug!(tenant_id, destination, kind, "dispatching message");

        let text_result = match text {
            Some(body) => Some(match handle.send_text(destination, body).await {
                Ok(message_id) => DispatchResult::Sent {
                    primitive: "text".to_string(),
                    message_id,
                },
                Err(err) => {
                    warn!(tenant_id, destination, %err, "text send failed");
                    DispatchResult::Failed {
                        error: err.to_string(),
                    }
                }
            }),
            None => None,
        };

        let image_result = match image {
            Some(url) => {
                let caption: Option<&str> = None;
                let file_options = FileOptions::default();
                let attempts: Vec<(&str, SendAttempt<'_>)> = vec![
                    (
                        "image",
                        Box::pin(handle.send_image_url(destination, url, caption)),
                    ),
                    (
                        "file",
                        Box::pin(handle.send_file_url(destination, url, &file_options)),
                    ),
                    (
                        "media",
                        Box::pin(handle.send_media_url(destination, url, caption)),
                    ),
                ];
                Some(Self::try_attempts(tenant_id, destination, attempts).await)
            }
            None => None,
        };

        info!(
            tenant_id,
            destination,
            text_sent = text_result.as_ref().map(DispatchResult::is_sent),
            image_sent = image_result.as_ref().map(DispatchResult::is_sent),
            "message dispatch finished"
        );
        Ok(MessageOutcome {
            text: text_result,
            image: image_result,
        })
    }

    /// Dispatch a generic file by URL with caller-supplied options, using the
    /// same fallback strategy as image dispatch.
    pub async fn send_file(
        &self,
        tenant_id: &str,
        destination: &str,
        file_url: &str,
        options: &FileOptions,
    ) -> Result<DispatchResult, CourierError> {
        if destination.is_empty() {
            return Err(CourierError::InvalidRequest(
                "destination must not be empty".to_string(),
            ));
        }
        if file_url.is_empty() {
            return Err(CourierError::InvalidRequest(
                "file_url must not be empty".to_string(),
            ));
        }
        let handle = self.resolve_handle(tenant_id).await?;

        let attempts: Vec<(&str, SendAttempt<'_>)> = vec![
            (
                "file",
                Box::pin(handle.send_file_url(destination, file_url, options)),
            ),
            (
                "media",
                Box::pin(handle.send_media_url(
                    destination,
                    file_url,
                    options.caption.as_deref(),
                )),
            ),
        ];
        Ok(Self::try_attempts(tenant_id, destination, attempts).await)
    }

    /// Run the ordered attempt chain: first success wins, every failure is
    /// recorded and the last one is reported if the chain is exhausted.
    async fn try_attempts(
        tenant_id: &str,
        destination: &str,
        attempts: Vec<(&str, SendAttempt<'_>)>,
    ) -> DispatchResult {
        let mut last_error = None;
        for (primitive, attempt) in attempts {
            match attempt.await {
                Ok(message_id) => {
                    debug!(tenant_id, destination, primitive, "send primitive succeeded");
                    return DispatchResult::Sent {
                        primitive: primitive.to_string(),
                        message_id,
                    };
                }
                Err(err) => {
                    warn!(tenant_id, destination, primitive, %err, "send primitive failed");
                    last_error = Some(err);
                }
            }
        }
        DispatchResult::Failed {
            error: last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no send primitive available".to_string()),
        }
    }

    async fn resolve_handle(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn ChatClient>, CourierError> {
        if !self.registry.contains(tenant_id).await {
            return Err(CourierError::SessionNotFound(tenant_id.to_string()));
        }
        self.registry
            .handle(tenant_id)
            .await
            .ok_or_else(|| CourierError::ClientUnavailable(tenant_id.to_string()))
    }
}
