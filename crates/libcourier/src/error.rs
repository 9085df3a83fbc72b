use thiserror::Error;

use courier_protocol::{ErrorCode, TenantId};

use crate::client::ClientError;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("no session for tenant: {0}")]
    SessionNotFound(TenantId),

    #[error("session for tenant {0} has no live client")]
    ClientUnavailable(TenantId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

impl CourierError {
    /// Convert to a protocol error code and sanitized message.
    pub fn to_error_code(&self) -> (ErrorCode, String) {
        match self {
            CourierError::SessionNotFound(_) => (ErrorCode::SessionNotFound, self.to_string()),
            CourierError::ClientUnavailable(_) => (ErrorCode::ClientUnavailable, self.to_string()),
            CourierError::InvalidRequest(_) => (ErrorCode::InvalidRequest, self.to_string()),
            CourierError::Client(_) => (ErrorCode::ServerError, self.to_string()),
        }
    }
}
