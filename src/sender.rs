//! Send endpoint client
//!
//! The downstream messaging gateway is an external collaborator; only its
//! contract lives here. A send is a `POST` with a JSON body of
//! `{"name", "phone", "message"}`; success is HTTP 2xx with
//! `{"success": true}` in the body, anything else is a failure the
//! dispatcher records on the message row.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::store::Recipient;

/// Wall-clock timeout for one send invocation
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Failure modes of a send attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The send invocation exceeded its wall-clock timeout
    #[error("timeout")]
    Timeout,

    /// The endpoint answered outside the 2xx range
    #[error("endpoint returned HTTP {status}: {body}")]
    Http {
        /// Response status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// The endpoint answered 2xx but reported `success = false`
    #[error("endpoint rejected the message: {0}")]
    Rejected(String),

    /// Connection-level failure before any response
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    name: &'a str,
    phone: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

/// The dispatcher's view of the send endpoint
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Delivers one message; `Ok` only on a confirmed success
    async fn send(&self, recipient: &Recipient) -> Result<(), SendError>;
}

/// HTTP implementation of the send endpoint contract
pub struct HttpMessageSender {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMessageSender {
    /// Builds a client against the given endpoint URL
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be constructed
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| SendError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(&self, recipient: &Recipient) -> Result<(), SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendRequest {
                name: &recipient.name,
                phone: &recipient.phone,
                message: &recipient.body,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                SendError::Timeout
            } else {
                SendError::Transport(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(SendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::Rejected(format!("unparseable response: {e}")))?;
        if parsed.success {
            Ok(())
        } else {
            Err(SendError::Rejected(
                parsed.error.unwrap_or_else(|| "success = false".to_string()),
            ))
        }
    }
}
