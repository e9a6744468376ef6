//! Error types for drip

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::domain_types::{CampaignId, MessageId};
use crate::policy::PolicyError;
use crate::rest_api::ErrorResponse;
use crate::state::CampaignStatus;
use crate::store::StoreError;

/// Main error type for campaign operations
#[derive(Error, Debug)]
pub enum CampaignError {
    /// The submitted pacing policy failed validation at admission
    #[error("Policy rejected: {0}")]
    Policy(#[from] PolicyError),

    /// Campaign row does not exist
    #[error("Campaign not found: {0}")]
    CampaignNotFound(CampaignId),

    /// Message row does not exist
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    /// The requested status change is not legal from the current state
    #[error("Illegal transition for campaign {id}: {current} -> {requested}")]
    IllegalTransition {
        /// Campaign the command targeted
        id: CampaignId,
        /// Status the campaign currently holds
        current: CampaignStatus,
        /// Status the command asked for
        requested: CampaignStatus,
    },

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CampaignError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Policy(_) => StatusCode::BAD_REQUEST,
            Self::CampaignNotFound(_) | Self::MessageNotFound(_) => StatusCode::NOT_FOUND,
            Self::IllegalTransition { .. } => StatusCode::CONFLICT,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Store(_)) {
            error!(error = %self, "Request failed on the store");
        }
        let body = ErrorResponse {
            error: match &self {
                Self::Policy(_) => "policy rejected".to_string(),
                Self::CampaignNotFound(_) => "campaign not found".to_string(),
                Self::MessageNotFound(_) => "message not found".to_string(),
                Self::IllegalTransition { .. } => "illegal transition".to_string(),
                Self::Store(_) => "store failure".to_string(),
            },
            details: Some(self.to_string()),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_operator_facing_status_codes() {
        let policy = CampaignError::Policy(PolicyError {
            field: "min_interval",
            reason: "too small".to_string(),
        });
        assert_eq!(policy.status_code(), StatusCode::BAD_REQUEST);

        let missing = CampaignError::CampaignNotFound(CampaignId::generate());
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let illegal = CampaignError::IllegalTransition {
            id: CampaignId::generate(),
            current: CampaignStatus::Canceled,
            requested: CampaignStatus::Paused,
        };
        assert_eq!(illegal.status_code(), StatusCode::CONFLICT);
    }
}
