//! REST API for campaign management
//!
//! Operator verbs (create, pause, resume, cancel, retry-message), the
//! scheduler trigger, and the schedule preview, all as JSON over HTTP.
//! Requests are parsed into domain types at the boundary; the store stays
//! the authoritative state, so command responses carry little more than
//! success or failure.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::admission::{Conflict, ExistingCampaign, check_conflicts};
use crate::dispatcher::{CampaignRunResult, Dispatcher};
use crate::domain_types::{CampaignId, CampaignName, MessageId, OwnerId};
use crate::error::CampaignError;
use crate::pacing::plan_schedule;
use crate::policy::PolicyConfig;
use crate::state::CampaignStatus;
use crate::store::{Campaign, CampaignStore, NewCampaign, Recipient};
use crate::time_provider::SharedTimeProvider;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    /// Campaign persistence
    pub store: Arc<dyn CampaignStore>,
    /// The dispatch worker, run inline by the trigger endpoint
    pub dispatcher: Arc<Dispatcher>,
    /// Clock, injected for tests
    pub time: SharedTimeProvider,
    /// Campaign timezone for `HH:MM` policy fields
    pub tz: FixedOffset,
}

/// Health check response for the /api/v1/health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Service status, `"healthy"` whenever the handler runs
    pub status: String,
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Optional detailed message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// One recipient row of a create request
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientPayload {
    /// Display name, interpolated by the send endpoint
    pub name: String,
    /// Destination phone number
    pub phone: String,
    /// Message body
    #[serde(alias = "messageBody", alias = "message_body")]
    pub message: String,
}

/// Campaign creation request
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    /// Campaign name
    pub name: String,
    /// Owning user id
    #[serde(alias = "ownerId")]
    pub owner_id: String,
    /// Start instant; omitted means "start now"
    #[serde(default, alias = "scheduledAt")]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Pacing policy blob, snake_case or camelCase
    #[serde(default)]
    pub config: serde_json::Value,
    /// Recipient rows
    pub recipients: Vec<RecipientPayload>,
}

/// Create request after boundary validation
struct ValidatedCreate {
    name: CampaignName,
    owner_id: OwnerId,
    scheduled_at: Option<DateTime<Utc>>,
    config: PolicyConfig,
    recipients: Vec<Recipient>,
}

impl CreateCampaignRequest {
    /// Parses and validates the request, converting to domain types
    fn parse(self) -> Result<ValidatedCreate, String> {
        let name = CampaignName::try_new(self.name.trim().to_string())
            .map_err(|e| format!("Invalid campaign name: {e}"))?;
        let owner_id =
            OwnerId::parse(&self.owner_id).map_err(|e| format!("Invalid owner id: {e}"))?;

        let config: PolicyConfig = if self.config.is_null() {
            PolicyConfig::default()
        } else {
            serde_json::from_value(self.config).map_err(|e| format!("Invalid config: {e}"))?
        };
        config.validate().map_err(|e| format!("Invalid policy: {e}"))?;

        for (index, recipient) in self.recipients.iter().enumerate() {
            if recipient.phone.trim().is_empty() {
                return Err(format!("Recipient {index} has an empty phone number"));
            }
        }
        let recipients = self
            .recipients
            .into_iter()
            .map(|r| Recipient {
                name: r.name,
                phone: r.phone,
                body: r.message,
            })
            .collect();

        Ok(ValidatedCreate {
            name,
            owner_id,
            scheduled_at: self.scheduled_at,
            config,
            recipients,
        })
    }
}

/// Campaign creation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCampaignResponse {
    /// Generated campaign id
    pub id: String,
    /// Initial status (`scheduled` or `pending`)
    pub status: CampaignStatus,
}

/// Admission conflict response body
#[derive(Debug, Clone, Serialize)]
pub struct ConflictResponse {
    /// Fixed marker for the conflict case
    pub error: String,
    /// Id of the first conflicting campaign
    pub conflicting_campaign_id: String,
    /// Name of the first conflicting campaign
    pub conflicting_campaign_name: String,
    /// Earliest suggested conflict-free start
    pub suggested_start: DateTime<Utc>,
}

impl ConflictResponse {
    fn from_conflict(conflict: Conflict) -> Self {
        Self {
            error: "schedule conflict".to_string(),
            conflicting_campaign_id: conflict.campaign_id.to_string(),
            conflicting_campaign_name: conflict.campaign_name.to_string(),
            suggested_start: conflict.suggested_start,
        }
    }
}

/// Operator command response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command took (or idempotently re-took) effect
    pub success: bool,
    /// Campaign status after the command
    pub status: CampaignStatus,
}

/// Retry command response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryResponse {
    /// The command itself always succeeds
    pub success: bool,
    /// Whether a `failed` row was actually reset to `waiting`
    pub retried: bool,
}

/// Campaign readback view
#[derive(Debug, Clone, Serialize)]
pub struct CampaignView {
    /// Campaign id
    pub id: String,
    /// Owning user id
    pub owner_id: String,
    /// Campaign name
    pub name: String,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// Recipient count, fixed at creation
    pub total_messages: u64,
    /// Confirmed sends
    pub sent_messages: u64,
    /// Accumulated active seconds
    pub execution_time_secs: i64,
    /// Instant at which the campaign becomes eligible
    pub scheduled_at: DateTime<Utc>,
    /// First dispatcher entry
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal timestamp
    pub finished_at: Option<DateTime<Utc>>,
    /// Admission instant
    pub created_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignView {
    fn from(campaign: Campaign) -> Self {
        Self {
            id: campaign.id.to_string(),
            owner_id: campaign.owner_id.to_string(),
            name: campaign.name.to_string(),
            status: campaign.status,
            total_messages: campaign.total_messages,
            sent_messages: campaign.sent_messages,
            execution_time_secs: campaign.execution_time_secs,
            scheduled_at: campaign.scheduled_at,
            started_at: campaign.started_at,
            finished_at: campaign.finished_at,
            created_at: campaign.created_at,
        }
    }
}

/// Scheduler trigger request
#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    /// Target a single campaign; omitted means "scan everything eligible"
    #[serde(default, alias = "campaignId")]
    pub campaign_id: Option<String>,
}

/// Scheduler trigger response; always returned with HTTP 200
#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    /// False only on internal error
    pub success: bool,
    /// Per-campaign outcomes of this invocation
    pub results: Vec<CampaignRunResult>,
}

/// Schedule preview request
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    /// Start instant; omitted means "now"
    #[serde(default, alias = "startAt", alias = "scheduledAt")]
    pub start_at: Option<DateTime<Utc>>,
    /// Number of recipients to plan for
    #[serde(alias = "recipientCount")]
    pub recipient_count: usize,
    /// Pacing policy blob, snake_case or camelCase
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Schedule preview response
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    /// Expected send instant per message, in order
    pub planned: Vec<DateTime<Utc>>,
}

/// Creates the Axum application router with all API endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_check))
        .route("/api/v1/campaigns", post(create_campaign))
        .route("/api/v1/campaigns/preview", post(preview_schedule))
        .route("/api/v1/campaigns/{id}", get(get_campaign))
        .route("/api/v1/campaigns/{id}/pause", post(pause_campaign))
        .route("/api/v1/campaigns/{id}/resume", post(resume_campaign))
        .route("/api/v1/campaigns/{id}/cancel", post(cancel_campaign))
        .route("/api/v1/messages/{id}/retry", post(retry_message))
        .route("/api/v1/dispatch", post(dispatch))
        .with_state(state)
}

fn bad_request(message: impl Into<String>, details: Option<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            details,
        }),
    )
        .into_response()
}

/// Handler for the health check endpoint
async fn health_check() -> Json<HealthCheckResponse> {
    Json(HealthCheckResponse {
        status: "healthy".to_string(),
    })
}

/// Handler for campaign creation: validate, run admission, persist, and
/// kick an immediate dispatch
async fn create_campaign(
    State(state): State<AppState>,
    Json(request): Json<CreateCampaignRequest>,
) -> Response {
    let validated = match request.parse() {
        Ok(validated) => validated,
        Err(message) => return bad_request("Invalid campaign request", Some(message)),
    };

    let now = state.time.now_utc();
    let scheduled_at = validated.scheduled_at.unwrap_or(now);

    let existing = match state.store.campaigns_for_owner(validated.owner_id).await {
        Ok(rows) => rows
            .into_iter()
            .map(|c| ExistingCampaign {
                id: c.id,
                name: c.name,
                start: c.scheduled_at,
                config: c.config,
                total_messages: usize::try_from(c.total_messages).unwrap_or(usize::MAX),
            })
            .collect::<Vec<_>>(),
        Err(e) => return CampaignError::Store(e).into_response(),
    };

    if let Some(conflict) = check_conflicts(
        &validated.config,
        scheduled_at,
        validated.recipients.len(),
        &existing,
        state.tz,
    ) {
        return (
            StatusCode::CONFLICT,
            Json(ConflictResponse::from_conflict(conflict)),
        )
            .into_response();
    }

    let status = if scheduled_at > now {
        CampaignStatus::Scheduled
    } else {
        CampaignStatus::Pending
    };
    let campaign = NewCampaign {
        id: CampaignId::generate(),
        owner_id: validated.owner_id,
        name: validated.name,
        status,
        scheduled_at,
        config: validated.config,
        created_at: now,
    };

    if let Err(e) = state
        .store
        .create_campaign(&campaign, &validated.recipients)
        .await
    {
        return CampaignError::Store(e).into_response();
    }

    // Immediate dispatcher run; the periodic trigger picks up whatever this
    // invocation cannot finish.
    let dispatcher = state.dispatcher.clone();
    let campaign_id = campaign.id;
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(Some(campaign_id)).await {
            warn!(campaign_id = %campaign_id, error = %e, "Post-create dispatch failed");
        }
    });

    (
        StatusCode::CREATED,
        Json(CreateCampaignResponse {
            id: campaign.id.to_string(),
            status,
        }),
    )
        .into_response()
}

/// Handler for campaign readback
async fn get_campaign(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(campaign_id) = CampaignId::parse(&id) else {
        return bad_request(
            "Invalid campaign id",
            Some("Campaign id must be a valid UUID".to_string()),
        );
    };
    match state.store.campaign(campaign_id).await {
        Ok(Some(campaign)) => (StatusCode::OK, Json(CampaignView::from(campaign))).into_response(),
        Ok(None) => CampaignError::CampaignNotFound(campaign_id).into_response(),
        Err(e) => CampaignError::Store(e).into_response(),
    }
}

/// Shared body of the pause/resume/cancel commands
async fn apply_status_command(
    state: &AppState,
    id: &str,
    requested: CampaignStatus,
    transition: fn(CampaignStatus) -> Option<CampaignStatus>,
) -> Response {
    let Ok(campaign_id) = CampaignId::parse(id) else {
        return bad_request(
            "Invalid campaign id",
            Some("Campaign id must be a valid UUID".to_string()),
        );
    };
    let current = match state.store.campaign_status(campaign_id).await {
        Ok(Some(status)) => status,
        Ok(None) => return CampaignError::CampaignNotFound(campaign_id).into_response(),
        Err(e) => return CampaignError::Store(e).into_response(),
    };

    let Some(next) = transition(current) else {
        return CampaignError::IllegalTransition {
            id: campaign_id,
            current,
            requested,
        }
        .into_response();
    };

    if next != current {
        if let Err(e) = state.store.set_campaign_status(campaign_id, next).await {
            return CampaignError::Store(e).into_response();
        }
    }
    (
        StatusCode::OK,
        Json(CommandResponse {
            success: true,
            status: next,
        }),
    )
        .into_response()
}

/// Handler for the pause command; idempotent
async fn pause_campaign(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    apply_status_command(&state, &id, CampaignStatus::Paused, CampaignStatus::apply_pause).await
}

/// Handler for the resume command; idempotent
async fn resume_campaign(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    apply_status_command(&state, &id, CampaignStatus::Active, CampaignStatus::apply_resume).await
}

/// Handler for the cancel command; terminal
async fn cancel_campaign(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    apply_status_command(
        &state,
        &id,
        CampaignStatus::Canceled,
        CampaignStatus::apply_cancel,
    )
    .await
}

/// Handler for the retry-message command
///
/// Only a `failed` row is reset to `waiting`; any other source state is a
/// no-op reported as `retried: false`.
async fn retry_message(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Ok(message_id) = MessageId::parse(&id) else {
        return bad_request(
            "Invalid message id",
            Some("Message id must be a valid UUID".to_string()),
        );
    };
    match state.store.message(message_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return CampaignError::MessageNotFound(message_id).into_response(),
        Err(e) => return CampaignError::Store(e).into_response(),
    }
    match state.store.retry_message(message_id).await {
        Ok(retried) => (
            StatusCode::OK,
            Json(RetryResponse {
                success: true,
                retried,
            }),
        )
            .into_response(),
        Err(e) => CampaignError::Store(e).into_response(),
    }
}

/// Handler for the scheduler trigger
///
/// Always answers HTTP 200, flagging internal errors in the body, so an
/// external scheduler never sees a retryable failure and storms the worker.
async fn dispatch(State(state): State<AppState>, body: Bytes) -> Json<DispatchResponse> {
    let request: DispatchRequest = if body.is_empty() {
        DispatchRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Dispatch trigger with unreadable body");
                return Json(DispatchResponse {
                    success: false,
                    results: Vec::new(),
                });
            }
        }
    };
    let target = match request.campaign_id {
        None => None,
        Some(raw) => match CampaignId::parse(&raw) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(campaign_id = %raw, error = %e, "Dispatch trigger with bad campaign id");
                return Json(DispatchResponse {
                    success: false,
                    results: Vec::new(),
                });
            }
        },
    };

    match state.dispatcher.run(target).await {
        Ok(results) => Json(DispatchResponse {
            success: true,
            results,
        }),
        Err(e) => {
            error!(error = %e, "Dispatcher invocation failed");
            Json(DispatchResponse {
                success: false,
                results: Vec::new(),
            })
        }
    }
}

/// Handler for the operator schedule preview
async fn preview_schedule(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Response {
    let config: PolicyConfig = if request.config.is_null() {
        PolicyConfig::default()
    } else {
        match serde_json::from_value(request.config) {
            Ok(config) => config,
            Err(e) => return bad_request("Invalid config", Some(e.to_string())),
        }
    };
    if let Err(e) = config.validate() {
        return CampaignError::Policy(e).into_response();
    }

    let start = request.start_at.unwrap_or_else(|| state.time.now_utc());
    let planned = plan_schedule(&config, start, request.recipient_count, state.tz);
    (StatusCode::OK, Json(PreviewResponse { planned })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_payload_accepts_message_body_alias() {
        let payload: RecipientPayload =
            serde_json::from_str(r#"{"name": "Ada", "phone": "+55", "messageBody": "hi"}"#)
                .unwrap();
        assert_eq!(payload.message, "hi");
    }

    #[test]
    fn create_request_rejects_empty_phone() {
        let request = CreateCampaignRequest {
            name: "launch".to_string(),
            owner_id: OwnerId::generate().to_string(),
            scheduled_at: None,
            config: serde_json::Value::Null,
            recipients: vec![RecipientPayload {
                name: "Ada".to_string(),
                phone: "  ".to_string(),
                message: "hi".to_string(),
            }],
        };
        assert!(request.parse().is_err());
    }

    #[test]
    fn create_request_defaults_config() {
        let request = CreateCampaignRequest {
            name: "launch".to_string(),
            owner_id: OwnerId::generate().to_string(),
            scheduled_at: None,
            config: serde_json::Value::Null,
            recipients: Vec::new(),
        };
        let validated = request.parse().unwrap();
        assert_eq!(validated.config, PolicyConfig::default());
    }
}
