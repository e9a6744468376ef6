//! The campaign dispatcher
//!
//! Worker entry point, invoked once when a campaign is created and then
//! periodically by the scheduler trigger. Each invocation runs under a hard
//! wall-clock budget so it can be hosted by short-lived workers: any pacing
//! delay that would cross the budget ends the invocation, and the next one
//! resumes from the store. Progress is crash-safe because every message
//! moves through claim-send-commit against the store; the only coordination
//! points are the claim CAS and the monotone sent counter.
//!
//! Within one invocation a campaign's messages are processed strictly
//! serially. Operator pause/cancel commands are re-read from the store
//! before every claim, so they take effect within one message at worst.

use chrono::{DateTime, Duration as TimeDelta, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::domain_types::CampaignId;
use crate::pacing::{one_shot_pause_active, outside_business_hours, sample_required_delay_secs};
use crate::sender::MessageSender;
use crate::state::CampaignStatus;
use crate::store::{Campaign, CampaignStore, StoreError};
use crate::time_provider::SharedTimeProvider;

/// Hard wall-clock budget for one dispatcher invocation
pub const INVOCATION_BUDGET: Duration = Duration::from_secs(55);

/// Age after which a `sending` claim is treated as abandoned by a dead
/// worker and swept back to `waiting`
pub const STALE_CLAIM_AGE_SECS: i64 = 120;

/// How one campaign left this invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Work remains; the next invocation picks the campaign up again
    Continued,
    /// Every message reached a terminal row state
    Finished,
    /// A pause gate held the campaign without persisting a status change
    PausedTemporarily,
}

/// Per-campaign result of one invocation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignRunResult {
    /// Campaign id
    pub id: CampaignId,
    /// Confirmed sends committed by this invocation
    pub messages_sent: u64,
    /// Outcome for this campaign
    pub status: RunOutcome,
}

/// The campaign dispatch worker
pub struct Dispatcher {
    store: Arc<dyn CampaignStore>,
    sender: Arc<dyn MessageSender>,
    time: SharedTimeProvider,
    tz: FixedOffset,
    budget: Duration,
}

impl Dispatcher {
    /// Assembles a dispatcher over its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn CampaignStore>,
        sender: Arc<dyn MessageSender>,
        time: SharedTimeProvider,
        tz: FixedOffset,
    ) -> Self {
        Self {
            store,
            sender,
            time,
            tz,
            budget: INVOCATION_BUDGET,
        }
    }

    /// Builder: override the invocation budget
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Runs one budgeted invocation
    ///
    /// With a target id only that campaign is considered, and its
    /// `scheduled_at` is not checked; a scan processes every eligible
    /// campaign in arrival order until the budget runs out.
    ///
    /// # Errors
    ///
    /// Returns a store error only when the initial eligibility scan fails;
    /// per-campaign store errors abandon that campaign for this invocation
    /// and the scan moves on.
    #[instrument(skip(self), fields(target = ?target.map(|id| id.to_string())))]
    pub async fn run(
        &self,
        target: Option<CampaignId>,
    ) -> Result<Vec<CampaignRunResult>, StoreError> {
        let deadline = self.time.instant() + self.budget;
        let now = self.time.now_utc();

        let campaigns = self.store.eligible_campaigns(now, target).await?;
        debug!(count = campaigns.len(), "Dispatcher invocation started");

        let mut results = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            if self.time.instant() >= deadline {
                debug!(campaign_id = %campaign.id, "Budget exhausted before campaign");
                break;
            }
            let mut sent = 0u64;
            let outcome = match self.drive_campaign(&campaign, deadline, &mut sent).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        campaign_id = %campaign.id,
                        error = %e,
                        "Abandoning campaign for this invocation"
                    );
                    RunOutcome::Continued
                }
            };
            results.push(CampaignRunResult {
                id: campaign.id,
                messages_sent: sent,
                status: outcome,
            });
        }
        Ok(results)
    }

    /// Advances a single campaign as far as the budget and gates allow
    async fn drive_campaign(
        &self,
        campaign: &Campaign,
        deadline: Instant,
        sent_in_run: &mut u64,
    ) -> Result<RunOutcome, StoreError> {
        let now = self.time.now_utc();

        if campaign.status.is_not_started() || campaign.status == CampaignStatus::Active {
            self.store.mark_campaign_started(campaign.id, now).await?;
        }
        let started_at = campaign.started_at.unwrap_or(now);
        // The one-shot day check compares against the day the campaign
        // first became active, or its scheduled start before first entry.
        let start_reference = campaign.started_at.unwrap_or(campaign.scheduled_at);

        self.store
            .release_stale_sending(campaign.id, now - TimeDelta::seconds(STALE_CLAIM_AGE_SECS))
            .await?;

        // Pause gates, in order: the one-shot interruption first, then the
        // recurring business-hours window. Neither persists a status; the
        // gates are simply re-evaluated on the next invocation.
        if let Some(one_shot) = &campaign.config.automatic_pause {
            if one_shot_pause_active(one_shot, now, start_reference, self.tz) {
                info!(
                    campaign_id = %campaign.id,
                    resume_at = %one_shot.resume_at,
                    "Campaign held by one-shot pause"
                );
                return Ok(RunOutcome::PausedTemporarily);
            }
        }
        if let Some((pause_at, resume_at)) = campaign.config.business_hours() {
            if outside_business_hours(now, self.tz, pause_at, resume_at) {
                info!(
                    campaign_id = %campaign.id,
                    window_open = %resume_at,
                    "Campaign held outside business hours"
                );
                return Ok(RunOutcome::PausedTemporarily);
            }
        }

        let counts = self.store.message_counts(campaign.id).await?;
        if counts.outstanding() == 0 {
            self.finalize(campaign.id, started_at).await?;
            return Ok(RunOutcome::Finished);
        }

        let outcome = self
            .send_loop(campaign.id, started_at, deadline, sent_in_run)
            .await?;
        if outcome != RunOutcome::Finished {
            let elapsed = (self.time.now_utc() - started_at).num_seconds();
            self.store
                .record_execution_time(campaign.id, elapsed.max(0))
                .await?;
        }
        Ok(outcome)
    }

    /// Serial claim-send-commit loop for one campaign
    async fn send_loop(
        &self,
        campaign_id: CampaignId,
        started_at: DateTime<Utc>,
        deadline: Instant,
        sent_in_run: &mut u64,
    ) -> Result<RunOutcome, StoreError> {
        loop {
            // Operator commands take effect no later than the next claim.
            let Some(current) = self.store.campaign(campaign_id).await? else {
                return Ok(RunOutcome::Continued);
            };
            if !current.status.is_eligible() {
                info!(
                    campaign_id = %campaign_id,
                    status = %current.status,
                    "Send loop stopped by operator command"
                );
                return Ok(RunOutcome::Continued);
            }

            let last_sent = self.store.last_sent_at(campaign_id).await?;
            let now = self.time.now_utc();
            let wait_secs = match last_sent {
                // No message has ever been claimed or sent: go immediately.
                None => 0,
                Some(last) => {
                    let required =
                        sample_required_delay_secs(&current.config, current.sent_messages);
                    required - (now - last).num_seconds()
                }
            };
            if wait_secs > 0 {
                let wait = Duration::from_secs(u64::try_from(wait_secs).unwrap_or(0));
                let remaining = deadline.saturating_duration_since(self.time.instant());
                if wait > remaining {
                    debug!(
                        campaign_id = %campaign_id,
                        wait_secs,
                        "Pacing delay crosses the invocation budget"
                    );
                    return Ok(RunOutcome::Continued);
                }
                self.time.sleep(wait).await;
            }

            let claim_at = self.time.now_utc();
            let Some(claimed) = self.store.claim_next_waiting(campaign_id, claim_at).await?
            else {
                // Nothing left to claim; finish unless another worker still
                // has a message in flight.
                let counts = self.store.message_counts(campaign_id).await?;
                if counts.outstanding() == 0 {
                    self.finalize(campaign_id, started_at).await?;
                    return Ok(RunOutcome::Finished);
                }
                return Ok(RunOutcome::Continued);
            };

            match self.sender.send(&claimed.recipient).await {
                Ok(()) => {
                    self.store
                        .mark_message_sent(claimed.id, self.time.now_utc())
                        .await?;
                    self.store.increment_sent_messages(campaign_id).await?;
                    *sent_in_run += 1;
                    debug!(campaign_id = %campaign_id, message_id = %claimed.id, "Message sent");
                }
                Err(e) => {
                    warn!(
                        campaign_id = %campaign_id,
                        message_id = %claimed.id,
                        error = %e,
                        "Send failed, message marked for operator retry"
                    );
                    self.store
                        .mark_message_failed(claimed.id, &e.to_string())
                        .await?;
                }
            }

            if self.time.instant() >= deadline {
                return Ok(RunOutcome::Continued);
            }
        }
    }

    /// Finishes a campaign: reconciles the sent counter against the actual
    /// `sent` rows and stamps the terminal timestamps
    async fn finalize(
        &self,
        campaign_id: CampaignId,
        started_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = self.time.now_utc();
        let elapsed = (now - started_at).num_seconds().max(0);
        self.store.finalize_campaign(campaign_id, now, elapsed).await?;
        info!(campaign_id = %campaign_id, "Campaign finished");
        Ok(())
    }
}
