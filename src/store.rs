//! Campaign store: persistence contract and its `SQLite` implementation
//!
//! The dispatcher never talks to `SQLx` directly; it sees the
//! `CampaignStore` trait. The two coordination-sensitive operations are the
//! message claim (a compare-and-swap on `status`, so exactly one worker wins
//! a row) and the monotone `sent_messages` increment (a single `UPDATE ...
//! SET x = x + 1`, atomic with respect to concurrent workers). Everything
//! else is plain reads and unconditional writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::database::DatabaseConnection;
use crate::domain_types::{CampaignId, CampaignName, MessageId, OwnerId};
use crate::policy::PolicyConfig;
use crate::state::{CampaignStatus, MessageStatus};

/// Longest error text retained on a failed message row
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

const ELIGIBLE_STATUSES: &str = "'scheduled', 'pending', 'processing', 'active'";

// SQL for campaign rows

const INSERT_CAMPAIGN: &str = r"
INSERT INTO campaigns (
    id, owner_id, name, status, total_messages, sent_messages,
    execution_time_secs, scheduled_at, started_at, finished_at, config, created_at
) VALUES (?, ?, ?, ?, ?, 0, 0, ?, NULL, NULL, ?, ?);
";

const SELECT_CAMPAIGN_COLUMNS: &str = r"
SELECT id, owner_id, name, status, total_messages, sent_messages,
       execution_time_secs, scheduled_at, started_at, finished_at, config, created_at
FROM campaigns
";

const SELECT_CAMPAIGN_STATUS: &str = r"
SELECT status FROM campaigns WHERE id = ?;
";

const UPDATE_CAMPAIGN_STATUS: &str = r"
UPDATE campaigns SET status = ? WHERE id = ?;
";

const MARK_CAMPAIGN_STARTED: &str = r"
UPDATE campaigns
SET status = 'processing', started_at = COALESCE(started_at, ?)
WHERE id = ?;
";

const FINALIZE_CAMPAIGN: &str = r"
UPDATE campaigns
SET status = 'finished',
    finished_at = ?2,
    execution_time_secs = ?3,
    sent_messages = (SELECT COUNT(*) FROM messages WHERE campaign_id = ?1 AND status = 'sent')
WHERE id = ?1;
";

const RECORD_EXECUTION_TIME: &str = r"
UPDATE campaigns SET execution_time_secs = ? WHERE id = ?;
";

const INCREMENT_SENT_MESSAGES: &str = r"
UPDATE campaigns SET sent_messages = sent_messages + 1 WHERE id = ?;
";

// SQL for message rows

const INSERT_MESSAGE: &str = r"
INSERT INTO messages (
    id, campaign_id, recipient_name, recipient_phone, body, status, error_message, sent_at
) VALUES (?, ?, ?, ?, ?, 'waiting', NULL, NULL);
";

const SELECT_NEXT_WAITING: &str = r"
SELECT id FROM messages
WHERE campaign_id = ? AND status = 'waiting'
ORDER BY rowid
LIMIT 1;
";

const CLAIM_MESSAGE: &str = r"
UPDATE messages SET status = 'sending', sent_at = ?2
WHERE id = ?1 AND status = 'waiting';
";

const SELECT_MESSAGE_BY_ID: &str = r"
SELECT id, campaign_id, recipient_name, recipient_phone, body, status, error_message, sent_at
FROM messages
WHERE id = ?;
";

const SELECT_MESSAGES_FOR_CAMPAIGN: &str = r"
SELECT id, campaign_id, recipient_name, recipient_phone, body, status, error_message, sent_at
FROM messages
WHERE campaign_id = ?
ORDER BY rowid;
";

const MARK_MESSAGE_SENT: &str = r"
UPDATE messages SET status = 'sent', sent_at = ?, error_message = NULL WHERE id = ?;
";

const MARK_MESSAGE_FAILED: &str = r"
UPDATE messages SET status = 'failed', error_message = ? WHERE id = ?;
";

const COUNT_MESSAGES_BY_STATUS: &str = r"
SELECT status, COUNT(*) AS n FROM messages WHERE campaign_id = ? GROUP BY status;
";

const SELECT_LAST_SENT_AT: &str = r"
SELECT MAX(sent_at) AS last_sent_at FROM messages WHERE campaign_id = ? AND sent_at IS NOT NULL;
";

const RETRY_MESSAGE: &str = r"
UPDATE messages SET status = 'waiting', error_message = NULL, sent_at = NULL
WHERE id = ? AND status = 'failed';
";

const RELEASE_STALE_SENDING: &str = r"
UPDATE messages SET status = 'waiting', sent_at = NULL
WHERE campaign_id = ?1 AND status = 'sending' AND (sent_at IS NULL OR sent_at < ?2);
";

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    /// Error from the underlying database
    #[error("Database error: {source}")]
    Database {
        /// Failing `SQLx` operation
        #[source]
        source: sqlx::Error,
    },

    /// A persisted row no longer parses into its domain type
    #[error("Corrupt row: {reason}")]
    CorruptRow {
        /// What failed to parse
        reason: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        Self::Database { source }
    }
}

fn corrupt(reason: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        reason: reason.into(),
    }
}

/// The read-only recipient triple carried by each message row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    /// Display name interpolated by the send endpoint
    pub name: String,
    /// Destination phone number
    pub phone: String,
    /// Message body
    pub body: String,
}

/// A campaign as admitted, before any messages have moved
#[derive(Debug, Clone)]
pub struct NewCampaign {
    /// Campaign id
    pub id: CampaignId,
    /// Owning user
    pub owner_id: OwnerId,
    /// Human name
    pub name: CampaignName,
    /// `scheduled` or `pending` depending on the start instant
    pub status: CampaignStatus,
    /// Instant at which the campaign becomes eligible
    pub scheduled_at: DateTime<Utc>,
    /// Pacing policy
    pub config: PolicyConfig,
    /// Admission instant
    pub created_at: DateTime<Utc>,
}

/// A campaign row as persisted
#[derive(Debug, Clone)]
pub struct Campaign {
    /// Campaign id
    pub id: CampaignId,
    /// Owning user
    pub owner_id: OwnerId,
    /// Human name
    pub name: CampaignName,
    /// Lifecycle status
    pub status: CampaignStatus,
    /// Recipient count, fixed at creation
    pub total_messages: u64,
    /// Monotone confirmed-send counter
    pub sent_messages: u64,
    /// Accumulated active seconds
    pub execution_time_secs: i64,
    /// Instant at which the campaign becomes eligible
    pub scheduled_at: DateTime<Utc>,
    /// First dispatcher entry, set once
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal timestamp
    pub finished_at: Option<DateTime<Utc>>,
    /// Pacing policy
    pub config: PolicyConfig,
    /// Admission instant
    pub created_at: DateTime<Utc>,
}

/// A message row reserved for exactly one worker by a successful claim
#[derive(Debug, Clone)]
pub struct ClaimedMessage {
    /// Message id
    pub id: MessageId,
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// What to send, and to whom
    pub recipient: Recipient,
}

/// A message row as persisted
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// Message id
    pub id: MessageId,
    /// Owning campaign
    pub campaign_id: CampaignId,
    /// What to send, and to whom
    pub recipient: Recipient,
    /// Row status
    pub status: MessageStatus,
    /// Failure detail, when `status = failed`
    pub error_message: Option<String>,
    /// Provisional at claim, authoritative once sent
    pub sent_at: Option<DateTime<Utc>>,
}

/// Message counts for one campaign, grouped by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    /// Rows in `waiting`
    pub waiting: u64,
    /// Rows in `sending`
    pub sending: u64,
    /// Rows in `sent`
    pub sent: u64,
    /// Rows in `failed`
    pub failed: u64,
}

impl MessageCounts {
    /// Rows that still hold the campaign open
    #[must_use]
    pub fn outstanding(&self) -> u64 {
        self.waiting + self.sending
    }
}

/// Persistence seen by the dispatcher and the command interface
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Persists a campaign together with one `waiting` message per recipient
    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
        recipients: &[Recipient],
    ) -> Result<(), StoreError>;

    /// Campaigns the dispatcher should look at
    ///
    /// A scan returns rows whose status is eligible and whose `scheduled_at`
    /// has passed; a targeted read skips the `scheduled_at` filter.
    async fn eligible_campaigns(
        &self,
        now: DateTime<Utc>,
        target: Option<CampaignId>,
    ) -> Result<Vec<Campaign>, StoreError>;

    /// Reads one campaign row
    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

    /// Atomic read of a campaign's status
    async fn campaign_status(&self, id: CampaignId)
    -> Result<Option<CampaignStatus>, StoreError>;

    /// Unconditional status write; returns whether the row existed
    async fn set_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<bool, StoreError>;

    /// Coerces the campaign to `processing`, stamping `started_at` once
    async fn mark_campaign_started(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Finishes the campaign, reconciling `sent_messages` to the actual
    /// count of `sent` rows
    async fn finalize_campaign(
        &self,
        id: CampaignId,
        finished_at: DateTime<Utc>,
        execution_time_secs: i64,
    ) -> Result<(), StoreError>;

    /// Updates the accumulated active time
    async fn record_execution_time(
        &self,
        id: CampaignId,
        execution_time_secs: i64,
    ) -> Result<(), StoreError>;

    /// Claims the next `waiting` message for this worker
    ///
    /// The `waiting -> sending` transition is a compare-and-swap: when two
    /// workers race for the same row exactly one update takes effect, and
    /// the loser moves on to the next `waiting` row. `at` is written as the
    /// provisional `sent_at`.
    async fn claim_next_waiting(
        &self,
        campaign_id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Option<ClaimedMessage>, StoreError>;

    /// Terminal commit for a confirmed send
    async fn mark_message_sent(
        &self,
        id: MessageId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Terminal commit for a failed send; the claim-time `sent_at` stays
    async fn mark_message_failed(&self, id: MessageId, error: &str) -> Result<(), StoreError>;

    /// Monotone counter increment, atomic under concurrent workers
    async fn increment_sent_messages(&self, campaign_id: CampaignId) -> Result<(), StoreError>;

    /// Message counts for a campaign, grouped by status
    async fn message_counts(&self, campaign_id: CampaignId) -> Result<MessageCounts, StoreError>;

    /// Most recent non-null `sent_at` for a campaign
    async fn last_sent_at(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Reads one message row
    async fn message(&self, id: MessageId) -> Result<Option<MessageRecord>, StoreError>;

    /// All message rows of a campaign, in claim order
    async fn messages_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    /// CAS `failed -> waiting`; any other source state is a no-op
    async fn retry_message(&self, id: MessageId) -> Result<bool, StoreError>;

    /// Sweeps `sending` rows with a stale provisional `sent_at` back to
    /// `waiting` so a crashed worker's claims are reclaimed
    async fn release_stale_sending(
        &self,
        campaign_id: CampaignId,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// The owner's campaigns still occupying a schedule window
    async fn campaigns_for_owner(&self, owner: OwnerId) -> Result<Vec<Campaign>, StoreError>;
}

/// `SQLite` implementation of the campaign store
pub struct SqliteCampaignStore {
    connection: DatabaseConnection,
}

impl SqliteCampaignStore {
    /// Wraps an initialized database connection
    #[must_use]
    pub fn new(connection: DatabaseConnection) -> Self {
        Self { connection }
    }

    fn to_unix(at: DateTime<Utc>) -> i64 {
        at.timestamp()
    }

    fn from_unix(secs: i64, column: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| corrupt(format!("timestamp {secs} in column '{column}' out of range")))
    }

    fn parse_campaign_row(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign, StoreError> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("owner_id");
        let name_str: String = row.get("name");
        let status_str: String = row.get("status");
        let config_str: String = row.get("config");

        let id = CampaignId::parse(&id_str)
            .map_err(|e| corrupt(format!("campaign id '{id_str}': {e}")))?;
        let owner_id = OwnerId::parse(&owner_str)
            .map_err(|e| corrupt(format!("owner id '{owner_str}': {e}")))?;
        let name = CampaignName::try_new(name_str)
            .map_err(|e| corrupt(format!("campaign {id_str} name: {e}")))?;
        let status = CampaignStatus::parse(&status_str)
            .ok_or_else(|| corrupt(format!("campaign {id_str} status '{status_str}'")))?;
        let config = PolicyConfig::from_json_str(&config_str)
            .map_err(|e| corrupt(format!("campaign {id_str} config: {e}")))?;

        let started_at = row
            .get::<Option<i64>, _>("started_at")
            .map(|s| Self::from_unix(s, "started_at"))
            .transpose()?;
        let finished_at = row
            .get::<Option<i64>, _>("finished_at")
            .map(|s| Self::from_unix(s, "finished_at"))
            .transpose()?;

        Ok(Campaign {
            id,
            owner_id,
            name,
            status,
            total_messages: u64::try_from(row.get::<i64, _>("total_messages")).unwrap_or(0),
            sent_messages: u64::try_from(row.get::<i64, _>("sent_messages")).unwrap_or(0),
            execution_time_secs: row.get("execution_time_secs"),
            scheduled_at: Self::from_unix(row.get("scheduled_at"), "scheduled_at")?,
            started_at,
            finished_at,
            config,
            created_at: Self::from_unix(row.get("created_at"), "created_at")?,
        })
    }

    fn parse_message_row(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, StoreError> {
        let id_str: String = row.get("id");
        let campaign_str: String = row.get("campaign_id");
        let status_str: String = row.get("status");

        let id = MessageId::parse(&id_str)
            .map_err(|e| corrupt(format!("message id '{id_str}': {e}")))?;
        let campaign_id = CampaignId::parse(&campaign_str)
            .map_err(|e| corrupt(format!("message {id_str} campaign id: {e}")))?;
        let status = MessageStatus::parse(&status_str)
            .ok_or_else(|| corrupt(format!("message {id_str} status '{status_str}'")))?;
        let sent_at = row
            .get::<Option<i64>, _>("sent_at")
            .map(|s| Self::from_unix(s, "sent_at"))
            .transpose()?;

        Ok(MessageRecord {
            id,
            campaign_id,
            recipient: Recipient {
                name: row.get("recipient_name"),
                phone: row.get("recipient_phone"),
                body: row.get("body"),
            },
            status,
            error_message: row.get("error_message"),
            sent_at,
        })
    }
}

#[async_trait]
impl CampaignStore for SqliteCampaignStore {
    #[instrument(skip(self, campaign, recipients), fields(campaign_id = %campaign.id, recipients = recipients.len()))]
    async fn create_campaign(
        &self,
        campaign: &NewCampaign,
        recipients: &[Recipient],
    ) -> Result<(), StoreError> {
        let mut tx = self.connection.pool().begin().await?;

        sqlx::query(INSERT_CAMPAIGN)
            .bind(campaign.id.to_string())
            .bind(campaign.owner_id.to_string())
            .bind(campaign.name.to_string())
            .bind(campaign.status.as_str())
            .bind(i64::try_from(recipients.len()).unwrap_or(i64::MAX))
            .bind(Self::to_unix(campaign.scheduled_at))
            .bind(serde_json::to_string(&campaign.config).map_err(|e| corrupt(e.to_string()))?)
            .bind(Self::to_unix(campaign.created_at))
            .execute(&mut *tx)
            .await?;

        for recipient in recipients {
            sqlx::query(INSERT_MESSAGE)
                .bind(MessageId::generate().to_string())
                .bind(campaign.id.to_string())
                .bind(&recipient.name)
                .bind(&recipient.phone)
                .bind(&recipient.body)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn eligible_campaigns(
        &self,
        now: DateTime<Utc>,
        target: Option<CampaignId>,
    ) -> Result<Vec<Campaign>, StoreError> {
        let rows = if let Some(id) = target {
            let sql = format!(
                "{SELECT_CAMPAIGN_COLUMNS} WHERE id = ? AND status IN ({ELIGIBLE_STATUSES});"
            );
            sqlx::query(&sql)
                .bind(id.to_string())
                .fetch_all(self.connection.pool())
                .await?
        } else {
            let sql = format!(
                "{SELECT_CAMPAIGN_COLUMNS} WHERE status IN ({ELIGIBLE_STATUSES}) AND scheduled_at <= ?;"
            );
            sqlx::query(&sql)
                .bind(Self::to_unix(now))
                .fetch_all(self.connection.pool())
                .await?
        };

        rows.iter().map(Self::parse_campaign_row).collect()
    }

    async fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        let sql = format!("{SELECT_CAMPAIGN_COLUMNS} WHERE id = ?;");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        row.as_ref().map(Self::parse_campaign_row).transpose()
    }

    async fn campaign_status(
        &self,
        id: CampaignId,
    ) -> Result<Option<CampaignStatus>, StoreError> {
        let row = sqlx::query(SELECT_CAMPAIGN_STATUS)
            .bind(id.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let status_str: String = row.get("status");
                CampaignStatus::parse(&status_str)
                    .map(Some)
                    .ok_or_else(|| corrupt(format!("campaign {id} status '{status_str}'")))
            }
        }
    }

    #[instrument(skip(self), fields(campaign_id = %id, status = %status))]
    async fn set_campaign_status(
        &self,
        id: CampaignId,
        status: CampaignStatus,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(UPDATE_CAMPAIGN_STATUS)
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_campaign_started(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(MARK_CAMPAIGN_STARTED)
            .bind(Self::to_unix(at))
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(campaign_id = %id))]
    async fn finalize_campaign(
        &self,
        id: CampaignId,
        finished_at: DateTime<Utc>,
        execution_time_secs: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(FINALIZE_CAMPAIGN)
            .bind(id.to_string())
            .bind(Self::to_unix(finished_at))
            .bind(execution_time_secs)
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    async fn record_execution_time(
        &self,
        id: CampaignId,
        execution_time_secs: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(RECORD_EXECUTION_TIME)
            .bind(execution_time_secs)
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    async fn claim_next_waiting(
        &self,
        campaign_id: CampaignId,
        at: DateTime<Utc>,
    ) -> Result<Option<ClaimedMessage>, StoreError> {
        loop {
            let candidate = sqlx::query(SELECT_NEXT_WAITING)
                .bind(campaign_id.to_string())
                .fetch_optional(self.connection.pool())
                .await?;
            let Some(candidate) = candidate else {
                return Ok(None);
            };
            let candidate_id: String = candidate.get("id");

            let claimed = sqlx::query(CLAIM_MESSAGE)
                .bind(&candidate_id)
                .bind(Self::to_unix(at))
                .execute(self.connection.pool())
                .await?;
            if claimed.rows_affected() == 0 {
                // Lost the race for this row; poll for another waiting one.
                continue;
            }

            let row = sqlx::query(SELECT_MESSAGE_BY_ID)
                .bind(&candidate_id)
                .fetch_one(self.connection.pool())
                .await?;
            let record = Self::parse_message_row(&row)?;
            return Ok(Some(ClaimedMessage {
                id: record.id,
                campaign_id: record.campaign_id,
                recipient: record.recipient,
            }));
        }
    }

    async fn mark_message_sent(
        &self,
        id: MessageId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(MARK_MESSAGE_SENT)
            .bind(Self::to_unix(at))
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    async fn mark_message_failed(&self, id: MessageId, error: &str) -> Result<(), StoreError> {
        let truncated: String = error.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        sqlx::query(MARK_MESSAGE_FAILED)
            .bind(truncated)
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    async fn increment_sent_messages(&self, campaign_id: CampaignId) -> Result<(), StoreError> {
        sqlx::query(INCREMENT_SENT_MESSAGES)
            .bind(campaign_id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(())
    }

    async fn message_counts(&self, campaign_id: CampaignId) -> Result<MessageCounts, StoreError> {
        let rows = sqlx::query(COUNT_MESSAGES_BY_STATUS)
            .bind(campaign_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;

        let mut counts = MessageCounts::default();
        for row in rows {
            let status_str: String = row.get("status");
            let n = u64::try_from(row.get::<i64, _>("n")).unwrap_or(0);
            match MessageStatus::parse(&status_str) {
                Some(MessageStatus::Waiting) => counts.waiting = n,
                Some(MessageStatus::Sending) => counts.sending = n,
                Some(MessageStatus::Sent) => counts.sent = n,
                Some(MessageStatus::Failed) => counts.failed = n,
                None => {
                    return Err(corrupt(format!(
                        "campaign {campaign_id} message status '{status_str}'"
                    )));
                }
            }
        }
        Ok(counts)
    }

    async fn last_sent_at(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(SELECT_LAST_SENT_AT)
            .bind(campaign_id.to_string())
            .fetch_one(self.connection.pool())
            .await?;
        row.get::<Option<i64>, _>("last_sent_at")
            .map(|s| Self::from_unix(s, "sent_at"))
            .transpose()
    }

    async fn message(&self, id: MessageId) -> Result<Option<MessageRecord>, StoreError> {
        let row = sqlx::query(SELECT_MESSAGE_BY_ID)
            .bind(id.to_string())
            .fetch_optional(self.connection.pool())
            .await?;
        row.as_ref().map(Self::parse_message_row).transpose()
    }

    async fn messages_for_campaign(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(SELECT_MESSAGES_FOR_CAMPAIGN)
            .bind(campaign_id.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(Self::parse_message_row).collect()
    }

    #[instrument(skip(self), fields(message_id = %id))]
    async fn retry_message(&self, id: MessageId) -> Result<bool, StoreError> {
        let result = sqlx::query(RETRY_MESSAGE)
            .bind(id.to_string())
            .execute(self.connection.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_stale_sending(
        &self,
        campaign_id: CampaignId,
        older_than: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(RELEASE_STALE_SENDING)
            .bind(campaign_id.to_string())
            .bind(Self::to_unix(older_than))
            .execute(self.connection.pool())
            .await?;
        let released = result.rows_affected();
        if released > 0 {
            warn!(
                campaign_id = %campaign_id,
                released,
                "Reclaimed stale sending rows from an interrupted worker"
            );
        }
        Ok(released)
    }

    async fn campaigns_for_owner(&self, owner: OwnerId) -> Result<Vec<Campaign>, StoreError> {
        let sql = format!(
            "{SELECT_CAMPAIGN_COLUMNS} WHERE owner_id = ? AND status IN ({ELIGIBLE_STATUSES});"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.to_string())
            .fetch_all(self.connection.pool())
            .await?;
        rows.iter().map(Self::parse_campaign_row).collect()
    }
}
