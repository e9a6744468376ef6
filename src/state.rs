//! Campaign and message lifecycle state machines
//!
//! The authority on legal transitions and terminal states. The source data
//! uses `scheduled`, `pending`, `processing`, and `active` somewhat
//! interchangeably: `{scheduled, pending}` mean "not yet started",
//! `{processing, active}` mean "running", and the dispatcher coerces a
//! campaign to `processing` on entry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a campaign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    /// Admitted with a future start instant
    Scheduled,
    /// Admitted for immediate execution, not yet picked up
    Pending,
    /// A dispatcher invocation has started working the campaign
    Processing,
    /// Alias of `Processing`; also the status written by a resume command
    Active,
    /// Suspended by an operator pause
    Paused,
    /// Terminated by an operator cancel (terminal)
    Canceled,
    /// All messages reached a terminal row state (terminal)
    Finished,
    /// Aborted administratively (terminal; never set by the dispatcher)
    Failed,
}

impl CampaignStatus {
    /// Canonical lowercase form used in the store
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Parses the canonical lowercase form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "canceled" => Some(Self::Canceled),
            "finished" => Some(Self::Finished),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Statuses the dispatcher considers when scanning for work
    #[must_use]
    pub fn is_eligible(self) -> bool {
        matches!(
            self,
            Self::Scheduled | Self::Pending | Self::Processing | Self::Active
        )
    }

    /// Whether the campaign has not yet been picked up by a dispatcher
    #[must_use]
    pub fn is_not_started(self) -> bool {
        matches!(self, Self::Scheduled | Self::Pending)
    }

    /// Whether a dispatcher is (or may be) advancing the campaign
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Processing | Self::Active)
    }

    /// Terminal statuses admit no further transitions
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Finished | Self::Failed)
    }

    /// Resulting status of an operator pause, if legal
    ///
    /// Pausing an already-paused campaign is a no-op; pausing a terminal
    /// campaign is rejected.
    #[must_use]
    pub fn apply_pause(self) -> Option<Self> {
        if self.is_terminal() {
            None
        } else {
            Some(Self::Paused)
        }
    }

    /// Resulting status of an operator resume, if legal
    ///
    /// Resume moves `paused` back to `active`; applied to any other
    /// non-terminal status it leaves the campaign unchanged, so a double
    /// resume equals a single one.
    #[must_use]
    pub fn apply_resume(self) -> Option<Self> {
        match self {
            Self::Paused => Some(Self::Active),
            s if s.is_terminal() => None,
            s => Some(s),
        }
    }

    /// Resulting status of an operator cancel, if legal
    ///
    /// Cancel is idempotent; a finished campaign can no longer be canceled.
    #[must_use]
    pub fn apply_cancel(self) -> Option<Self> {
        match self {
            Self::Finished | Self::Failed => None,
            _ => Some(Self::Canceled),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a single message row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created, not yet claimed by any worker
    Waiting,
    /// Claimed by exactly one worker; the send may be in flight
    Sending,
    /// Confirmed by the send endpoint (terminal)
    Sent,
    /// Send failed; retryable by operator command
    Failed,
}

impl MessageStatus {
    /// Canonical lowercase form used in the store
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parses the canonical lowercase form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the row has reached a terminal state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
