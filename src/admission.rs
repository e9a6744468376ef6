//! Admission-time conflict planning
//!
//! Before a campaign is persisted, its expected `[start, end]` window is
//! checked against every extant scheduled or running campaign of the same
//! owner. Windows are extended by a fixed buffer on both sides; on overlap
//! the first conflicting campaign is reported together with the earliest
//! suggested conflict-free start.

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::domain_types::{CampaignId, CampaignName};
use crate::pacing::planned_window;
use crate::policy::PolicyConfig;

/// Clearance required between two campaign windows, minutes
pub const CONFLICT_BUFFER_MINS: i64 = 60;
/// Extra slack added to the suggested replacement start, minutes
pub const SUGGESTION_GAP_MINS: i64 = 5;

/// An owner's extant campaign as seen by the planner
#[derive(Debug, Clone)]
pub struct ExistingCampaign {
    /// Campaign id
    pub id: CampaignId,
    /// Campaign name, echoed in conflict reports
    pub name: CampaignName,
    /// Planned or actual start instant
    pub start: DateTime<Utc>,
    /// Pacing policy
    pub config: PolicyConfig,
    /// Recipient count
    pub total_messages: usize,
}

/// A detected overlap with an existing campaign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// First conflicting campaign
    pub campaign_id: CampaignId,
    /// Its name, for the operator message
    pub campaign_name: CampaignName,
    /// Earliest suggested replacement start
    pub suggested_start: DateTime<Utc>,
}

/// Checks a candidate `(config, start, n)` against the owner's campaigns
///
/// Returns the first conflict in the order the existing campaigns are
/// given, or `None` when the candidate window is clear.
#[must_use]
pub fn check_conflicts(
    config: &PolicyConfig,
    start: DateTime<Utc>,
    recipient_count: usize,
    existing: &[ExistingCampaign],
    tz: FixedOffset,
) -> Option<Conflict> {
    let buffer = Duration::minutes(CONFLICT_BUFFER_MINS);
    let (candidate_start, candidate_end) = planned_window(config, start, recipient_count, tz);

    for other in existing {
        let (other_start, other_end) =
            planned_window(&other.config, other.start, other.total_messages, tz);
        if candidate_end > other_start - buffer && candidate_start < other_end + buffer {
            return Some(Conflict {
                campaign_id: other.id,
                campaign_name: other.name.clone(),
                suggested_start: other_end + buffer + Duration::minutes(SUGGESTION_GAP_MINS),
            });
        }
    }
    None
}
