//! Integration tests for the dispatcher
//!
//! Drives the claim-send-commit loop end to end against an embedded store
//! with a recording sender. The mock time provider caps pacing sleeps so
//! the suites run at full speed; the pacing-agreement test at the bottom
//! uses the real clock with a one-second fixed interval.

use async_trait::async_trait;
use chrono::{Duration as TimeDelta, Utc};
use drip::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
use drip::dispatcher::{Dispatcher, RunOutcome};
use drip::domain_types::{CampaignId, CampaignName, OwnerId};
use drip::pacing::{default_campaign_tz, minute_of_day};
use drip::policy::{AutomaticPause, BusinessHoursStrategy, MinuteOfDay, PolicyConfig};
use drip::sender::{MessageSender, SendError};
use drip::state::{CampaignStatus, MessageStatus};
use drip::store::{CampaignStore, NewCampaign, Recipient, SqliteCampaignStore};
use drip::time_provider::{production_time_provider, test_time_provider};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Sender that records every delivery and fails configured phone numbers
#[derive(Default)]
struct RecordingSender {
    delivered: Mutex<Vec<Recipient>>,
    failing_phones: HashSet<String>,
}

impl RecordingSender {
    fn new() -> Self {
        Self::default()
    }

    fn failing(phones: &[&str]) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            failing_phones: phones.iter().map(ToString::to_string).collect(),
        }
    }

    fn delivered_phones(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.phone.clone())
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, recipient: &Recipient) -> Result<(), SendError> {
        if self.failing_phones.contains(&recipient.phone) {
            return Err(SendError::Rejected("invalid number".to_string()));
        }
        self.delivered.lock().unwrap().push(recipient.clone());
        Ok(())
    }
}

/// Sender that pauses its own campaign after a fixed number of deliveries,
/// emulating an operator command landing mid-loop
struct PausingSender {
    store: Arc<dyn CampaignStore>,
    campaign_id: CampaignId,
    pause_after: u64,
    delivered: AtomicU64,
}

#[async_trait]
impl MessageSender for PausingSender {
    async fn send(&self, _recipient: &Recipient) -> Result<(), SendError> {
        let delivered = self.delivered.fetch_add(1, Ordering::SeqCst) + 1;
        if delivered == self.pause_after {
            self.store
                .set_campaign_status(self.campaign_id, CampaignStatus::Paused)
                .await
                .expect("pause write");
        }
        Ok(())
    }
}

async fn in_memory_store() -> Arc<SqliteCampaignStore> {
    let connection = DatabaseConnection::in_memory().await.unwrap();
    Arc::new(SqliteCampaignStore::new(connection))
}

fn recipients(n: usize) -> Vec<Recipient> {
    (0..n)
        .map(|i| Recipient {
            name: format!("Recipient {i}"),
            phone: format!("+551198888{i:04}"),
            body: format!("Hello {i}"),
        })
        .collect()
}

fn immediate_policy() -> PolicyConfig {
    PolicyConfig {
        min_interval: 5,
        max_interval: 5,
        ..PolicyConfig::default()
    }
}

async fn seed_campaign(
    store: &dyn CampaignStore,
    config: PolicyConfig,
    n: usize,
) -> CampaignId {
    let campaign = NewCampaign {
        id: CampaignId::generate(),
        owner_id: OwnerId::generate(),
        name: CampaignName::try_new("dispatch test".to_string()).unwrap(),
        status: CampaignStatus::Pending,
        scheduled_at: Utc::now(),
        config,
        created_at: Utc::now(),
    };
    store.create_campaign(&campaign, &recipients(n)).await.unwrap();
    campaign.id
}

fn dispatcher(
    store: Arc<SqliteCampaignStore>,
    sender: Arc<dyn MessageSender>,
) -> Dispatcher {
    Dispatcher::new(store, sender, test_time_provider(), default_campaign_tz())
}

#[test_log::test(tokio::test)]
async fn small_campaign_runs_to_completion() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let id = seed_campaign(store.as_ref(), immediate_policy(), 3).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, RunOutcome::Finished);
    assert_eq!(results[0].messages_sent, 3);

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.sent_messages, 3);
    assert!(campaign.started_at.is_some());
    assert!(campaign.finished_at.is_some());

    let messages = store.messages_for_campaign(id).await.unwrap();
    assert!(messages.iter().all(|m| m.status == MessageStatus::Sent));
    assert!(messages.iter().all(|m| m.sent_at.is_some()));
    assert_eq!(sender.delivered_phones().len(), 3);
}

#[test_log::test(tokio::test)]
async fn zero_recipient_campaign_finishes_immediately() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let id = seed_campaign(store.as_ref(), immediate_policy(), 0).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);
    assert_eq!(results[0].messages_sent, 0);

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.sent_messages, 0);
    assert!(sender.delivered_phones().is_empty());
}

#[test_log::test(tokio::test)]
async fn single_message_goes_out_on_the_first_invocation() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let id = seed_campaign(store.as_ref(), immediate_policy(), 1).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);
    assert_eq!(results[0].messages_sent, 1);
    assert_eq!(sender.delivered_phones().len(), 1);
}

#[test_log::test(tokio::test)]
async fn failed_send_is_recorded_and_the_rest_proceed() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::failing(&["+5511988880001"]));
    let id = seed_campaign(store.as_ref(), immediate_policy(), 3).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);
    assert_eq!(results[0].messages_sent, 2);

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    // Finalization reconciles the counter against the actual sent rows.
    assert_eq!(campaign.sent_messages, 2);

    let messages = store.messages_for_campaign(id).await.unwrap();
    let failed: Vec<_> = messages
        .iter()
        .filter(|m| m.status == MessageStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].recipient.phone, "+5511988880001");
    assert_eq!(failed[0].error_message.as_deref(), Some("endpoint rejected the message: invalid number"));
    // The claim-time provisional sent_at stays on the failed row.
    assert!(failed[0].sent_at.is_some());
}

#[test_log::test(tokio::test)]
async fn operator_pause_stops_the_loop_within_one_message() {
    let store = in_memory_store().await;
    let id = seed_campaign(store.as_ref(), immediate_policy(), 10).await;
    let sender = Arc::new(PausingSender {
        store: store.clone(),
        campaign_id: id,
        pause_after: 2,
        delivered: AtomicU64::new(0),
    });

    let results = dispatcher(store.clone(), sender).run(Some(id)).await.unwrap();
    assert_eq!(results[0].status, RunOutcome::Continued);
    // The send in flight when the pause landed still commits; nothing after.
    assert_eq!(results[0].messages_sent, 2);

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Paused);
    let counts = store.message_counts(id).await.unwrap();
    assert_eq!(counts.sent, 2);
    assert_eq!(counts.waiting, 8);
    assert_eq!(counts.sending, 0);

    // Resume and let the next invocation drain the rest.
    store
        .set_campaign_status(id, CampaignStatus::Active)
        .await
        .unwrap();
    let sender = Arc::new(RecordingSender::new());
    let results = dispatcher(store.clone(), sender).run(Some(id)).await.unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.sent_messages, campaign.total_messages);
}

#[test_log::test(tokio::test)]
async fn canceled_campaign_is_not_picked_up() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let id = seed_campaign(store.as_ref(), immediate_policy(), 3).await;
    store
        .set_campaign_status(id, CampaignStatus::Canceled)
        .await
        .unwrap();

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(sender.delivered_phones().is_empty());
}

#[test_log::test(tokio::test)]
async fn business_hours_gate_holds_without_persisting_a_pause() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let tz = default_campaign_tz();

    // Build a window that excludes the current local time.
    let now_minute = minute_of_day(Utc::now(), tz);
    let hhmm = |m: u32| MinuteOfDay::parse(&format!("{:02}:{:02}", m / 60, m % 60)).unwrap();
    let (pause_at, resume_at) = if now_minute + 10 < 24 * 60 {
        // now < resume_at: the window has not opened yet today.
        (hhmm(now_minute + 10), hhmm(now_minute + 5))
    } else {
        // Just before midnight: now >= pause_at closes the window.
        (hhmm(2), hhmm(1))
    };
    let config = PolicyConfig {
        min_interval: 5,
        max_interval: 5,
        business_hours_strategy: BusinessHoursStrategy::Pause,
        pause_at: Some(pause_at),
        resume_at: Some(resume_at),
        ..PolicyConfig::default()
    };
    let id = seed_campaign(store.as_ref(), config, 2).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::PausedTemporarily);
    assert_eq!(results[0].messages_sent, 0);

    // The gate does not persist a status change; the campaign stays
    // eligible for the next invocation.
    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Processing);
    assert!(sender.delivered_phones().is_empty());
}

#[test_log::test(tokio::test)]
async fn one_shot_pause_holds_until_its_resume_instant() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());

    // pause_at 00:00 makes the time-of-day condition always true, so the
    // gate is governed purely by the absolute resume instant.
    let config = PolicyConfig {
        min_interval: 5,
        max_interval: 5,
        automatic_pause: Some(AutomaticPause {
            pause_at: MinuteOfDay::parse("00:00").unwrap(),
            resume_at: Utc::now() + TimeDelta::hours(2),
        }),
        ..PolicyConfig::default()
    };
    let id = seed_campaign(store.as_ref(), config, 2).await;

    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::PausedTemporarily);
    assert!(sender.delivered_phones().is_empty());

    // Same campaign with the resume instant in the past sends normally.
    let expired = PolicyConfig {
        min_interval: 5,
        max_interval: 5,
        automatic_pause: Some(AutomaticPause {
            pause_at: MinuteOfDay::parse("00:00").unwrap(),
            resume_at: Utc::now() - TimeDelta::hours(1),
        }),
        ..PolicyConfig::default()
    };
    let id = seed_campaign(store.as_ref(), expired, 1).await;
    let results = dispatcher(store.clone(), sender.clone())
        .run(Some(id))
        .await
        .unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);
}

#[test_log::test(tokio::test)]
async fn concurrent_workers_send_each_message_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = DatabasePath::from_path(dir.path().join("workers.db")).unwrap();
    let connection = DatabaseConnection::initialize(DatabaseConfig::new(path))
        .await
        .unwrap();
    let store = Arc::new(SqliteCampaignStore::new(connection));

    let config = PolicyConfig {
        min_interval: 0,
        max_interval: 0,
        ..PolicyConfig::default()
    };
    let id = seed_campaign(store.as_ref(), config, 20).await;
    let sender = Arc::new(RecordingSender::new());

    let worker_a = Arc::new(dispatcher(store.clone(), sender.clone()));
    let worker_b = Arc::new(dispatcher(store.clone(), sender.clone()));
    let (a, b) = tokio::join!(worker_a.run(Some(id)), worker_b.run(Some(id)));
    a.unwrap();
    b.unwrap();

    let campaign = store.campaign(id).await.unwrap().unwrap();
    assert_eq!(campaign.status, CampaignStatus::Finished);
    assert_eq!(campaign.sent_messages, 20);

    let counts = store.message_counts(id).await.unwrap();
    assert_eq!(counts.sent, 20);
    assert_eq!(counts.sending, 0);
    assert_eq!(counts.waiting, 0);

    // No recipient was delivered twice.
    let mut phones = sender.delivered_phones();
    phones.sort();
    phones.dedup();
    assert_eq!(phones.len(), 20);
}

#[test_log::test(tokio::test)]
async fn exhausted_budget_stops_before_any_campaign() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let id = seed_campaign(store.as_ref(), immediate_policy(), 2).await;

    let worker = dispatcher(store.clone(), sender.clone())
        .with_budget(std::time::Duration::ZERO);
    let results = worker.run(Some(id)).await.unwrap();
    assert!(results.is_empty());
    assert!(sender.delivered_phones().is_empty());
}

/// Calculator/dispatcher agreement in expectation: with `min == max` the
/// realized send instants match the planned grid to within endpoint latency.
#[test_log::test(tokio::test)]
async fn realized_pacing_matches_the_fixed_interval_plan() {
    let store = in_memory_store().await;
    let sender = Arc::new(RecordingSender::new());
    let config = PolicyConfig {
        min_interval: 1,
        max_interval: 1,
        ..PolicyConfig::default()
    };
    let id = seed_campaign(store.as_ref(), config, 3).await;

    let worker = Dispatcher::new(
        store.clone(),
        sender,
        production_time_provider(),
        default_campaign_tz(),
    );
    let results = worker.run(Some(id)).await.unwrap();
    assert_eq!(results[0].status, RunOutcome::Finished);

    let mut sent_at: Vec<_> = store
        .messages_for_campaign(id)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| m.sent_at)
        .collect();
    sent_at.sort();
    assert_eq!(sent_at.len(), 3);
    for pair in sent_at.windows(2) {
        let gap = (pair[1] - pair[0]).num_seconds();
        assert!((1..=3).contains(&gap), "gap {gap}s escapes the 1s plan");
    }
}
