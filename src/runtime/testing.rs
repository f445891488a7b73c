//! Shared fixtures for runtime tests: one in-memory database seeded with campaign
//! "c1" of user "u1", its leads and a single sender "s1".

use crate::config::EngineConfig;
use crate::flow::{Flow, FlowRegistry};
use crate::mailer::RecordingMailer;
use crate::runtime::events::EventProcessor;
use crate::runtime::executor::NodeExecutor;
use crate::runtime::supervisor::{prepare_start, CampaignSupervisor};
use crate::store::leads::NewLead;
use crate::store::senders::sender;
use crate::store::{Activity, CampaignStatus, Database, ExecutionState, Store};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

pub(crate) struct Harness {
    pub store: Store,
    pub flows: Arc<FlowRegistry>,
    pub executor: Arc<NodeExecutor>,
    pub mailer: Arc<RecordingMailer>,
}

pub(crate) fn engine_config(send_cooldown_secs: u64) -> EngineConfig {
    EngineConfig {
        send_cooldown_secs,
        capacity_backoff_secs: 3600,
        fetch_backoff_secs: 300,
        daily_reset_cron: "0 0 0 * * *".into(),
        tracking_base_url: "http://track.test".into(),
    }
}

impl Harness {
    pub async fn new(lead_ids: &[&str], daily_limit: i64) -> Self {
        Self::with_cooldown(lead_ids, daily_limit, 60).await
    }

    pub async fn with_cooldown(lead_ids: &[&str], daily_limit: i64, send_cooldown_secs: u64) -> Self {
        let db = Database::in_memory().await.unwrap();
        let store = Store::new(&db);

        store.campaigns.create("c1", "u1", "Launch").await.unwrap();
        store.leads.create_list("list-1", "u1", "Prospects").await.unwrap();
        store.campaigns.attach_list("c1", "list-1").await.unwrap();
        for id in lead_ids {
            store
                .leads
                .insert_lead(&NewLead {
                    id: id.to_string(),
                    email: format!("{id}@example.com"),
                    first_name: id.to_uppercase(),
                    custom_fields: json!({}),
                    ..NewLead::default()
                })
                .await
                .unwrap();
            store.leads.add_to_list("list-1", id).await.unwrap();
        }
        store
            .senders
            .insert(&sender("s1", "u1", daily_limit, 0))
            .await
            .unwrap();

        let flows = Arc::new(FlowRegistry::new(store.flows.clone()));
        let mailer = Arc::new(RecordingMailer::new());
        let executor = Arc::new(NodeExecutor::new(
            store.clone(),
            mailer.clone(),
            engine_config(send_cooldown_secs),
        ));

        Self {
            store,
            flows,
            executor,
            mailer,
        }
    }

    pub async fn publish(&self, flow: Flow) {
        self.flows.publish(flow).await.unwrap();
    }

    /// Put the campaign in `sending` at the entry node without spawning a task
    pub async fn prepare(&self) -> ExecutionState {
        prepare_start(&self.store, &self.flows, "c1").await.unwrap()
    }

    pub fn supervisor(&self) -> Arc<CampaignSupervisor> {
        Arc::new(CampaignSupervisor::new(
            self.store.clone(),
            Arc::clone(&self.flows),
            Arc::clone(&self.executor),
        ))
    }

    pub fn events(&self, supervisor: Arc<CampaignSupervisor>) -> EventProcessor {
        EventProcessor::new(self.store.activities.clone(), supervisor)
    }

    pub async fn state(&self) -> Option<ExecutionState> {
        self.store.executions.get("c1").await.unwrap()
    }

    pub async fn activities(&self) -> Vec<Activity> {
        self.store.activities.for_campaign("c1").await.unwrap()
    }

    pub async fn campaign_status(&self) -> CampaignStatus {
        self.store.campaigns.require("c1").await.unwrap().status
    }
}

/// Detached activity value, never stored
pub(crate) fn activity_stub(campaign_id: &str, lead_id: &str) -> Activity {
    Activity {
        message_id: "<stub@outbound.example>".into(),
        tracking_id: "stub".into(),
        campaign_id: campaign_id.into(),
        lead_id: lead_id.into(),
        sender_id: "s1".into(),
        user_id: "u1".into(),
        node_id: "hello".into(),
        subject: "Hi".into(),
        sent_at: Utc::now(),
        opened_at: None,
        open_count: 0,
        clicked_at: None,
        click_count: 0,
        replied_at: None,
    }
}
