/// Campaign lifecycle supervisor
///
/// Starts and stops campaigns, owns the interpreter task and inbox of every sending
/// campaign, and re-spawns tasks for campaigns that were sending when the process
/// last exited.

use crate::error::{EngineError, EngineResult};
use crate::flow::FlowRegistry;
use crate::runtime::executor::NodeExecutor;
use crate::runtime::interpreter::{CampaignWorker, EngagementSignal};
use crate::store::{CampaignStatus, ExecutionState, Store};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to one running interpreter task
#[derive(Debug)]
struct WorkerHandle {
    inbox: mpsc::UnboundedSender<EngagementSignal>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Cancel between steps and wait for the task to wind down
    async fn shutdown(self, campaign_id: &str) {
        self.cancel.cancel();
        wait_for(campaign_id, self.task).await;
    }
}

async fn wait_for(campaign_id: &str, task: JoinHandle<()>) {
    if let Err(e) = task.await {
        if !e.is_cancelled() {
            tracing::error!(campaign_id, error = %e, "Interpreter task panicked");
        }
    }
}

pub struct CampaignSupervisor {
    store: Store,
    flows: Arc<FlowRegistry>,
    executor: Arc<NodeExecutor>,
    workers: RwLock<HashMap<String, WorkerHandle>>,
}

impl std::fmt::Debug for CampaignSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignSupervisor").finish_non_exhaustive()
    }
}

/// Validate a campaign for start and create its execution state at the entry node
///
/// Leaves the campaign in `sending`; spawning the interpreter is the caller's job.
pub(crate) async fn prepare_start(
    store: &Store,
    flows: &FlowRegistry,
    campaign_id: &str,
) -> EngineResult<ExecutionState> {
    let campaign = store.campaigns.require(campaign_id).await?;
    if !campaign.status.can_start() {
        return Err(EngineError::InvalidTransition(format!(
            "campaign {} is {}, only draft or paused campaigns can start",
            campaign_id, campaign.status
        )));
    }

    let flow = match store.flows.get_flow(campaign_id).await? {
        Some(flow) => flow,
        None => return Err(EngineError::not_found("flow", campaign_id)),
    };
    flow.validate()?;
    let flow = flows
        .reload(campaign_id)
        .await?
        .ok_or_else(|| EngineError::not_found("flow", campaign_id))?;

    let entry = flow
        .entry_node()
        .ok_or_else(|| EngineError::InvalidFlow("flow has no entry node".into()))?;

    let state = ExecutionState::at_entry(campaign_id, entry.id.clone());
    store.executions.save(&state).await?;
    store
        .campaigns
        .set_status(campaign_id, CampaignStatus::Sending)
        .await?;

    tracing::info!(campaign_id, entry_node = %entry.id, "Campaign prepared for sending");
    Ok(state)
}

impl CampaignSupervisor {
    pub fn new(store: Store, flows: Arc<FlowRegistry>, executor: Arc<NodeExecutor>) -> Self {
        Self {
            store,
            flows,
            executor,
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// draft/paused -> sending: create execution state at the entry node and spawn the interpreter
    pub async fn start(&self, campaign_id: &str) -> EngineResult<ExecutionState> {
        let mut workers = self.workers.write().await;
        if let Some(existing) = workers.get(campaign_id) {
            if !existing.task.is_finished() {
                return Err(EngineError::InvalidTransition(format!(
                    "campaign {} already has a running interpreter",
                    campaign_id
                )));
            }
        }

        let state = prepare_start(&self.store, &self.flows, campaign_id).await?;
        let handle = self.spawn_worker(campaign_id);
        workers.insert(campaign_id.to_string(), handle);

        tracing::info!(campaign_id, "▶️ Campaign started");
        Ok(state)
    }

    /// sending -> paused: destroy the execution state and cancel the interpreter
    ///
    /// The node pointer is not kept; a later start re-enters at the entry node.
    /// A node effect already in flight finishes before the state is removed.
    pub async fn stop(&self, campaign_id: &str) -> EngineResult<()> {
        let campaign = self.store.campaigns.require(campaign_id).await?;
        if campaign.status != CampaignStatus::Sending {
            return Err(EngineError::InvalidTransition(format!(
                "campaign {} is {}, only sending campaigns can stop",
                campaign_id, campaign.status
            )));
        }

        let handle = self.workers.write().await.remove(campaign_id);
        if let Some(handle) = handle {
            handle.shutdown(campaign_id).await;
        }

        self.store.executions.delete(campaign_id).await?;
        self.store
            .campaigns
            .set_status(campaign_id, CampaignStatus::Paused)
            .await?;

        tracing::info!(campaign_id, "⏹️ Campaign stopped");
        Ok(())
    }

    /// Deliver an engagement signal to the campaign's interpreter
    ///
    /// Returns false when no interpreter is running for the campaign.
    pub async fn notify(&self, campaign_id: &str, signal: EngagementSignal) -> bool {
        let delivered = {
            let workers = self.workers.read().await;
            match workers.get(campaign_id) {
                Some(handle) => handle.inbox.send(signal).is_ok(),
                None => return false,
            }
        };

        if !delivered {
            self.workers.write().await.remove(campaign_id);
            tracing::debug!(campaign_id, "Dropped signal for finished interpreter");
        }
        delivered
    }

    /// Spawn interpreters for campaigns left in `sending` with live execution state
    pub async fn resume_all(&self) -> EngineResult<usize> {
        let ids = self
            .store
            .campaigns
            .ids_with_status(CampaignStatus::Sending)
            .await?;

        let mut resumed = 0;
        let mut workers = self.workers.write().await;
        for campaign_id in ids {
            if workers.contains_key(&campaign_id) {
                continue;
            }
            if self.store.executions.get(&campaign_id).await?.is_none() {
                tracing::warn!(campaign_id = %campaign_id, "Sending campaign without execution state, not resuming");
                continue;
            }
            let handle = self.spawn_worker(&campaign_id);
            workers.insert(campaign_id, handle);
            resumed += 1;
        }

        tracing::info!("🔁 Resumed {} sending campaigns", resumed);
        Ok(resumed)
    }

    pub async fn is_running(&self, campaign_id: &str) -> bool {
        self.workers
            .read()
            .await
            .get(campaign_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Wait for a campaign's interpreter to finish on its own
    pub async fn join(&self, campaign_id: &str) {
        let handle = self.workers.write().await.remove(campaign_id);
        if let Some(handle) = handle {
            wait_for(campaign_id, handle.task).await;
        }
    }

    /// Cancel every interpreter and wait for them to finish, leaving state in place
    ///
    /// Campaigns stay `sending` so the next boot resumes them.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.workers.write().await.drain().collect();
        let count = handles.len();
        for (campaign_id, handle) in handles {
            handle.shutdown(&campaign_id).await;
        }
        tracing::info!("⏹️ Shut down {} interpreters", count);
    }

    fn spawn_worker(&self, campaign_id: &str) -> WorkerHandle {
        let (inbox, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = CampaignWorker::new(
            campaign_id,
            self.store.clone(),
            Arc::clone(&self.flows),
            Arc::clone(&self.executor),
            receiver,
            cancel.clone(),
        );
        let task = tokio::spawn(worker.run());
        WorkerHandle { inbox, cancel, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::types::fixtures::*;
    use crate::flow::{Flow, Predicate};
    use crate::mailer::{Mailer, OutboundMessage};
    use crate::runtime::testing::{engine_config, Harness};
    use crate::store::EventKind;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::{Notify, Semaphore};

    fn email_then_goal() -> Flow {
        Flow {
            campaign_id: "c1".into(),
            nodes: vec![email("hello", "Hi {{name}}", "<p>Hi</p>"), goal("done")],
            edges: vec![edge("hello", "done", "")],
        }
    }

    /// Poll until the pointer reaches `node_id`, for up to two seconds
    async fn reaches_node(h: &Harness, node_id: &str) -> bool {
        for _ in 0..200 {
            if h.state().await.is_some_and(|s| s.current_node_id == node_id) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn records_activities(h: &Harness, count: usize) -> bool {
        for _ in 0..200 {
            if h.activities().await.len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn email_goal_flow_contacts_every_lead_then_completes() {
        let h = Harness::with_cooldown(&["a", "b", "c", "d"], 1000, 0).await;
        h.publish(email_then_goal()).await;
        let supervisor = h.supervisor();

        supervisor.start("c1").await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), supervisor.join("c1"))
            .await
            .expect("interpreter should finish");

        let activities = h.activities().await;
        assert_eq!(activities.len(), 4);
        let mut leads: Vec<_> = activities.iter().map(|a| a.lead_id.clone()).collect();
        leads.sort();
        assert_eq!(leads, vec!["a", "b", "c", "d"]);
        assert_eq!(h.campaign_status().await, CampaignStatus::Completed);
        assert_eq!(h.state().await.unwrap().emails_sent, 4);
    }

    #[tokio::test]
    async fn start_rejects_missing_or_invalid_flows() {
        let h = Harness::new(&["a"], 10).await;
        let supervisor = h.supervisor();
        assert!(matches!(
            supervisor.start("c1").await,
            Err(EngineError::NotFound { entity: "flow", .. })
        ));

        let broken = Flow {
            campaign_id: "c1".into(),
            nodes: vec![goal("done")],
            edges: vec![edge("done", "ghost", "")],
        };
        h.store.flows.save_flow(&broken).await.unwrap();
        assert!(matches!(
            supervisor.start("c1").await,
            Err(EngineError::InvalidFlow(_))
        ));
        assert_eq!(h.campaign_status().await, CampaignStatus::Draft);

        assert!(matches!(
            supervisor.start("ghost-campaign").await,
            Err(EngineError::NotFound { entity: "campaign", .. })
        ));
    }

    #[tokio::test]
    async fn stop_destroys_state_and_restart_reenters_at_entry() {
        let h = Harness::new(&["a", "b"], 10).await;
        h.publish(Flow {
            campaign_id: "c1".into(),
            nodes: vec![
                email("hello", "Hi", "b"),
                delay("wait", 2, "days"),
                goal("done"),
            ],
            edges: vec![edge("hello", "wait", ""), edge("wait", "done", "")],
        })
        .await;
        let supervisor = h.supervisor();

        supervisor.start("c1").await.unwrap();
        assert!(reaches_node(&h, "wait").await);

        supervisor.stop("c1").await.unwrap();
        assert!(h.state().await.is_none());
        assert_eq!(h.campaign_status().await, CampaignStatus::Paused);
        assert!(!supervisor.is_running("c1").await);
        assert!(matches!(
            supervisor.stop("c1").await,
            Err(EngineError::InvalidTransition(_))
        ));

        let restarted = supervisor.start("c1").await.unwrap();
        assert_eq!(restarted.current_node_id, "hello");
        assert!(restarted.lead_id.is_none());
        assert!(matches!(
            supervisor.start("c1").await,
            Err(EngineError::InvalidTransition(_))
        ));
        supervisor.stop("c1").await.unwrap();
    }

    #[tokio::test]
    async fn reply_preempts_condition_cooldown() {
        // one hour cooldown: only the signal can move the pointer within the test
        let h = Harness::with_cooldown(&["ada"], 10, 3600).await;
        h.publish(Flow {
            campaign_id: "c1".into(),
            nodes: vec![
                email("hello", "Hi", "b"),
                condition("replied?", Predicate::Replied),
                email("thanks", "Thanks", "b"),
                goal("done"),
            ],
            edges: vec![
                edge("hello", "replied?", ""),
                edge("replied?", "thanks", "true"),
                edge("replied?", "done", ""),
                edge("thanks", "done", ""),
            ],
        })
        .await;
        let supervisor = h.supervisor();
        supervisor.start("c1").await.unwrap();

        assert!(reaches_node(&h, "replied?").await);
        let sent = h.activities().await.remove(0);
        let replied = h
            .store
            .activities
            .apply_event(EventKind::Reply, &sent.message_id, Utc::now())
            .await
            .unwrap();
        assert!(
            supervisor
                .notify("c1", EngagementSignal { kind: EventKind::Reply, activity: replied })
                .await
        );

        assert!(records_activities(&h, 2).await);
        let follow_up = &h.activities().await[1];
        assert_eq!(follow_up.node_id, "thanks");
        assert_eq!(follow_up.lead_id, "ada");
        supervisor.stop("c1").await.unwrap();
    }

    #[tokio::test]
    async fn resume_all_respawns_sending_campaigns() {
        let h = Harness::with_cooldown(&["a", "b"], 10, 0).await;
        h.publish(email_then_goal()).await;
        prepare_start(&h.store, &h.flows, "c1").await.unwrap();

        let supervisor = h.supervisor();
        assert_eq!(supervisor.resume_all().await.unwrap(), 1);
        tokio::time::timeout(Duration::from_secs(10), supervisor.join("c1"))
            .await
            .expect("resumed interpreter should finish");
        assert_eq!(h.activities().await.len(), 2);
        assert_eq!(h.campaign_status().await, CampaignStatus::Completed);
    }

    /// Mailer that signals when a send begins and blocks until released
    struct GatedMailer {
        entered: Notify,
        gate: Semaphore,
    }

    impl GatedMailer {
        fn new() -> Self {
            Self {
                entered: Notify::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Mailer for GatedMailer {
        async fn send(&self, message: &OutboundMessage) -> EngineResult<String> {
            self.entered.notify_one();
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| EngineError::SendFailed(e.to_string()))?;
            permit.forget();
            Ok(message.message_id.clone())
        }
    }

    fn gated_supervisor(h: &Harness, mailer: Arc<GatedMailer>) -> Arc<CampaignSupervisor> {
        let executor = Arc::new(NodeExecutor::new(h.store.clone(), mailer, engine_config(60)));
        Arc::new(CampaignSupervisor::new(h.store.clone(), Arc::clone(&h.flows), executor))
    }

    #[tokio::test]
    async fn stop_lets_an_in_flight_send_finish_before_removing_state() {
        let h = Harness::new(&["ada"], 10).await;
        h.publish(email_then_goal()).await;
        let mailer = Arc::new(GatedMailer::new());
        let supervisor = gated_supervisor(&h, Arc::clone(&mailer));

        supervisor.start("c1").await.unwrap();
        mailer.entered.notified().await;

        let stopping = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            async move { supervisor.stop("c1").await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished());

        mailer.gate.add_permits(1);
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("stop should return once the send completes")
            .unwrap()
            .unwrap();

        // the send that went out is on the ledger and holds its reservation
        assert_eq!(h.activities().await.len(), 1);
        assert_eq!(h.store.senders.get("s1").await.unwrap().unwrap().sent_today, 1);
        assert!(h.state().await.is_none());
        assert_eq!(h.campaign_status().await, CampaignStatus::Paused);
        assert!(!supervisor.is_running("c1").await);
    }

    #[tokio::test]
    async fn shutdown_keeps_campaigns_resumable() {
        let h = Harness::new(&["a", "b"], 10).await;
        h.publish(email_then_goal()).await;
        let supervisor = h.supervisor();

        supervisor.start("c1").await.unwrap();
        assert!(records_activities(&h, 1).await);

        supervisor.shutdown().await;
        assert!(!supervisor.is_running("c1").await);
        assert_eq!(h.campaign_status().await, CampaignStatus::Sending);
        assert!(h.state().await.is_some());

        assert_eq!(h.supervisor().resume_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn notify_without_worker_is_a_no_op() {
        let h = Harness::new(&["a"], 10).await;
        let supervisor = h.supervisor();
        let activity = crate::runtime::testing::activity_stub("c1", "a");
        assert!(!supervisor.notify("c1", EngagementSignal { kind: EventKind::Open, activity }).await);
    }
}
