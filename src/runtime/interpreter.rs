/// Per-campaign workflow interpreter
///
/// One task per sending campaign. The task is the only writer of its campaign's
/// execution state: webhook-derived engagement signals arrive through an inbox and
/// are applied between steps, never written to the database by the request path.

use crate::error::EngineError;
use crate::flow::types::{NodeKind, Predicate, TRUE_BRANCH};
use crate::flow::FlowRegistry;
use crate::runtime::executor::{after, NodeExecutor, NodeOutcome};
use crate::store::{Activity, CampaignStatus, EventKind, ExecutionState, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

/// Engagement reported for one of the campaign's messages
#[derive(Debug, Clone)]
pub struct EngagementSignal {
    pub kind: EventKind,
    /// Activity after the event was applied to the ledger
    pub activity: Activity,
}

/// What the loop does after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Suspend until the given time or the next signal
    Sleep(DateTime<Utc>),
    /// Campaign stopped, completed or broken; the task ends
    Exit,
}

pub struct CampaignWorker {
    campaign_id: String,
    store: Store,
    flows: Arc<FlowRegistry>,
    executor: Arc<NodeExecutor>,
    inbox: UnboundedReceiver<EngagementSignal>,
    cancel: CancellationToken,
}

impl Predicate {
    /// Whether the activity satisfies this predicate
    pub fn holds_for(self, activity: &Activity) -> bool {
        match self {
            Predicate::Opened => activity.open_count > 0,
            Predicate::Clicked => activity.click_count > 0,
            Predicate::Replied => activity.replied_at.is_some(),
        }
    }
}

impl CampaignWorker {
    pub fn new(
        campaign_id: impl Into<String>,
        store: Store,
        flows: Arc<FlowRegistry>,
        executor: Arc<NodeExecutor>,
        inbox: UnboundedReceiver<EngagementSignal>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            store,
            flows,
            executor,
            inbox,
            cancel,
        }
    }

    /// Drive the campaign until it completes, breaks or is cancelled
    ///
    /// Cancellation is only observed between steps, so a node effect in flight
    /// always finishes and persists before the task ends.
    pub async fn run(mut self) {
        tracing::info!(campaign_id = %self.campaign_id, "🚀 Interpreter task started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            while let Ok(signal) = self.inbox.try_recv() {
                self.absorb(signal).await;
            }

            let wake_at = match self.step().await {
                Step::Sleep(at) => at,
                Step::Exit => break,
            };

            let pause = (wake_at - Utc::now()).to_std().unwrap_or_default();
            if pause.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tracing::debug!(campaign_id = %self.campaign_id, %wake_at, "Sleeping until next step");
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                Some(signal) = self.inbox.recv() => {
                    self.absorb(signal).await;
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!(campaign_id = %self.campaign_id, "Interpreter cancelled");
                    break;
                }
            }
        }

        tracing::info!(campaign_id = %self.campaign_id, "Interpreter task finished");
    }

    /// Load state, run the current node if it is due, persist the result
    pub async fn step(&mut self) -> Step {
        let now = Utc::now();
        let campaign_id = self.campaign_id.as_str();

        let mut state = match self.store.executions.get(campaign_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::info!(campaign_id, "Execution state gone, campaign was stopped");
                return Step::Exit;
            }
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Failed to load execution state");
                return Step::Sleep(after(now, self.executor.config().fetch_backoff()));
            }
        };

        if !state.is_due(now) {
            return Step::Sleep(state.next_run_at.unwrap_or(now));
        }

        let campaign = match self.store.campaigns.get(campaign_id).await {
            Ok(Some(campaign)) if campaign.status == CampaignStatus::Sending => campaign,
            Ok(Some(campaign)) => {
                tracing::info!(campaign_id, status = %campaign.status, "Campaign no longer sending");
                return Step::Exit;
            }
            Ok(None) => {
                tracing::warn!(campaign_id, "Campaign disappeared");
                return Step::Exit;
            }
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Failed to load campaign");
                return Step::Sleep(after(now, self.executor.config().fetch_backoff()));
            }
        };

        let flow = match self.flows.get(campaign_id).await {
            Ok(Some(flow)) => flow,
            Ok(None) => {
                tracing::error!(campaign_id, "❌ Campaign has no valid flow, stopping interpreter");
                return Step::Exit;
            }
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Failed to load flow");
                return Step::Sleep(after(now, self.executor.config().fetch_backoff()));
            }
        };

        let Some(node) = flow.node(&state.current_node_id) else {
            let error = EngineError::MalformedState(format!(
                "current node {} is not in the flow",
                state.current_node_id
            ));
            tracing::error!(campaign_id, %error, "❌ Stopping interpreter");
            return Step::Exit;
        };

        let outcome = self.executor.execute(&campaign, &flow, node, &mut state).await;
        self.persist(&state).await;

        match outcome {
            NodeOutcome::Scheduled => Step::Sleep(state.next_run_at.unwrap_or(now)),
            NodeOutcome::Completed => {
                if let Err(e) = self
                    .store
                    .campaigns
                    .set_status(campaign_id, CampaignStatus::Completed)
                    .await
                {
                    tracing::error!(campaign_id, error = %e, "Failed to mark campaign completed");
                }
                tracing::info!(
                    campaign_id,
                    emails_sent = state.emails_sent,
                    "🎉 Campaign completed"
                );
                Step::Exit
            }
        }
    }

    /// Apply an engagement signal to the execution state
    ///
    /// Counters always move. When the campaign waits on a condition node for the
    /// signal's lead and the predicate now holds, the pointer takes the "true" edge
    /// and the node becomes due immediately.
    pub async fn absorb(&mut self, signal: EngagementSignal) {
        let campaign_id = self.campaign_id.as_str();

        let mut state = match self.store.executions.get(campaign_id).await {
            Ok(Some(state)) => state,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(campaign_id, error = %e, "Failed to load execution state for signal");
                return;
            }
        };

        state.record_engagement(signal.kind);

        if let Some(target) = self.branch_target(&state, &signal.activity).await {
            tracing::info!(
                campaign_id,
                from = %state.current_node_id,
                to = %target,
                event = ?signal.kind,
                message_id = %signal.activity.message_id,
                "⚡ Engagement satisfied condition, advancing"
            );
            state.current_node_id = target;
            state.next_run_at = Some(Utc::now());
        }

        self.persist(&state).await;
    }

    async fn branch_target(&self, state: &ExecutionState, activity: &Activity) -> Option<String> {
        let flow = match self.flows.get(&self.campaign_id).await {
            Ok(Some(flow)) => flow,
            _ => return None,
        };
        let node = flow.node(&state.current_node_id)?;
        let NodeKind::Condition(condition) = &node.kind else {
            return None;
        };
        if let Some(lead_id) = &state.lead_id {
            if *lead_id != activity.lead_id {
                return None;
            }
        }
        if !condition.predicate.holds_for(activity) {
            return None;
        }
        flow.labeled_target(&node.id, TRUE_BRANCH).map(str::to_string)
    }

    async fn persist(&self, state: &ExecutionState) {
        if let Err(e) = self.store.executions.save(state).await {
            // no rollback: the in-memory step already happened
            tracing::error!(campaign_id = %self.campaign_id, error = %e, "Failed to persist execution state");
        }
    }
}
