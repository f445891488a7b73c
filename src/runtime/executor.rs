/// Node effects for the four flow node types
///
/// Each handler mutates the campaign's `ExecutionState` in memory (pointer, focus lead,
/// wake time, counters) and reports whether the campaign keeps running. Persisting the
/// state is left to the interpreter, which is its only writer.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::flow::types::{DelayNode, EmailNode, Flow, Node, NodeKind, DEFAULT_BRANCH};
use crate::mailer::{Mailer, OutboundMessage};
use crate::runtime::render::{inject_tracking, render_html, render_text};
use crate::store::types::NewActivity;
use crate::store::{Campaign, ExecutionState, Lead, Sender, Store};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Result of running one node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOutcome {
    /// State updated; run again at `next_run_at`
    Scheduled,
    /// Lead pool exhausted; the campaign is complete
    Completed,
}

/// Who the next email goes to
enum LeadTarget {
    Lead(Lead),
    /// The focus lead picked up an exclusion flag mid-pass
    FocusExcluded,
    Exhausted,
}

/// Executes node effects against the store and mailer
pub struct NodeExecutor {
    store: Store,
    mailer: Arc<dyn Mailer>,
    config: EngineConfig,
}

impl std::fmt::Debug for NodeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeExecutor")
            .field("config", &self.config)
            .finish()
    }
}

/// `now + duration`, saturating on overflow
pub(crate) fn after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

impl NodeExecutor {
    pub fn new(store: Store, mailer: Arc<dyn Mailer>, config: EngineConfig) -> Self {
        Self { store, mailer, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the effect of `node` for `campaign`
    pub async fn execute(
        &self,
        campaign: &Campaign,
        flow: &Flow,
        node: &Node,
        state: &mut ExecutionState,
    ) -> NodeOutcome {
        let now = Utc::now();
        tracing::debug!(
            campaign_id = %campaign.id,
            node_id = %node.id,
            node_type = node.kind_name(),
            "Executing node"
        );

        match &node.kind {
            NodeKind::Email(email) => self.run_email(campaign, flow, node, email, state, now).await,
            NodeKind::Delay(delay) => self.run_delay(campaign, flow, node, delay, state, now).await,
            NodeKind::Condition(_) => {
                // fallback path; engagement signals take the "true" edge before this fires
                let wake_at = after(now, self.config.send_cooldown());
                self.advance(campaign, flow, node, state, wake_at).await
            }
            NodeKind::Goal => self.end_pass(campaign, flow, state, now).await,
        }
    }

    async fn run_email(
        &self,
        campaign: &Campaign,
        flow: &Flow,
        node: &Node,
        email: &EmailNode,
        state: &mut ExecutionState,
        now: DateTime<Utc>,
    ) -> NodeOutcome {
        let sender = match self.store.senders.reserve(&campaign.user_id).await {
            Ok(sender) => sender,
            Err(EngineError::CapacityExhausted(_)) => {
                tracing::warn!(
                    campaign_id = %campaign.id,
                    user_id = %campaign.user_id,
                    "No sender capacity left, backing off"
                );
                state.next_run_at = Some(after(now, self.config.capacity_backoff()));
                return NodeOutcome::Scheduled;
            }
            Err(e) => {
                tracing::error!(campaign_id = %campaign.id, error = %e, "Sender reservation failed");
                state.next_run_at = Some(after(now, self.config.fetch_backoff()));
                return NodeOutcome::Scheduled;
            }
        };

        let lead = match self.target_lead(campaign, state).await {
            Ok(LeadTarget::Lead(lead)) => lead,
            Ok(LeadTarget::Exhausted) => {
                self.release(&sender).await;
                tracing::info!(campaign_id = %campaign.id, "No eligible leads remain");
                return NodeOutcome::Completed;
            }
            Ok(LeadTarget::FocusExcluded) => {
                self.release(&sender).await;
                tracing::info!(
                    campaign_id = %campaign.id,
                    lead_id = ?state.lead_id,
                    "Focus lead is excluded, ending its pass"
                );
                return self.end_pass(campaign, flow, state, now).await;
            }
            Err(e) => {
                self.release(&sender).await;
                tracing::warn!(campaign_id = %campaign.id, error = %e, "Lead fetch failed, backing off");
                state.next_run_at = Some(after(now, self.config.fetch_backoff()));
                return NodeOutcome::Scheduled;
            }
        };

        let tracking_id = Uuid::new_v4().to_string();
        let body = render_html(&email.body, &lead);
        let message = OutboundMessage {
            message_id: format!("<{}@{}>", Uuid::new_v4(), sender_domain(&sender)),
            from_email: sender.email.clone(),
            from_name: sender.name.clone(),
            to_email: lead.email.clone(),
            to_name: lead.full_name(),
            subject: render_text(&email.subject, &lead),
            html_body: inject_tracking(&body, &self.config.tracking_base_url, &tracking_id),
        };

        let message_id = match self.mailer.send(&message).await {
            Ok(message_id) => message_id,
            Err(e) => {
                // pointer stays put; the same lead is retried after the cooldown
                self.release(&sender).await;
                tracing::warn!(
                    campaign_id = %campaign.id,
                    lead_id = %lead.id,
                    node_id = %node.id,
                    error = %e,
                    "Send failed"
                );
                state.next_run_at = Some(after(now, self.config.send_cooldown()));
                return NodeOutcome::Scheduled;
            }
        };

        let activity = NewActivity {
            message_id: message_id.clone(),
            tracking_id,
            campaign_id: campaign.id.clone(),
            lead_id: lead.id.clone(),
            sender_id: sender.id.clone(),
            user_id: campaign.user_id.clone(),
            node_id: node.id.clone(),
            subject: message.subject.clone(),
            sent_at: now,
        };
        if let Err(e) = self.store.activities.record(&activity).await {
            tracing::error!(campaign_id = %campaign.id, %message_id, error = %e, "Failed to record activity");
        }

        tracing::info!(
            campaign_id = %campaign.id,
            lead_id = %lead.id,
            sender_id = %sender.id,
            %message_id,
            "Email sent"
        );

        state.emails_sent += 1;
        state.lead_id = Some(lead.id);
        let wake_at = after(now, self.config.send_cooldown());
        self.advance(campaign, flow, node, state, wake_at).await
    }

    async fn run_delay(
        &self,
        campaign: &Campaign,
        flow: &Flow,
        node: &Node,
        delay: &DelayNode,
        state: &mut ExecutionState,
        now: DateTime<Utc>,
    ) -> NodeOutcome {
        if !delay.parsed_unit().1 {
            tracing::warn!(
                campaign_id = %campaign.id,
                node_id = %node.id,
                unit = %delay.unit,
                "Unknown delay unit, waiting in hours"
            );
        }
        let wake_at = now
            .checked_add_signed(delay.duration())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        // the pointer moves now; only the wake time carries the delay
        self.advance(campaign, flow, node, state, wake_at).await
    }

    /// Follow the default edge out of `node`, or end the pass when there is none
    async fn advance(
        &self,
        campaign: &Campaign,
        flow: &Flow,
        node: &Node,
        state: &mut ExecutionState,
        wake_at: DateTime<Utc>,
    ) -> NodeOutcome {
        match flow.next_target(&node.id, DEFAULT_BRANCH) {
            Some(target) => {
                state.current_node_id = target.to_string();
                state.next_run_at = Some(wake_at);
                NodeOutcome::Scheduled
            }
            None => {
                tracing::debug!(campaign_id = %campaign.id, node_id = %node.id, "No default edge, ending pass");
                self.end_pass(campaign, flow, state, wake_at).await
            }
        }
    }

    /// Finish the current lead's pass: restart at the entry node for the next
    /// eligible lead, or complete the campaign when none is left.
    ///
    /// A pass that never picked a lead completes the campaign, since another
    /// pass over the same flow would not contact anyone either.
    async fn end_pass(
        &self,
        campaign: &Campaign,
        flow: &Flow,
        state: &mut ExecutionState,
        wake_at: DateTime<Utc>,
    ) -> NodeOutcome {
        if state.lead_id.is_none() {
            tracing::info!(campaign_id = %campaign.id, "Pass reached its end without contacting a lead");
            return NodeOutcome::Completed;
        }

        match self.store.leads.has_remaining(&campaign.id).await {
            Ok(true) => {
                let Some(entry) = flow.entry_node() else {
                    return NodeOutcome::Completed;
                };
                tracing::info!(
                    campaign_id = %campaign.id,
                    finished_lead = ?state.lead_id,
                    "Pass finished, restarting at entry node"
                );
                state.current_node_id = entry.id.clone();
                state.lead_id = None;
                state.next_run_at = Some(wake_at);
                NodeOutcome::Scheduled
            }
            Ok(false) => NodeOutcome::Completed,
            Err(e) => {
                tracing::warn!(campaign_id = %campaign.id, error = %e, "Lead fetch failed, backing off");
                state.next_run_at = Some(after(Utc::now(), self.config.fetch_backoff()));
                NodeOutcome::Scheduled
            }
        }
    }

    async fn target_lead(
        &self,
        campaign: &Campaign,
        state: &ExecutionState,
    ) -> Result<LeadTarget, EngineError> {
        match &state.lead_id {
            Some(lead_id) => Ok(match self.store.leads.eligible_lead(lead_id).await? {
                Some(lead) => LeadTarget::Lead(lead),
                None => LeadTarget::FocusExcluded,
            }),
            None => Ok(match self.store.leads.next_lead(&campaign.id).await? {
                Some(lead) => LeadTarget::Lead(lead),
                None => LeadTarget::Exhausted,
            }),
        }
    }

    async fn release(&self, sender: &Sender) {
        if let Err(e) = self.store.senders.release(&sender.id).await {
            tracing::error!(sender_id = %sender.id, error = %e, "Failed to release sender reservation");
        }
    }
}

fn sender_domain(sender: &Sender) -> &str {
    sender
        .email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .unwrap_or("localhost")
}
