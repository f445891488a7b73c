/// Campaign runtime
///
/// This module drives sending campaigns:
/// - One interpreter task per campaign walking its flow
/// - Node effects (email, delay, condition, goal)
/// - Engagement events forwarded to interpreters through per-campaign inboxes
/// - The daily sender quota reset

// Node effects and template rendering
pub mod executor;
pub mod render;

// Per-campaign interpreter loop and its supervisor
pub mod interpreter;
pub mod supervisor;

// Webhook and tracking event handling
pub mod events;

// Background cron job for sender quotas
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use events::{DeliveryEvent, EventProcessor};
pub use executor::{NodeExecutor, NodeOutcome};
pub use interpreter::{CampaignWorker, EngagementSignal};
pub use scheduler::DailyResetService;
pub use supervisor::CampaignSupervisor;
