/// Outreach: campaign workflow engine for outbound email sequences
///
/// This library runs multi-step email campaigns: each campaign walks a flow of email,
/// delay, condition and goal nodes, one lead per pass, reacting to opens, clicks and
/// replies reported through webhooks.

// Core configuration and setup
pub mod config;

// Engine error taxonomy
pub mod error;

// Flow definitions, validation, storage and hot-reload registry
pub mod flow;

// SQLite repositories: campaigns, leads, senders, activities, execution state
pub mod store;

// Outbound mail dispatch
pub mod mailer;

// Per-campaign interpreters, node effects and event processing
pub mod runtime;

// HTTP API layer - flow upload, lifecycle, webhooks and tracking
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::{EngineError, EngineResult};
pub use flow::{Edge, Flow, Node, NodeKind};
pub use runtime::CampaignSupervisor;
pub use server::start_server;
