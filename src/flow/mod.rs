/// Flow management layer
///
/// Handles flow definitions, persistence and the hot-reload registry:
/// - Type definitions (Flow, Node, NodeKind, Edge) and validation
/// - SQLite persistence with sqlx
/// - Lock-free registry using ArcSwap

// Core flow type definitions
pub mod types;

// SQLite persistence layer for flows
pub mod storage;

// Hot-reload registry read by interpreter tasks
pub mod registry;

pub use registry::FlowRegistry;
pub use storage::FlowStorage;
pub use types::{Edge, Flow, Node, NodeKind, Predicate};
