/// Persistence layer
///
/// SQLite-backed repositories for everything the engine reads and writes besides flows:
/// campaigns, leads, senders, activities and execution states.

pub mod activities;
pub mod campaigns;
pub mod database;
pub mod execution;
pub mod leads;
pub mod senders;
pub mod types;

pub use activities::ActivityLedger;
pub use campaigns::CampaignStore;
pub use database::Database;
pub use execution::ExecutionStore;
pub use leads::LeadSelector;
pub use senders::SenderAllocator;
pub use types::{Activity, Campaign, CampaignStatus, EventKind, ExecutionState, Lead, Sender};

use crate::flow::FlowStorage;

/// Repository bundle sharing one connection pool
#[derive(Debug, Clone)]
pub struct Store {
    pub campaigns: CampaignStore,
    pub flows: FlowStorage,
    pub leads: LeadSelector,
    pub senders: SenderAllocator,
    pub activities: ActivityLedger,
    pub executions: ExecutionStore,
}

impl Store {
    pub fn new(database: &Database) -> Self {
        let pool = database.pool();
        Self {
            campaigns: CampaignStore::new(pool.clone()),
            flows: FlowStorage::new(pool.clone()),
            leads: LeadSelector::new(pool.clone()),
            senders: SenderAllocator::new(pool.clone()),
            activities: ActivityLedger::new(pool.clone()),
            executions: ExecutionStore::new(pool.clone()),
        }
    }
}
