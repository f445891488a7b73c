/// Hot-reload flow registry using ArcSwap
///
/// Interpreter tasks read flows on every iteration. The registry keeps validated
/// flows in memory behind an atomically swapped map, so a flow edit replaces the
/// whole map without blocking readers.

use crate::error::EngineResult;
use crate::flow::{storage::FlowStorage, types::Flow};
use arc_swap::ArcSwap;
use std::{collections::HashMap, sync::Arc};

/// Lock-free flow cache keyed by campaign id
#[derive(Debug)]
pub struct FlowRegistry {
    flows: ArcSwap<HashMap<String, Arc<Flow>>>,
    storage: FlowStorage,
}

impl FlowRegistry {
    pub fn new(storage: FlowStorage) -> Self {
        Self {
            flows: ArcSwap::new(Arc::new(HashMap::new())),
            storage,
        }
    }

    /// Cached flow for a campaign, loading it from storage on a miss
    pub async fn get(&self, campaign_id: &str) -> EngineResult<Option<Arc<Flow>>> {
        if let Some(flow) = self.flows.load().get(campaign_id) {
            return Ok(Some(Arc::clone(flow)));
        }
        self.reload(campaign_id).await
    }

    /// Replace the cached copy with the stored one
    ///
    /// Flows that no longer validate are dropped from the cache and reported as absent.
    pub async fn reload(&self, campaign_id: &str) -> EngineResult<Option<Arc<Flow>>> {
        let stored = self.storage.get_flow(campaign_id).await?;

        let flow = match stored {
            Some(flow) => match flow.validate() {
                Ok(()) => Some(Arc::new(flow)),
                Err(e) => {
                    tracing::warn!(campaign_id, error = %e, "Stored flow failed validation");
                    None
                }
            },
            None => None,
        };

        let current = self.flows.load();
        let mut next = (**current).clone();
        match &flow {
            Some(flow) => {
                next.insert(campaign_id.to_string(), Arc::clone(flow));
            }
            None => {
                next.remove(campaign_id);
            }
        }
        self.flows.store(Arc::new(next));

        tracing::debug!(campaign_id, cached = flow.is_some(), "Reloaded flow");
        Ok(flow)
    }

    /// Validate, persist and cache a flow in one step
    pub async fn publish(&self, flow: Flow) -> EngineResult<Arc<Flow>> {
        flow.validate()?;
        self.storage.save_flow(&flow).await?;

        let flow = Arc::new(flow);
        let current = self.flows.load();
        let mut next = (**current).clone();
        next.insert(flow.campaign_id.clone(), Arc::clone(&flow));
        self.flows.store(Arc::new(next));

        tracing::info!(
            campaign_id = %flow.campaign_id,
            nodes = flow.nodes.len(),
            edges = flow.edges.len(),
            "Published flow"
        );
        Ok(flow)
    }

    pub fn cached_count(&self) -> usize {
        self.flows.load().len()
    }
}
