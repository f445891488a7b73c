/// Background daily quota reset
///
/// Runs a single tokio-cron-scheduler job that zeroes `sent_today` on every sender.
/// The schedule comes from configuration and includes a seconds field.

use crate::store::SenderAllocator;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

pub struct DailyResetService {
    scheduler: Arc<RwLock<JobScheduler>>,
    senders: SenderAllocator,
    schedule: String,
    job_uuid: RwLock<Option<Uuid>>,
}

impl std::fmt::Debug for DailyResetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyResetService")
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl DailyResetService {
    pub async fn new(senders: SenderAllocator, schedule: impl Into<String>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            senders,
            schedule: schedule.into(),
            job_uuid: RwLock::new(None),
        })
    }

    /// Register the reset job and start ticking
    pub async fn start(&self) -> Result<()> {
        tracing::info!("⏰ Starting daily sender reset ({})", self.schedule);

        let senders = self.senders.clone();
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let senders = senders.clone();
            Box::pin(async move {
                match senders.reset_daily().await {
                    Ok(count) => tracing::info!("🔄 Reset daily quota on {} senders", count),
                    Err(e) => tracing::error!("❌ Daily sender reset failed: {}", e),
                }
            })
        })?;

        let uuid = {
            let scheduler = self.scheduler.write().await;
            scheduler.add(job).await?
        };
        *self.job_uuid.write().await = Some(uuid);

        {
            let scheduler = self.scheduler.read().await;
            scheduler.start().await?;
        }

        tracing::info!("✅ Daily sender reset scheduled");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if let Some(uuid) = self.job_uuid.write().await.take() {
            let scheduler = self.scheduler.read().await;
            if let Err(e) = scheduler.remove(&uuid).await {
                tracing::warn!("⚠️ Failed to remove reset job {}: {}", uuid, e);
            }
        }

        {
            let mut scheduler = self.scheduler.write().await;
            scheduler.shutdown().await?;
        }

        tracing::info!("⏹️ Daily sender reset stopped");
        Ok(())
    }

    pub async fn is_scheduled(&self) -> bool {
        self.job_uuid.read().await.is_some()
    }
}
