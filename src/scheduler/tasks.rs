use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::scheduler::broadcast::ScheduledBroadcaster;
use crate::scheduler::Scheduler;

/// Register built-in background tasks
pub async fn register_builtin_tasks(
    scheduler: &Scheduler,
    broadcaster: Option<(Arc<ScheduledBroadcaster>, Duration)>,
) -> anyhow::Result<()> {
    // Hourly liveness log
    scheduler
        .add_cron_job("0 0 * * * *", "heartbeat", || {
            Box::pin(async {
                info!("Heartbeat: bot is alive");
            })
        })
        .await?;

    if let Some((broadcaster, period)) = broadcaster {
        scheduler
            .add_repeated_job(period, "prediction-broadcast", move || {
                let broadcaster = broadcaster.clone();
                Box::pin(async move {
                    broadcaster.broadcast().await;
                })
            })
            .await?;
    }

    Ok(())
}
