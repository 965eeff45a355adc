pub mod broadcast;
pub mod tasks;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn logged_run(name: String, task: TaskFuture) -> TaskFuture {
    Box::pin(async move {
        info!("Running scheduled task: {}", name);
        task.await;
    })
}

/// Wrapper around tokio-cron-scheduler for background tasks
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    /// Create a new scheduler
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner })
    }

    /// Add a recurring cron job
    pub async fn add_cron_job<F>(&self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            logged_run(job_name.clone(), task())
        })
        .with_context(|| format!("Failed to create cron job: {}", name))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!("Scheduled task '{}' with cron: {}", name, cron_expr);
        Ok(())
    }

    /// Add a job that first fires one `period` after start, then every `period`
    pub async fn add_repeated_job<F>(&self, period: Duration, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let job_name = name.to_string();
        let job = Job::new_repeated_async(period, move |_uuid, _lock| {
            logged_run(job_name.clone(), task())
        })
        .with_context(|| format!("Failed to create repeated job: {}", name))?;

        self.inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;

        info!(
            "Scheduled task '{}' every {}h",
            name,
            period.as_secs() / 3600
        );
        Ok(())
    }

    /// Begin firing registered jobs on the scheduler's own task.
    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start job scheduler")?;
        info!("Job scheduler running");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to stop job scheduler")?;
        info!("Job scheduler stopped");
        Ok(())
    }
}
