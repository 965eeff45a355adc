use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::classifier::MessageClassifier;
use crate::composer::ReplyComposer;
use crate::config::Config;
use crate::context::ContextRetriever;
use crate::generator::{GeneratorSettings, ResponseGenerator};
use crate::llm::CompletionProvider;
use crate::platform::Platform;
use crate::poller::{MentionPoller, PollerSettings};
use crate::scheduler::broadcast::ScheduledBroadcaster;
use crate::scheduler::tasks::register_builtin_tasks;
use crate::scheduler::Scheduler;
use crate::search::SearchProvider;

/// Top-level driver: startup chores, the broadcast schedule, and a poll loop
/// that is restarted after a long backoff whenever it fails or panics.
pub struct Supervisor {
    config: Arc<Config>,
    platform: Arc<dyn Platform>,
    poller: MentionPoller,
    broadcaster: Arc<ScheduledBroadcaster>,
    critical_backoff: Duration,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(
        config: Arc<Config>,
        platform: Arc<dyn Platform>,
        search: Arc<dyn SearchProvider>,
        llm: Arc<dyn CompletionProvider>,
        cancel: CancellationToken,
    ) -> Self {
        let retriever = Arc::new(ContextRetriever::new(
            search,
            config.search.max_snippets,
            config.messages.search_fallback.clone(),
        ));
        let generator = Arc::new(ResponseGenerator::new(
            llm,
            GeneratorSettings {
                system_prompt: config.llm.system_prompt.clone(),
                prompt_template: config.messages.prompt_template.clone(),
                max_output_tokens: config.llm.max_tokens,
                fallback: config.messages.generation_fallback.clone(),
            },
        ));
        let composer = ReplyComposer::new(config.signature(), config.twitter.max_chars);

        let poller = MentionPoller::new(
            platform.clone(),
            MessageClassifier::new(&config.bot.keywords),
            retriever.clone(),
            generator.clone(),
            composer.clone(),
            PollerSettings::from_config(&config),
        );
        let broadcaster = Arc::new(ScheduledBroadcaster::new(
            platform.clone(),
            retriever,
            generator,
            composer,
            config.broadcast.topics.clone(),
            config.broadcast.hashtags.clone(),
        ));

        Self {
            critical_backoff: Duration::from_secs(config.bot.critical_backoff_secs),
            config,
            platform,
            poller,
            broadcaster,
            cancel,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        self.startup().await;

        let mut scheduler = Scheduler::new().await?;
        let periodic = self.config.broadcast.enabled.then(|| {
            (
                self.broadcaster.clone(),
                Duration::from_secs(self.config.broadcast.interval_hours * 3600),
            )
        });
        register_builtin_tasks(&scheduler, periodic).await?;
        scheduler.start().await?;

        self.supervise_poller().await;

        if let Err(e) = scheduler.shutdown().await {
            warn!("Scheduler shutdown failed: {:#}", e);
        }
        info!("Bot stopped");
        Ok(())
    }

    /// Best-effort profile update, then the startup broadcast.
    pub async fn startup(&self) {
        if self.config.bot.update_profile {
            let description = self.config.profile_description();
            match self.platform.update_profile_description(&description).await {
                Ok(()) => info!("Profile updated: {}", description),
                Err(e) => warn!("Failed to update profile: {:#}", e),
            }
        }

        info!("Starting bot @{}...", self.config.twitter.bot_handle);

        if self.config.broadcast.enabled {
            self.broadcaster.broadcast().await;
        }
    }

    /// Run the poll loop until cancelled, restarting it after failures.
    pub async fn supervise_poller(&mut self) {
        loop {
            let outcome = AssertUnwindSafe(self.poller.run(&self.cancel))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => break,
                Ok(Err(e)) => error!("Critical error in bot: {:#}", e),
                Err(panic) => error!(
                    "Critical error in bot: poll loop panicked: {}",
                    panic_message(&*panic)
                ),
            }

            info!(
                "Restarting mention poller in {}s",
                self.critical_backoff.as_secs()
            );
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.critical_backoff) => {}
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mention, test_config, FakeLlm, FakePlatform, FakeSearch};

    fn supervisor(platform: Arc<FakePlatform>, cancel: CancellationToken) -> Supervisor {
        Supervisor::new(
            Arc::new(test_config()),
            platform,
            Arc::new(FakeSearch::returning(&["ctx"])),
            Arc::new(FakeLlm::returning("Maybe.")),
            cancel,
        )
    }

    #[tokio::test]
    async fn test_startup_updates_profile_and_broadcasts_once() {
        let platform = Arc::new(FakePlatform::new("1"));
        let s = supervisor(platform.clone(), CancellationToken::new());

        s.startup().await;

        assert_eq!(
            platform.profile().as_deref(),
            Some("Prediction bot. Automatizado por Ana.")
        );
        let posts = platform.posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].starts_with("Maybe. #Predicción #Bot"));
    }

    #[tokio::test]
    async fn test_profile_failure_is_not_fatal() {
        let mut platform = FakePlatform::new("1");
        platform.fail_profile = true;
        let platform = Arc::new(platform);
        let s = supervisor(platform.clone(), CancellationToken::new());

        s.startup().await;

        assert!(platform.profile().is_none());
        assert_eq!(platform.posts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_poll_loop_restarts_after_backoff() {
        let mut platform = FakePlatform::new("1");
        platform.fail_self_id = true;
        let platform = Arc::new(platform);
        let cancel = CancellationToken::new();
        let mut s = supervisor(platform.clone(), cancel.clone());

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(650)).await;
            stopper.cancel();
        });

        s.supervise_poller().await;
        // attempts at t=0, 300 and 600
        assert_eq!(platform.self_id_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_poll_loop_is_restarted() {
        let mut platform = FakePlatform::new("1");
        platform.panic_on_search = true;
        let platform = Arc::new(platform);
        let cancel = CancellationToken::new();
        let mut s = supervisor(platform.clone(), cancel.clone());

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(350)).await;
            stopper.cancel();
        });

        s.supervise_poller().await;
        assert_eq!(platform.search_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_answers_mentions_until_cancelled() {
        let platform = FakePlatform::new("1").with_username("7", "maria");
        platform.push_batch(vec![mention(10, "7", "@bot chance of snow")]);
        let platform = Arc::new(platform);
        let cancel = CancellationToken::new();
        let mut s = supervisor(platform.clone(), cancel.clone());

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90)).await;
            stopper.cancel();
        });

        s.supervise_poller().await;

        let replies = platform.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1, "@maria Maybe.\nAutomatizado por Ana.");
        assert_eq!(s.poller.cursor().last_seen().map(|id| id.0), Some(10));
    }
}
