use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{Classification, MessageClassifier};
use crate::composer::ReplyComposer;
use crate::config::Config;
use crate::context::ContextRetriever;
use crate::generator::ResponseGenerator;
use crate::platform::{Mention, MentionId, OutboundMessage, Platform, RateLimited};
use crate::supervisor::panic_message;

/// Id of the newest mention already handled. Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCursor {
    last_seen: Option<MentionId>,
}

impl PollCursor {
    pub fn last_seen(&self) -> Option<MentionId> {
        self.last_seen
    }

    pub fn advance(&mut self, id: MentionId) {
        if self.last_seen.map_or(true, |current| id > current) {
            self.last_seen = Some(id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub handle: String,
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub clarification: String,
    /// Must contain `{question}`.
    pub question_reframe: String,
}

impl PollerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            handle: config.twitter.bot_handle.clone(),
            batch_size: config.bot.batch_size,
            poll_interval: Duration::from_secs(config.bot.poll_interval_secs),
            error_backoff: Duration::from_secs(config.bot.error_backoff_secs),
            clarification: config.messages.clarification.clone(),
            question_reframe: config.messages.question_reframe.clone(),
        }
    }
}

/// Result of one fetch-and-process cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Mentions fetched and handled (self-authored ones included).
    Processed(usize),
    /// Fetch failed; wait this long before the next attempt.
    FetchFailed(Duration),
}

/// Polls for new mentions and answers each one in order.
pub struct MentionPoller {
    platform: Arc<dyn Platform>,
    classifier: MessageClassifier,
    retriever: Arc<ContextRetriever>,
    generator: Arc<ResponseGenerator>,
    composer: ReplyComposer,
    settings: PollerSettings,
    cursor: PollCursor,
    self_id: Option<String>,
}

impl MentionPoller {
    pub fn new(
        platform: Arc<dyn Platform>,
        classifier: MessageClassifier,
        retriever: Arc<ContextRetriever>,
        generator: Arc<ResponseGenerator>,
        composer: ReplyComposer,
        settings: PollerSettings,
    ) -> Self {
        Self {
            platform,
            classifier,
            retriever,
            generator,
            composer,
            settings,
            cursor: PollCursor::default(),
            self_id: None,
        }
    }

    pub fn cursor(&self) -> PollCursor {
        self.cursor
    }

    /// Poll until cancelled. Returns `Err` only when the bot's own id cannot
    /// be resolved; everything else is handled inside the loop.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        info!(
            "Polling mentions of @{} every {}s",
            self.settings.handle,
            self.settings.poll_interval.as_secs()
        );

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let wait = match self.poll_once().await? {
                PollOutcome::Processed(_) => self.settings.poll_interval,
                PollOutcome::FetchFailed(wait) => wait,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Mention poller received shutdown signal");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ensure_self_id(&mut self) -> Result<String> {
        if let Some(id) = &self.self_id {
            return Ok(id.clone());
        }
        let id = self.platform.self_id().await?;
        self.self_id = Some(id.clone());
        Ok(id)
    }

    /// One fetch followed by processing of the whole batch, oldest first.
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let self_id = self.ensure_self_id().await?;

        let fetched = self
            .platform
            .search_mentions(
                &self.settings.handle,
                true,
                self.cursor.last_seen(),
                self.settings.batch_size,
            )
            .await;

        let mut mentions = match fetched {
            Ok(mentions) => mentions,
            Err(e) => {
                let wait = match e.downcast_ref::<RateLimited>() {
                    Some(limited) => limited.retry_after.max(self.settings.error_backoff),
                    None => self.settings.error_backoff,
                };
                error!(
                    "Failed to fetch mentions: {:#}; retrying in {}s",
                    e,
                    wait.as_secs()
                );
                return Ok(PollOutcome::FetchFailed(wait));
            }
        };

        if mentions.is_empty() {
            debug!("No new mentions");
            return Ok(PollOutcome::Processed(0));
        }

        info!("Found {} new mention(s)", mentions.len());
        mentions.sort_by_key(|m| m.id);
        let count = mentions.len();

        for mention in mentions {
            if self.cursor.last_seen().is_some_and(|seen| mention.id <= seen) {
                debug!("Skipping already handled mention {}", mention.id);
                continue;
            }

            if mention.author_id == self_id {
                debug!("Skipping own post {}", mention.id);
            } else {
                match AssertUnwindSafe(self.respond(&mention)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("Failed to reply to mention {}: {:#}", mention.id, e),
                    Err(panic) => error!(
                        "Panicked while replying to mention {}: {}",
                        mention.id,
                        panic_message(&*panic)
                    ),
                }
            }

            self.cursor.advance(mention.id);
        }

        Ok(PollOutcome::Processed(count))
    }

    async fn respond(&self, mention: &Mention) -> Result<()> {
        match mention.created_at {
            Some(at) => info!("New mention {} ({}): {}", mention.id, at, mention.text),
            None => info!("New mention {}: {}", mention.id, mention.text),
        }

        let username = match self.platform.resolve_username(&mention.author_id).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to look up user {}: {:#}", mention.author_id, e);
                format!("user_{}", mention.author_id)
            }
        };

        let question = strip_handle(&mention.text, &self.settings.handle);
        let classification = self.classifier.classify(&question);
        debug!("Mention {} classified as {:?}", mention.id, classification);

        let body = match classification {
            Classification::Question => {
                let context = self.retriever.retrieve(&question).await;
                self.generator.generate(&context, &question).await
            }
            Classification::PredictionTopic => {
                let context = self.retriever.retrieve(&question).await;
                let reframed = self
                    .settings
                    .question_reframe
                    .replace("{question}", &question);
                self.generator.generate(&context, &reframed).await
            }
            Classification::Unclear => self.settings.clarification.clone(),
        };

        let reply = OutboundMessage::reply(
            self.composer.compose(Some(&username), &body),
            mention.id,
        );
        reply.send(self.platform.as_ref()).await?;
        info!("Replied to mention {} from @{}", mention.id, username);
        Ok(())
    }
}

/// Remove every `@handle` (case-insensitive, whole handle only) and trim.
pub fn strip_handle(text: &str, handle: &str) -> String {
    let needle = format!("@{}", handle.to_ascii_lowercase());
    // ASCII lowercasing keeps byte offsets aligned with `text`
    let lowered = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for (idx, _) in lowered.match_indices(&needle) {
        let end = idx + needle.len();
        let continues = lowered[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if continues {
            continue;
        }
        out.push_str(&text[last..idx]);
        last = end;
    }
    out.push_str(&text[last..]);
    out.trim().to_string()
}
