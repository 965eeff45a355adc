use std::sync::Arc;

use anyhow::Result;
use chrono::Timelike;
use tracing::{error, info};

use crate::composer::ReplyComposer;
use crate::context::ContextRetriever;
use crate::generator::ResponseGenerator;
use crate::platform::{OutboundMessage, Platform};

/// Topic for a wall-clock hour: `topics[hour % topics.len()]`.
pub fn select_topic(topics: &[String], hour: u32) -> Option<&str> {
    if topics.is_empty() {
        return None;
    }
    topics
        .get(hour as usize % topics.len())
        .map(String::as_str)
}

/// Publishes an unprompted prediction post on a rotating topic.
pub struct ScheduledBroadcaster {
    platform: Arc<dyn Platform>,
    retriever: Arc<ContextRetriever>,
    generator: Arc<ResponseGenerator>,
    composer: ReplyComposer,
    topics: Vec<String>,
    hashtags: String,
}

impl ScheduledBroadcaster {
    pub fn new(
        platform: Arc<dyn Platform>,
        retriever: Arc<ContextRetriever>,
        generator: Arc<ResponseGenerator>,
        composer: ReplyComposer,
        topics: Vec<String>,
        hashtags: String,
    ) -> Self {
        Self {
            platform,
            retriever,
            generator,
            composer,
            topics,
            hashtags,
        }
    }

    /// Broadcast for the current local hour. Failures are logged and the slot skipped.
    pub async fn broadcast(&self) {
        let hour = chrono::Local::now().hour();
        if let Err(e) = self.broadcast_at(hour).await {
            error!("Scheduled broadcast failed: {:#}", e);
        }
    }

    pub async fn broadcast_at(&self, hour: u32) -> Result<()> {
        let topic = match select_topic(&self.topics, hour) {
            Some(topic) => topic,
            None => anyhow::bail!("No broadcast topics configured"),
        };
        info!("Broadcasting prediction on: {}", topic);

        let context = self.retriever.retrieve(topic).await;
        let answer = self.generator.generate(&context, topic).await;
        let post = OutboundMessage::post(self.composer.compose_tagged(&answer, &self.hashtags));
        post.send(self.platform.as_ref()).await?;
        info!("Published scheduled prediction");
        Ok(())
    }
}
