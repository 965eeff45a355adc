pub mod oauth;
pub mod twitter;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Platform post identifier. Ids are assigned monotonically, so ordering by id
/// is ordering by recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MentionId(pub u64);

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MentionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(MentionId)
    }
}

/// A post that mentions the bot
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub id: MentionId,
    pub author_id: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Text ready to publish. A target id makes it a reply, otherwise a standalone post.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub body: String,
    pub in_reply_to: Option<MentionId>,
}

impl OutboundMessage {
    pub fn reply(body: String, to: MentionId) -> Self {
        Self {
            body,
            in_reply_to: Some(to),
        }
    }

    pub fn post(body: String) -> Self {
        Self {
            body,
            in_reply_to: None,
        }
    }

    /// Route through the matching platform call.
    pub async fn send(&self, platform: &dyn Platform) -> Result<()> {
        match self.in_reply_to {
            Some(id) => platform.publish_reply(&self.body, id).await,
            None => platform.publish_post(&self.body).await,
        }
    }
}

/// Returned by a platform call that hit the rate limit.
#[derive(Debug, thiserror::Error)]
#[error("rate limited, retry after {}s", .retry_after.as_secs())]
pub struct RateLimited {
    pub retry_after: Duration,
}

/// Social platform operations the bot depends on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Account id of the bot itself.
    async fn self_id(&self) -> Result<String>;

    /// Mentions of `handle` newer than `since`, at most `limit`, in any order.
    async fn search_mentions(
        &self,
        handle: &str,
        exclude_self: bool,
        since: Option<MentionId>,
        limit: u32,
    ) -> Result<Vec<Mention>>;

    async fn resolve_username(&self, author_id: &str) -> Result<String>;

    async fn publish_post(&self, text: &str) -> Result<()>;

    async fn publish_reply(&self, text: &str, in_reply_to: MentionId) -> Result<()>;

    async fn update_profile_description(&self, text: &str) -> Result<()>;
}
