//! X (Twitter) client over API v2, plus the v1.1 profile endpoint.
//!
//! All requests are signed with OAuth 1.0a user-context credentials.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::TwitterConfig;
use crate::platform::oauth::{percent_encode, Credentials};
use crate::platform::{Mention, MentionId, Platform, RateLimited};

/// Wait used when a 429 carries no usable reset header.
const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 900;

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    detail: Option<String>,
}

impl ApiError {
    fn describe(&self) -> &str {
        self.message
            .as_deref()
            .or(self.detail.as_deref())
            .unwrap_or("unknown error")
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Option<Vec<Tweet>>,
    errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    author_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl Tweet {
    fn into_mention(self) -> Result<Mention> {
        let id: MentionId = self
            .id
            .parse()
            .with_context(|| format!("Invalid tweet id: {}", self.id))?;
        Ok(Mention {
            id,
            author_id: self.author_id.unwrap_or_default(),
            text: self.text,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<User>,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct PostResponse {
    data: Option<PostedTweet>,
    errors: Option<Vec<ApiError>>,
}

#[derive(Debug, Deserialize)]
struct PostedTweet {
    id: String,
}

/// Rate limit headers from an API response
#[derive(Debug, Clone, Default)]
struct RateLimitInfo {
    remaining: Option<u32>,
    reset_at: Option<i64>,
}

impl RateLimitInfo {
    fn from_response(response: &reqwest::Response) -> Self {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            remaining: header("x-rate-limit-remaining").and_then(|v| v.parse().ok()),
            reset_at: header("x-rate-limit-reset").and_then(|v| v.parse().ok()),
        }
    }

    fn wait(&self, now: i64) -> Duration {
        let secs = self
            .reset_at
            .map(|reset| reset.saturating_sub(now).max(1) as u64)
            .unwrap_or(DEFAULT_RATE_LIMIT_WAIT_SECS);
        Duration::from_secs(secs)
    }
}

/// Search query for mentions of `handle`, optionally excluding the bot's own posts.
fn mention_query(handle: &str, exclude_self: bool) -> String {
    if exclude_self {
        format!("@{} -from:{}", handle, handle)
    } else {
        format!("@{}", handle)
    }
}

fn join_errors(errors: &[ApiError]) -> String {
    errors
        .iter()
        .map(ApiError::describe)
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct TwitterClient {
    client: reqwest::Client,
    credentials: Credentials,
    bearer_token: Option<String>,
    api_base: String,
    self_id: OnceCell<String>,
}

impl TwitterClient {
    pub fn new(config: &TwitterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build X API HTTP client")?;
        Ok(Self {
            client,
            credentials: Credentials {
                consumer_key: config.api_key.clone(),
                consumer_secret: config.api_secret.clone(),
                access_token: config.access_token.clone(),
                access_token_secret: config.access_token_secret.clone(),
            },
            bearer_token: Some(config.bearer_token.clone()).filter(|t| !t.is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            self_id: OnceCell::new(),
        })
    }

    /// GET returning the body of a successful response. Read-only lookups use
    /// the app bearer token when one is configured; `user_context` forces OAuth.
    async fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
        user_context: bool,
    ) -> Result<String> {
        let url = format!("{}{}", self.api_base, path);
        let auth = match (&self.bearer_token, user_context) {
            (Some(token), false) => format!("Bearer {}", token),
            _ => self.credentials.authorization_header("GET", &url, params)?,
        };

        let full_url = if params.is_empty() {
            url.clone()
        } else {
            let query = params
                .iter()
                .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}?{}", url, query)
        };

        let response = self
            .client
            .get(&full_url)
            .header("Authorization", auth)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", path))?;

        Self::read_body(path, response).await
    }

    async fn read_body(path: &str, response: reqwest::Response) -> Result<String> {
        let rate_limit = RateLimitInfo::from_response(&response);
        if let Some(remaining) = rate_limit.remaining {
            if remaining <= 3 {
                warn!(
                    "X API rate limit low on {} ({} remaining)",
                    path, remaining
                );
            }
        }

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RateLimited {
                retry_after: rate_limit.wait(Utc::now().timestamp()),
            }
            .into());
        }

        let body = response.text().await.unwrap_or_default();
        debug!("X API {} response ({}): {}", path, status, body);

        if !status.is_success() {
            anyhow::bail!("X API error on {} ({}): {}", path, status, body);
        }
        Ok(body)
    }

    async fn post_tweet(&self, payload: serde_json::Value) -> Result<()> {
        let path = "/2/tweets";
        let url = format!("{}{}", self.api_base, path);
        let auth = self.credentials.authorization_header("POST", &url, &[])?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", auth)
            .json(&payload)
            .send()
            .await
            .context("Failed to post tweet")?;

        let body = Self::read_body(path, response).await?;
        let parsed: PostResponse =
            serde_json::from_str(&body).context("Failed to parse post response")?;

        match (parsed.data, parsed.errors) {
            (Some(tweet), _) => {
                info!("Published tweet {}", tweet.id);
                Ok(())
            }
            (None, Some(errors)) => anyhow::bail!("X API errors: {}", join_errors(&errors)),
            (None, None) => anyhow::bail!("X API returned no tweet data"),
        }
    }
}

#[async_trait]
impl Platform for TwitterClient {
    async fn self_id(&self) -> Result<String> {
        let id = self
            .self_id
            .get_or_try_init(|| async {
                let body = self.get("/2/users/me", &[], true).await?;
                let parsed: UserResponse =
                    serde_json::from_str(&body).context("Failed to parse users/me response")?;
                let user = parsed.data.context("No user data returned for users/me")?;
                info!("Authenticated as @{} ({})", user.username, user.id);
                Ok::<_, anyhow::Error>(user.id)
            })
            .await?;
        Ok(id.clone())
    }

    async fn search_mentions(
        &self,
        handle: &str,
        exclude_self: bool,
        since: Option<MentionId>,
        limit: u32,
    ) -> Result<Vec<Mention>> {
        let query = mention_query(handle, exclude_self);
        let max_results = limit.clamp(10, 100).to_string();
        let since_id = since.map(|id| id.to_string());

        let mut params: Vec<(&str, &str)> = vec![
            ("query", query.as_str()),
            ("max_results", max_results.as_str()),
            ("tweet.fields", "author_id,created_at"),
        ];
        if let Some(id) = since_id.as_deref() {
            params.push(("since_id", id));
        }

        let body = self.get("/2/tweets/search/recent", &params, false).await?;
        let parsed: SearchResponse =
            serde_json::from_str(&body).context("Failed to parse search response")?;

        if let Some(errors) = &parsed.errors {
            if parsed.data.is_none() {
                anyhow::bail!("X API errors: {}", join_errors(errors));
            }
            warn!("X API partial errors: {}", join_errors(errors));
        }

        parsed
            .data
            .unwrap_or_default()
            .into_iter()
            .map(Tweet::into_mention)
            .collect()
    }

    async fn resolve_username(&self, author_id: &str) -> Result<String> {
        let body = self.get(&format!("/2/users/{}", author_id), &[], false).await?;
        let parsed: UserResponse =
            serde_json::from_str(&body).context("Failed to parse user response")?;
        parsed
            .data
            .map(|u| u.username)
            .with_context(|| format!("User {} not found", author_id))
    }

    async fn publish_post(&self, text: &str) -> Result<()> {
        self.post_tweet(json!({ "text": text })).await
    }

    async fn publish_reply(&self, text: &str, in_reply_to: MentionId) -> Result<()> {
        self.post_tweet(json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": in_reply_to.to_string() },
        }))
        .await
    }

    async fn update_profile_description(&self, text: &str) -> Result<()> {
        let path = "/1.1/account/update_profile.json";
        let url = format!("{}{}", self.api_base, path);
        let params = [("description", text)];
        let auth = self.credentials.authorization_header("POST", &url, &params)?;

        let response = self
            .client
            .post(&url)
            .header("Authorization", auth)
            .form(&params)
            .send()
            .await
            .context("Failed to update profile")?;

        Self::read_body(path, response).await?;
        Ok(())
    }
}
