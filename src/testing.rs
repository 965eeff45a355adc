//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::llm::CompletionProvider;
use crate::platform::{Mention, MentionId, Platform, RateLimited};
use crate::search::SearchProvider;

pub fn mention(id: u64, author_id: &str, text: &str) -> Mention {
    Mention {
        id: MentionId(id),
        author_id: author_id.to_string(),
        text: text.to_string(),
        created_at: None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCall {
    pub since: Option<MentionId>,
    pub limit: u32,
}

/// Records everything published; serves scripted mention batches.
pub struct FakePlatform {
    self_id: String,
    batches: Mutex<VecDeque<Result<Vec<Mention>>>>,
    usernames: HashMap<String, String>,
    pub fail_self_id: bool,
    pub fail_publish: bool,
    pub fail_profile: bool,
    pub panic_on_search: bool,
    pub panic_for_author: Option<String>,
    self_id_calls: AtomicUsize,
    search_calls: Mutex<Vec<SearchCall>>,
    posts: Mutex<Vec<String>>,
    replies: Mutex<Vec<(MentionId, String)>>,
    profile: Mutex<Option<String>>,
}

impl FakePlatform {
    pub fn new(self_id: &str) -> Self {
        Self {
            self_id: self_id.to_string(),
            batches: Mutex::new(VecDeque::new()),
            usernames: HashMap::new(),
            fail_self_id: false,
            fail_publish: false,
            fail_profile: false,
            panic_on_search: false,
            panic_for_author: None,
            self_id_calls: AtomicUsize::new(0),
            search_calls: Mutex::new(Vec::new()),
            posts: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            profile: Mutex::new(None),
        }
    }

    pub fn with_username(mut self, author_id: &str, username: &str) -> Self {
        self.usernames
            .insert(author_id.to_string(), username.to_string());
        self
    }

    pub fn push_batch(&self, batch: Vec<Mention>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_failure(&self, message: &str) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn push_rate_limited(&self, retry_after: Duration) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(RateLimited { retry_after }.into()));
    }

    pub fn self_id_calls(&self) -> usize {
        self.self_id_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> Vec<SearchCall> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(MentionId, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn profile(&self) -> Option<String> {
        self.profile.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn self_id(&self) -> Result<String> {
        self.self_id_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_self_id {
            anyhow::bail!("users/me unavailable");
        }
        Ok(self.self_id.clone())
    }

    async fn search_mentions(
        &self,
        _handle: &str,
        _exclude_self: bool,
        since: Option<MentionId>,
        limit: u32,
    ) -> Result<Vec<Mention>> {
        self.search_calls
            .lock()
            .unwrap()
            .push(SearchCall { since, limit });
        if self.panic_on_search {
            panic!("search client bug");
        }
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn resolve_username(&self, author_id: &str) -> Result<String> {
        if self.panic_for_author.as_deref() == Some(author_id) {
            panic!("lookup bug for {}", author_id);
        }
        match self.usernames.get(author_id) {
            Some(name) => Ok(name.clone()),
            None => anyhow::bail!("unknown user {}", author_id),
        }
    }

    async fn publish_post(&self, text: &str) -> Result<()> {
        if self.fail_publish {
            anyhow::bail!("post rejected");
        }
        self.posts.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn publish_reply(&self, text: &str, in_reply_to: MentionId) -> Result<()> {
        if self.fail_publish {
            anyhow::bail!("reply rejected");
        }
        self.replies
            .lock()
            .unwrap()
            .push((in_reply_to, text.to_string()));
        Ok(())
    }

    async fn update_profile_description(&self, text: &str) -> Result<()> {
        if self.fail_profile {
            anyhow::bail!("profile update rejected");
        }
        *self.profile.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}

/// Returns fixed snippets (or fails) and records queries.
pub struct FakeSearch {
    snippets: Option<Vec<String>>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn returning(snippets: &[&str]) -> Self {
        Self {
            snippets: Some(snippets.iter().map(|s| s.to_string()).collect()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            snippets: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.snippets {
            Some(snippets) => Ok(snippets.clone()),
            None => anyhow::bail!("search backend down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_output_tokens: u32,
}

/// Returns a fixed completion (or fails) and records prompts.
pub struct FakeLlm {
    reply: Option<String>,
    calls: Mutex<Vec<CompletionCall>>,
}

impl FakeLlm {
    pub fn returning(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String> {
        self.calls.lock().unwrap().push(CompletionCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            max_output_tokens,
        });
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => anyhow::bail!("model overloaded"),
        }
    }
}

/// Local HTTP endpoint that accepts connections and never answers.
/// Returns its base URL.
pub async fn stalled_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

pub fn test_config() -> crate::config::Config {
    crate::config::Config::from_toml_str(
        r#"
[twitter]
bot_handle = "bot"

[bot]
creator_name = "Ana"
keywords = ["prediction", "probability", "chance", "will win"]

[broadcast]
topics = ["Topic A?", "Topic B?", "Topic C?"]
"#,
    )
    .unwrap()
}
