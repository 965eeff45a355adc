use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return &self.base_url;
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub twitter: TwitterConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    pub bot: BotConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TwitterConfig {
    pub bot_handle: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub access_token_secret: String,
    #[serde(default)]
    pub bearer_token: String,
    #[serde(default = "default_twitter_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_engine")]
    pub engine: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub creator_name: String,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_critical_backoff_secs")]
    pub critical_backoff_secs: u64,
    #[serde(default = "default_true")]
    pub update_profile: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_hashtags")]
    pub hashtags: String,
}

/// Fixed phrases. `{creator}`, `{question}` and `{context}` are substituted at use.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_clarification")]
    pub clarification: String,
    #[serde(default = "default_search_fallback")]
    pub search_fallback: String,
    #[serde(default = "default_generation_fallback")]
    pub generation_fallback: String,
    #[serde(default = "default_question_reframe")]
    pub question_reframe: String,
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_profile_description")]
    pub profile_description: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            engine: default_search_engine(),
            base_url: default_search_base_url(),
            max_snippets: default_max_snippets(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topics: default_topics(),
            interval_hours: default_interval_hours(),
            hashtags: default_hashtags(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            signature: default_signature(),
            clarification: default_clarification(),
            search_fallback: default_search_fallback(),
            generation_fallback: default_generation_fallback(),
            question_reframe: default_question_reframe(),
            prompt_template: default_prompt_template(),
            profile_description: default_profile_description(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_system_prompt() -> String {
    "You are an analytical prediction bot.".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_twitter_api_base() -> String {
    "https://api.twitter.com".to_string()
}

fn default_max_chars() -> usize {
    280
}

fn default_search_engine() -> String {
    "google".to_string()
}

fn default_search_base_url() -> String {
    "https://serpapi.com/search.json".to_string()
}

fn default_max_snippets() -> usize {
    3
}

fn default_keywords() -> Vec<String> {
    [
        "prediction",
        "probability",
        "chance",
        "will win",
        "elected",
        "predicción",
        "probabilidad",
        "ganará",
        "pierre poilievre",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    10
}

fn default_error_backoff_secs() -> u64 {
    60
}

fn default_critical_backoff_secs() -> u64 {
    300
}

fn default_topics() -> Vec<String> {
    vec![
        "Pierre Poilievre elected Canadian Prime Minister?".to_string(),
        "Will the economy improve in the next quarter?".to_string(),
        "Will it rain this afternoon in New York?".to_string(),
    ]
}

fn default_interval_hours() -> u64 {
    6
}

fn default_hashtags() -> String {
    "#Predicción #Bot".to_string()
}

fn default_signature() -> String {
    "Automatizado por {creator}.".to_string()
}

fn default_clarification() -> String {
    "I'm not sure how to help. Could you ask a question or request a prediction?".to_string()
}

fn default_search_fallback() -> String {
    "no relevant information found".to_string()
}

fn default_generation_fallback() -> String {
    "unable to generate a prediction right now".to_string()
}

fn default_question_reframe() -> String {
    "What is the probability that {question}?".to_string()
}

fn default_prompt_template() -> String {
    "Context: {context}\nQuestion: {question}\n\
     Answer briefly and analytically, as a prediction bot would."
        .to_string()
}

fn default_profile_description() -> String {
    "Prediction bot. Automatizado por {creator}.".to_string()
}

/// Fill an empty credential from the environment.
fn env_fallback(value: &mut String, var: &str) {
    if !value.is_empty() {
        return;
    }
    if let Ok(env_value) = std::env::var(var) {
        if !env_value.is_empty() {
            *value = env_value;
        }
    }
}

impl Config {
    /// Attribution signature with the creator name filled in.
    pub fn signature(&self) -> String {
        self.messages
            .signature
            .replace("{creator}", &self.bot.creator_name)
    }

    pub fn profile_description(&self) -> String {
        self.messages
            .profile_description
            .replace("{creator}", &self.bot.creator_name)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env_fallbacks();
        Ok(config)
    }

    /// Parse and validate without touching the environment.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Invalid TOML")?;

        config.twitter.bot_handle = config
            .twitter
            .bot_handle
            .trim()
            .trim_start_matches('@')
            .to_string();
        config.bot.batch_size = config.bot.batch_size.clamp(10, 100);
        config.bot.keywords = config
            .bot
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.twitter.bot_handle.is_empty() {
            anyhow::bail!("[twitter] bot_handle must not be empty");
        }
        if self.bot.creator_name.trim().is_empty() {
            anyhow::bail!("[bot] creator_name must not be empty");
        }
        if self.broadcast.topics.is_empty() {
            anyhow::bail!("[broadcast] topics must contain at least one topic");
        }
        if self.broadcast.interval_hours == 0 {
            anyhow::bail!("[broadcast] interval_hours must be greater than zero");
        }
        if [
            self.twitter.request_timeout_secs,
            self.search.request_timeout_secs,
            self.llm.request_timeout_secs,
        ]
        .contains(&0)
        {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        if self.twitter.max_chars == 0 {
            anyhow::bail!("[twitter] max_chars must be greater than zero");
        }
        Ok(())
    }

    fn apply_env_fallbacks(&mut self) {
        env_fallback(&mut self.twitter.api_key, "X_API_KEY");
        env_fallback(&mut self.twitter.api_secret, "X_API_SECRET");
        env_fallback(&mut self.twitter.access_token, "X_ACCESS_TOKEN");
        env_fallback(&mut self.twitter.access_token_secret, "X_ACCESS_TOKEN_SECRET");
        env_fallback(&mut self.twitter.bearer_token, "X_BEARER_TOKEN");
        env_fallback(&mut self.search.api_key, "SERPAPI_KEY");
        env_fallback(&mut self.llm.api_key, "OPENAI_API_KEY");
    }
}
