use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const TELEGRAM_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const MODEL_VAR: &str = "OPENAI_MODEL";
pub const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const WEBHOOK_URL_VAR: &str = "AUTOMATION_WEBHOOK_URL";

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

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Empty means every user is served.
    #[serde(default)]
    pub allowed_user_ids: Vec<u64>,
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
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: default_model(),
            base_url: String::new(),
            api_key: String::new(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

/// System personas and the fixed instruction sent with every photo.
#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_text_system")]
    pub text_system: String,
    #[serde(default = "default_image_system")]
    pub image_system: String,
    #[serde(default = "default_image_instruction")]
    pub image_instruction: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            text_system: default_text_system(),
            image_system: default_image_system(),
            image_instruction: default_image_instruction(),
        }
    }
}

/// User-visible fixed strings.
#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_text_fallback")]
    pub text_fallback: String,
    #[serde(default = "default_image_fallback")]
    pub image_fallback: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
            text_fallback: default_text_fallback(),
            image_fallback: default_image_fallback(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_text_system() -> String {
    "You are a friendly Turkish chatbot talking inside a Telegram bot. \
     Explain things clearly and briefly, and feel free to answer in Turkish \
     unless the user clearly writes in another language."
        .to_string()
}

fn default_image_system() -> String {
    "You are an image analysis assistant inside a Telegram bot. \
     Describe what you see accurately and concisely, answering in Turkish \
     unless asked otherwise."
        .to_string()
}

fn default_image_instruction() -> String {
    "Describe this image in detail: the main subjects, the setting, \
     and any visible text."
        .to_string()
}

fn default_greeting() -> String {
    "Merhaba! 👋 Ben ChatGPT destekli Telegram botunum.\n\
     Bana metin ya da fotoğraf gönderebilirsin."
        .to_string()
}

fn default_text_fallback() -> String {
    "Şu an OpenAI ile konuşurken bir hata oldu, lütfen biraz sonra tekrar dene.".to_string()
}

fn default_image_fallback() -> String {
    "Fotoğrafı analiz ederken bir hata oldu, lütfen biraz sonra tekrar dene.".to_string()
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

/// Reads an environment-style variable, treating empty values as unset.
fn lookup<F>(env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay the
    /// environment. `env` is the variable lookup (normally `std::env::var`).
    pub fn load<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::parse(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env(&env);
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(env, TELEGRAM_TOKEN_VAR) {
            self.telegram.bot_token = token;
        }
        if let Some(key) = lookup(env, API_KEY_VAR) {
            self.llm.api_key = key;
        }
        if let Some(model) = lookup(env, MODEL_VAR) {
            self.llm.model = model;
        }
        if let Some(base_url) = lookup(env, BASE_URL_VAR) {
            self.llm.base_url = base_url;
        }
        if let Some(url) = lookup(env, WEBHOOK_URL_VAR) {
            self.webhook.url = Some(url);
        }
        // An empty url in the file also disables the relay
        if self.webhook.url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            self.webhook.url = None;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!(
                "Telegram bot token is not set: export {} or set [telegram] bot_token",
                TELEGRAM_TOKEN_VAR
            );
        }
        // Local Ollama servers accept any key
        if self.llm.api_key.trim().is_empty() && self.llm.provider != LlmProvider::Ollama {
            bail!(
                "Inference API key is not set: export {} or set [llm] api_key",
                API_KEY_VAR
            );
        }
        if self.llm.model.trim().is_empty() {
            bail!("[llm] model must not be empty");
        }
        // Telegram refuses to send an empty message
        for (key, value) in [
            ("greeting", &self.messages.greeting),
            ("text_fallback", &self.messages.text_fallback),
            ("image_fallback", &self.messages.image_fallback),
        ] {
            if value.trim().is_empty() {
                bail!("[messages] {} must not be empty", key);
            }
        }
        Ok(())
    }
}
