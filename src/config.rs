//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or `RELAY_CONFIG`) relative to the current
//! working directory, then layers the deployment environment on top:
//! credentials, listen port and webhook URL discovery. Secrets are only ever
//! read from the environment, never from TOML.

use std::{
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::Path,
};

use serde::Deserialize;

use crate::error::AppError;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Listen port used in webhook mode when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 10000;

/// System prompt seeded into every new conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Respond concisely and helpfully.";

/// Console (stdin/stdout) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Path appended to the public base URL in webhook mode.
    pub webhook_path: String,
}

/// Comms subsystem configuration.
#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub telegram: TelegramConfig,
}

/// OpenAI / OpenAI-compatible provider configuration (`[llm.openai]`).
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens per reply.
    pub max_tokens: u32,
    /// Per-request HTTP timeout. `None` leaves the client default in place.
    pub timeout_seconds: Option<u64>,
}

/// LLM subsystem configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"openai"` or `"dummy"`.
    pub provider: String,
    pub openai: OpenAiConfig,
}

/// Conversation memory configuration (`[memory]`).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Behaviour prompt stored as the first turn of every conversation.
    pub system_prompt: String,
    /// Maximum non-system turns kept per user. `None` = unbounded.
    pub history_cap: Option<usize>,
}

/// How Telegram updates reach the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Long polling from the Telegram API (local development).
    Polling,
    /// Telegram pushes updates to `url`; we listen on `listen`.
    Webhook { listen: SocketAddr, url: String },
}

impl DeliveryMode {
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryMode::Polling => "polling",
            DeliveryMode::Webhook { .. } => "webhook",
        }
    }
}

/// Deployment environment inputs. Collected once by [`EnvVars::from_env`];
/// tests construct it directly instead of mutating process env.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    pub telegram_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub port: Option<String>,
    /// Set on Render; its presence selects webhook mode.
    pub render: Option<String>,
    pub render_external_url: Option<String>,
    pub render_service_name: Option<String>,
    pub log_level: Option<String>,
}

impl EnvVars {
    pub fn from_env() -> Self {
        let get = |key: &str| env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            telegram_token: get("TELEGRAM_TOKEN"),
            openai_api_key: get("OPENAI_API_KEY"),
            port: get("PORT"),
            render: get("RENDER"),
            render_external_url: get("RENDER_EXTERNAL_URL"),
            render_service_name: get("RENDER_SERVICE_NAME"),
            log_level: get("RELAY_LOG_LEVEL"),
        }
    }
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub comms: CommsConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub delivery: DeliveryMode,
    /// From `TELEGRAM_TOKEN`.
    pub telegram_token: Option<String>,
    /// From `OPENAI_API_KEY`.
    pub llm_api_key: Option<String>,
}

impl Config {
    /// Returns `true` if the console channel should be loaded.
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    /// Returns `true` if the Telegram channel should be loaded.
    pub fn comms_telegram_should_load(&self) -> bool {
        self.comms.telegram.enabled
    }

    /// Check that every credential the enabled components need is present.
    ///
    /// Called after CLI flags have been applied, right before startup.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut missing = Vec::new();
        if self.comms_telegram_should_load() && self.telegram_token.is_none() {
            missing.push("TELEGRAM_TOKEN");
        }
        if self.llm.provider != "dummy" && self.llm_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        if !self.comms_telegram_should_load() && !self.comms_pty_should_load() {
            return Err(AppError::Config("no comms channel enabled".into()));
        }
        Ok(())
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    memory: RawMemory,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default = "default_bot_name")]
    name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawBot {
    fn default() -> Self {
        Self { name: default_bot_name(), log_level: default_log_level() }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    telegram: RawTelegram,
}

#[derive(Deserialize, Default)]
struct RawPty {
    /// Defaults to `false`: the console is opt-in (`-i`).
    #[serde(default)]
    enabled: bool,
}

#[derive(Deserialize)]
struct RawTelegram {
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_webhook_path")]
    webhook_path: String,
}

impl Default for RawTelegram {
    fn default() -> Self {
        Self { enabled: true, webhook_path: default_webhook_path() }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self { provider: default_llm_provider(), openai: RawOpenAiConfig::default() }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_model")]
    model: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            model: default_openai_model(),
            temperature: default_openai_temperature(),
            max_tokens: default_openai_max_tokens(),
            timeout_seconds: None,
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(default = "default_system_prompt")]
    system_prompt: String,
    #[serde(default)]
    history_cap: Option<usize>,
}

impl Default for RawMemory {
    fn default() -> Self {
        Self { system_prompt: default_system_prompt(), history_cap: None }
    }
}

fn default_bot_name() -> String { "relay-bot".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_webhook_path() -> String { "/webhook".to_string() }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_max_tokens() -> u32 { 1000 }
fn default_system_prompt() -> String { DEFAULT_SYSTEM_PROMPT.to_string() }

fn default_true() -> bool {
    true
}

/// Load config from `RELAY_CONFIG` (or [`DEFAULT_CONFIG_PATH`]) and the
/// process environment.
///
/// A missing default config file is not an error: every field has a default,
/// so a bare deployment only needs the credential env vars. An explicitly
/// named file must exist.
pub fn load(path_override: Option<&str>) -> Result<Config, AppError> {
    let explicit = path_override
        .map(str::to_string)
        .or_else(|| env::var("RELAY_CONFIG").ok());
    let env = EnvVars::from_env();

    match explicit {
        Some(path) => load_from(Path::new(&path), &env),
        None => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_from(path, &env)
            } else {
                resolve(parse_toml("", path)?, &env)
            }
        }
    }
}

/// Load from an explicit path and environment snapshot.
pub fn load_from(path: &Path, env: &EnvVars) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    resolve(parse_toml(&raw, path)?, env)
}

fn parse_toml(raw: &str, path: &Path) -> Result<RawConfig, AppError> {
    toml::from_str(raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))
}

fn resolve(parsed: RawConfig, env: &EnvVars) -> Result<Config, AppError> {
    let delivery = resolve_delivery(env, &parsed.comms.telegram.webhook_path)?;

    Ok(Config {
        bot_name: parsed.bot.name,
        log_level: env.log_level.clone().unwrap_or(parsed.bot.log_level),
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            telegram: TelegramConfig {
                enabled: parsed.comms.telegram.enabled,
                webhook_path: parsed.comms.telegram.webhook_path,
            },
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                model: parsed.llm.openai.model,
                temperature: parsed.llm.openai.temperature,
                max_tokens: parsed.llm.openai.max_tokens,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        memory: MemoryConfig {
            system_prompt: parsed.memory.system_prompt,
            history_cap: parsed.memory.history_cap,
        },
        delivery,
        telegram_token: env.telegram_token.clone(),
        llm_api_key: env.openai_api_key.clone(),
    })
}

/// Pick polling or webhook delivery from the hosting environment.
///
/// Webhook mode needs a public URL: `RENDER_EXTERNAL_URL` if given, else one
/// derived from `RENDER_SERVICE_NAME`. Neither present is a fatal error.
pub fn resolve_delivery(env: &EnvVars, webhook_path: &str) -> Result<DeliveryMode, AppError> {
    if env.render.is_none() {
        return Ok(DeliveryMode::Polling);
    }

    let public_url = match (&env.render_external_url, &env.render_service_name) {
        (Some(url), _) => url.trim_end_matches('/').to_string(),
        (None, Some(name)) => format!("https://{name}.onrender.com"),
        (None, None) => {
            return Err(AppError::Config(
                "missing RENDER_EXTERNAL_URL environment variable".into(),
            ));
        }
    };

    let port = match &env.port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("invalid PORT '{p}': {e}")))?,
        None => DEFAULT_PORT,
    };

    let path = if webhook_path.starts_with('/') {
        webhook_path.to_string()
    } else {
        format!("/{webhook_path}")
    };

    Ok(DeliveryMode::Webhook {
        listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        url: format!("{public_url}{path}"),
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

#[doc(hidden)]
impl Config {
    /// Safe `Config` for tests — dummy LLM, console only, no credentials.
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            comms: CommsConfig {
                pty: PtyConfig { enabled: true },
                telegram: TelegramConfig { enabled: false, webhook_path: default_webhook_path() },
            },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    max_tokens: 16,
                    timeout_seconds: Some(1),
                },
            },
            memory: MemoryConfig {
                system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
                history_cap: None,
            },
            delivery: DeliveryMode::Polling,
            telegram_token: None,
            llm_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL_TOML: &str = r#"
[bot]
name = "test-bot"
log_level = "info"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn render_env() -> EnvVars {
        EnvVars { render: Some("true".into()), ..EnvVars::default() }
    }

    #[test]
    fn parse_minimal_config_uses_defaults() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &EnvVars::default()).unwrap();
        assert_eq!(cfg.bot_name, "test-bot");
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.openai.model, "gpt-3.5-turbo");
        assert_eq!(cfg.llm.openai.max_tokens, 1000);
        assert!((cfg.llm.openai.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.llm.openai.timeout_seconds, None);
        assert_eq!(cfg.memory.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(cfg.memory.history_cap, None);
        assert!(cfg.comms_telegram_should_load());
        assert!(!cfg.comms_pty_should_load());
        assert_eq!(cfg.delivery, DeliveryMode::Polling);
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(
            r#"
[bot]
name = "full"
log_level = "debug"

[comms.pty]
enabled = true

[comms.telegram]
enabled = false
webhook_path = "/tg"

[llm]
default = "dummy"

[llm.openai]
model = "gpt-4o-mini"
temperature = 0.2
max_tokens = 256
timeout_seconds = 30

[memory]
system_prompt = "Be terse."
history_cap = 20
"#,
        );
        let cfg = load_from(f.path(), &EnvVars::default()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.comms_pty_should_load());
        assert!(!cfg.comms_telegram_should_load());
        assert_eq!(cfg.comms.telegram.webhook_path, "/tg");
        assert_eq!(cfg.llm.provider, "dummy");
        assert_eq!(cfg.llm.openai.max_tokens, 256);
        assert_eq!(cfg.llm.openai.timeout_seconds, Some(30));
        assert_eq!(cfg.memory.system_prompt, "Be terse.");
        assert_eq!(cfg.memory.history_cap, Some(20));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvVars::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn malformed_toml_errors() {
        let f = write_toml("[bot\nname = ");
        let msg = load_from(f.path(), &EnvVars::default()).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn env_log_level_override() {
        let f = write_toml(MINIMAL_TOML);
        let env = EnvVars { log_level: Some("trace".into()), ..EnvVars::default() };
        let cfg = load_from(f.path(), &env).unwrap();
        assert_eq!(cfg.log_level, "trace");
    }

    #[test]
    fn credentials_come_from_env() {
        let f = write_toml(MINIMAL_TOML);
        let env = EnvVars {
            telegram_token: Some("123:abc".into()),
            openai_api_key: Some("sk-test".into()),
            ..EnvVars::default()
        };
        let cfg = load_from(f.path(), &env).unwrap();
        assert_eq!(cfg.telegram_token.as_deref(), Some("123:abc"));
        assert_eq!(cfg.llm_api_key.as_deref(), Some("sk-test"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_reports_all_missing_credentials() {
        let f = write_toml(MINIMAL_TOML);
        let cfg = load_from(f.path(), &EnvVars::default()).unwrap();
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("TELEGRAM_TOKEN"));
        assert!(msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn validate_allows_keyless_dummy_console() {
        assert!(Config::test_default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_no_channels() {
        let mut cfg = Config::test_default();
        cfg.comms.pty.enabled = false;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn polling_without_render() {
        let mode = resolve_delivery(&EnvVars::default(), "/webhook").unwrap();
        assert_eq!(mode, DeliveryMode::Polling);
        assert_eq!(mode.label(), "polling");
    }

    #[test]
    fn webhook_uses_external_url_override() {
        let env = EnvVars {
            render_external_url: Some("https://relay.example.com/".into()),
            render_service_name: Some("ignored".into()),
            port: Some("8443".into()),
            ..render_env()
        };
        let mode = resolve_delivery(&env, "/webhook").unwrap();
        assert_eq!(
            mode,
            DeliveryMode::Webhook {
                listen: "0.0.0.0:8443".parse().unwrap(),
                url: "https://relay.example.com/webhook".into(),
            }
        );
    }

    #[test]
    fn webhook_derives_url_from_service_name() {
        let env = EnvVars { render_service_name: Some("my-bot".into()), ..render_env() };
        match resolve_delivery(&env, "webhook").unwrap() {
            DeliveryMode::Webhook { listen, url } => {
                assert_eq!(url, "https://my-bot.onrender.com/webhook");
                assert_eq!(listen.port(), DEFAULT_PORT);
            }
            other => panic!("expected webhook mode, got {other:?}"),
        }
    }

    #[test]
    fn webhook_without_url_fails_fast() {
        let msg = resolve_delivery(&render_env(), "/webhook").unwrap_err().to_string();
        assert!(msg.contains("RENDER_EXTERNAL_URL"));
    }

    #[test]
    fn webhook_rejects_bad_port() {
        let env = EnvVars {
            render_service_name: Some("my-bot".into()),
            port: Some("not-a-port".into()),
            ..render_env()
        };
        assert!(resolve_delivery(&env, "/webhook").is_err());
    }
}
