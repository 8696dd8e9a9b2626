//! Configuration loading, validation, and hot-reload diffing.
//!
//! The configuration file is JSON at `<state-dir>/config.json`. After the
//! JSON load, environment variables of the form `PICOCLAW_<SECTION>_<KEY>`
//! override individual fields; the overlay is driven by a data table rather
//! than reflection, so every binding is explicit and checked.

pub mod paths;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use paths::{
    auth_path, builtin_skills_path, config_path, default_workspace, expand_home,
    global_skills_path, home_dir, state_dir,
};

/// A `Vec<String>` that also accepts JSON numbers, so allowlists can
/// contain both `"123"` and `123`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlexibleStringList(pub Vec<String>);

impl<'de> Deserialize<'de> for FlexibleStringList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<serde_json::Value>::deserialize(deserializer)?;
        let items = raw
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                other => other.to_string(),
            })
            .collect();
        Ok(Self(items))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_workspace_str")]
    pub workspace: String,

    #[serde(default = "default_true")]
    pub restrict_to_workspace: bool,

    #[serde(default)]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    #[serde(default = "default_bootstrap_max_chars")]
    pub bootstrap_max_chars: usize,

    #[serde(default = "default_bootstrap_total_max_chars")]
    pub bootstrap_total_max_chars: usize,

    #[serde(default)]
    pub context_pruning: ContextPruningConfig,

    /// Extra memory directory, relative to the workspace unless absolute
    #[serde(default)]
    pub additional_memory_dir: String,
}

fn default_workspace_str() -> String {
    paths::default_workspace().to_string_lossy().to_string()
}
fn default_model() -> String {
    "glm-4.7".into()
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tool_iterations() -> u32 {
    20
}
fn default_bootstrap_max_chars() -> usize {
    20_000
}
fn default_bootstrap_total_max_chars() -> usize {
    24_000
}
fn default_true() -> bool {
    true
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            workspace: default_workspace_str(),
            restrict_to_workspace: true,
            provider: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            bootstrap_max_chars: default_bootstrap_max_chars(),
            bootstrap_total_max_chars: default_bootstrap_total_max_chars(),
            context_pruning: ContextPruningConfig::default(),
            additional_memory_dir: String::new(),
        }
    }
}

/// TTL-based context pruning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPruningConfig {
    #[serde(default = "default_pruning_mode")]
    pub mode: String,

    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u32,

    #[serde(default = "default_keep_last_assistants")]
    pub keep_last_assistants: usize,

    #[serde(default = "default_soft_trim_ratio")]
    pub soft_trim_ratio: f64,

    #[serde(default = "default_hard_clear_ratio")]
    pub hard_clear_ratio: f64,

    #[serde(default = "default_min_prunable_tool_chars")]
    pub min_prunable_tool_chars: usize,
}

fn default_pruning_mode() -> String {
    "off".into()
}
fn default_ttl_minutes() -> u32 {
    60
}
fn default_keep_last_assistants() -> usize {
    4
}
fn default_soft_trim_ratio() -> f64 {
    0.3
}
fn default_hard_clear_ratio() -> f64 {
    0.5
}
fn default_min_prunable_tool_chars() -> usize {
    1000
}

impl Default for ContextPruningConfig {
    fn default() -> Self {
        Self {
            mode: default_pruning_mode(),
            ttl_minutes: default_ttl_minutes(),
            keep_last_assistants: default_keep_last_assistants(),
            soft_trim_ratio: default_soft_trim_ratio(),
            hard_clear_ratio: default_hard_clear_ratio(),
            min_prunable_tool_chars: default_min_prunable_tool_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub allow_from: FlexibleStringList,

    #[serde(default)]
    pub require_mention: bool,

    /// "off", "first", "all"
    #[serde(default = "default_reply_to_mode")]
    pub reply_to_mode: String,

    /// "open", "allowlist", "disabled"
    #[serde(default = "default_dm_policy")]
    pub dm_policy: String,
}

fn default_reply_to_mode() -> String {
    "first".into()
}
fn default_dm_policy() -> String {
    "allowlist".into()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            allow_from: FlexibleStringList::default(),
            require_mention: false,
            reply_to_mode: default_reply_to_mode(),
            dm_policy: default_dm_policy(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub api_base: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub proxy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}
fn default_gateway_port() -> u16 {
    18790
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web: WebToolsConfig,
    #[serde(default)]
    pub cron: CronToolsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebToolsConfig {
    #[serde(default)]
    pub brave: BraveConfig,
    #[serde(default)]
    pub duckduckgo: DuckDuckGoConfig,
    #[serde(default)]
    pub perplexity: PerplexityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BraveConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuckDuckGoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerplexityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    5
}

impl Default for BraveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

impl Default for DuckDuckGoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: default_max_results(),
        }
    }
}

impl Default for PerplexityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronToolsConfig {
    /// 0 means no timeout
    #[serde(default = "default_exec_timeout_minutes")]
    pub exec_timeout_minutes: u32,
}

fn default_exec_timeout_minutes() -> u32 {
    5
}

impl Default for CronToolsConfig {
    fn default() -> Self {
        Self {
            exec_timeout_minutes: default_exec_timeout_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval")]
    pub interval_minutes: u32,
}

fn default_heartbeat_interval() -> u32 {
    30
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub monitor_usb: bool,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            monitor_usb: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agents: AgentsConfig::default(),
            channels: ChannelsConfig::default(),
            providers: BTreeMap::new(),
            gateway: GatewayConfig::default(),
            tools: ToolsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            devices: DevicesConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write config file at {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Environment override {variable}: {reason}")]
    EnvOverride { variable: String, reason: String },
}

/// Load configuration from `path`. A missing file yields defaults; the
/// environment overlay is applied in both cases.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config = match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            Config::default()
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    };

    config.apply_env_overrides()?;
    Ok(config)
}

/// Write configuration as pretty JSON, creating parent directories.
pub fn save_config(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let data = serde_json::to_string_pretty(config).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    std::fs::write(path, data).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

type EnvSetter = fn(&mut Config, &str) -> Result<(), String>;

/// The data-driven environment overlay: variable name → field assignment.
/// Every recognized binding is listed here explicitly.
const ENV_BINDINGS: &[(&str, EnvSetter)] = &[
    ("PICOCLAW_AGENTS_DEFAULTS_WORKSPACE", |c, v| {
        c.agents.defaults.workspace = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_RESTRICT_TO_WORKSPACE", |c, v| {
        c.agents.defaults.restrict_to_workspace = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_PROVIDER", |c, v| {
        c.agents.defaults.provider = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_MODEL", |c, v| {
        c.agents.defaults.model = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_MAX_TOKENS", |c, v| {
        c.agents.defaults.max_tokens = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_TEMPERATURE", |c, v| {
        c.agents.defaults.temperature = parse_float(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_MAX_TOOL_ITERATIONS", |c, v| {
        c.agents.defaults.max_tool_iterations = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_BOOTSTRAP_MAX_CHARS", |c, v| {
        c.agents.defaults.bootstrap_max_chars = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_BOOTSTRAP_TOTAL_MAX_CHARS", |c, v| {
        c.agents.defaults.bootstrap_total_max_chars = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_ADDITIONAL_MEMORY_DIR", |c, v| {
        c.agents.defaults.additional_memory_dir = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_MODE", |c, v| {
        c.agents.defaults.context_pruning.mode = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_TTL_MINUTES", |c, v| {
        c.agents.defaults.context_pruning.ttl_minutes = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_KEEP_LAST_ASSISTANTS", |c, v| {
        c.agents.defaults.context_pruning.keep_last_assistants = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_SOFT_TRIM_RATIO", |c, v| {
        c.agents.defaults.context_pruning.soft_trim_ratio = parse_float(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_HARD_CLEAR_RATIO", |c, v| {
        c.agents.defaults.context_pruning.hard_clear_ratio = parse_float(v)?;
        Ok(())
    }),
    ("PICOCLAW_AGENTS_DEFAULTS_CONTEXT_PRUNING_MIN_PRUNABLE_TOOL_CHARS", |c, v| {
        c.agents.defaults.context_pruning.min_prunable_tool_chars = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_CHANNELS_DISCORD_ENABLED", |c, v| {
        c.channels.discord.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_CHANNELS_DISCORD_TOKEN", |c, v| {
        c.channels.discord.token = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_CHANNELS_DISCORD_REQUIRE_MENTION", |c, v| {
        c.channels.discord.require_mention = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_CHANNELS_DISCORD_REPLY_TO_MODE", |c, v| {
        c.channels.discord.reply_to_mode = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_CHANNELS_DISCORD_DM_POLICY", |c, v| {
        c.channels.discord.dm_policy = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_GATEWAY_HOST", |c, v| {
        c.gateway.host = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_GATEWAY_PORT", |c, v| {
        c.gateway.port = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_BRAVE_ENABLED", |c, v| {
        c.tools.web.brave.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_BRAVE_API_KEY", |c, v| {
        c.tools.web.brave.api_key = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_BRAVE_MAX_RESULTS", |c, v| {
        c.tools.web.brave.max_results = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_DUCKDUCKGO_ENABLED", |c, v| {
        c.tools.web.duckduckgo.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_DUCKDUCKGO_MAX_RESULTS", |c, v| {
        c.tools.web.duckduckgo.max_results = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_PERPLEXITY_ENABLED", |c, v| {
        c.tools.web.perplexity.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_PERPLEXITY_API_KEY", |c, v| {
        c.tools.web.perplexity.api_key = v.to_string();
        Ok(())
    }),
    ("PICOCLAW_TOOLS_WEB_PERPLEXITY_MAX_RESULTS", |c, v| {
        c.tools.web.perplexity.max_results = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_TOOLS_CRON_EXEC_TIMEOUT_MINUTES", |c, v| {
        c.tools.cron.exec_timeout_minutes = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_HEARTBEAT_ENABLED", |c, v| {
        c.heartbeat.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_HEARTBEAT_INTERVAL_MINUTES", |c, v| {
        c.heartbeat.interval_minutes = parse_num(v)?;
        Ok(())
    }),
    ("PICOCLAW_DEVICES_ENABLED", |c, v| {
        c.devices.enabled = parse_bool(v)?;
        Ok(())
    }),
    ("PICOCLAW_DEVICES_MONITOR_USB", |c, v| {
        c.devices.monitor_usb = parse_bool(v)?;
        Ok(())
    }),
];

fn parse_bool(v: &str) -> Result<bool, String> {
    match v.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected boolean, got {other:?}")),
    }
}

fn parse_num<T: std::str::FromStr>(v: &str) -> Result<T, String> {
    v.trim()
        .parse()
        .map_err(|_| format!("expected number, got {v:?}"))
}

fn parse_float(v: &str) -> Result<f64, String> {
    v.trim()
        .parse()
        .map_err(|_| format!("expected float, got {v:?}"))
}

impl Config {
    /// Apply `PICOCLAW_*` environment variable overrides on top of the
    /// loaded values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (variable, setter) in ENV_BINDINGS {
            let Ok(value) = std::env::var(variable) else {
                continue;
            };
            setter(self, &value).map_err(|reason| ConfigError::EnvOverride {
                variable: variable.to_string(),
                reason,
            })?;
        }

        // Provider credentials: PICOCLAW_PROVIDERS_<NAME>_API_KEY etc.
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix("PICOCLAW_PROVIDERS_") else {
                continue;
            };
            let (name, field): (&str, fn(&mut ProviderConfig, String)) =
                if let Some(name) = rest.strip_suffix("_API_KEY") {
                    (name, |p, v| p.api_key = v)
                } else if let Some(name) = rest.strip_suffix("_API_BASE") {
                    (name, |p, v| p.api_base = v)
                } else if let Some(name) = rest.strip_suffix("_PROXY") {
                    (name, |p, v| p.proxy = v)
                } else {
                    continue;
                };
            if name.is_empty() {
                continue;
            }
            let entry = self.providers.entry(name.to_ascii_lowercase()).or_default();
            field(entry, value);
        }

        Ok(())
    }

    /// The workspace path with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.agents.defaults.workspace))
    }

    /// The additional memory directory: empty when unset, joined to the
    /// workspace when relative, `~`-expanded when user-prefixed.
    pub fn additional_memory_path(&self) -> Option<PathBuf> {
        let dir = self.agents.defaults.additional_memory_dir.trim();
        if dir.is_empty() {
            return None;
        }
        let expanded = expand_home(dir);
        let path = PathBuf::from(&expanded);
        if path.is_absolute() {
            Some(path)
        } else {
            Some(self.workspace_path().join(path))
        }
    }

    /// The first configured API key, in preference order.
    pub fn api_key(&self) -> Option<&str> {
        const PREFERENCE: &[&str] = &["openrouter", "openai", "gemini", "zhipu", "groq", "vllm", "deepseek"];
        PREFERENCE
            .iter()
            .filter_map(|name| self.providers.get(*name))
            .map(|p| p.api_key.as_str())
            .find(|k| !k.is_empty())
    }

    /// The API base URL matching the selected key, with the OpenRouter
    /// default filled in.
    pub fn api_base(&self) -> Option<String> {
        let openrouter = self.providers.get("openrouter");
        if openrouter.is_some_and(|p| !p.api_key.is_empty()) {
            let base = openrouter.map(|p| p.api_base.as_str()).unwrap_or("");
            return Some(if base.is_empty() {
                "https://openrouter.ai/api/v1".to_string()
            } else {
                base.to_string()
            });
        }
        const PREFERENCE: &[&str] = &["openai", "gemini", "zhipu", "groq", "vllm", "deepseek"];
        PREFERENCE
            .iter()
            .filter_map(|name| self.providers.get(*name))
            .find(|p| !p.api_key.is_empty() && !p.api_base.is_empty())
            .map(|p| p.api_base.clone())
    }

    /// Diff this config against `new`, returning the names of changed
    /// hot-reloadable fields. Cold fields (workspace, channels, gateway)
    /// are deliberately excluded: they require a restart.
    pub fn compare_hot_reloadable(&self, new: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let a = &self.agents.defaults;
        let b = &new.agents.defaults;

        if a.model != b.model {
            changed.push("model");
        }
        if a.max_tokens != b.max_tokens {
            changed.push("max_tokens");
        }
        if (a.temperature - b.temperature).abs() > f64::EPSILON {
            changed.push("temperature");
        }
        if a.max_tool_iterations != b.max_tool_iterations {
            changed.push("max_tool_iterations");
        }
        if a.bootstrap_max_chars != b.bootstrap_max_chars {
            changed.push("bootstrap_max_chars");
        }
        if a.bootstrap_total_max_chars != b.bootstrap_total_max_chars {
            changed.push("bootstrap_total_max_chars");
        }
        if a.context_pruning != b.context_pruning {
            changed.push("context_pruning");
        }
        if a.additional_memory_dir != b.additional_memory_dir {
            changed.push("additional_memory_dir");
        }
        if self.tools.web != new.tools.web {
            changed.push("tools.web");
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.agents.defaults.model, "glm-4.7");
        assert_eq!(cfg.agents.defaults.max_tokens, 8192);
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 20);
        assert_eq!(cfg.agents.defaults.bootstrap_max_chars, 20_000);
        assert_eq!(cfg.agents.defaults.bootstrap_total_max_chars, 24_000);
        assert_eq!(cfg.agents.defaults.context_pruning.mode, "off");
        assert_eq!(cfg.agents.defaults.context_pruning.keep_last_assistants, 4);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
        assert_eq!(cfg.gateway.port, 18790);
        assert!(cfg.heartbeat.enabled);
        assert!(!cfg.channels.discord.enabled);
        assert!(cfg.tools.web.duckduckgo.enabled);
        assert_eq!(cfg.tools.web.brave.max_results, 5);
        assert!(!cfg.agents.defaults.workspace.is_empty());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let cfg = load_config(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(cfg.agents.defaults.model, "glm-4.7");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"agents": {"defaults": {"model": "gpt-4o", "max_tokens": 2048}}}"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.agents.defaults.model, "gpt-4o");
        assert_eq!(cfg.agents.defaults.max_tokens, 2048);
        // Untouched fields keep their defaults
        assert_eq!(cfg.agents.defaults.max_tool_iterations, 20);
        assert_eq!(cfg.gateway.port, 18790);
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut cfg = Config::default();
        cfg.agents.defaults.model = "custom-model".into();
        cfg.providers.insert(
            "zhipu".into(),
            ProviderConfig {
                api_key: "key".into(),
                api_base: "https://api.z.ai/v1".into(),
                proxy: String::new(),
            },
        );

        save_config(&path, &cfg).unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        let reloaded: Config = serde_json::from_str(&data).unwrap();
        assert_eq!(reloaded.agents.defaults.model, "custom-model");
        assert_eq!(reloaded.providers["zhipu"].api_key, "key");
    }

    #[test]
    fn env_override_model() {
        std::env::set_var("PICOCLAW_AGENTS_DEFAULTS_MODEL", "env-model");
        let mut cfg = Config::default();
        cfg.apply_env_overrides().unwrap();
        std::env::remove_var("PICOCLAW_AGENTS_DEFAULTS_MODEL");
        assert_eq!(cfg.agents.defaults.model, "env-model");
    }

    #[test]
    fn env_override_rejects_bad_number() {
        std::env::set_var("PICOCLAW_GATEWAY_PORT", "not-a-port");
        let mut cfg = Config::default();
        let err = cfg.apply_env_overrides().unwrap_err();
        std::env::remove_var("PICOCLAW_GATEWAY_PORT");
        assert!(matches!(err, ConfigError::EnvOverride { .. }));
    }

    #[test]
    fn env_override_provider_key() {
        std::env::set_var("PICOCLAW_PROVIDERS_MOONSHOT_API_KEY", "mk-123");
        let mut cfg = Config::default();
        cfg.apply_env_overrides().unwrap();
        std::env::remove_var("PICOCLAW_PROVIDERS_MOONSHOT_API_KEY");
        assert_eq!(cfg.providers["moonshot"].api_key, "mk-123");
    }

    #[test]
    fn flexible_list_accepts_numbers() {
        let json = r#"{"enabled": true, "allow_from": ["alice", 123]}"#;
        let discord: DiscordConfig = serde_json::from_str(json).unwrap();
        assert_eq!(discord.allow_from.0, vec!["alice", "123"]);
    }

    #[test]
    fn api_key_preference_order() {
        let mut cfg = Config::default();
        cfg.providers.insert(
            "zhipu".into(),
            ProviderConfig {
                api_key: "z-key".into(),
                ..Default::default()
            },
        );
        cfg.providers.insert(
            "openrouter".into(),
            ProviderConfig {
                api_key: "or-key".into(),
                ..Default::default()
            },
        );
        assert_eq!(cfg.api_key(), Some("or-key"));
        assert_eq!(cfg.api_base().as_deref(), Some("https://openrouter.ai/api/v1"));
    }

    #[test]
    fn additional_memory_path_variants() {
        let mut cfg = Config::default();
        assert!(cfg.additional_memory_path().is_none());

        cfg.agents.defaults.workspace = "/tmp/picoclaw-workspace".into();
        cfg.agents.defaults.additional_memory_dir = "extra-memory".into();
        assert_eq!(
            cfg.additional_memory_path().unwrap(),
            PathBuf::from("/tmp/picoclaw-workspace/extra-memory")
        );

        cfg.agents.defaults.additional_memory_dir = "/var/lib/picoclaw-memory".into();
        assert_eq!(
            cfg.additional_memory_path().unwrap(),
            PathBuf::from("/var/lib/picoclaw-memory")
        );
    }

    #[test]
    fn compare_hot_reloadable_no_changes() {
        let a = Config::default();
        let b = Config::default();
        assert!(a.compare_hot_reloadable(&b).is_empty());
    }

    #[test]
    fn compare_hot_reloadable_detects_changes() {
        let a = Config::default();
        let mut b = Config::default();
        b.agents.defaults.model = "other-model".into();
        b.agents.defaults.context_pruning.mode = "cache-ttl".into();
        b.tools.web.brave.enabled = true;
        b.agents.defaults.additional_memory_dir = "/extra/memory".into();

        let changed = a.compare_hot_reloadable(&b);
        assert!(changed.contains(&"model"));
        assert!(changed.contains(&"context_pruning"));
        assert!(changed.contains(&"tools.web"));
        assert!(changed.contains(&"additional_memory_dir"));
        assert!(!changed.contains(&"max_tokens"));
    }

    #[test]
    fn cold_fields_do_not_trigger_reload() {
        let a = Config::default();
        let mut b = Config::default();
        b.gateway.port = 9999;
        b.channels.discord.enabled = true;
        assert!(a.compare_hot_reloadable(&b).is_empty());
    }
}
