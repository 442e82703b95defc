//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Drawbridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas: Option<CanvasConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<SessionsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP port for the control surface and the streaming endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Port of the canvas WebSocket listener.
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Endpoint advertised to HTTP clients. Defaults to `ws://<bind>:<ws_port>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ws_url: Option<String>,

    #[serde(default = "default_true")]
    pub cors: bool,
}

fn default_port() -> u16 {
    3000
}

fn default_ws_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// File the canvas is snapshotted to. Persistence is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// URL of the remote agent that streams tool calls and the final history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Tool names whose arguments describe canvas elements.
    #[serde(default = "default_drawing_tools")]
    pub drawing_tools: Vec<String>,

    #[serde(default)]
    pub confirm: ConfirmMode,

    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_env: None,
            drawing_tools: default_drawing_tools(),
            confirm: ConfirmMode::default(),
            timeout_secs: default_agent_timeout(),
        }
    }
}

impl AgentConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

fn default_drawing_tools() -> Vec<String> {
    vec!["draw_on_canvas".into(), "update_canvas".into()]
}

fn default_agent_timeout() -> u64 {
    120
}

/// How tool calls are confirmed before the agent continues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmMode {
    #[default]
    Always,
    Never,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory for per-session transcripts. Persistence is off when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "drawbridge_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

fn substitute_env_vars(input: &str) -> String {
    let Ok(re) = regex::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

impl Config {
    /// Load config from a JSON5 file. A missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::DrawbridgeError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::DrawbridgeError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or_else(default_port)
    }

    pub fn ws_port(&self) -> u16 {
        self.gateway
            .as_ref()
            .map(|g| g.ws_port)
            .unwrap_or_else(default_ws_port)
    }

    pub fn bind_addr(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn cors_enabled(&self) -> bool {
        self.gateway.as_ref().is_none_or(|g| g.cors)
    }

    /// WebSocket endpoint reported by the control surface.
    pub fn public_ws_url(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.public_ws_url.clone())
            .unwrap_or_else(|| format!("ws://{}:{}", self.bind_addr(), self.ws_port()))
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.canvas
            .as_ref()
            .and_then(|c| c.snapshot_path.as_deref())
            .map(expand_path)
    }

    pub fn transcript_dir(&self) -> Option<PathBuf> {
        self.sessions
            .as_ref()
            .and_then(|s| s.transcript_dir.as_deref())
            .map(expand_path)
    }

    /// Agent settings with defaults filled in.
    pub fn agent(&self) -> AgentConfig {
        self.agent.clone().unwrap_or_default()
    }

    /// Validate the config. Returns `(warnings, errors)`.
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(gateway) = &self.gateway {
            if gateway.port == gateway.ws_port {
                errors.push(format!(
                    "gateway.port and gateway.ws_port must differ (both {})",
                    gateway.port
                ));
            }
            if let Some(url) = &gateway.public_ws_url {
                if !url.starts_with("ws://") && !url.starts_with("wss://") {
                    errors.push(format!("gateway.public_ws_url must be a ws:// or wss:// URL, got '{url}'"));
                }
            }
        }

        if let Some(agent) = &self.agent {
            match &agent.endpoint {
                Some(endpoint) => {
                    if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                        errors.push(format!("agent.endpoint must be an http(s) URL, got '{endpoint}'"));
                    }
                    if agent.api_key_env.is_some() && agent.resolve_api_key().is_none() {
                        warnings.push("agent.api_key_env is set but the variable is empty".into());
                    }
                }
                None => warnings.push("agent.endpoint is not set; the stream endpoint will be unavailable".into()),
            }
            if agent.drawing_tools.is_empty() {
                warnings.push("agent.drawing_tools is empty; agent output will never reach the canvas".into());
            }
        }

        if let Some(logging) = &self.logging {
            if !matches!(logging.format.as_str(), "plain" | "json") {
                warnings.push(format!("Unknown logging.format '{}', using plain", logging.format));
            }
            if !matches!(logging.output.as_str(), "stderr" | "stdout") {
                warnings.push(format!("Unknown logging.output '{}', using stderr", logging.output));
            }
        }

        (warnings, errors)
    }
}

pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".drawbridge")
}
