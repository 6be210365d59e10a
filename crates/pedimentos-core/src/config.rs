use crate::error::Result;
use crate::orchestrator::{Discovery, Timing};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const CONFIG_FILE: &str = "pedimentos.yaml";

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

/// Customs REST backend holding the service records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}

fn default_api_timeout() -> u64 {
    5
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            token: String::new(),
            timeout_secs: default_api_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServicesConfig / ProcessorConfig
// ---------------------------------------------------------------------------

/// Base URL of the dependent partidas/remesas/acuse endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_services_url")]
    pub base_url: String,
    #[serde(default = "default_services_timeout")]
    pub timeout_secs: u64,
}

fn default_services_url() -> String {
    "http://localhost:8003".to_string()
}

fn default_services_timeout() -> u64 {
    300
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: default_services_url(),
            timeout_secs: default_services_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_processor_url")]
    pub url: String,
    #[serde(default = "default_services_timeout")]
    pub timeout_secs: u64,
}

fn default_processor_url() -> String {
    "http://localhost:8002/pedimento_completo".to_string()
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            url: default_processor_url(),
            timeout_secs: default_services_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RegistryBackend {
    #[default]
    Rest,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub backend: RegistryBackend,
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
    /// Age after which a record still `IN_PROGRESS` at startup is considered
    /// abandoned. Local backend only.
    #[serde(default = "default_recovery_age")]
    pub recovery_max_age_secs: u64,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(".pedimentos/registry.redb")
}

fn default_recovery_age() -> u64 {
    600
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::default(),
            path: default_registry_path(),
            recovery_max_age_secs: default_recovery_age(),
        }
    }
}

impl RegistryConfig {
    /// `path` resolved against `root` when relative.
    pub fn resolved_path(&self, root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            root.join(&self.path)
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestratorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay() -> u64 {
    2
}

fn default_max_delay() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_inter_step_delay")]
    pub inter_step_delay_secs: u64,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_settle_delay() -> u64 {
    5
}

fn default_inter_step_delay() -> u64 {
    3
}

fn default_discovery_timeout() -> u64 {
    30
}

fn default_discovery_interval() -> u64 {
    1
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            inter_step_delay_secs: default_inter_step_delay(),
            discovery_timeout_secs: default_discovery_timeout(),
            discovery_interval_secs: default_discovery_interval(),
            retry: RetryConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load `pedimentos.yaml` from `root`. A missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = config_path(root);
        let data = serde_yaml::to_string(self)?;
        atomic_write(&path, data.as_bytes())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.orchestrator.retry;
        RetryPolicy::new(
            Duration::from_secs(retry.base_delay_secs),
            Duration::from_secs(retry.max_delay_secs),
            retry.max_attempts,
        )
    }

    pub fn discovery(&self) -> Discovery {
        Discovery {
            timeout: Duration::from_secs(self.orchestrator.discovery_timeout_secs),
            interval: Duration::from_secs(self.orchestrator.discovery_interval_secs),
        }
    }

    pub fn timing(&self) -> Timing {
        Timing {
            settle_delay: Duration::from_secs(self.orchestrator.settle_delay_secs),
            inter_step_delay: Duration::from_secs(self.orchestrator.inter_step_delay_secs),
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        for (field, url) in [
            ("api.base_url", &self.api.base_url),
            ("services.base_url", &self.services.base_url),
            ("processor.url", &self.processor.url),
        ] {
            if url.trim().is_empty() {
                push(WarnLevel::Error, format!("{field} is empty"));
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                push(
                    WarnLevel::Error,
                    format!("{field} '{url}' is not an http(s) URL"),
                );
            }
        }

        if self.server.serves(&self.services.base_url) {
            push(
                WarnLevel::Warning,
                format!(
                    "services.base_url '{}' points at this server, which does not host the dependent services",
                    self.services.base_url
                ),
            );
        }

        if self.registry.backend == RegistryBackend::Rest && self.api.token.trim().is_empty() {
            push(
                WarnLevel::Warning,
                "api.token is empty; the customs API will reject unauthenticated calls"
                    .to_string(),
            );
        }

        let orch = &self.orchestrator;
        if orch.discovery_interval_secs == 0 {
            push(
                WarnLevel::Error,
                "orchestrator.discovery_interval_secs must be greater than zero".to_string(),
            );
        }
        if orch.discovery_interval_secs > orch.discovery_timeout_secs {
            push(
                WarnLevel::Warning,
                format!(
                    "orchestrator.discovery_interval_secs ({}) exceeds discovery_timeout_secs ({}); records are looked up once",
                    orch.discovery_interval_secs, orch.discovery_timeout_secs
                ),
            );
        }
        if orch.retry.max_delay_secs == 0 {
            push(
                WarnLevel::Error,
                "orchestrator.retry.max_delay_secs must be greater than zero".to_string(),
            );
        }
        if orch.retry.base_delay_secs > orch.retry.max_delay_secs {
            push(
                WarnLevel::Warning,
                format!(
                    "orchestrator.retry.base_delay_secs ({}) exceeds max_delay_secs ({}); every retry waits the cap",
                    orch.retry.base_delay_secs, orch.retry.max_delay_secs
                ),
            );
        }

        warnings
    }
}

impl ServerConfig {
    /// Whether `url` addresses this server's own listen address.
    fn serves(&self, url: &str) -> bool {
        let Some((host, port)) = host_and_port(url) else {
            return false;
        };
        let local = matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0" | "[::1]" | "[::]");
        port == self.port && (local || host == self.host)
    }
}

/// Host and effective port of an http(s) URL.
fn host_and_port(url: &str) -> Option<(&str, u16)> {
    let (rest, default_port) = if let Some(rest) = url.strip_prefix("https://") {
        (rest, 443)
    } else {
        (url.strip_prefix("http://")?, 80)
    };
    let authority = rest.split(['/', '?', '#']).next()?;
    let authority = authority.rsplit('@').next()?;
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !port.contains(']') => {
            Some((host, port.parse().ok()?))
        }
        _ => Some((authority, default_port)),
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
