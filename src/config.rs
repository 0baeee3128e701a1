use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub daemon: DaemonConfig,
    pub execution: ExecutionConfig,
    pub registry: RegistryConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub default: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub gemini: Option<ProviderAuth>,
    pub openai: Option<ProviderAuth>,
    pub openrouter: Option<ProviderAuth>,
    pub ollama: Option<ProviderAuth>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: "gemini".into(),
            model: "gemini-2.0-flash".into(),
            gemini: Some(ProviderAuth::default()),
            openai: None,
            openrouter: None,
            ollama: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ProviderAuth {
    pub api_key: Option<String>,
    pub api_key_cmd: Option<String>,
    pub base_url: Option<String>,
}

impl ProviderAuth {
    pub fn resolve_api_key(&self, provider_name: &str) -> anyhow::Result<Zeroizing<String>> {
        if let Some(key) = &self.api_key {
            if !key.is_empty() {
                return Ok(Zeroizing::new(key.clone()));
            }
        }
        if let Some(cmd) = &self.api_key_cmd {
            #[cfg(unix)]
            let output = Command::new("sh").arg("-c").arg(cmd).output()?;
            #[cfg(windows)]
            let output = Command::new("cmd").args(["/C", cmd]).output()?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                anyhow::bail!(
                    "api_key_cmd failed (exit {}): {stderr}",
                    output.status.code().unwrap_or(-1)
                );
            }
            let key = String::from_utf8(output.stdout)?.trim().to_string();
            if key.is_empty() {
                anyhow::bail!("api_key_cmd returned empty string");
            }
            return Ok(Zeroizing::new(key));
        }
        let env_var = match provider_name {
            "gemini" => "GEMINI_API_KEY",
            "openai" => "OPENAI_API_KEY",
            "openrouter" => "OPENROUTER_API_KEY",
            other => anyhow::bail!("no API key configured for provider '{other}'"),
        };
        match std::env::var(env_var) {
            Ok(key) if !key.is_empty() => Ok(Zeroizing::new(key)),
            _ => anyhow::bail!(
                "no API key for {provider_name}: set {env_var} or [provider.{provider_name}] api_key"
            ),
        }
    }
}

/// Where the daemon listens. Unix builds default to a domain socket,
/// Windows builds to TCP loopback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    Tcp(String),
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{addr}"),
        }
    }
}

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/aios.sock";
pub const DEFAULT_TCP_ADDR: &str = "127.0.0.1:65432";
pub const MIN_REQUEST_BYTES: usize = 4096;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
    pub tcp_addr: Option<String>,
    pub request_timeout_seconds: u64,
    pub confirm_timeout_seconds: u64,
    pub max_request_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            tcp_addr: None,
            request_timeout_seconds: 30,
            confirm_timeout_seconds: 30,
            max_request_bytes: MIN_REQUEST_BYTES,
        }
    }
}

impl DaemonConfig {
    /// An explicit `tcp_addr` wins on every platform; otherwise Unix uses
    /// the domain socket and Windows the fixed loopback port.
    pub fn endpoint(&self) -> Endpoint {
        if let Some(addr) = &self.tcp_addr {
            return Endpoint::Tcp(addr.clone());
        }
        #[cfg(unix)]
        {
            Endpoint::Unix(
                self.socket_path
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)),
            )
        }
        #[cfg(not(unix))]
        {
            Endpoint::Tcp(DEFAULT_TCP_ADDR.into())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_seconds.max(1))
    }

    pub fn effective_max_request_bytes(&self) -> usize {
        self.max_request_bytes.max(MIN_REQUEST_BYTES)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_seconds: u64,
    pub translate_min_chars: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            translate_min_chars: 3,
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.clamp(1, 600))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub refresh_interval_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 300,
        }
    }
}

impl RegistryConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DbConfig {
    pub path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: 10000,
        }
    }
}

impl DbConfig {
    pub fn effective_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::aios_dir().join("history.db"))
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::path();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(&path) {
                if meta.permissions().mode() & 0o077 != 0 {
                    eprintln!(
                        "aios: warning: {} is readable by other users. Consider: chmod 600 {}",
                        path.display(),
                        path.display()
                    );
                }
            }
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Copy with inline API keys masked, for display.
    pub fn redacted(&self) -> Self {
        let mut out = self.clone();
        let provider = &mut out.provider;
        for auth in [
            &mut provider.gemini,
            &mut provider.openai,
            &mut provider.openrouter,
            &mut provider.ollama,
        ]
        .into_iter()
        .flatten()
        {
            if auth.api_key.is_some() {
                auth.api_key = Some("***".into());
            }
        }
        out
    }

    pub fn path() -> PathBuf {
        Self::aios_dir().join("config.toml")
    }

    pub fn aios_dir() -> PathBuf {
        #[cfg(windows)]
        {
            if let Some(dir) = dirs::data_local_dir() {
                return dir.join("aios");
            }
        }
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".aios")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_inline_keys() {
        let config = Config::from_toml(
            r#"
            [provider.gemini]
            api_key = "secret"
            "#,
        )
        .unwrap();
        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider.default, "gemini");
        assert_eq!(config.execution.timeout_seconds, 30);
        assert_eq!(config.registry.refresh_interval_seconds, 300);
        assert_eq!(config.daemon.confirm_timeout_seconds, 30);
        assert_eq!(config.daemon.max_request_bytes, 4096);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = Config::from_toml(
            r#"
            [registry]
            refresh_interval_seconds = 60

            [daemon]
            confirm_timeout_seconds = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.registry.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.daemon.confirm_timeout(), Duration::from_secs(5));
        assert_eq!(config.daemon.request_timeout_seconds, 30);
        assert_eq!(config.provider.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_from_toml_rejects_garbage() {
        assert!(Config::from_toml("[daemon\nbroken").is_err());
    }

    #[test]
    fn test_max_request_bytes_never_below_floor() {
        let daemon = DaemonConfig {
            max_request_bytes: 16,
            ..Default::default()
        };
        assert_eq!(daemon.effective_max_request_bytes(), MIN_REQUEST_BYTES);
    }

    #[test]
    fn test_tcp_addr_overrides_endpoint() {
        let daemon = DaemonConfig {
            tcp_addr: Some("127.0.0.1:9999".into()),
            ..Default::default()
        };
        assert_eq!(daemon.endpoint(), Endpoint::Tcp("127.0.0.1:9999".into()));
        assert_eq!(daemon.endpoint().to_string(), "tcp:127.0.0.1:9999");
    }

    #[cfg(unix)]
    #[test]
    fn test_default_endpoint_is_domain_socket() {
        let daemon = DaemonConfig::default();
        assert_eq!(
            daemon.endpoint(),
            Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
        );
    }

    #[test]
    fn test_resolve_api_key_prefers_inline_key() {
        let auth = ProviderAuth {
            api_key: Some("inline".into()),
            ..Default::default()
        };
        assert_eq!(auth.resolve_api_key("gemini").unwrap().as_str(), "inline");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_api_key_from_cmd() {
        let auth = ProviderAuth {
            api_key_cmd: Some("echo from-cmd".into()),
            ..Default::default()
        };
        assert_eq!(auth.resolve_api_key("gemini").unwrap().as_str(), "from-cmd");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_api_key_cmd_failure() {
        let auth = ProviderAuth {
            api_key_cmd: Some("exit 3".into()),
            ..Default::default()
        };
        let err = auth.resolve_api_key("gemini").unwrap_err();
        assert!(err.to_string().contains("exit 3"));
    }

    #[test]
    fn test_resolve_api_key_unknown_provider() {
        let auth = ProviderAuth::default();
        assert!(auth.resolve_api_key("ollama").is_err());
    }

    #[test]
    fn test_config_path_under_aios_dir() {
        assert!(Config::path().starts_with(Config::aios_dir()));
        assert!(Config::path().ends_with("config.toml"));
    }

    #[test]
    fn test_db_path_default() {
        let db = DbConfig::default();
        assert!(db.effective_path().ends_with("history.db"));
    }
}
