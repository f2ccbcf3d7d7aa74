use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tracing: TracingConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub control: ControlConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TracingConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
}

/// Remote control surface settings, shared by the server and the CLI client.
#[derive(Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Shared secret expected in the `x-control-key` header. Empty rejects
    /// every control request.
    #[serde(default)]
    pub api_key: String,
    /// Base URL the `jobs` CLI talks to.
    #[serde(default = "default_control_url")]
    pub url: String,
}

impl std::fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConfig")
            .field("api_key", &"<redacted>")
            .field("url", &self.url)
            .finish()
    }
}

fn default_control_url() -> String {
    "http://localhost:3000".to_string()
}
