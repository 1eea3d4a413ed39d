//! Process configuration, loaded from environment variables with defaults,
//! the same plain env-var shape as `JWT_SECRET`/`AUTH_DB_PATH`/`BIND_ADDR`
//! style configuration.

pub const DEFAULT_HTTP_PORT: u16 = 15555;
pub const DEFAULT_TRANSFER_PORT: u16 = 15556;
pub const MDNS_SERVICE_TYPE: &str = "_adbtoolkit._tcp.local.";

/// Everything [`crate::lifecycle::LifecycleController`] needs to start the
/// listeners and locate persisted state.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub http_port: u16,
    pub transfer_port: u16,
    pub data_dir: std::path::PathBuf,
    pub device_label: String,
}

impl AgentConfig {
    /// Load configuration from the environment, falling back to sensible
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let http_port = std::env::var("AGENT_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        let transfer_port = std::env::var("AGENT_TRANSFER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TRANSFER_PORT);
        let data_dir = std::env::var("AGENT_DATA_DIR")
            .unwrap_or_else(|_| "agent-data".to_string())
            .into();
        let device_label = std::env::var("AGENT_DEVICE_LABEL").unwrap_or_else(|_| {
            hostname_fallback()
        });

        Self {
            http_port,
            transfer_port,
            data_dir,
            device_label,
        }
    }

    pub fn pairing_store_path(&self) -> std::path::PathBuf {
        self.data_dir.join("pairing_state")
    }

    pub fn auth_token_path(&self) -> std::path::PathBuf {
        self.data_dir.join("auth_token")
    }
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "agent-device".to_string())
}
