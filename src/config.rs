use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "LIVE_GATEWAY_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub srt_connection_latency_ms: u64,
    /// Bytes per transport read, 7 MPEG-TS packets by default.
    pub srt_read_buffer_size: usize,
    /// Transport reads taken while probing.
    pub probing_size: usize,
    /// Upper bound for one blocking read while streaming.
    pub read_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            srt_connection_latency_ms: 300,
            srt_read_buffer_size: 1316,
            probing_size: 120,
            read_timeout_ms: 1000,
        }
    }
}

impl GatewayConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read {}: {}", path.display(), e))?;
        Self::from_json(&json)
    }

    /// Loads the file named by `LIVE_GATEWAY_CONFIG`, or the defaults when unset.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn srt_latency(&self) -> Duration {
        Duration::from_millis(self.srt_connection_latency_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

pub fn config() -> &'static GatewayConfig {
    static CONFIG: LazyLock<GatewayConfig> = LazyLock::new(|| {
        GatewayConfig::load().unwrap_or_else(|e| {
            log::warn!("using default config: {:#}", e);
            GatewayConfig::default()
        })
    });
    &CONFIG
}
