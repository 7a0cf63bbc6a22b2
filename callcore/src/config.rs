use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

/// Client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub sfu: SfuConfig,
    pub retry: RetryConfig,
    /// ICE servers handed out by the call-coordination service
    pub ice_servers: Vec<IceServerConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// Base URL of the SFU signaling server
    pub url: String,
    /// Bearer credential bound to every signaling request
    pub token: String,
    pub request_timeout_ms: u64,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3031".to_string(),
            token: String::new(),
            request_timeout_ms: 10_000,
        }
    }
}

impl SfuConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per RPC, `None` retries until success or cancellation
    pub max_attempts: Option<usize>,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(5),
            min_delay_ms: 250,
            max_delay_ms: 25_000,
            factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: String,
    pub password: String,
}

impl From<&IceServerConfig> for RTCIceServer {
    fn from(server: &IceServerConfig) -> Self {
        Self {
            urls: server.urls.clone(),
            username: server.username.clone(),
            credential: server.password.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";
const DEFAULT_TURN_PORT: u16 = 3478;

impl ClientConfig {
    /// Load configuration from an optional file, then environment overrides
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // CALLCORE_SFU__URL, CALLCORE_RETRY__MAX_ATTEMPTS, ...
        builder = builder.add_source(
            Environment::with_prefix("CALLCORE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Peer connection configuration for both transports.
    ///
    /// Falls back to a public STUN server plus a TURN server on the SFU host
    /// when the coordinator supplied no ICE servers.
    #[must_use]
    pub fn rtc_configuration(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            self.default_ice_servers()
        } else {
            self.ice_servers.iter().map(RTCIceServer::from).collect()
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    fn default_ice_servers(&self) -> Vec<RTCIceServer> {
        let host = url::Url::parse(&self.sfu.url)
            .ok()
            .and_then(|url| url.host_str().map(ToString::to_string))
            .unwrap_or_else(|| {
                tracing::warn!(url = %self.sfu.url, "Invalid SFU URL, using it as TURN host");
                self.sfu.url.clone()
            });

        vec![
            RTCIceServer {
                urls: vec![DEFAULT_STUN_SERVER.to_string()],
                ..Default::default()
            },
            RTCIceServer {
                urls: vec![format!("turn:{host}:{DEFAULT_TURN_PORT}")],
                username: "video".to_string(),
                credential: "video".to_string(),
                ..Default::default()
            },
        ]
    }
}
