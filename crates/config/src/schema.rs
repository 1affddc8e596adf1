//! Config schema types.

use serde::{Deserialize, Serialize};

/// Top-level configuration consumed by the server core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConclaveConfig {
    pub server: ServerConfig,
    pub ssl: SslConfig,
    pub cors: CorsConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub api_token: ApiTokenConfig,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
    pub sessions: SessionsConfig,
    pub discussion: DiscussionConfig,
    pub identification: IdentificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SslConfig {
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
        }
    }
}

/// Connection settings for the external persistence adapter. The core never
/// opens this itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub algorithm: String,
    pub access_ttl_minutes: u64,
    pub refresh_ttl_days: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: "HS256".into(),
            access_ttl_minutes: 30,
            refresh_ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiTokenConfig {
    pub prefix: String,
    pub secret: Option<String>,
}

impl Default for ApiTokenConfig {
    fn default() -> Self {
        Self {
            prefix: "ck".into(),
            secret: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Seconds without a heartbeat before a session turns stale.
    pub stale_threshold_secs: u64,
    /// Seconds without a heartbeat before a session is disconnected.
    pub disconnect_threshold_secs: u64,
    pub sweep_interval_secs: u64,
    pub queue_capacity: usize,
    /// Fraction of capacity at which a queue warning is emitted.
    pub queue_warning_threshold: f64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: 30,
            disconnect_threshold_secs: 60,
            sweep_interval_secs: 10,
            queue_capacity: 100,
            queue_warning_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionConfig {
    /// Per-agent wait for opinions and votes.
    pub timeout_secs: u64,
    /// Minimum share of valid votes for consensus.
    pub consensus_threshold: f64,
}

impl Default for DiscussionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            consensus_threshold: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentificationConfig {
    /// Reject requests that carry no project identification.
    pub require_identification: bool,
    /// Fall back to the `default` project when nothing identifies one.
    pub allow_default_fallback: bool,
}

impl Default for IdentificationConfig {
    fn default() -> Self {
        Self {
            require_identification: false,
            allow_default_fallback: true,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = ConclaveConfig::default();
        assert_eq!(cfg.server.port, 8765);
        assert!(cfg.sessions.stale_threshold_secs <= cfg.sessions.disconnect_threshold_secs);
        assert_eq!(cfg.discussion.consensus_threshold, 0.75);
        assert!(cfg.identification.allow_default_fallback);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: ConclaveConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.sessions.sweep_interval_secs, 10);
    }
}
