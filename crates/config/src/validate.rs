//! Semantic validation of a loaded config.

use crate::schema::ConclaveConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub field: &'static str,
    pub message: String,
}

impl Diagnostic {
    fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field,
            message: message.into(),
        }
    }

    fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field,
            message: message.into(),
        }
    }
}

/// Check cross-field constraints the schema types cannot express.
#[must_use]
pub fn validate(config: &ConclaveConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.sessions.stale_threshold_secs > config.sessions.disconnect_threshold_secs {
        diagnostics.push(Diagnostic::error(
            "sessions.stale_threshold_secs",
            format!(
                "stale threshold ({}) must not exceed disconnect threshold ({})",
                config.sessions.stale_threshold_secs, config.sessions.disconnect_threshold_secs
            ),
        ));
    }

    if config.sessions.queue_capacity == 0 {
        diagnostics.push(Diagnostic::error(
            "sessions.queue_capacity",
            "queue capacity must be at least 1",
        ));
    }

    if !(0.0..=1.0).contains(&config.sessions.queue_warning_threshold) {
        diagnostics.push(Diagnostic::error(
            "sessions.queue_warning_threshold",
            "warning threshold must be within 0.0..=1.0",
        ));
    }

    if !(0.0..=1.0).contains(&config.discussion.consensus_threshold)
        || config.discussion.consensus_threshold == 0.0
    {
        diagnostics.push(Diagnostic::error(
            "discussion.consensus_threshold",
            "consensus threshold must be within (0.0, 1.0]",
        ));
    }

    if config.ssl.enabled && (config.ssl.cert_path.is_none() || config.ssl.key_path.is_none()) {
        diagnostics.push(Diagnostic::error(
            "ssl",
            "ssl.enabled requires cert_path and key_path",
        ));
    }

    if config.jwt.secret.is_none() {
        diagnostics.push(Diagnostic::warning(
            "jwt.secret",
            "no JWT secret configured; hub user authentication is disabled",
        ));
    }

    diagnostics
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::schema::SslConfig};

    #[test]
    fn default_config_has_no_errors() {
        let diagnostics = validate(&ConclaveConfig::default());
        assert!(diagnostics.iter().all(|d| d.severity != Severity::Error));
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let mut cfg = ConclaveConfig::default();
        cfg.sessions.stale_threshold_secs = 120;
        cfg.sessions.disconnect_threshold_secs = 60;
        let diagnostics = validate(&cfg);
        assert!(
            diagnostics
                .iter()
                .any(|d| d.severity == Severity::Error
                    && d.field == "sessions.stale_threshold_secs")
        );
    }

    #[test]
    fn ssl_without_paths_rejected() {
        let mut cfg = ConclaveConfig::default();
        cfg.ssl = SslConfig {
            enabled: true,
            cert_path: None,
            key_path: None,
        };
        assert!(validate(&cfg).iter().any(|d| d.field == "ssl"));
    }

    #[test]
    fn consensus_threshold_bounds() {
        let mut cfg = ConclaveConfig::default();
        cfg.discussion.consensus_threshold = 1.5;
        assert!(
            validate(&cfg)
                .iter()
                .any(|d| d.field == "discussion.consensus_threshold")
        );
    }
}
