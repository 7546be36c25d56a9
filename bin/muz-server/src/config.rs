//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Runtime configuration for muz-server.
///
/// Every field has a default so the relay starts without any environment
/// variables set; only the upstream credential has no default, and without it
/// the chat route answers `503` instead of contacting the gateway.
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3001"`, port from `PORT`).
    pub bind_address: String,

    /// Full URL of the gateway's chat-completions endpoint.
    pub upstream_url: String,

    /// Bearer credential for the gateway. Never taken from requests.
    pub upstream_api_key: Option<String>,

    /// Upper bound on the total duration of one upstream call, body included.
    pub upstream_timeout: Duration,

    /// Value of the `HTTP-Referer` attribution header sent upstream.
    pub referer: String,

    /// Value of the `X-Title` attribution header sent upstream.
    pub app_title: String,

    /// Comma-separated CORS origin allowlist; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Maximum accepted request body size in bytes (images arrive base64-encoded).
    pub body_limit_bytes: usize,

    /// Serve Swagger UI at `/swagger-ui`.
    pub enable_swagger: bool,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT);
        Self {
            bind_address: non_blank(&lookup, "MUZ_BIND")
                .unwrap_or_else(|| format!("0.0.0.0:{port}")),
            upstream_url: non_blank(&lookup, "MUZ_UPSTREAM_URL")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_owned()),
            upstream_api_key: non_blank(&lookup, "OPENROUTER_API_KEY"),
            upstream_timeout: Duration::from_secs(parse_or(
                &lookup,
                "MUZ_UPSTREAM_TIMEOUT_SECS",
                300,
            )),
            referer: non_blank(&lookup, "MUZ_REFERER")
                .unwrap_or_else(|| "http://localhost:5173".to_owned()),
            app_title: non_blank(&lookup, "MUZ_APP_TITLE").unwrap_or_else(|| "MUZ AI".to_owned()),
            cors_allowed_origins: non_blank(&lookup, "MUZ_CORS_ORIGINS"),
            body_limit_bytes: parse_or(&lookup, "MUZ_BODY_LIMIT_BYTES", 50 * 1024 * 1024),
            enable_swagger: lookup("MUZ_ENABLE_SWAGGER")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(true),
            log_level: non_blank(&lookup, "MUZ_LOG").unwrap_or_else(|| "info".to_owned()),
            log_json: lookup("MUZ_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("upstream_url", &self.upstream_url)
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("upstream_timeout", &self.upstream_timeout)
            .field("referer", &self.referer)
            .field("app_title", &self.app_title)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("enable_swagger", &self.enable_swagger)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish()
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3001");
        assert_eq!(cfg.upstream_url, DEFAULT_UPSTREAM_URL);
        assert!(cfg.upstream_api_key.is_none());
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(300));
        assert_eq!(cfg.body_limit_bytes, 50 * 1024 * 1024);
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
    }

    #[test]
    fn port_feeds_default_bind_address() {
        let cfg = config_from(&[("PORT", "8080")]);
        assert_eq!(cfg.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn explicit_bind_wins_over_port() {
        let cfg = config_from(&[("PORT", "8080"), ("MUZ_BIND", "127.0.0.1:9000")]);
        assert_eq!(cfg.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn blank_api_key_counts_as_unset() {
        let cfg = config_from(&[("OPENROUTER_API_KEY", "   ")]);
        assert!(cfg.upstream_api_key.is_none());
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let cfg = config_from(&[("PORT", "not-a-port"), ("MUZ_UPSTREAM_TIMEOUT_SECS", "-1")]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3001");
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(300));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let cfg = config_from(&[("OPENROUTER_API_KEY", "sk-secret")]);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn swagger_can_be_disabled() {
        assert!(!config_from(&[("MUZ_ENABLE_SWAGGER", "false")]).enable_swagger);
        assert!(!config_from(&[("MUZ_ENABLE_SWAGGER", "0")]).enable_swagger);
    }
}
