// ============================
// relay-lib/src/config.rs
// ============================
//! Configuration management.
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Allowed origin for the realtime transport (CORS)
    pub client_origin: String,
    /// Postgres connection string for membership lookups
    pub database_url: String,
    /// Log level
    pub log_level: String,
    /// Credential verification settings
    pub auth: AuthSettings,
    /// Rate limiting for the HTTP management surface
    pub rate_limit: RateLimitSettings,
}

/// Signing parameters for bearer-credential verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC signing secret shared with the identity service
    pub secret: String,
    /// Expected `iss` claim, unchecked when absent
    pub issuer: Option<String>,
    /// Expected `aud` claim, unchecked when absent
    pub audience: Option<String>,
}

/// Fixed-window rate limit parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum requests per window per client IP
    pub max_requests: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".parse().expect("static addr"),
            client_origin: "http://localhost:3000".to_string(),
            database_url: "postgres://localhost/bugtrail".to_string(),
            log_level: "info".to_string(),
            auth: AuthSettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            issuer: None,
            audience: None,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        // 100 requests per 15 minutes per IP
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

/// Load settings: defaults, then `relay.toml`, then `RELAY_*` environment
/// variables (nested keys separated with `__`, e.g. `RELAY_AUTH__SECRET`).
pub fn load_settings() -> Result<Settings> {
    let settings = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::file("relay.toml"))
        .merge(Env::prefixed("RELAY_").split("__"))
        .extract()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.bind_addr.to_string(), "127.0.0.1:4000");
        assert_eq!(settings.client_origin, "http://localhost:3000");
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.rate_limit.max_requests, 100);
        assert_eq!(settings.rate_limit.window_secs, 900);
        assert!(settings.auth.issuer.is_none());
        assert!(settings.auth.audience.is_none());
    }

    #[test]
    fn test_load_settings_layering() {
        // figment's Jail isolates cwd and environment per test
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "relay.toml",
                r#"
                bind_addr = "0.0.0.0:9000"
                log_level = "debug"

                [auth]
                secret = "file-secret"
                "#,
            )?;
            jail.set_env("RELAY_LOG_LEVEL", "warn");
            jail.set_env("RELAY_AUTH__ISSUER", "bugtrail");

            let settings = load_settings().expect("settings should load");
            assert_eq!(settings.bind_addr.to_string(), "0.0.0.0:9000");
            // Environment variable takes precedence over the file
            assert_eq!(settings.log_level, "warn");
            assert_eq!(settings.auth.secret, "file-secret");
            assert_eq!(settings.auth.issuer.as_deref(), Some("bugtrail"));
            // Untouched keys keep their defaults
            assert_eq!(settings.client_origin, "http://localhost:3000");
            Ok(())
        });
    }
}
