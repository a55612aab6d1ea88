//! Runtime configuration. Storage backend selection happens here and
//! nowhere else: the remote KV is used exactly when both its URL and its
//! token are configured, anything less falls back to the in-process maps.

use std::time::Duration;

pub const ENV_KV_URL: &str = "PARLOR_KV_REST_URL";
pub const ENV_KV_TOKEN: &str = "PARLOR_KV_REST_TOKEN";
pub const ENV_KV_TTL: &str = "PARLOR_KV_TTL_SECS";

const DEFAULT_TTL_SECS: u64 = 86_400;

/// How session and seat records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process-local maps; sessions die with the process
    Memory,
    /// Upstash-style REST KV shared between processes
    RemoteKv { url: String, token: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub backend: StorageBackend,
    /// Session lifetime. Remote keys carry it as `EX`; the memory stores
    /// sweep on it.
    pub session_ttl: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            session_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl AppSettings {
    /// Pure constructor; `from_env` is a thin wrapper over it.
    pub fn resolve(url: Option<String>, token: Option<String>, ttl_secs: Option<u64>) -> Self {
        let backend = match (non_empty(url), non_empty(token)) {
            (Some(url), Some(token)) => StorageBackend::RemoteKv { url, token },
            _ => StorageBackend::Memory,
        };
        Self {
            backend,
            session_ttl: Duration::from_secs(ttl_secs.unwrap_or(DEFAULT_TTL_SECS)),
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        let ttl_secs = match std::env::var(ENV_KV_TTL) {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring unparseable session TTL override");
                    None
                }
            },
            Err(_) => None,
        };
        Self::resolve(
            std::env::var(ENV_KV_URL).ok(),
            std::env::var(ENV_KV_TOKEN).ok(),
            ttl_secs,
        )
    }

    pub fn ttl_secs(&self) -> u64 {
        self.session_ttl.as_secs()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_memory_with_a_day_of_ttl() {
        let settings = AppSettings::default();
        assert_eq!(settings.backend, StorageBackend::Memory);
        assert_eq!(settings.ttl_secs(), 86_400);
    }

    #[test]
    fn remote_backend_requires_both_url_and_token() {
        let both = AppSettings::resolve(
            Some("https://kv.example.test".into()),
            Some("secret".into()),
            None,
        );
        assert_eq!(
            both.backend,
            StorageBackend::RemoteKv {
                url: "https://kv.example.test".into(),
                token: "secret".into(),
            }
        );

        let url_only =
            AppSettings::resolve(Some("https://kv.example.test".into()), None, None);
        assert_eq!(url_only.backend, StorageBackend::Memory);

        let blank_token = AppSettings::resolve(
            Some("https://kv.example.test".into()),
            Some("   ".into()),
            None,
        );
        assert_eq!(blank_token.backend, StorageBackend::Memory);
    }

    #[test]
    fn ttl_override_is_applied() {
        let settings = AppSettings::resolve(None, None, Some(300));
        assert_eq!(settings.session_ttl, Duration::from_secs(300));
    }
}
