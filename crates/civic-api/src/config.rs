//! Startup configuration from environment variables.

use civic_engine::TransitionPolicy;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8001";
pub const DEFAULT_SWEEP_MAX_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    /// Issues persist here when set and the `sqlite` feature is on.
    pub sqlite_path: Option<PathBuf>,
    /// Append-only JSONL audit file; in-memory when unset.
    pub audit_log: Option<PathBuf>,
    pub transition_policy: TransitionPolicy,
    pub sweep_max: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8001)),
            sqlite_path: None,
            audit_log: None,
            transition_policy: TransitionPolicy::default(),
            sweep_max: Duration::from_secs(DEFAULT_SWEEP_MAX_SECS),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_raw = get("CIVIC_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw.parse().map_err(|e| ConfigError::Invalid {
            var: "CIVIC_LISTEN",
            reason: format!("{}: {}", listen_raw, e),
        })?;

        let transition_policy = match get("CIVIC_TRANSITION_POLICY") {
            Some(raw) => TransitionPolicy::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                var: "CIVIC_TRANSITION_POLICY",
                reason: format!("expected 'permissive' or 'strict', got '{}'", raw),
            })?,
            None => TransitionPolicy::default(),
        };

        let sweep_max = match get("CIVIC_SLA_SWEEP_MAX_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "CIVIC_SLA_SWEEP_MAX_SECS",
                    reason: format!("'{}' is not a number of seconds", raw),
                })?;
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_SWEEP_MAX_SECS),
        };

        Ok(Self {
            listen,
            sqlite_path: get("CIVIC_SQLITE_PATH").map(PathBuf::from),
            audit_log: get("CIVIC_AUDIT_LOG").map(PathBuf::from),
            transition_policy,
            sweep_max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(cfg.transition_policy, TransitionPolicy::Permissive);
        assert_eq!(cfg.sweep_max, Duration::from_secs(300));
        assert!(cfg.sqlite_path.is_none());
        assert!(cfg.audit_log.is_none());
    }

    #[test]
    fn reads_overrides() {
        let cfg = ApiConfig::from_lookup(lookup(&[
            ("CIVIC_LISTEN", "127.0.0.1:9000"),
            ("CIVIC_TRANSITION_POLICY", "Strict"),
            ("CIVIC_SLA_SWEEP_MAX_SECS", "30"),
            ("CIVIC_AUDIT_LOG", "/tmp/audit.jsonl"),
            ("CIVIC_SQLITE_PATH", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.listen.port(), 9000);
        assert_eq!(cfg.transition_policy, TransitionPolicy::Strict);
        assert_eq!(cfg.sweep_max, Duration::from_secs(30));
        assert_eq!(cfg.audit_log, Some(PathBuf::from("/tmp/audit.jsonl")));
        assert!(cfg.sqlite_path.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ApiConfig::from_lookup(lookup(&[("CIVIC_TRANSITION_POLICY", "loose")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CIVIC_SLA_SWEEP_MAX_SECS", "soon")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CIVIC_LISTEN", "nowhere")])).is_err());
    }
}
