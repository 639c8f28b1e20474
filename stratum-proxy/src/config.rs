//! Configuration loading and validation (§6, §4.8).
//!
//! Mirrors the original proxy's `NewProxy` fatal-on-misconfiguration checks:
//! a missing instance name or a missing mandatory upstream URL aborts the
//! process rather than limping along half configured.

use crate::error::ErrorKind;

use serde::Deserialize;

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_upstream_timeout")]
    pub timeout: String,
}

fn default_upstream_timeout() -> String {
    "10s".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamEndpoints {
    pub prime: Option<UpstreamConfig>,
    pub region: Option<UpstreamConfig>,
    pub zone: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StratumConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_stratum_listen")]
    pub listen: String,
    #[serde(default = "default_stratum_timeout")]
    pub timeout: String,
    #[serde(default = "default_max_conn")]
    pub max_conn: usize,
}

fn default_stratum_listen() -> String {
    "0.0.0.0:3333".to_string()
}

fn default_stratum_timeout() -> String {
    "30s".to_string()
}

fn default_max_conn() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_refresh_interval")]
    pub block_refresh_interval: String,
    #[serde(default = "default_state_update_interval")]
    pub state_update_interval: String,
    #[serde(default = "default_hashrate_expiration")]
    pub hashrate_expiration: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: u64,
    #[serde(default)]
    pub seal_mining: bool,
    #[serde(default)]
    pub quai_coinbase: String,
    #[serde(default)]
    pub qi_coinbase: String,
    #[serde(default)]
    pub miner_preference: f64,
    #[serde(default)]
    pub lockup: u8,
    #[serde(default = "default_max_fails")]
    pub max_fails: i64,
    #[serde(default)]
    pub health_check: bool,
    pub stratum: StratumConfig,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_refresh_interval() -> String {
    "5s".to_string()
}

fn default_state_update_interval() -> String {
    "30s".to_string()
}

fn default_hashrate_expiration() -> String {
    "1h".to_string()
}

fn default_difficulty() -> u64 {
    1
}

fn default_max_fails() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub name: String,
    pub upstream: UpstreamEndpoints,
    pub proxy: ProxyConfig,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Bounded cache size for the job-id -> work lookup (§3 I3), 10-100.
    #[serde(default = "default_job_cache_size")]
    pub job_cache_size: usize,
}

fn default_threads() -> usize {
    0 // 0 means "let tokio pick a default"
}

fn default_job_cache_size() -> usize {
    64
}

impl Config {
    pub fn from_json(data: &str) -> Result<Self, ErrorKind> {
        let config: Config =
            serde_json::from_str(data).map_err(|e| ErrorKind::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ErrorKind> {
        if self.name.trim().is_empty() {
            return Err(ErrorKind::Config("instance name empty".to_string()));
        }
        if self.upstream.zone.url.trim().is_empty() {
            return Err(ErrorKind::Config(
                "zone upstream url is required".to_string(),
            ));
        }
        if !self.proxy.seal_mining {
            if self
                .upstream
                .region
                .as_ref()
                .map_or(true, |u| u.url.trim().is_empty())
            {
                return Err(ErrorKind::Config(
                    "region upstream url is required in full mode".to_string(),
                ));
            }
            if self
                .upstream
                .prime
                .as_ref()
                .map_or(true, |u| u.url.trim().is_empty())
            {
                return Err(ErrorKind::Config(
                    "prime upstream url is required in full mode".to_string(),
                ));
            }
        }

        parse_duration(&self.proxy.block_refresh_interval)?;
        parse_duration(&self.proxy.state_update_interval)?;
        parse_duration(&self.proxy.hashrate_expiration)?;
        parse_duration(&self.proxy.stratum.timeout)?;
        parse_duration(&self.upstream.zone.timeout)?;

        if self.proxy.stratum.enabled {
            self.proxy
                .stratum
                .listen
                .parse::<SocketAddr>()
                .map_err(|e| ErrorKind::Config(format!("invalid stratum listen address: {}", e)))?;
        }

        if !(10..=100).contains(&self.job_cache_size) {
            return Err(ErrorKind::Config(
                "jobCacheSize must be between 10 and 100".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses a Go-style duration string (`"30s"`, `"1m"`, `"500ms"`, `"2h"`).
/// Hand-rolled rather than pulled in from a crate: the original proxy's
/// config strings only ever use a single unit suffix, never compound
/// durations like `"1h30m"`.
pub fn parse_duration(s: &str) -> Result<Duration, ErrorKind> {
    let s = s.trim();
    let split_at = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ErrorKind::Config(format!("can't parse duration `{}`", s)))?;
    let (value, unit) = s.split_at(split_at);
    let value: u64 = value
        .parse()
        .map_err(|_| ErrorKind::Config(format!("can't parse duration `{}`", s)))?;

    let duration = match unit {
        "ns" => Duration::from_nanos(value),
        "us" => Duration::from_micros(value),
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        _ => {
            return Err(ErrorKind::Config(format!(
                "unknown duration unit `{}` in `{}`",
                unit, s
            )))
        }
    };
    Ok(duration)
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal_full_mode_json() -> &'static str {
        r#"{
            "name": "test-proxy",
            "upstream": {
                "prime": {"name": "prime", "url": "http://localhost:9001"},
                "region": {"name": "region", "url": "http://localhost:9002"},
                "zone": {"name": "zone", "url": "http://localhost:9003"}
            },
            "proxy": {
                "enabled": true,
                "stratum": {"enabled": true, "listen": "0.0.0.0:3333"}
            }
        }"#
    }

    #[test]
    fn parses_minimal_full_mode_config() {
        let config = Config::from_json(minimal_full_mode_json()).expect("should parse");
        assert_eq!(config.name, "test-proxy");
        assert!(!config.proxy.seal_mining);
        assert_eq!(config.job_cache_size, 64);
    }

    #[test]
    fn rejects_empty_name() {
        let config = Config::from_json(minimal_full_mode_json())
            .unwrap()
            .clone();
        let mut config = config;
        config.name = "".to_string();
        assert!(matches!(config.validate(), Err(ErrorKind::Config(_))));
    }

    #[test]
    fn rejects_missing_region_url_in_full_mode() {
        let json = r#"{
            "name": "test-proxy",
            "upstream": {
                "zone": {"name": "zone", "url": "http://localhost:9003"}
            },
            "proxy": {
                "enabled": true,
                "stratum": {"enabled": true, "listen": "0.0.0.0:3333"}
            }
        }"#;
        assert!(Config::from_json(json).is_err());
    }

    #[test]
    fn seal_mining_mode_only_requires_zone() {
        let json = r#"{
            "name": "test-proxy",
            "upstream": {
                "zone": {"name": "zone", "url": "http://localhost:9003"}
            },
            "proxy": {
                "enabled": true,
                "sealMining": true,
                "stratum": {"enabled": true, "listen": "0.0.0.0:3333"}
            }
        }"#;
        let config = Config::from_json(json).expect("seal mining config should be valid");
        assert!(config.proxy.seal_mining);
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("nope").is_err());
    }
}
