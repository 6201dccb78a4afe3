//! Typed configuration assembled from environment variables (§6), loaded
//! once at startup and validated fail-fast, following the teacher's
//! `DATABASE_URL must be set`-style error messages.

use std::time::Duration;

use anyhow::{Context, Result};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String> {
    env_var(key).with_context(|| format!("{key} must be set"))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_var(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub redis_url: String,
    pub mqtt_url: String,
    pub mqtt_client_id: String,
    pub mqtt_clean_session: bool,
    pub mqtt_topic_prefix: String,
    pub mysql_dsn: String,
    pub auth_endpoint: Option<String>,
    pub auth_cache_ttl: Duration,
    pub default_radius_km: f64,
    pub max_radius_km: f64,
    pub geohash_precision: usize,
    pub ogn_center_lat: f64,
    pub ogn_center_lon: f64,
    pub ogn_radius_km: f64,
    pub tracking_radius_percent: f64,
    pub boundary_grace_period: Duration,
    pub min_movement_distance_m: f64,
    pub worker_pool_size: usize,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub websocket_ping_interval: Duration,
    pub websocket_pong_timeout: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Optional pprof profiling server port (unset disables it).
    pub debug_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            server_port: parse_or("SERVER_PORT", 8080),
            redis_url: required("REDIS_URL")?,
            mqtt_url: required("MQTT_URL")?,
            mqtt_client_id: env_var("MQTT_CLIENT_ID").unwrap_or_else(|| "fanethub".to_string()),
            mqtt_clean_session: parse_or("MQTT_CLEAN_SESSION", false),
            mqtt_topic_prefix: env_var("MQTT_TOPIC_PREFIX").unwrap_or_else(|| "fb/b".to_string()),
            mysql_dsn: required("MYSQL_DSN")?,
            auth_endpoint: env_var("AUTH_ENDPOINT"),
            auth_cache_ttl: Duration::from_secs(parse_or("AUTH_CACHE_TTL", 300)),
            default_radius_km: parse_or("DEFAULT_RADIUS_KM", 50.0),
            max_radius_km: parse_or("MAX_RADIUS_KM", 200.0),
            geohash_precision: parse_or("GEOHASH_PRECISION", 5),
            ogn_center_lat: parse_or("OGN_CENTER_LAT", 46.5),
            ogn_center_lon: parse_or("OGN_CENTER_LON", 14.2),
            ogn_radius_km: parse_or("OGN_RADIUS_KM", 200.0),
            tracking_radius_percent: parse_or("TRACKING_RADIUS_PERCENT", 0.9),
            boundary_grace_period: Duration::from_secs(parse_or("BOUNDARY_GRACE_PERIOD", 300)),
            min_movement_distance_m: parse_or("MIN_MOVEMENT_DISTANCE", 100.0),
            worker_pool_size: parse_or("WORKER_POOL_SIZE", 100),
            max_batch_size: parse_or("MAX_BATCH_SIZE", 1000),
            batch_timeout: Duration::from_secs(parse_or("BATCH_TIMEOUT", 5)),
            websocket_ping_interval: Duration::from_secs(parse_or("WEBSOCKET_PING_INTERVAL", 30)),
            websocket_pong_timeout: Duration::from_secs(parse_or("WEBSOCKET_PONG_TIMEOUT", 60)),
            log_level: env_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format: match env_var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            debug_port: env_var("DEBUG_PORT").and_then(|v| v.parse().ok()),
        })
    }

    pub fn tracking_radius_km(&self) -> f64 {
        self.ogn_radius_km * self.tracking_radius_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "SERVER_PORT",
            "REDIS_URL",
            "MQTT_URL",
            "MYSQL_DSN",
            "AUTH_ENDPOINT",
        ] {
            unsafe { std::env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn fails_fast_without_required_keys() {
        clear_env();
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("must be set"));
    }

    #[test]
    #[serial]
    fn loads_with_required_keys_set() {
        clear_env();
        unsafe {
            std::env::set_var("REDIS_URL", "redis://localhost:6379");
            std::env::set_var("MQTT_URL", "mqtt://localhost:1883");
            std::env::set_var("MYSQL_DSN", "mysql://root@localhost/fanethub");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.mqtt_topic_prefix, "fb/b");
        clear_env();
    }
}
