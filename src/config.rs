//! Process configuration, read once at startup from the environment
//! (a `.env` file is honored via `dotenvy` before this runs).

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderName, HeaderValue};

const DEFAULT_KEY_PARAM: &str = "key";
const DEFAULT_POLL_SECS: u64 = 15;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream GTFS-RT vehicle positions endpoint.
    pub feed_url: String,
    pub api_key: String,
    /// Query parameter the key is sent under, unless `auth_header` is set.
    pub api_key_param: String,
    /// When set, the key is sent as this HTTP header instead of a query
    /// parameter.
    pub auth_header: Option<String>,
    pub poll_interval: Duration,
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Loads configuration from the environment. Missing required values or
    /// unparseable overrides are fatal here rather than at first use.
    pub fn from_env() -> Result<Self> {
        let feed_url = env::var("FEED_URL").context("FEED_URL must be set")?;
        let api_key = env::var("FEED_API_KEY").context("FEED_API_KEY must be set")?;
        let api_key_param =
            env::var("FEED_API_KEY_PARAM").unwrap_or_else(|_| DEFAULT_KEY_PARAM.to_string());
        let auth_header = env::var("FEED_AUTH_HEADER").ok();
        if let Some(header) = &auth_header {
            HeaderName::from_bytes(header.as_bytes())
                .context("FEED_AUTH_HEADER must be a valid HTTP header name")?;
            HeaderValue::from_str(&api_key)
                .context("FEED_API_KEY must be a valid header value when FEED_AUTH_HEADER is set")?;
        }

        let poll_secs = match env::var("POLL_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .context("POLL_INTERVAL_SECS must be a whole number of seconds")?,
            Err(_) => DEFAULT_POLL_SECS,
        };

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("BIND_ADDR must be a socket address like 0.0.0.0:3000")?;

        Ok(Self {
            feed_url,
            api_key,
            api_key_param,
            auth_header,
            poll_interval: Duration::from_secs(poll_secs),
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-global, so everything lives in one
    // sequential test.
    #[test]
    fn test_from_env() {
        unsafe {
            env::remove_var("FEED_URL");
            env::remove_var("FEED_API_KEY");
            env::remove_var("FEED_API_KEY_PARAM");
            env::remove_var("FEED_AUTH_HEADER");
            env::remove_var("POLL_INTERVAL_SECS");
            env::remove_var("BIND_ADDR");
        }

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("FEED_URL"));

        unsafe {
            env::set_var("FEED_URL", "https://feeds.example.net/vehicle_positions.pb");
            env::set_var("FEED_API_KEY", "s3cret");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.feed_url, "https://feeds.example.net/vehicle_positions.pb");
        assert_eq!(config.api_key, "s3cret");
        assert_eq!(config.api_key_param, "key");
        assert_eq!(config.auth_header, None);
        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());

        unsafe {
            env::set_var("FEED_API_KEY_PARAM", "api_key");
            env::set_var("FEED_AUTH_HEADER", "x-api-key");
            env::set_var("POLL_INTERVAL_SECS", "30");
            env::set_var("BIND_ADDR", "127.0.0.1:8080");
        }

        let config = Config::from_env().unwrap();
        assert_eq!(config.api_key_param, "api_key");
        assert_eq!(config.auth_header.as_deref(), Some("x-api-key"));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());

        unsafe {
            env::set_var("POLL_INTERVAL_SECS", "every so often");
        }
        assert!(Config::from_env().is_err());

        // Header-auth inputs are checked at load, not on the first request.
        unsafe {
            env::set_var("POLL_INTERVAL_SECS", "30");
            env::set_var("FEED_AUTH_HEADER", "x api key");
        }
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("FEED_AUTH_HEADER"));

        unsafe {
            env::set_var("FEED_AUTH_HEADER", "x-api-key");
            env::set_var("FEED_API_KEY", "line\nbreak");
        }
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("FEED_API_KEY"));

        // The same key is fine for query-parameter auth.
        unsafe {
            env::remove_var("FEED_AUTH_HEADER");
        }
        assert!(Config::from_env().is_ok());

        unsafe {
            env::remove_var("FEED_URL");
            env::remove_var("FEED_API_KEY");
            env::remove_var("FEED_API_KEY_PARAM");
            env::remove_var("FEED_AUTH_HEADER");
            env::remove_var("POLL_INTERVAL_SECS");
            env::remove_var("BIND_ADDR");
        }
    }
}
