use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

#[cfg(test)]
use once_cell::sync::Lazy;
#[cfg(test)]
pub(crate) static ENV_MUTEX: Lazy<std::sync::Mutex<()>> = Lazy::new(|| std::sync::Mutex::new(()));

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    http_bind: SocketAddr,
    transcriber_base_url: String,
    summarizer_base_url: String,
    enhancer_base_url: String,
    reasoner_base_url: String,
    stage_connect_timeout: Duration,
    preprocess_timeout: Duration,
    transcribe_timeout: Duration,
    summarize_timeout: Duration,
    reasoning_timeout: Duration,
    rate_limit_enabled: bool,
    rate_limit_requests: usize,
    rate_limit_window: Duration,
    job_retention: Duration,
    max_jobs: usize,
    janitor_interval: Duration,
    reasoning_enabled: bool,
    reasoning_domain: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {source}")]
    Invalid {
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl Config {
    /// Load and validate the worker configuration from environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when `TRANSCRIBER_BASE_URL` or
    /// `SUMMARIZER_BASE_URL` is unset, or when any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_bind = parse_socket_addr("SCRIBE_HTTP_BIND", "0.0.0.0:9100")?;
        let transcriber_base_url = env_var("TRANSCRIBER_BASE_URL")?;
        let summarizer_base_url = env_var("SUMMARIZER_BASE_URL")?;
        let enhancer_base_url = env::var("ENHANCER_BASE_URL")
            .unwrap_or_else(|_| "http://enhancer:9210".to_string());
        let reasoner_base_url = env::var("REASONER_BASE_URL")
            .unwrap_or_else(|_| "http://reasoner:9220".to_string());

        // Stage timeouts. Transcription dominates: a one-hour lecture through
        // Whisper can legitimately take several minutes.
        let stage_connect_timeout = parse_duration_ms("STAGE_CONNECT_TIMEOUT_MS", 3000)?;
        let preprocess_timeout = parse_duration_secs("PREPROCESS_TIMEOUT_SECS", 120)?;
        let transcribe_timeout = parse_duration_secs("TRANSCRIBE_TIMEOUT_SECS", 900)?;
        let summarize_timeout = parse_duration_secs("SUMMARIZE_TIMEOUT_SECS", 600)?;
        let reasoning_timeout = parse_duration_secs("REASONING_TIMEOUT_SECS", 300)?;

        let rate_limit_enabled = parse_bool("SCRIBE_RATE_LIMIT_ENABLED", true)?;
        let rate_limit_requests = parse_usize("SCRIBE_RATE_LIMIT_REQUESTS", 10)?;
        let rate_limit_window = parse_duration_secs("SCRIBE_RATE_LIMIT_WINDOW_SECS", 60)?;

        let job_retention = parse_duration_secs("SCRIBE_JOB_RETENTION_SECS", 86_400)?;
        let max_jobs = parse_usize("SCRIBE_MAX_JOBS", 10_000)?;
        let janitor_interval = parse_duration_secs("SCRIBE_JANITOR_INTERVAL_SECS", 3600)?;

        let reasoning_enabled = parse_bool("REASONING_CORE_ENABLED", false)?;
        let reasoning_domain =
            env::var("REASONING_CORE_DOMAIN").unwrap_or_else(|_| "generic".to_string());

        Ok(Self {
            http_bind,
            transcriber_base_url,
            summarizer_base_url,
            enhancer_base_url,
            reasoner_base_url,
            stage_connect_timeout,
            preprocess_timeout,
            transcribe_timeout,
            summarize_timeout,
            reasoning_timeout,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
            job_retention,
            max_jobs,
            janitor_interval,
            reasoning_enabled,
            reasoning_domain,
        })
    }

    #[must_use]
    pub fn http_bind(&self) -> SocketAddr {
        self.http_bind
    }

    #[must_use]
    pub fn transcriber_base_url(&self) -> &str {
        &self.transcriber_base_url
    }

    #[must_use]
    pub fn summarizer_base_url(&self) -> &str {
        &self.summarizer_base_url
    }

    #[must_use]
    pub fn enhancer_base_url(&self) -> &str {
        &self.enhancer_base_url
    }

    #[must_use]
    pub fn reasoner_base_url(&self) -> &str {
        &self.reasoner_base_url
    }

    #[must_use]
    pub fn stage_connect_timeout(&self) -> Duration {
        self.stage_connect_timeout
    }

    #[must_use]
    pub fn preprocess_timeout(&self) -> Duration {
        self.preprocess_timeout
    }

    #[must_use]
    pub fn transcribe_timeout(&self) -> Duration {
        self.transcribe_timeout
    }

    #[must_use]
    pub fn summarize_timeout(&self) -> Duration {
        self.summarize_timeout
    }

    #[must_use]
    pub fn reasoning_timeout(&self) -> Duration {
        self.reasoning_timeout
    }

    #[must_use]
    pub fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_enabled
    }

    #[must_use]
    pub fn rate_limit_requests(&self) -> usize {
        self.rate_limit_requests
    }

    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        self.rate_limit_window
    }

    #[must_use]
    pub fn job_retention(&self) -> Duration {
        self.job_retention
    }

    /// Failed and cancelled jobs are kept for a quarter of the normal
    /// retention; their error payloads lose value quickly.
    #[must_use]
    pub fn failed_job_retention(&self) -> Duration {
        self.job_retention / 4
    }

    #[must_use]
    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    #[must_use]
    pub fn janitor_interval(&self) -> Duration {
        self.janitor_interval
    }

    #[must_use]
    pub fn reasoning_enabled(&self) -> bool {
        self.reasoning_enabled
    }

    #[must_use]
    pub fn reasoning_domain(&self) -> &str {
        &self.reasoning_domain
    }
}

fn env_var(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_socket_addr(name: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());

    raw.parse().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_duration_secs(name: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    let value = parse_u64(name, default_secs)?;
    Ok(Duration::from_secs(value))
}

fn parse_duration_ms(name: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default_ms.to_string());
    let ms = raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })?;
    Ok(Duration::from_millis(ms))
}

fn parse_usize(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<usize>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
        name,
        source: anyhow::Error::new(error),
    })
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            source: anyhow::anyhow!("invalid boolean value: {raw}"),
        }),
    }
}
