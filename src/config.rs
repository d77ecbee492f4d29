//! Typed, environment-sourced configuration (C10, ambient stack).
//!
//! Mirrors the key table in the design doc: every `event_worker.*`,
//! `event_producer.*`, `event_consumer.*` and `clickhouse.*` key has a
//! corresponding `EVENT_WORKER_*` / `EVENT_PRODUCER_*` / `EVENT_CONSUMER_*` /
//! `CLICKHOUSE_*` environment variable. Missing optional keys fall back to
//! the documented defaults; a missing or malformed required key is an
//! `InitFatal` error.

use std::time::Duration;

use crate::error::{AppError, Result};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::InitFatal(format!("{key}: cannot parse {raw:?}"))),
    }
}

fn env_duration_or(key: &str, default: Duration) -> Result<Duration> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => humantime::parse_duration(&raw)
            .map_err(|e| AppError::InitFatal(format!("{key}: {e}"))),
    }
}

fn env_list_or(key: &str, default: Vec<String>) -> Vec<String> {
    match env_var(key) {
        None => default,
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Panic,
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Panic => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "PANIC" => Ok(LogLevel::Panic),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub addr: String,
    pub db: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub num_workers: usize,
    pub batch_size: usize,
    pub max_batch_capacity: usize,
}

impl WorkerConfig {
    const FLUSH_THRESHOLD_FLOOR: usize = 30;

    /// `batch_size` defaults to 1000 when unset or `<= 1`; `max_batch_capacity`
    /// is floored at 30, matching the worker pool's coalescing contract.
    fn normalize(mut self) -> Self {
        if self.batch_size <= 1 {
            self.batch_size = 1000;
        }
        if self.max_batch_capacity < Self::FLUSH_THRESHOLD_FLOOR {
            self.max_batch_capacity = Self::FLUSH_THRESHOLD_FLOOR;
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub error_topic: String,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Parsed and carried for forward-compatibility; never consulted by the
    /// producer. Dead configuration, inherited unchanged from the source
    /// system (see design notes).
    #[allow(dead_code)]
    pub sleep_duration: Duration,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub consumer_group: String,
    pub topics: Vec<String>,
    /// Parsed and carried, like `ProducerConfig::sleep_duration`; the poll
    /// loop's retry behavior is governed by `poll_fetches_timeout` and
    /// cancellation, not a bounded attempt count.
    #[allow(dead_code)]
    pub retry_count: u32,
    pub poll_fetches_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub http_addr: String,
    pub clickhouse: ClickhouseConfig,
    pub event_worker: WorkerConfig,
    pub event_producer: ProducerConfig,
    pub event_consumer: ConsumerConfig,
}

impl Config {
    /// Load configuration from the environment, after loading a `.env` file
    /// if one is present (best-effort — a missing file is fine).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::parse_env()
    }

    fn parse_env() -> Result<Self> {
        let log_level = match env_var("LOG_LEVEL") {
            None => LogLevel::Info,
            Some(raw) => raw
                .parse()
                .map_err(|_| AppError::InitFatal(format!("LOG_LEVEL: invalid value {raw:?}")))?,
        };
        let log_format = match env_var("LOG_FORMAT").as_deref() {
            None | Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::InitFatal(format!(
                    "LOG_FORMAT: invalid value {other:?}"
                )))
            }
        };

        let clickhouse = ClickhouseConfig {
            addr: env_var("CLICKHOUSE_ADDR").unwrap_or_else(|| "localhost:8123".to_string()),
            db: env_var("CLICKHOUSE_DB").unwrap_or_else(|| "default".to_string()),
            username: env_var("CLICKHOUSE_USERNAME").unwrap_or_else(|| "default".to_string()),
            password: env_var("CLICKHOUSE_PASSWORD").unwrap_or_default(),
        };

        let event_worker = WorkerConfig {
            num_workers: env_or("EVENT_WORKER_NUM_WORKERS", num_cpus::get())?,
            batch_size: env_or("EVENT_WORKER_BATCH_SIZE", 1000usize)?,
            max_batch_capacity: env_or("EVENT_WORKER_MAX_BATCH_CAPACITY", 30usize)?,
        }
        .normalize();

        let event_producer = ProducerConfig {
            brokers: env_list_or("EVENT_PRODUCER_BROKERS", vec!["localhost:9092".to_string()]),
            topic: env_var("EVENT_PRODUCER_TOPIC").unwrap_or_else(|| "events".to_string()),
            error_topic: env_var("EVENT_PRODUCER_ERROR_TOPIC")
                .unwrap_or_else(|| "events-dlq".to_string()),
            retry_attempts: env_or("EVENT_PRODUCER_RETRY_ATTEMPTS", 3u32)?,
            retry_delay: env_duration_or("EVENT_PRODUCER_RETRY_DELAY", Duration::from_secs(1))?,
            sleep_duration: env_duration_or(
                "EVENT_PRODUCER_SLEEP_DURATION",
                Duration::from_secs(0),
            )?,
        };

        let event_consumer = ConsumerConfig {
            brokers: env_list_or("EVENT_CONSUMER_BROKERS", vec!["localhost:9092".to_string()]),
            consumer_group: env_var("EVENT_CONSUMER_CONSUMER_GROUP")
                .unwrap_or_else(|| "eventline".to_string()),
            topics: env_list_or("EVENT_CONSUMER_TOPICS", vec!["events".to_string()]),
            retry_count: env_or("EVENT_CONSUMER_RETRY_COUNT", 10u32)?,
            poll_fetches_timeout: env_duration_or(
                "EVENT_CONSUMER_POLL_FETCHES_TIMEOUT",
                Duration::from_secs(15),
            )?,
        };

        Ok(Self {
            log_level,
            log_format,
            http_addr: env_var("HTTP_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            clickhouse,
            event_worker,
            event_producer,
            event_consumer,
        })
    }
}
