use std::{env, fmt::Display, str::FromStr, time::Duration};

use accrual_engine::{OracleClientConfig, ReconcilerConfig, RetryPolicy};
use log::*;
use lp_common::parse_boolean_flag;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/loyalty.db";
const DEFAULT_ACCRUAL_SYSTEM_ADDRESS: &str = "http://localhost:8082";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;
const DEFAULT_MAX_RETRY_AFTER_SECS: u64 = 3_600;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_RETRY_CAP_MS: u64 = 60_000;
const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 10;
const DEFAULT_RETRY_JITTER: f64 = 0.1;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub oracle: OracleConfig,
    pub engine: EngineConfig,
    /// If false, the periodic recovery sweep is not started. Pending orders are still recovered once at start-up.
    pub sweep_enabled: bool,
    pub sweep_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct OracleConfig {
    /// The base address of the accrual system, e.g. `http://localhost:8082`
    pub address: String,
    pub timeout: Duration,
    /// The pause applied when the oracle rate-limits us without saying for how long
    pub default_retry_after: Duration,
    /// The longest pause we accept from the oracle
    pub max_retry_after: Duration,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub max_retry_attempts: u32,
    pub retry_jitter: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            oracle: OracleConfig::default(),
            engine: EngineConfig::default(),
            sweep_enabled: true,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ACCRUAL_SYSTEM_ADDRESS.to_string(),
            timeout: Duration::from_millis(DEFAULT_ORACLE_TIMEOUT_MS),
            default_retry_after: Duration::from_secs(DEFAULT_RETRY_AFTER_SECS),
            max_retry_after: Duration::from_secs(DEFAULT_MAX_RETRY_AFTER_SECS),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retry_base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_cap: Duration::from_millis(DEFAULT_RETRY_CAP_MS),
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            retry_jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

impl ServerConfig {
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any source of `LPS_*` values. Missing values take their defaults, and invalid
    /// ones are logged and replaced with the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let database_url = lookup("LPS_DATABASE_URL").unwrap_or_else(|| {
            warn!("🪛️ LPS_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let db_max_connections = parse_value(&lookup, "LPS_DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS);
        let address = lookup("LPS_ACCRUAL_SYSTEM_ADDRESS").unwrap_or_else(|| {
            warn!("🪛️ LPS_ACCRUAL_SYSTEM_ADDRESS is not set. Using {DEFAULT_ACCRUAL_SYSTEM_ADDRESS}.");
            DEFAULT_ACCRUAL_SYSTEM_ADDRESS.to_string()
        });
        let oracle = OracleConfig {
            address,
            timeout: millis(parse_value(&lookup, "LPS_ORACLE_TIMEOUT_MS", DEFAULT_ORACLE_TIMEOUT_MS)),
            default_retry_after: secs(parse_value(&lookup, "LPS_DEFAULT_RETRY_AFTER_SECS", DEFAULT_RETRY_AFTER_SECS)),
            max_retry_after: secs(parse_value(&lookup, "LPS_MAX_RETRY_AFTER_SECS", DEFAULT_MAX_RETRY_AFTER_SECS)),
        };
        let mut workers = parse_value(&lookup, "LPS_WORKERS", DEFAULT_WORKERS);
        if workers == 0 {
            warn!("🪛️ LPS_WORKERS must be at least 1. Using the default, {DEFAULT_WORKERS}, instead.");
            workers = DEFAULT_WORKERS;
        }
        let mut retry_jitter = parse_value(&lookup, "LPS_RETRY_JITTER", DEFAULT_RETRY_JITTER);
        if !(0.0..=1.0).contains(&retry_jitter) {
            warn!("🪛️ LPS_RETRY_JITTER must be between 0 and 1. Using the default, {DEFAULT_RETRY_JITTER}.");
            retry_jitter = DEFAULT_RETRY_JITTER;
        }
        let engine = EngineConfig {
            workers,
            poll_interval: millis(parse_value(&lookup, "LPS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)),
            retry_base: millis(parse_value(&lookup, "LPS_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)),
            retry_cap: millis(parse_value(&lookup, "LPS_RETRY_CAP_MS", DEFAULT_RETRY_CAP_MS)),
            max_retry_attempts: parse_value(&lookup, "LPS_MAX_RETRY_ATTEMPTS", DEFAULT_MAX_RETRY_ATTEMPTS),
            retry_jitter,
        };
        let sweep_enabled = parse_boolean_flag(lookup("LPS_RECOVERY_SWEEP"), true);
        let mut sweep_interval = parse_value(&lookup, "LPS_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        if sweep_interval == 0 {
            warn!(
                "🪛️ LPS_SWEEP_INTERVAL_SECS must be at least 1. Using the default, {DEFAULT_SWEEP_INTERVAL_SECS}, \
                 instead."
            );
            sweep_interval = DEFAULT_SWEEP_INTERVAL_SECS;
        }
        let sweep_interval = secs(sweep_interval);
        Self { database_url, db_max_connections, oracle, engine, sweep_enabled, sweep_interval }
    }

    pub fn oracle_client_config(&self) -> OracleClientConfig {
        OracleClientConfig::new(self.oracle.address.clone())
            .with_timeout(self.oracle.timeout)
            .with_default_retry_after(self.oracle.default_retry_after)
            .with_max_retry_after(self.oracle.max_retry_after)
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let engine = &self.engine;
        let retry = RetryPolicy::new(engine.retry_base, engine.retry_cap, engine.max_retry_attempts)
            .with_jitter(engine.retry_jitter);
        ReconcilerConfig::default()
            .with_workers(engine.workers)
            .with_poll_interval(engine.poll_interval)
            .with_retry_policy(retry)
    }
}

fn parse_value<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(name) {
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        None => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn millis(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}
