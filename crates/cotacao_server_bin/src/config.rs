use awesome_api::api::{AWESOME_API_URL, DEFAULT_FETCH_BUDGET};
use dotenvy::dotenv;
use log::warn;
use quote_store::store::{DEFAULT_DATABASE_URL, DEFAULT_SAVE_BUDGET};
use std::env;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

pub struct Config {
    pub bind: String,
    pub workers: usize,
    pub provider_url: String,
    pub database_url: String,
    pub fetch_budget: Duration,
    pub save_budget: Duration,
}

impl Config {
    pub fn new() -> Config {
        dotenv().ok();
        Config::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Config {
        let text = |key: &str, default: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let mut workers = parse_or(&lookup, "COTACAO_WORKERS", 1);
        if workers == 0 {
            workers = 1;
        }

        Config {
            bind: text("COTACAO_BIND", DEFAULT_BIND),
            workers,
            provider_url: text("COTACAO_PROVIDER_URL", AWESOME_API_URL),
            database_url: text("COTACAO_DATABASE_URL", DEFAULT_DATABASE_URL),
            fetch_budget: millis_or(&lookup, "COTACAO_FETCH_TIMEOUT_MS", DEFAULT_FETCH_BUDGET),
            save_budget: millis_or(&lookup, "COTACAO_SAVE_TIMEOUT_MS", DEFAULT_SAVE_BUDGET),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(value) => value.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default", key, value);
            default
        }),
    }
}

fn millis_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    let default_ms = default.as_millis() as u64;
    Duration::from_millis(parse_or(lookup, key, default_ms))
}
