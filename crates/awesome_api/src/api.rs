use async_trait::async_trait;
use deadline::RaceError;
use log::debug;
use quote_model::{Quote, QuoteEnvelope};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub const AWESOME_API_URL: &str = "https://economia.awesomeapi.com.br/json/last/USD-BRL";
pub const DEFAULT_FETCH_BUDGET: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
    #[error("could not read body: {0}")]
    Body(reqwest::Error),
    #[error("malformed quote: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    #[error("worker failed: {0}")]
    Worker(String),
}

impl FetchError {
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, FetchError::DeadlineExceeded(_))
    }
}

impl From<RaceError<FetchError>> for FetchError {
    fn from(err: RaceError<FetchError>) -> FetchError {
        match err {
            RaceError::Failed(e) => e,
            RaceError::DeadlineExceeded { budget, .. } => FetchError::DeadlineExceeded(budget),
            e @ RaceError::Worker { .. } => FetchError::Worker(e.to_string()),
        }
    }
}

/// Anything able to produce a fresh quote on demand.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self) -> Result<Quote, FetchError>;
}

#[derive(Clone)]
pub struct AwesomeAPI {
    url: String,
    budget: Duration,
    client: reqwest::Client,
}

impl AwesomeAPI {
    pub fn new(url: impl Into<String>, budget: Duration) -> Self {
        return AwesomeAPI {
            url: url.into(),
            budget,
            client: reqwest::Client::new(),
        };
    }
}

impl Default for AwesomeAPI {
    fn default() -> Self {
        AwesomeAPI::new(AWESOME_API_URL, DEFAULT_FETCH_BUDGET)
    }
}

#[async_trait]
impl QuoteSource for AwesomeAPI {
    async fn get_quote(&self) -> Result<Quote, FetchError> {
        debug!("get_quote | url: {}", self.url);

        let work = fetch_quote(self.client.clone(), self.url.clone());
        let quote = deadline::race("awesome_api get_quote", self.budget, work).await?;

        debug!("get_quote | bid: {}", quote.bid);
        Ok(quote)
    }
}

async fn fetch_quote(client: reqwest::Client, url: String) -> Result<Quote, FetchError> {
    let res = client.get(&url).send().await.map_err(FetchError::Request)?;
    if !res.status().is_success() {
        return Err(FetchError::UnexpectedStatus(res.status()));
    }

    let body = res.bytes().await.map_err(FetchError::Body)?;
    let envelope: QuoteEnvelope = serde_json::from_slice(&body)?;

    Ok(envelope.usdbrl)
}
