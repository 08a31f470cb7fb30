use deadline::RaceError;
use dotenvy::dotenv;
use log::{debug, info, warn};
use quote_model::{BidEnvelope, BidView};
use reqwest::StatusCode;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

const DEFAULT_SERVER_URL: &str = "http://localhost:8080/cotacao";
const DEFAULT_OUTPUT_FILE: &str = "cotacao.txt";
const DEFAULT_BUDGET: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
enum ClientError {
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
    #[error("could not write output: {0}")]
    Write(#[from] std::io::Error),
}

impl From<RaceError<ClientError>> for ClientError {
    fn from(err: RaceError<ClientError>) -> ClientError {
        match err {
            RaceError::Failed(e) => e,
            RaceError::DeadlineExceeded { budget, .. } => ClientError::DeadlineExceeded(budget),
            e @ RaceError::Worker { .. } => ClientError::Worker(e.to_string()),
        }
    }
}

struct Config {
    server_url: String,
    output_file: PathBuf,
    budget: Duration,
}

impl Config {
    fn new() -> Config {
        dotenv().ok();

        let server_url =
            env::var("COTACAO_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let output_file =
            env::var("COTACAO_OUTPUT_FILE").unwrap_or_else(|_| DEFAULT_OUTPUT_FILE.to_string());
        let budget = match env::var("COTACAO_CLIENT_TIMEOUT_MS") {
            Ok(ms) => match ms.trim().parse() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    warn!("COTACAO_CLIENT_TIMEOUT_MS has invalid value {:?}, using default", ms);
                    DEFAULT_BUDGET
                }
            },
            Err(_) => DEFAULT_BUDGET,
        };

        Config {
            server_url,
            output_file: PathBuf::from(output_file),
            budget,
        }
    }
}

async fn get_cotacao(url: &str, budget: Duration) -> Result<BidView, ClientError> {
    debug!("get_cotacao | url: {}", url);

    let work = request_bid(reqwest::Client::new(), url.to_string());
    let view = deadline::race("client get_cotacao", budget, work).await?;

    Ok(view)
}

async fn request_bid(client: reqwest::Client, url: String) -> Result<BidView, ClientError> {
    let res = client.get(&url).send().await.map_err(ClientError::Request)?;
    if res.status() != StatusCode::OK {
        return Err(ClientError::UnexpectedStatus(res.status()));
    }

    let body = res.bytes().await.map_err(ClientError::Body)?;
    let envelope: BidEnvelope = serde_json::from_slice(&body)?;

    Ok(envelope.usdbrl)
}

fn save_to_file(path: &Path, view: &BidView) -> Result<(), ClientError> {
    fs::write(path, view.to_line())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let config = Config::new();

    let view = get_cotacao(&config.server_url, config.budget).await?;
    save_to_file(&config.output_file, &view)?;

    info!("Wrote {} to {}", view.to_line(), config.output_file.display());
    Ok(())
}
