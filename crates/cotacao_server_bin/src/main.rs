use awesome_api::api::{AwesomeAPI, QuoteSource};
use log::{error, info};
use quote_model::QuoteEnvelope;
use quote_store::store::{QuoteSink, QuoteStore};
use serde::Serialize;
use std::{process::exit, sync::Arc};

use actix_web::{App, HttpResponse, HttpServer, Responder, get, middleware::Logger, web};

use config::Config;

mod config;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ErrorResponse {
    fn new(message: String) -> Self {
        ErrorResponse { error: message }
    }
}

/// Fetches a fresh quote, stores it and echoes it back.
#[get("/cotacao")]
async fn get_cotacao(
    source: web::Data<dyn QuoteSource>,
    sink: web::Data<dyn QuoteSink>,
) -> impl Responder {
    let quote = match source.get_quote().await {
        Ok(quote) => quote,
        Err(e) => {
            error!("get_cotacao | fetch failed: {}", e);
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new(format!("Failed to retrieve data: {}", e)));
        }
    };

    if let Err(e) = sink.save(&quote).await {
        error!("get_cotacao | save failed: {}", e);
        return HttpResponse::InternalServerError()
            .json(ErrorResponse::new(format!("Failed to save data: {}", e)));
    }

    HttpResponse::Ok().json(QuoteEnvelope::from(quote))
}

async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(ErrorResponse::new("not found".to_string()))
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_cotacao);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let config = Config::new();

    let store = match QuoteStore::connect(&config.database_url, config.save_budget).await {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open quote store: {}", e);
            exit(1);
        }
    };
    if let Err(e) = store.reset().await {
        error!("Could not reset quote store: {}", e);
        exit(1);
    }
    info!("Quote store ready at {}", config.database_url);

    let source: Arc<dyn QuoteSource> = Arc::new(AwesomeAPI::new(
        config.provider_url.clone(),
        config.fetch_budget,
    ));
    let sink: Arc<dyn QuoteSink> = Arc::new(store);

    info!("Listening on {}", config.bind);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::from(source.clone()))
            .app_data(web::Data::from(sink.clone()))
            .configure(routes)
            .default_service(web::to(not_found))
            .wrap(Logger::default())
    })
    .bind(config.bind.as_str())?
    .workers(config.workers)
    .run()
    .await
}
