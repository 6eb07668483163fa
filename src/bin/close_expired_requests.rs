use chrono::Utc;
use dotenvy::dotenv;
use tracing_subscriber::{fmt, EnvFilter};

use bloodshare::config::Config;
use bloodshare::database;
use bloodshare::services::blood_request_service;

#[tokio::main]
async fn main() {
    dotenv().ok();
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bloodshare=info")),
        )
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match database::connect(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("cannot open database {}: {}", config.database_url, e);
            std::process::exit(1);
        }
    };

    match blood_request_service::close_expired_requests(&pool, Utc::now()).await {
        Ok(closed) => println!("expired blood requests closed: {}", closed),
        Err(e) => {
            eprintln!("closing expired requests failed: {}", e);
            std::process::exit(1);
        }
    }
}
