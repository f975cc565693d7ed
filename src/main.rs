use axum::http::StatusCode;
use axum::{Router, middleware, routing};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use webhook_gate::api::{status, webhook_middleware};
use webhook_gate::logging::{FileLogger, setup_logging};
use webhook_gate::receiver::EventReceiver;
use webhook_gate::{AppState, load_config};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8888";
const DEFAULT_CONFIG_PATH: &str = "webhook_gate.toml";

fn build_receiver() -> EventReceiver {
    let mut receiver = EventReceiver::new();

    receiver.on_any(|event| async move {
        info!(
            event = %event.name,
            id = %event.id,
            action = event.action().unwrap_or("-"),
            "Delivery handled"
        );
        Ok(())
    });

    receiver.on_error(|error| async move {
        warn!(
            id = error.event().map(|e| e.id.as_str()).unwrap_or("-"),
            errors = error.len(),
            "Delivery failed: {}",
            error
        );
        Ok(())
    });

    receiver
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let config_path =
        std::env::var("GATE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let mut config = match load_config(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Ok(secret) = std::env::var("WEBHOOK_SECRET") {
        config.secret = secret;
    }
    if let Err(e) = config.validate() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let file_logger = config
        .log
        .as_ref()
        .map(|log| FileLogger::new(log.directory.clone()));
    let _log_guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let webhook_path = config.path.clone();
    let state = Arc::new(AppState::new(config, build_receiver()));

    let app = Router::new()
        .route("/status", routing::get(status))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_middleware,
        ))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", bind_address, e);
            std::process::exit(1);
        }
    };

    info!("Listening on {}", bind_address);
    info!("Using config at {:?}", config_path);
    info!("Accepting deliveries at {}", webhook_path);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
