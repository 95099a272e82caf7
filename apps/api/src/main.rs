use sharebox_api::app::create_app;
use sharebox_api::auth::AppState;
use sharebox_api::config::{load_config, save_default_config, Config};
use sharebox_api::constants::{CONFIG_PATH, DATABASE_PATH, DATA_DIR};
use sharebox_api::database::{create_pool, init_database};
use sharebox_api::logging::{init_logging, install_panic_hook};
use sharebox_api::storage::ChunkStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

fn init_directories(config: &Config) {
    for dir in [&*DATA_DIR, &config.storage.shares_dir] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Failed to create directory {:?}: {}", dir, e);
        }
    }
}

#[tokio::main]
async fn main() {
    if std::env::args().any(|arg| arg == "--init-config") {
        match save_default_config(&CONFIG_PATH) {
            Ok(_) => {
                println!("Default configuration saved to {:?}", *CONFIG_PATH);
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Failed to save default configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    // Initialize logging
    init_logging();
    install_panic_hook();

    // Load configuration
    let config = Arc::new(load_config(&CONFIG_PATH));

    init_directories(&config);

    let pool = match create_pool(&DATABASE_PATH) {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database schema
    let schema = pool
        .get()
        .map_err(sharebox_api::error::AppError::from)
        .and_then(|conn| init_database(&conn));
    if let Err(e) = schema {
        error!("Failed to initialize database: {}", e);
        std::process::exit(1);
    }

    let state = AppState {
        store: ChunkStore::new(config.storage.shares_dir.clone()),
        config: Arc::clone(&config),
        pool,
    };
    let app = create_app(state);

    let host: std::net::IpAddr = config.server.host.parse().unwrap_or_else(|_| {
        warn!("Invalid server.host {:?}, binding 0.0.0.0", config.server.host);
        std::net::IpAddr::from([0, 0, 0, 0])
    });
    let addr = SocketAddr::new(host, config.server.port);
    info!("Starting Sharebox API on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server failed: {}", e);
        std::process::exit(1);
    }
}
