//! # Journey Activity Service
//!
//! Binary entry point for the journey custom activity HTTP service.
//!
//! This executable:
//! - Loads configuration from files and the environment
//! - Initializes logging
//! - Wires the execute pipeline against the upstream platform
//! - Starts the HTTP server from journey-activity-api

mod settings;

use journey_activity_api::{start_server, AppState, LoggingConfig};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "journey_activity_service=info,journey_activity_api=info,\
                              journey_activity_core=info,tower_http=debug";

#[tokio::main]
async fn main() {
    // Logging settings live in the configuration, so it is read first and
    // any failure is reported once the subscriber is up.
    let loaded = settings::load_configuration();
    let logging = loaded
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Journey Activity Service");

    let service_config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to load configuration; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(3);
    }

    if !service_config.security.jwt_secret_configured() {
        warn!("No JWT secret configured; lifecycle tokens will not be verified");
    }
    if !service_config.upstream.has_credentials() {
        warn!("Upstream credentials not configured; executions will acknowledge without writing");
    }

    info!(
        target_collection = %service_config.collections.target_key,
        audit_collection = %service_config.collections.audit_key,
        audit_enabled = service_config.collections.audit_enabled,
        cache_tokens = service_config.upstream.cache_tokens,
        "Pipeline configuration loaded"
    );

    let state = match AppState::from_config(service_config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to initialise application state; aborting");
            std::process::exit(3);
        }
    };

    if let Err(e) = start_server(state).await {
        error!("Server stopped with error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if logging.level.trim().is_empty() || logging.level == "info" {
            DEFAULT_FILTER.into()
        } else {
            logging.level.as_str().into()
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
