use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use thiserror::Error;
use tracing::{info, warn};

use watchline_domain::config::{ApiConfig, ConfigError, WatcherConfig};
use watchline_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryError};
use watchline_watcher::{AddressWatcher, TransactionListener, WatcherError};

use crate::{
    activity::RecentActivity,
    handlers::{
        activity_handler, add_address_handler, list_addresses_handler, metrics_handler,
        remove_address_handler, start_handler, status_handler, stop_handler,
    },
    state::AppState,
};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let watcher_config = WatcherConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("API");
    let telemetry = init_telemetry(&telemetry_config)?;

    let watcher = AddressWatcher::connect(&watcher_config)?;
    let activity = Arc::new(RecentActivity::new(config.activity_capacity()));
    info!(capacity = activity.capacity(), "activity log ready");
    let listener: Arc<dyn TransactionListener> = activity.clone();
    watcher.on_transaction(listener);
    for address in watcher_config.addresses() {
        if let Err(err) = watcher.add_address(address) {
            warn!(address = address.as_str(), %err, "skipping configured address");
        }
    }
    if config.autostart() {
        watcher.start(watcher_config.poll_interval())?;
    }

    let state = AppState::new(
        watcher.clone(),
        activity,
        telemetry,
        watcher_config.poll_interval(),
    );

    // Metrics move to the internal listener when one is configured.
    let include_metrics_on_public = !config.has_internal_listener();

    let public_state = state.clone();
    let public_server = HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(Logger::default())
            .configure(routes);
        if include_metrics_on_public {
            app.route("/metrics", web::get().to(metrics_handler))
        } else {
            app
        }
    })
    .bind(config.api_bind_address())?
    .run();
    info!(bind = config.api_bind_address(), "api listening");

    let internal_server = match config.internal_bind_address() {
        Some(addr) => {
            let internal_state = state.clone();
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(internal_state.clone()))
                    .wrap(Logger::default())
                    .route("/metrics", web::get().to(metrics_handler))
            })
            .bind(addr)?
            .run();
            info!(bind = addr, "internal listener ready");
            Some(server)
        }
        None => None,
    };

    let served = if let Some(internal) = internal_server {
        tokio::try_join!(public_server, internal).map(|_| ())
    } else {
        public_server.await
    };

    watcher.stop();
    served?;
    Ok(())
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/v1/addresses", web::get().to(list_addresses_handler))
        .route("/api/v1/addresses", web::post().to(add_address_handler))
        .route(
            "/api/v1/addresses/{address}",
            web::delete().to(remove_address_handler),
        )
        .route("/api/v1/watcher", web::get().to(status_handler))
        .route("/api/v1/watcher/start", web::post().to(start_handler))
        .route("/api/v1/watcher/stop", web::post().to(stop_handler))
        .route("/api/v1/activity", web::get().to(activity_handler));
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
