use std::time::Duration;

use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct WatcherStatusResponse {
    pub running: bool,
    pub addresses: usize,
    pub listeners: usize,
    pub poll_interval_ms: u64,
    pub fetch_limit: usize,
    pub commitment: String,
    pub overlap: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct StartRequest {
    pub interval_ms: Option<u64>,
}

fn status_of(state: &AppState) -> WatcherStatusResponse {
    let watcher = state.watcher();
    let options = watcher.options();
    WatcherStatusResponse {
        running: watcher.is_running(),
        addresses: watcher.addresses().len(),
        listeners: watcher.listener_count(),
        poll_interval_ms: watcher
            .period()
            .unwrap_or_else(|| state.poll_interval())
            .as_millis() as u64,
        fetch_limit: options.fetch_limit,
        commitment: options.commitment.to_string(),
        overlap: options.overlap.to_string(),
    }
}

pub async fn status_handler(state: web::Data<AppState>) -> HttpResponse {
    let status = status_of(&state);
    let tag = if status.running { "running" } else { "stopped" };
    counter!("api_watcher_requests_total", "action" => "status", "status" => tag).increment(1);
    HttpResponse::Ok().json(status)
}

/// An empty body starts the loop at the configured interval.
pub async fn start_handler(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice::<StartRequest>(&body).map_err(|err| {
            counter!("api_watcher_requests_total", "action" => "start", "status" => "invalid")
                .increment(1);
            ApiError::InvalidBody(err.to_string())
        })?
    };
    let interval = request
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| state.poll_interval());
    let started = state.watcher().start(interval)?;
    let outcome = if started { "started" } else { "already_running" };
    counter!("api_watcher_requests_total", "action" => "start", "status" => outcome).increment(1);
    Ok(HttpResponse::Ok().json(status_of(&state)))
}

pub async fn stop_handler(state: web::Data<AppState>) -> HttpResponse {
    let stopped = state.watcher().stop();
    let outcome = if stopped { "stopped" } else { "not_running" };
    counter!("api_watcher_requests_total", "action" => "stop", "status" => outcome).increment(1);
    HttpResponse::Ok().json(status_of(&state))
}
