use actix_web::{web, HttpResponse};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

use super::ApiError;

#[derive(Debug, Deserialize, Serialize)]
pub struct AddAddressRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressView {
    pub address: String,
    pub last_seen: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddAddressResponse {
    pub address: String,
    pub added: bool,
}

pub async fn list_addresses_handler(state: web::Data<AppState>) -> HttpResponse {
    let addresses: Vec<AddressView> = state
        .watcher()
        .snapshot()
        .into_iter()
        .map(|entry| AddressView {
            address: entry.address.to_string(),
            last_seen: entry.last_seen,
        })
        .collect();
    HttpResponse::Ok().json(addresses)
}

pub async fn add_address_handler(
    state: web::Data<AppState>,
    payload: web::Json<AddAddressRequest>,
) -> Result<HttpResponse, ApiError> {
    let added = state
        .watcher()
        .add_address(&payload.address)
        .inspect_err(|_| {
            counter!("api_address_requests_total", "action" => "add", "status" => "invalid")
                .increment(1);
        })?;

    let body = AddAddressResponse {
        address: payload.address.trim().to_string(),
        added,
    };
    if added {
        counter!("api_address_requests_total", "action" => "add", "status" => "added").increment(1);
        Ok(HttpResponse::Created().json(body))
    } else {
        counter!("api_address_requests_total", "action" => "add", "status" => "present")
            .increment(1);
        Ok(HttpResponse::Ok().json(body))
    }
}

pub async fn remove_address_handler(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let address = path.into_inner();
    if !state.watcher().remove_address(&address) {
        counter!("api_address_requests_total", "action" => "remove", "status" => "not_found")
            .increment(1);
        return Err(ApiError::NotWatched(address));
    }
    counter!("api_address_requests_total", "action" => "remove", "status" => "removed")
        .increment(1);
    Ok(HttpResponse::NoContent().finish())
}
