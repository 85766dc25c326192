pub mod activity;
pub mod addresses;
pub mod metrics;
pub mod watcher;

pub use activity::activity_handler;
pub use addresses::{add_address_handler, list_addresses_handler, remove_address_handler};
pub use metrics::metrics_handler;
pub use watcher::{start_handler, status_handler, stop_handler};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use watchline_domain::AddressFormatError;
use watchline_watcher::WatcherError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddressFormatError),
    #[error("address `{0}` is not watched")]
    NotWatched(String),
    #[error("poll interval must be greater than zero")]
    InvalidInterval,
    #[error("malformed request body: {0}")]
    InvalidBody(String),
    #[error("watcher failure: {0}")]
    Watcher(WatcherError),
}

impl From<WatcherError> for ApiError {
    fn from(value: WatcherError) -> Self {
        match value {
            WatcherError::InvalidAddress(err) => ApiError::InvalidAddress(err),
            WatcherError::InvalidInterval => ApiError::InvalidInterval,
            other => ApiError::Watcher(other),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress(_) | ApiError::InvalidInterval | ApiError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotWatched(_) => StatusCode::NOT_FOUND,
            ApiError::Watcher(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
