use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use watchline_domain::TransactionNotice;

use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub address: String,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub failed: bool,
    pub memo: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl From<TransactionNotice> for ActivityEntry {
    fn from(notice: TransactionNotice) -> Self {
        let block_time = notice.signature.block_timestamp();
        Self {
            address: notice.address.to_string(),
            signature: notice.signature.signature,
            slot: notice.signature.slot,
            block_time,
            failed: notice.signature.failed,
            memo: notice.signature.memo,
            observed_at: notice.observed_at,
        }
    }
}

pub async fn activity_handler(
    state: web::Data<AppState>,
    query: web::Query<ActivityQuery>,
) -> HttpResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let entries: Vec<ActivityEntry> = state
        .activity()
        .recent(limit)
        .into_iter()
        .map(ActivityEntry::from)
        .collect();
    HttpResponse::Ok().json(entries)
}
