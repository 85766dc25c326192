use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use tracing::debug;

use watchline_domain::{Commitment, SignatureInfo, WatchedAddress};

use crate::watcher::WatcherError;

mod types;

pub use types::{
    JsonRpcErrorObject, JsonRpcRequest, JsonRpcResponse, SignatureEntry,
    SignaturesForAddressConfig,
};

const GET_SIGNATURES_FOR_ADDRESS: &str = "getSignaturesForAddress";

/// Upstream feed of transaction signatures for one address.
#[async_trait]
pub trait SignatureSource: Send + Sync {
    /// Returns up to `limit` signatures involving `address`, newest first.
    async fn recent_signatures(
        &self,
        address: &WatchedAddress,
        limit: usize,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>, WatcherError>;
}

/// `SignatureSource` backed by a Solana JSON-RPC endpoint.
pub struct RpcSignatureSource {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcSignatureSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, WatcherError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SignatureSource for RpcSignatureSource {
    async fn recent_signatures(
        &self,
        address: &WatchedAddress,
        limit: usize,
        commitment: Commitment,
    ) -> Result<Vec<SignatureInfo>, WatcherError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = signatures_request(id, address, limit, commitment);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: JsonRpcResponse<Vec<SignatureEntry>> = response.json().await?;
        let entries = unwrap_response(body)?;
        debug!(address = %address, count = entries.len(), "fetched signature page");

        Ok(entries.into_iter().map(convert_entry).collect())
    }
}

fn signatures_request(
    id: u64,
    address: &WatchedAddress,
    limit: usize,
    commitment: Commitment,
) -> JsonRpcRequest<(String, SignaturesForAddressConfig)> {
    JsonRpcRequest::new(
        id,
        GET_SIGNATURES_FOR_ADDRESS,
        (
            address.as_str().to_string(),
            SignaturesForAddressConfig { limit, commitment },
        ),
    )
}

fn unwrap_response<T>(response: JsonRpcResponse<T>) -> Result<T, WatcherError> {
    if let Some(err) = response.error {
        return Err(WatcherError::Rpc(format!(
            "{} (code {})",
            err.message, err.code
        )));
    }
    response
        .result
        .ok_or_else(|| WatcherError::Rpc("response carried neither result nor error".to_string()))
}

fn convert_entry(entry: SignatureEntry) -> SignatureInfo {
    SignatureInfo {
        signature: entry.signature,
        slot: entry.slot,
        block_time: entry.block_time,
        failed: entry.err.is_some_and(|err| !err.is_null()),
        memo: entry.memo,
        confirmation_status: entry.confirmation_status,
    }
}
