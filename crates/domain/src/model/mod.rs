//! Data structures shared across the watcher and its outer surfaces.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Errors emitted when a user-supplied address is not a valid public key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must not be empty")]
    Empty,
    #[error("invalid address `{address}`: {reason}")]
    Invalid { address: String, reason: String },
}

/// A validated ledger address. The canonical base58 rendering is cached so
/// the watcher can key its maps by string without re-encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchedAddress {
    key: Pubkey,
    encoded: String,
}

impl WatchedAddress {
    pub fn parse(address: &str) -> Result<Self, AddressFormatError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(AddressFormatError::Empty);
        }
        let key = Pubkey::from_str(trimmed).map_err(|err| AddressFormatError::Invalid {
            address: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self::from_pubkey(key))
    }

    pub fn from_pubkey(key: Pubkey) -> Self {
        Self {
            encoded: key.to_string(),
            key,
        }
    }

    pub fn pubkey(&self) -> &Pubkey {
        &self.key
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for WatchedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl FromStr for WatchedAddress {
    type Err = AddressFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for WatchedAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for WatchedAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Finality requested when querying ledger state.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

/// What the scheduler does when a tick fires while the previous poll cycle is
/// still in flight.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OverlapPolicy {
    /// Drop the tick; at most one cycle runs at a time.
    #[default]
    Skip,
    /// Start a new cycle on every tick, even if earlier ones are pending.
    Allow,
}

/// One entry of an address's signature feed, newest entries first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    /// Unix seconds, when the node knows it.
    pub block_time: Option<i64>,
    /// The transaction landed but carried an execution error.
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub confirmation_status: Option<Commitment>,
}

impl SignatureInfo {
    pub fn new(signature: impl Into<String>, slot: u64) -> Self {
        Self {
            signature: signature.into(),
            slot,
            block_time: None,
            failed: false,
            memo: None,
            confirmation_status: None,
        }
    }

    pub fn block_timestamp(&self) -> Option<DateTime<Utc>> {
        self.block_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Notification handed to transaction listeners for each newly observed
/// signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionNotice {
    pub address: WatchedAddress,
    pub signature: SignatureInfo,
    pub observed_at: DateTime<Utc>,
}

impl TransactionNotice {
    pub fn new(address: WatchedAddress, signature: SignatureInfo) -> Self {
        Self {
            address,
            signature,
            observed_at: Utc::now(),
        }
    }
}
