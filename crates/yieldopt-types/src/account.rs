//! Account identifiers.
//!
//! Every party that holds a balance (users, the vault, the staking venue)
//! is addressed by a 32-byte [`AccountId`]. Ids render as lowercase hex.
//! Human-readable labels ("alice", "vault") are mapped onto ids with a
//! domain-separated BLAKE3 key derivation so that the same label always
//! yields the same account.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// BLAKE3 context for label → account derivation.
pub const ACCOUNT_LABEL_CONTEXT: &str = "yieldopt v1 account-label";

/// A 32-byte account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(pub [u8; 32]);

/// Error returned when parsing a hex account id.
#[derive(Debug, thiserror::Error)]
#[error("invalid account id: {0}")]
pub struct ParseAccountIdError(String);

impl AccountId {
    /// Derive an account id from a human-readable label.
    pub fn from_label(label: &str) -> Self {
        Self(blake3::derive_key(ACCOUNT_LABEL_CONTEXT, label.as_bytes()))
    }

    /// Parse a 64-character hex id, or derive one from a label otherwise.
    pub fn resolve(input: &str) -> Self {
        input
            .parse()
            .unwrap_or_else(|_| Self::from_label(input))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.short())
    }
}

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(ParseAccountIdError(format!(
                "expected 64 hex characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ParseAccountIdError(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
