//! Ledger account identity, `0x`-prefixed hex.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// A ledger account authorized to submit transactions.
///
/// Stored in lowercase so that comparisons (e.g. "is this the administrator?")
/// are insensitive to the checksum casing wallets like to display.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// The standard prefix for all account identities.
    pub const PREFIX: &'static str = "0x";

    /// Number of raw bytes behind an identity.
    pub const BYTE_LEN: usize = 20;

    /// Parse an identity from its textual form.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(Self::PREFIX)
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| TypeError::InvalidIdentity(format!("missing 0x prefix: {raw}")))?;

        let bytes = hex::decode(body)
            .map_err(|e| TypeError::InvalidIdentity(format!("{raw}: {e}")))?;
        if bytes.len() != Self::BYTE_LEN {
            return Err(TypeError::InvalidIdentity(format!(
                "{raw}: expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        Ok(Self::from_bytes(&bytes_to_array(&bytes)))
    }

    /// Build an identity from its raw 20 bytes.
    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(format!("{}{}", Self::PREFIX, hex::encode(bytes)))
    }

    /// Return the normalized (lowercase) address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines and status bars, e.g. `0x802b…2195`.
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

fn bytes_to_array(bytes: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    out
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}
