// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Share Validation and Threshold Combination
//!
//! Nodes answer with heterogeneously shaped partial results. This module
//! normalizes them into [`Share`] records, groups and sorts them, and hands
//! them to the external combination primitive ([`ThresholdCrypto`]).
//!
//! ## Ordering
//!
//! Shares are always sorted ascending by `share_index` before combination.
//! The primitive is only guaranteed correct for a stable, monotonic order.

pub mod claims;
pub mod combine;
pub mod model;

pub use claims::{get_claims, split_signature, ClaimResult, ClaimSignature};
pub use combine::{
    combine_ecdsa, combine_jwt, decrypt_with_shares, get_signatures, join_signature,
    CombinedSignature,
};
pub use model::{classify, unwrap_candidate, BlsShare, Share, ShareShape};

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Failure reported by the external combination primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("Share combination failed: {0}")]
    Combine(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Key derivation failed: {0}")]
    Derive(String),
}

/// ECDSA signature schemes the network can threshold-sign with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EcdsaSigType {
    #[serde(rename = "K256")]
    K256,
    #[serde(rename = "ECDSA_CAIT_SITH")]
    EcdsaCaitSith,
    #[serde(rename = "EcdsaCaitSithP256")]
    EcdsaCaitSithP256,
}

impl EcdsaSigType {
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "K256" => Some(EcdsaSigType::K256),
            "ECDSA_CAIT_SITH" => Some(EcdsaSigType::EcdsaCaitSith),
            "EcdsaCaitSithP256" => Some(EcdsaSigType::EcdsaCaitSithP256),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            EcdsaSigType::K256 => "K256",
            EcdsaSigType::EcdsaCaitSith => "ECDSA_CAIT_SITH",
            EcdsaSigType::EcdsaCaitSithP256 => "EcdsaCaitSithP256",
        }
    }
}

/// Raw output of an ECDSA share combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdsaParts {
    /// Hex-encoded `r`, with or without `0x`
    pub r: String,
    /// Hex-encoded `s`, with or without `0x`
    pub s: String,
    /// Recovery id (0/1)
    pub recid: u8,
}

/// External threshold-cryptography primitives.
///
/// Implementations wrap a correct combination library; this crate never
/// performs the Lagrange math itself. Inputs are always pre-sorted by
/// share index.
pub trait ThresholdCrypto: Send + Sync {
    fn combine_ecdsa_shares(
        &self,
        sig_type: EcdsaSigType,
        shares: &[Share],
    ) -> Result<EcdsaParts, CryptoError>;

    /// Combine BLS signature shares into a hex-encoded signature.
    fn combine_bls_shares(&self, shares: &[BlsShare]) -> Result<String, CryptoError>;

    /// Encrypt `message` to the network key under `identity`; returns base64 ciphertext.
    fn encrypt(
        &self,
        public_key: &str,
        message: &[u8],
        identity: &[u8],
    ) -> Result<String, CryptoError>;

    fn verify_and_decrypt_with_signature_shares(
        &self,
        public_key: &str,
        identity: &[u8],
        ciphertext: &str,
        shares: &[BlsShare],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Combine legacy condition-ECDSA shares given the shared `R` point.
    fn combine_legacy_ecdsa(
        &self,
        r_x: &str,
        r_y: &str,
        shares: &[String],
    ) -> Result<String, CryptoError>;

    /// Derive the public key of a claimed key id from the network root keys.
    fn compute_hd_pub_key(
        &self,
        root_pubkeys: &[String],
        key_id: &str,
        sig_type: EcdsaSigType,
    ) -> Result<String, CryptoError>;
}

/// Pick the most frequent item.
///
/// Ties go to the item seen first. Returns `None` for an empty input.
pub fn most_common<T, I>(items: I) -> Option<T>
where
    I: IntoIterator<Item = T>,
    T: Eq + Hash,
{
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (position, item) in items.into_iter().enumerate() {
        counts.entry(item).or_insert((0, position)).0 += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn most_common_picks_majority() {
        assert_eq!(most_common(["a", "b", "b", "c"]), Some("b"));
        assert_eq!(most_common(Vec::<String>::new()), None);
    }

    #[test]
    fn most_common_tie_breaks_to_first_seen() {
        assert_eq!(most_common(["x", "y", "y", "x"]), Some("x"));
        assert_eq!(most_common(["y", "x", "x", "y"]), Some("y"));
        assert_eq!(most_common(["q", "r", "s"]), Some("q"));
    }

    #[test]
    fn sig_type_wire_names() {
        for sig_type in [
            EcdsaSigType::K256,
            EcdsaSigType::EcdsaCaitSith,
            EcdsaSigType::EcdsaCaitSithP256,
        ] {
            assert_eq!(EcdsaSigType::from_wire(sig_type.as_wire()), Some(sig_type));
        }
        assert_eq!(EcdsaSigType::from_wire("BLS"), None);
    }
}
