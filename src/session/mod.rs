// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Keys and Capabilities
//!
//! Authorization material attached to node requests:
//!
//! - [`SessionKeyPair`] - ephemeral Ed25519 key, persisted and reused
//! - [`SiweMessage`] - EIP-4361 delegation messages and EIP-191 verification
//! - [`RecapCapabilityObject`] - `(resource, ability)` grants embedded in a SIWE
//! - wallet sig lifecycle and per-node session signatures ([`manager`])
//! - [`LocalWalletAuthCallback`] and capacity delegation ([`wallet`])
//!
//! ## Wallet Sig Lifecycle
//!
//! ```text
//! Absent --(cache miss / callback)--> Fetched --(verify)--> Validated
//!                                                  |
//!                          Reusable <--------------+--------------> MustResign
//! ```
//!
//! `MustResign` bypasses the cache and asks the auth callback again.

pub mod keypair;
pub mod manager;
pub mod recap;
pub mod resources;
pub mod siwe;
pub mod wallet;

pub use keypair::{verify_session_sig, SessionKeyPair};
pub use manager::{
    build_capability_object, check_need_to_resign, needs_resign, resolve_wallet_sig,
    sign_session_sigs, ResignReason, SESSION_SIG_TTL, WALLET_SIG_TTL,
};
pub use recap::RecapCapabilityObject;
pub use resources::{LitAbility, LitResource, LitResourcePrefix, ResourceAbilityRequest};
pub use siwe::{verify_wallet_sig, SiweError, SiweMessage};
pub use wallet::{
    create_capacity_delegation_auth_sig, CapacityDelegationRequest, LocalWalletAuthCallback,
};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// URI used by capability delegation messages.
pub const SIWE_DELEGATION_URI: &str = "lit:capability:delegation";

/// `derivedVia` of per-node session signatures.
pub const SESSION_SIG_DERIVED_VIA: &str = "litSessionSignViaNacl";

/// `derivedVia` of wallet-produced EIP-191 signatures.
pub const WALLET_SIG_DERIVED_VIA: &str = "web3.eth.personal.sign";

/// `derivedVia` of PKP-produced session key signatures.
pub const PKP_SIG_DERIVED_VIA: &str = "web3.eth.personal.sign via Lit PKP";

/// A signature over a SIWE-style message (wallet sig) or a session template
/// (session sig).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    pub sig: String,
    pub derived_via: String,
    pub signed_message: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algo: Option<String>,
}

impl AuthSig {
    /// Name of the first empty required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("address", &self.address),
            ("derivedVia", &self.derived_via),
            ("sig", &self.sig),
            ("signedMessage", &self.signed_message),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// Session signatures keyed by node URL.
pub type SessionSigs = BTreeMap<String, AuthSig>;

/// Failure of an auth callback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid authentication parameters: {0}")]
    InvalidParams(String),
}

/// Everything an auth callback needs to produce a wallet sig.
#[derive(Debug, Clone)]
pub struct AuthCallbackParams {
    pub chain: String,
    pub statement: Option<String>,
    /// SIWE resources to embed (the encoded recap URN)
    pub resources: Vec<String>,
    pub switch_chain: bool,
    /// ISO-8601 expiration of the delegation
    pub expiration: String,
    /// Session key URI the delegation is issued to
    pub uri: String,
    pub nonce: String,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
    pub session_capability_object: RecapCapabilityObject,
}

/// Produces wallet signatures on demand.
#[async_trait]
pub trait AuthCallback: Send + Sync {
    async fn authenticate(&self, params: AuthCallbackParams) -> Result<AuthSig, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_reports_first_empty() {
        let mut sig = AuthSig {
            sig: "0x01".into(),
            derived_via: WALLET_SIG_DERIVED_VIA.into(),
            signed_message: "msg".into(),
            address: "0xabc".into(),
            algo: None,
        };
        assert_eq!(sig.missing_field(), None);

        sig.sig = " ".into();
        assert_eq!(sig.missing_field(), Some("sig"));
        sig.address.clear();
        assert_eq!(sig.missing_field(), Some("address"));
    }

    #[test]
    fn auth_sig_serializes_camel_case_without_empty_algo() {
        let sig = AuthSig {
            sig: "s".into(),
            derived_via: "d".into(),
            signed_message: "m".into(),
            address: "a".into(),
            algo: None,
        };
        let value = serde_json::to_value(&sig).unwrap();
        assert_eq!(value["derivedVia"], "d");
        assert_eq!(value["signedMessage"], "m");
        assert!(value.get("algo").is_none());
    }
}
