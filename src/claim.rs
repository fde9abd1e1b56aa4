// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key claiming and the mint seam.
//!
//! Every connected node signs the derived key id on its own. The split
//! signatures are handed to a [`MintCallback`], which typically submits the
//! on-chain mint transaction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};
use crate::shares::ClaimSignature;

/// Auth method type ids understood by the nodes.
pub mod auth_method_type {
    pub const ETH_WALLET: u32 = 1;
    pub const LIT_ACTION: u32 = 2;
    pub const WEBAUTHN: u32 = 3;
    pub const DISCORD: u32 = 4;
    pub const GOOGLE: u32 = 5;
    pub const GOOGLE_JWT: u32 = 6;
}

/// Authentication material for a non-wallet identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    pub auth_method_type: u32,
    pub access_token: String,
}

impl AuthMethod {
    pub fn new(auth_method_type: u32, access_token: impl Into<String>) -> Self {
        Self {
            auth_method_type,
            access_token: access_token.into(),
        }
    }

    pub fn discord(access_token: impl Into<String>) -> Self {
        Self::new(auth_method_type::DISCORD, access_token)
    }

    pub fn google(access_token: impl Into<String>) -> Self {
        Self::new(auth_method_type::GOOGLE, access_token)
    }

    pub fn google_jwt(access_token: impl Into<String>) -> Self {
        Self::new(auth_method_type::GOOGLE_JWT, access_token)
    }
}

/// What the mint callback receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRequest {
    pub derived_key_id: String,
    pub auth_method_type: u32,
    pub signatures: Vec<ClaimSignature>,
    pub pubkey: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Mint failed: {0}")]
pub struct MintError(pub String);

/// Submits a claimed key for minting; returns the transaction reference.
#[async_trait]
pub trait MintCallback: Send + Sync {
    async fn mint(&self, request: MintRequest) -> Result<String, MintError>;
}

/// Result of [`crate::client::NodeClient::claim_key_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimKeyResponse {
    pub signatures: Vec<ClaimSignature>,
    pub claimed_key_id: String,
    pub pubkey: String,
    pub mint_tx: String,
}

/// Reject auth methods that cannot claim keys.
pub fn check_claimable(auth_method: &AuthMethod) -> ClientResult<()> {
    if auth_method.auth_method_type == auth_method_type::WEBAUTHN {
        return Err(ClientError::invalid_argument(
            "Unsupported auth method type: WebAuthn cannot be used to claim keys",
        ));
    }
    if auth_method.access_token.trim().is_empty() {
        return Err(ClientError::param_null("authMethod.accessToken must not be empty"));
    }
    Ok(())
}

/// Trace id reported for failed claim rounds.
pub fn claim_trace_id(request_id: &str) -> String {
    format!("lit_{request_id}")
}
