// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-node claim signatures.
//!
//! Claims are not threshold-combined: every node signs the derived key id
//! on its own, and the signatures are split into `{r, s, v}` tuples for the
//! on-chain mint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::clean;
use crate::error::{ClientError, ClientResult};

/// A split 65-byte ECDSA signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSignature {
    pub r: String,
    pub s: String,
    pub v: u8,
}

/// All node signatures for one claim key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    pub signatures: Vec<ClaimSignature>,
    pub derived_key_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeClaim {
    signature: String,
    derived_key_id: String,
}

/// Split a hex signature (with or without `0x`) into `{r, s, v}`.
///
/// `v` is normalized to 27/28.
pub fn split_signature(signature: &str) -> ClientResult<ClaimSignature> {
    let cleaned = clean(signature);
    let bytes = alloy::hex::decode(cleaned.trim_start_matches("0x")).map_err(|e| {
        ClientError::invalid_param_type(format!("claim signature is not hex: {e}"))
    })?;
    if bytes.len() != 65 {
        return Err(ClientError::invalid_param_type(format!(
            "claim signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }

    let v = match bytes[64] {
        v @ (27 | 28) => v,
        v @ (0 | 1) => v + 27,
        other => {
            return Err(ClientError::invalid_param_type(format!(
                "invalid signature recovery byte {other}"
            )))
        }
    };

    Ok(ClaimSignature {
        r: alloy::hex::encode_prefixed(&bytes[..32]),
        s: alloy::hex::encode_prefixed(&bytes[32..64]),
        v,
    })
}

/// Aggregate per-node claim data, keyed by claim name.
///
/// Claim names are taken from the first node; the derived key id is the
/// first node's.
pub fn get_claims(claims: &[Map<String, Value>]) -> ClientResult<BTreeMap<String, ClaimResult>> {
    let Some(first) = claims.first() else {
        return Ok(BTreeMap::new());
    };

    let mut results = BTreeMap::new();
    for key in first.keys() {
        let node_claims: Vec<NodeClaim> = claims
            .iter()
            .filter_map(|c| c.get(key))
            .map(|raw| {
                serde_json::from_value(raw.clone()).map_err(|e| {
                    ClientError::invalid_param_type(format!("malformed claim {key}: {e}"))
                })
            })
            .collect::<ClientResult<_>>()?;

        let signatures = node_claims
            .iter()
            .map(|c| split_signature(&c.signature))
            .collect::<ClientResult<Vec<_>>>()?;
        let derived_key_id = node_claims
            .first()
            .map(|c| clean(&c.derived_key_id))
            .unwrap_or_default();

        results.insert(
            key.clone(),
            ClaimResult {
                signatures,
                derived_key_id,
            },
        );
    }

    Ok(results)
}
