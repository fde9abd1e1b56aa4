// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Grouping, quorum checks and combination of validated shares.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use base64ct::{Base64Url, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::model::{unwrap_candidate, BlsShare, Share};
use super::{most_common, EcdsaSigType, ThresholdCrypto};
use crate::error::{ClientError, ClientResult};

/// Default signature name when a share does not carry one.
const DEFAULT_SIG_NAME: &str = "sig";

/// A reconstructed ECDSA signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedSignature {
    pub r: String,
    pub s: String,
    pub recid: u8,
    /// `0x`-prefixed `r || s || v` with `v = 27 + recid`
    pub signature: String,
    pub public_key: String,
    pub data_signed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub siwe_message: Option<String>,
}

/// Combine every named signature in a round.
///
/// `signed_data` holds one map per node, keyed by signature name. Shares
/// are grouped by name across nodes and each group is combined separately.
/// If any requested name has no valid share left, the whole call fails.
pub fn get_signatures(
    signed_data: &[Map<String, Value>],
    min_node_count: usize,
    crypto: &dyn ThresholdCrypto,
    request_id: &str,
) -> ClientResult<BTreeMap<String, CombinedSignature>> {
    let requested: BTreeSet<&String> = signed_data.iter().flat_map(|m| m.keys()).collect();

    let mut grouped: BTreeMap<String, Vec<Share>> = BTreeMap::new();
    for node_data in signed_data {
        for (name, raw) in node_data {
            match unwrap_candidate(raw) {
                Some(mut share) => {
                    share
                        .sig_name
                        .get_or_insert_with(|| DEFAULT_SIG_NAME.to_string());
                    grouped.entry(name.clone()).or_default().push(share);
                }
                None => {
                    warn!(request_id = %request_id, sig_name = %name, "Dropping malformed share");
                }
            }
        }
    }

    if grouped.len() != requested.len() {
        return Err(ClientError::no_valid_shares(
            "total number of valid signatures does not match requested",
        )
        .with_request_id(request_id)
        .with_details(json!({
            "requested": requested.len(),
            "valid": grouped.len(),
        })));
    }

    let widest = grouped.values().map(Vec::len).max().unwrap_or(0);
    for (name, shares) in &grouped {
        if shares.len() < widest {
            warn!(
                request_id = %request_id,
                sig_name = %name,
                shares = shares.len(),
                expected = widest,
                "Signature has fewer shares than other signatures in this round"
            );
        }
    }

    grouped
        .into_iter()
        .map(|(name, shares)| {
            let combined = combine_ecdsa(shares, min_node_count, crypto, request_id)?;
            Ok((name, combined))
        })
        .collect()
}

/// Combine one group of ECDSA shares.
pub fn combine_ecdsa(
    mut shares: Vec<Share>,
    min_node_count: usize,
    crypto: &dyn ThresholdCrypto,
    request_id: &str,
) -> ClientResult<CombinedSignature> {
    shares.sort_by_key(|s| s.share_index);

    if shares.len() < min_node_count {
        return Err(ClientError::no_valid_shares(format!(
            "not enough signature shares: {} of {} required",
            shares.len(),
            min_node_count
        ))
        .with_request_id(request_id)
        .with_details(json!({
            "attempted": shares.len(),
            "required": min_node_count,
        })));
    }

    let majority = most_common(shares.iter().map(|s| s.sig_type.as_str()))
        .unwrap_or_default()
        .to_string();
    let sig_type = EcdsaSigType::from_wire(&majority).ok_or_else(|| {
        ClientError::unknown_signature_type(format!("unknown signature type: {majority}"))
            .with_request_id(request_id)
    })?;
    if let Some(outlier) = shares.iter().find(|s| s.sig_type != majority) {
        return Err(ClientError::unknown_signature_type(format!(
            "inconsistent signature types: {} and {}",
            majority, outlier.sig_type
        ))
        .with_request_id(request_id));
    }

    debug!(
        request_id = %request_id,
        shares = shares.len(),
        sig_type = sig_type.as_wire(),
        "Combining ECDSA shares"
    );

    let parts = crypto
        .combine_ecdsa_shares(sig_type, &shares)
        .map_err(|e| ClientError::from(e).with_request_id(request_id))?;

    if parts.r.trim_start_matches("0x").is_empty() || parts.s.trim_start_matches("0x").is_empty() {
        return Err(ClientError::unknown_signature_error(
            "combination produced no usable signature",
        )
        .with_request_id(request_id));
    }

    let signature = join_signature(&parts.r, &parts.s, parts.recid)
        .map_err(|e| e.with_request_id(request_id))?;

    Ok(CombinedSignature {
        r: parts.r.trim_start_matches("0x").to_string(),
        s: parts.s.trim_start_matches("0x").to_string(),
        recid: parts.recid,
        signature,
        public_key: most_common(shares.iter().map(|s| s.public_key.clone())).unwrap_or_default(),
        data_signed: most_common(shares.iter().map(|s| s.data_signed.clone()))
            .unwrap_or_default(),
        siwe_message: most_common(shares.iter().filter_map(|s| s.siwe_message.clone())),
    })
}

/// Join `r`, `s` and a recovery id into a 65-byte `0x` hex signature.
pub fn join_signature(r: &str, s: &str, recid: u8) -> ClientResult<String> {
    let r = pad_scalar(r)?;
    let s = pad_scalar(s)?;
    let v = if recid >= 27 { recid } else { 27 + recid };
    Ok(format!("0x{r}{s}{v:02x}"))
}

fn pad_scalar(value: &str) -> ClientResult<String> {
    let hex = value.trim_start_matches("0x").to_ascii_lowercase();
    if hex.len() > 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ClientError::unknown_signature_error(format!(
            "invalid signature scalar: {value}"
        )));
    }
    Ok(format!("{hex:0>64}"))
}

/// Combine BLS shares into a signed JWT.
///
/// Returns `{unsignedJwt}.{base64url(signature)}`.
pub fn combine_jwt(
    mut shares: Vec<BlsShare>,
    min_node_count: usize,
    crypto: &dyn ThresholdCrypto,
    request_id: &str,
) -> ClientResult<String> {
    check_bls_quorum(&shares, min_node_count, request_id)?;

    let distinct: HashSet<&String> = shares
        .iter()
        .filter_map(|s| s.unsigned_jwt.as_ref())
        .collect();
    if distinct.len() > 1 {
        warn!(
            request_id = %request_id,
            variants = distinct.len(),
            "Nodes returned different unsigned JWTs, using the most common"
        );
    }
    let unsigned_jwt = most_common(shares.iter().filter_map(|s| s.unsigned_jwt.clone()))
        .ok_or_else(|| {
            ClientError::unknown_signature_error("no node returned an unsigned JWT")
                .with_request_id(request_id)
        })?;

    shares.sort_by_key(|s| s.share_index);
    let signature_hex = crypto
        .combine_bls_shares(&shares)
        .map_err(|e| ClientError::from(e).with_request_id(request_id))?;
    let signature = alloy::hex::decode(signature_hex.trim_start_matches("0x")).map_err(|e| {
        ClientError::unknown_signature_error(format!("combined signature is not hex: {e}"))
            .with_request_id(request_id)
    })?;

    Ok(format!("{unsigned_jwt}.{}", Base64Url::encode_string(&signature)))
}

/// Verify decryption shares and decrypt `ciphertext`.
pub fn decrypt_with_shares(
    mut shares: Vec<BlsShare>,
    min_node_count: usize,
    crypto: &dyn ThresholdCrypto,
    network_pub_key: &str,
    identity: &[u8],
    ciphertext: &str,
    request_id: &str,
) -> ClientResult<Vec<u8>> {
    check_bls_quorum(&shares, min_node_count, request_id)?;
    shares.sort_by_key(|s| s.share_index);

    crypto
        .verify_and_decrypt_with_signature_shares(network_pub_key, identity, ciphertext, &shares)
        .map_err(|e| ClientError::from(e).with_request_id(request_id))
}

fn check_bls_quorum(
    shares: &[BlsShare],
    min_node_count: usize,
    request_id: &str,
) -> ClientResult<()> {
    if shares.len() < min_node_count {
        return Err(ClientError::no_valid_shares(format!(
            "not enough signature shares: {} of {} required",
            shares.len(),
            min_node_count
        ))
        .with_request_id(request_id)
        .with_details(json!({
            "attempted": shares.len(),
            "required": min_node_count,
        })));
    }
    Ok(())
}
