// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PKP operations: signing with a network-held key, signing a session key
//! with it, and claiming a new key id.

use alloy::primitives::Address;
use chrono::Utc;
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use super::{auth_for_node, new_request_id, per_node_bodies, NodeClient};
use crate::claim::{
    check_claimable, claim_trace_id, AuthMethod, ClaimKeyResponse, MintCallback, MintRequest,
};
use crate::error::{ClientError, ClientResult};
use crate::node::transport::{PKP_CLAIM_ENDPOINT, PKP_SIGN_ENDPOINT, SIGN_SESSION_KEY_ENDPOINT};
use crate::node::Quorum;
use crate::session::siwe::iso_timestamp;
use crate::session::{
    build_capability_object, AuthSig, ResourceAbilityRequest, SessionKeyPair, SessionSigs,
    SiweMessage, PKP_SIG_DERIVED_VIA, WALLET_SIG_TTL,
};
use crate::shares::model::clean;
use crate::shares::{
    get_signatures, most_common, split_signature, CombinedSignature, EcdsaSigType,
};

const SESSION_KEY_SIWE_DOMAIN: &str = "litprotocol.com";
const SESSION_KEY_SIWE_STATEMENT: &str = "Lit Protocol PKP session signature";
/// Used when the PKP public key does not parse.
const PLACEHOLDER_PKP_ADDRESS: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
const SESSION_SIG_NAME: &str = "sessionSig";

#[derive(Debug, Clone, Default)]
pub struct PkpSignParams {
    pub to_sign: Vec<u8>,
    pub pub_key: String,
    pub auth_sig: Option<AuthSig>,
    pub session_sigs: Option<SessionSigs>,
    pub auth_methods: Vec<AuthMethod>,
}

#[derive(Debug, Clone, Default)]
pub struct SignSessionKeyParams {
    /// Session key to certify; the stored key is used when absent
    pub session_key: Option<SessionKeyPair>,
    pub auth_methods: Vec<AuthMethod>,
    pub auth_sig: Option<AuthSig>,
    pub pkp_public_key: String,
    /// ISO-8601; defaults to 24 hours from now
    pub expiration: Option<String>,
    pub resources: Vec<String>,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
    pub chain_id: Option<u64>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignSessionKeyResponse {
    pub auth_sig: AuthSig,
    pub pkp_public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeSessionKeyResponse {
    signed_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeClaimResponse {
    signature: String,
    derived_key_id: String,
}

/// Ethereum address of an uncompressed or compressed secp256k1 public key.
pub fn compute_address(public_key: &str) -> ClientResult<Address> {
    let bytes = alloy::hex::decode(public_key.trim_start_matches("0x"))
        .map_err(|e| ClientError::invalid_param_type(format!("public key is not hex: {e}")))?;
    let key = VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| ClientError::invalid_param_type(format!("invalid public key: {e}")))?;
    Ok(Address::from_public_key(&key))
}

fn has_auth(
    auth_sig: Option<&AuthSig>,
    session_sigs: Option<&SessionSigs>,
    auth_methods: &[AuthMethod],
) -> bool {
    auth_sig.is_some() || session_sigs.is_some() || !auth_methods.is_empty()
}

impl NodeClient {
    /// Threshold-sign `to_sign` with the PKP `pub_key`.
    pub async fn pkp_sign(&self, params: PkpSignParams) -> ClientResult<CombinedSignature> {
        if params.to_sign.is_empty() {
            return Err(ClientError::param_null("toSign must not be empty"));
        }
        if params.pub_key.trim().is_empty() {
            return Err(ClientError::param_null("pubKey must not be empty"));
        }
        if !has_auth(
            params.auth_sig.as_ref(),
            params.session_sigs.as_ref(),
            &params.auth_methods,
        ) {
            return Err(ClientError::params_missing(
                "Either authSig, sessionSigs or authMethods must be present",
            ));
        }

        let state = self.network().await?;
        let request_id = new_request_id();

        let bodies = per_node_bodies(&state.connected_nodes, |node| {
            let auth_sig =
                auth_for_node(params.auth_sig.as_ref(), params.session_sigs.as_ref(), node)?;
            Ok(json!({
                "toSign": params.to_sign,
                "pubkey": params.pub_key,
                "authSig": auth_sig,
                "authMethods": params.auth_methods,
            }))
        })?;
        let threshold = Quorum::AllConnected
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let responses: Vec<Value> = self
            .send_round("pkp_sign", PKP_SIGN_ENDPOINT, bodies, threshold, &request_id)
            .await?;

        let signed: Vec<Map<String, Value>> = responses
            .into_iter()
            .map(|response| {
                let mut wrapped = Map::new();
                wrapped.insert("signature".into(), response);
                wrapped
            })
            .collect();

        let mut signatures =
            get_signatures(&signed, self.config().min_node_count, self.crypto(), &request_id)?;
        signatures.remove("signature").ok_or_else(|| {
            ClientError::no_valid_shares("no signature was combined").with_request_id(&request_id)
        })
    }

    /// Have the network sign a session key with a PKP, producing an auth sig
    /// that names the PKP as signer.
    pub async fn sign_session_key(
        &self,
        params: SignSessionKeyParams,
    ) -> ClientResult<SignSessionKeyResponse> {
        if params.auth_sig.is_none() && params.auth_methods.is_empty() {
            return Err(ClientError::params_missing(
                "Either authSig or authMethods must be present",
            ));
        }
        if params.pkp_public_key.trim().is_empty() {
            return Err(ClientError::param_null("pkpPublicKey must not be empty"));
        }

        let state = self.network().await?;
        let request_id = new_request_id();

        let session_key = match params.session_key.clone() {
            Some(key) => key,
            None => SessionKeyPair::load_or_generate(self.store()),
        };
        let session_key_uri = session_key.session_key_uri();

        let pkp_address = match compute_address(&params.pkp_public_key) {
            Ok(address) => address.to_checksum(None),
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    error = %e,
                    "Could not derive PKP address, using placeholder"
                );
                PLACEHOLDER_PKP_ADDRESS.to_string()
            }
        };

        let mut siwe = SiweMessage::new(
            params.domain.as_deref().unwrap_or(SESSION_KEY_SIWE_DOMAIN),
            pkp_address,
            session_key_uri.clone(),
            params.chain_id.unwrap_or(1),
            state.latest_blockhash.clone(),
        );
        siwe.statement = Some(SESSION_KEY_SIWE_STATEMENT.to_string());
        siwe.expiration_time = Some(
            params
                .expiration
                .clone()
                .unwrap_or_else(|| iso_timestamp(Utc::now() + WALLET_SIG_TTL)),
        );
        siwe.resources = params.resources.clone();
        if !params.resource_ability_requests.is_empty() {
            build_capability_object(&params.resource_ability_requests)?.add_to_siwe(&mut siwe)?;
        }
        let siwe_message = siwe
            .prepare()
            .map_err(|e| {
                ClientError::invalid_argument(e.to_string()).with_request_id(&request_id)
            })?;

        let body = json!({
            "sessionKey": session_key_uri,
            "authMethods": params.auth_methods,
            "pkpPublicKey": params.pkp_public_key,
            "authSig": params.auth_sig,
            "siweMessage": siwe_message,
        });
        let bodies = per_node_bodies(&state.connected_nodes, |_| Ok(body.clone()))?;
        let threshold = Quorum::AllConnected
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let responses: Vec<NodeSessionKeyResponse> = self
            .send_round(
                "sign_session_key",
                SIGN_SESSION_KEY_ENDPOINT,
                bodies,
                threshold,
                &request_id,
            )
            .await?;

        let signed: Vec<Map<String, Value>> =
            responses.into_iter().map(|r| r.signed_data).collect();
        let mut signatures =
            get_signatures(&signed, self.config().min_node_count, self.crypto(), &request_id)?;
        let session_sig = signatures.remove(SESSION_SIG_NAME).ok_or_else(|| {
            ClientError::no_valid_shares("no session signature was combined")
                .with_request_id(&request_id)
        })?;

        let address = compute_address(&session_sig.public_key)
            .map_err(|e| e.with_request_id(&request_id))?;
        info!(
            request_id = %request_id,
            address = %address,
            "Session key signed by PKP"
        );

        Ok(SignSessionKeyResponse {
            auth_sig: AuthSig {
                sig: session_sig.signature,
                derived_via: PKP_SIG_DERIVED_VIA.to_string(),
                signed_message: session_sig.siwe_message.unwrap_or(siwe_message),
                address: address.to_checksum(None),
                algo: None,
            },
            pkp_public_key: session_sig.public_key,
        })
    }

    /// Claim the key id bound to `auth_method` and hand it to `mint`.
    pub async fn claim_key_id(
        &self,
        auth_method: AuthMethod,
        mint: &dyn MintCallback,
    ) -> ClientResult<ClaimKeyResponse> {
        check_claimable(&auth_method)?;

        let state = self.network().await?;
        let request_id = new_request_id();

        let body = json!({ "authMethod": auth_method });
        let bodies = per_node_bodies(&state.connected_nodes, |_| Ok(body.clone()))?;
        let threshold = Quorum::AllConnected
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let responses: Vec<NodeClaimResponse> = self
            .send_round("claim_key_id", PKP_CLAIM_ENDPOINT, bodies, threshold, &request_id)
            .await
            .map_err(|mut e| {
                e.message = format!(
                    "Claim request has failed. Request trace id: {} ({})",
                    claim_trace_id(&request_id),
                    e.message
                );
                e
            })?;

        let signatures = responses
            .iter()
            .map(|r| split_signature(&r.signature))
            .collect::<ClientResult<Vec<_>>>()
            .map_err(|e| e.with_request_id(&request_id))?;
        let derived_key_id = most_common(responses.iter().map(|r| clean(&r.derived_key_id)))
            .unwrap_or_default();

        let pubkey = self
            .crypto()
            .compute_hd_pub_key(&state.hd_root_pubkeys, &derived_key_id, EcdsaSigType::K256)
            .map_err(|e| ClientError::from(e).with_request_id(&request_id))?;

        let mint_tx = mint
            .mint(MintRequest {
                derived_key_id: derived_key_id.clone(),
                auth_method_type: auth_method.auth_method_type,
                signatures: signatures.clone(),
                pubkey: pubkey.clone(),
            })
            .await
            .map_err(|e| ClientError::unknown(e.to_string()).with_request_id(&request_id))?;

        info!(
            request_id = %request_id,
            derived_key_id = %derived_key_id,
            mint_tx = %mint_tx,
            "Key id claimed"
        );

        Ok(ClaimKeyResponse {
            signatures,
            claimed_key_id: derived_key_id,
            pubkey,
            mint_tx,
        })
    }
}
