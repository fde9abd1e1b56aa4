// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Condition-gated operations: signed JWTs, encryption bound to conditions,
//! threshold decryption, and the legacy condition ECDSA signature.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{auth_for_node, jwt_params, new_request_id, per_node_bodies, NodeClient};
use crate::access_control::{build_identity_param, hash_private_data, AccessControlConditions};
use crate::error::{ClientError, ClientResult};
use crate::node::transport::{ENCRYPTION_SIGN_ENDPOINT, SIGN_ACC_ENDPOINT, SIGN_ECDSA_ENDPOINT};
use crate::node::Quorum;
use crate::session::{AuthSig, SessionSigs};
use crate::shares::{combine_jwt, decrypt_with_shares, BlsShare};

/// Condition families as passed by callers; exactly one must be set.
#[derive(Debug, Clone, Default)]
pub struct ConditionParts {
    pub access_control_conditions: Option<Vec<Value>>,
    pub evm_contract_conditions: Option<Vec<Value>>,
    pub sol_rpc_conditions: Option<Vec<Value>>,
    pub unified_access_control_conditions: Option<Vec<Value>>,
}

impl ConditionParts {
    pub fn evm(conditions: Vec<Value>) -> Self {
        Self {
            access_control_conditions: Some(conditions),
            ..Default::default()
        }
    }

    pub fn unified(conditions: Vec<Value>) -> Self {
        Self {
            unified_access_control_conditions: Some(conditions),
            ..Default::default()
        }
    }

    fn resolve(&self) -> ClientResult<AccessControlConditions> {
        AccessControlConditions::from_parts(
            self.access_control_conditions.clone(),
            self.evm_contract_conditions.clone(),
            self.sol_rpc_conditions.clone(),
            self.unified_access_control_conditions.clone(),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignedTokenParams {
    pub conditions: ConditionParts,
    pub chain: String,
    pub auth_sig: Option<AuthSig>,
    pub session_sigs: Option<SessionSigs>,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptParams {
    pub conditions: ConditionParts,
    pub data_to_encrypt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct DecryptParams {
    pub conditions: ConditionParts,
    pub ciphertext: String,
    pub data_to_encrypt_hash: String,
    pub chain: String,
    pub auth_sig: Option<AuthSig>,
    pub session_sigs: Option<SessionSigs>,
}

#[derive(Debug, Clone)]
pub struct ValidateAndSignEcdsaParams {
    /// Unified conditions are not accepted by this endpoint
    pub conditions: ConditionParts,
    pub chain: String,
    pub auth_sig: AuthSig,
}

/// Outcome of [`NodeClient::validate_and_sign_ecdsa`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionSignature {
    Signed(String),
    /// The nodes evaluated the conditions to false
    ConditionFailed,
}

#[derive(Debug, Deserialize)]
struct NodeEcdsaResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    local_x: String,
    #[serde(default)]
    local_y: String,
    #[serde(default)]
    signature_share: String,
}

const CONDITION_FAILED: &str = "failure";

fn require_auth(
    auth_sig: Option<&AuthSig>,
    session_sigs: Option<&SessionSigs>,
) -> ClientResult<()> {
    if auth_sig.is_none() && session_sigs.is_none() {
        return Err(ClientError::params_missing(
            "You must pass either authSig or sessionSigs",
        ));
    }
    Ok(())
}

impl NodeClient {
    /// Obtain a JWT signed by the network attesting the caller meets the
    /// conditions.
    pub async fn get_signed_token(&self, params: SignedTokenParams) -> ClientResult<String> {
        let conditions = params.conditions.resolve()?;
        require_auth(params.auth_sig.as_ref(), params.session_sigs.as_ref())?;

        let state = self.network().await?;
        let request_id = new_request_id();
        let (iat, exp) = jwt_params();

        let bodies = per_node_bodies(&state.connected_nodes, |node| {
            let mut body = Map::new();
            conditions.insert_into(&mut body);
            body.insert("chain".into(), json!(params.chain));
            let auth_sig =
                auth_for_node(params.auth_sig.as_ref(), params.session_sigs.as_ref(), node)?;
            body.insert("authSig".into(), json!(auth_sig));
            body.insert("iat".into(), json!(iat));
            body.insert("exp".into(), json!(exp));
            Ok(Value::Object(body))
        })?;

        let threshold = Quorum::MinNodeCount
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let shares: Vec<BlsShare> = self
            .send_round("get_signed_token", SIGN_ACC_ENDPOINT, bodies, threshold, &request_id)
            .await?;

        combine_jwt(shares, self.config().min_node_count, self.crypto(), &request_id)
    }

    /// Encrypt locally to the network key, bound to the conditions.
    pub async fn encrypt(&self, params: EncryptParams) -> ClientResult<EncryptResponse> {
        let conditions = params.conditions.resolve()?;
        if params.data_to_encrypt.is_empty() {
            return Err(ClientError::invalid_param_type(
                "dataToEncrypt must not be empty",
            ));
        }

        let state = self.network().await?;
        let data_to_encrypt_hash = hash_private_data(&params.data_to_encrypt);
        let identity = build_identity_param(&conditions.hash(), &data_to_encrypt_hash);

        let ciphertext = self.crypto().encrypt(
            &state.subnet_pub_key,
            &params.data_to_encrypt,
            identity.as_bytes(),
        )?;
        debug!(identity = %identity, "Encrypted data");

        Ok(EncryptResponse {
            ciphertext,
            data_to_encrypt_hash,
        })
    }

    /// Collect decryption shares and decrypt `ciphertext`.
    pub async fn decrypt(&self, params: DecryptParams) -> ClientResult<Vec<u8>> {
        let conditions = params.conditions.resolve()?;
        require_auth(params.auth_sig.as_ref(), params.session_sigs.as_ref())?;
        if params.ciphertext.is_empty() {
            return Err(ClientError::param_null("ciphertext must not be empty"));
        }

        let state = self.network().await?;
        let request_id = new_request_id();
        let identity = build_identity_param(&conditions.hash(), &params.data_to_encrypt_hash);

        let bodies = per_node_bodies(&state.connected_nodes, |node| {
            let mut body = Map::new();
            conditions.insert_into(&mut body);
            body.insert("dataToEncryptHash".into(), json!(params.data_to_encrypt_hash));
            body.insert("chain".into(), json!(params.chain));
            let auth_sig =
                auth_for_node(params.auth_sig.as_ref(), params.session_sigs.as_ref(), node)?;
            body.insert("authSig".into(), json!(auth_sig));
            Ok(Value::Object(body))
        })?;

        let threshold = Quorum::MinNodeCount
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let shares: Vec<BlsShare> = self
            .send_round("decrypt", ENCRYPTION_SIGN_ENDPOINT, bodies, threshold, &request_id)
            .await?;

        let plaintext = decrypt_with_shares(
            shares,
            self.config().min_node_count,
            self.crypto(),
            &state.subnet_pub_key,
            identity.as_bytes(),
            &params.ciphertext,
            &request_id,
        )?;
        info!(request_id = %request_id, bytes = plaintext.len(), "Decrypted data");
        Ok(plaintext)
    }

    /// Legacy condition signature combined from every node's share.
    pub async fn validate_and_sign_ecdsa(
        &self,
        params: ValidateAndSignEcdsaParams,
    ) -> ClientResult<ConditionSignature> {
        if params.conditions.unified_access_control_conditions.is_some() {
            return Err(ClientError::invalid_argument(
                "unified access control conditions cannot be signed with ECDSA",
            ));
        }
        let conditions = params.conditions.resolve()?;

        let state = self.network().await?;
        let request_id = new_request_id();
        let (iat, exp) = jwt_params();

        let (evm, evm_contract, sol_rpc) = match &conditions {
            AccessControlConditions::Evm(c) => (Some(c), None, None),
            AccessControlConditions::EvmContract(c) => (None, Some(c), None),
            AccessControlConditions::Solana(c) => (None, None, Some(c)),
            AccessControlConditions::Unified(_) => (None, None, None),
        };
        let body = json!({
            "access_control_conditions": evm,
            "evmContractConditions": evm_contract,
            "solRpcConditions": sol_rpc,
            "auth_sig": params.auth_sig,
            "chain": params.chain,
            "iat": iat,
            "exp": exp,
        });
        let bodies = per_node_bodies(&state.connected_nodes, |_| Ok(body.clone()))?;

        let threshold = Quorum::AllConnected
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let responses: Vec<NodeEcdsaResponse> = self
            .send_round(
                "validate_and_sign_ecdsa",
                SIGN_ECDSA_ENDPOINT,
                bodies,
                threshold,
                &request_id,
            )
            .await?;

        let Some(first) = responses.first() else {
            return Err(ClientError::no_valid_shares("no node returned a signature share")
                .with_request_id(&request_id));
        };
        if first.result == CONDITION_FAILED {
            info!(request_id = %request_id, "Conditions not met");
            return Ok(ConditionSignature::ConditionFailed);
        }

        let shares: Vec<String> = responses
            .iter()
            .map(|r| r.signature_share.clone())
            .collect();
        let signature = self
            .crypto()
            .combine_legacy_ecdsa(&first.local_x, &first.local_y, &shares)
            .map_err(|e| ClientError::from(e).with_request_id(&request_id))?;

        Ok(ConditionSignature::Signed(signature))
    }
}
