// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Access-control conditions and the identity parameter binding a
//! ciphertext to them.
//!
//! The identity parameter is
//! `lit-accesscontrolcondition://{sha256(conditions)}/{sha256(data)}` and must
//! be derived identically on encrypt and decrypt.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};
use crate::session::LitResource;

/// One family of access-control conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessControlConditions {
    Evm(Vec<Value>),
    EvmContract(Vec<Value>),
    Solana(Vec<Value>),
    Unified(Vec<Value>),
}

impl AccessControlConditions {
    /// Pick the single supplied family.
    ///
    /// Zero or several families is an invalid argument, as is an empty list.
    pub fn from_parts(
        evm: Option<Vec<Value>>,
        evm_contract: Option<Vec<Value>>,
        solana: Option<Vec<Value>>,
        unified: Option<Vec<Value>>,
    ) -> ClientResult<Self> {
        let mut supplied: Vec<Self> = [
            evm.map(Self::Evm),
            evm_contract.map(Self::EvmContract),
            solana.map(Self::Solana),
            unified.map(Self::Unified),
        ]
        .into_iter()
        .flatten()
        .collect();

        match supplied.len() {
            0 => Err(ClientError::invalid_argument(
                concat!(
                    "You must provide either accessControlConditions or evmContractConditions ",
                    "or solRpcConditions or unifiedAccessControlConditions",
                ),
            )),
            1 => {
                let conditions = supplied.remove(0);
                if conditions.conditions().is_empty() {
                    return Err(ClientError::invalid_argument(
                        "access control conditions must not be empty",
                    ));
                }
                Ok(conditions)
            }
            n => Err(ClientError::invalid_argument(format!(
                "exactly one kind of access control conditions is allowed, got {n}"
            ))),
        }
    }

    /// Request-body key the nodes expect for this family.
    pub fn body_key(&self) -> &'static str {
        match self {
            Self::Evm(_) => "accessControlConditions",
            Self::EvmContract(_) => "evmContractConditions",
            Self::Solana(_) => "solRpcConditions",
            Self::Unified(_) => "unifiedAccessControlConditions",
        }
    }

    pub fn conditions(&self) -> &[Value] {
        match self {
            Self::Evm(c) | Self::EvmContract(c) | Self::Solana(c) | Self::Unified(c) => c,
        }
    }

    /// Hex SHA-256 of the conditions' JSON encoding.
    pub fn hash(&self) -> String {
        hash_conditions(self.conditions())
    }

    /// Insert the conditions under their body key.
    pub fn insert_into(&self, body: &mut Map<String, Value>) {
        body.insert(
            self.body_key().to_string(),
            Value::Array(self.conditions().to_vec()),
        );
    }
}

/// Hex SHA-256 of a condition list's JSON encoding.
pub fn hash_conditions(conditions: &[Value]) -> String {
    let encoded = Value::Array(conditions.to_vec()).to_string();
    alloy::hex::encode(Sha256::digest(encoded.as_bytes()))
}

/// Hex SHA-256 of the plaintext.
pub fn hash_private_data(data: &[u8]) -> String {
    alloy::hex::encode(Sha256::digest(data))
}

/// `lit-accesscontrolcondition://{conditions_hash}/{data_hash}`
pub fn build_identity_param(conditions_hash: &str, data_hash: &str) -> String {
    LitResource::access_control_condition(format!("{conditions_hash}/{data_hash}")).resource_key()
}
