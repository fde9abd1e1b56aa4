// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Test doubles for the transport and combination seams.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::node::{NodeError, NodeTransport};
use crate::shares::{BlsShare, CryptoError, EcdsaParts, EcdsaSigType, Share, ThresholdCrypto};

#[derive(Clone)]
enum Scripted {
    Respond(Value),
    Fail,
    Hang,
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub body: Value,
    pub request_id: String,
}

/// Transport answering from a per-URL script.
///
/// Unscripted URLs fail with a request error. The script can be changed
/// while the transport is shared, through the `set_*` methods.
#[derive(Default)]
pub struct StubTransport {
    script: Mutex<HashMap<String, Scripted>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, body: Value) -> Self {
        self.set_response(url, body);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.set_failing(url);
        self
    }

    /// Never answer; relies on the caller's per-request timeout.
    pub fn hang(self, url: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Hang);
        self
    }

    pub fn set_response(&self, url: &str, body: Value) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Respond(body));
    }

    pub fn set_failing(&self, url: &str) {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), Scripted::Fail);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.ends_with(suffix))
            .collect()
    }
}

#[async_trait]
impl NodeTransport for StubTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        request_id: &str,
    ) -> Result<Value, NodeError> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            body: body.clone(),
            request_id: request_id.to_string(),
        });

        let scripted = self.script.lock().unwrap().get(url).cloned();
        match scripted {
            Some(Scripted::Respond(value)) => Ok(value),
            Some(Scripted::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(NodeError::Timeout)
            }
            Some(Scripted::Fail) | None => Err(NodeError::Request(format!("no route to {url}"))),
        }
    }
}

/// Deterministic combination stub recording the share order it was given.
///
/// The synthetic `r`/`s` depend only on the first three shares, mimicking a
/// threshold-3 scheme.
#[derive(Default)]
pub struct RecordingCrypto {
    ecdsa_calls: Mutex<Vec<Vec<u32>>>,
    bls_calls: Mutex<Vec<Vec<u32>>>,
    empty_r: bool,
}

impl RecordingCrypto {
    pub const BLS_SIGNATURE: &'static str = "a1b2c3d4e5f6";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_empty_r(mut self) -> Self {
        self.empty_r = true;
        self
    }

    pub fn ecdsa_calls(&self) -> Vec<Vec<u32>> {
        self.ecdsa_calls.lock().unwrap().clone()
    }

    pub fn bls_calls(&self) -> Vec<Vec<u32>> {
        self.bls_calls.lock().unwrap().clone()
    }
}

impl ThresholdCrypto for RecordingCrypto {
    fn combine_ecdsa_shares(
        &self,
        _sig_type: EcdsaSigType,
        shares: &[Share],
    ) -> Result<EcdsaParts, CryptoError> {
        self.ecdsa_calls
            .lock()
            .unwrap()
            .push(shares.iter().map(|s| s.share_index).collect());

        let seed: String = shares
            .iter()
            .take(3)
            .map(|s| s.signature_share.as_str())
            .collect();
        let r = alloy::hex::encode(Sha256::digest(format!("r:{seed}")));
        let s = alloy::hex::encode(Sha256::digest(format!("s:{seed}")));

        Ok(EcdsaParts {
            r: if self.empty_r { String::new() } else { r },
            s,
            recid: 0,
        })
    }

    fn combine_bls_shares(&self, shares: &[BlsShare]) -> Result<String, CryptoError> {
        self.bls_calls
            .lock()
            .unwrap()
            .push(shares.iter().map(|s| s.share_index).collect());
        Ok(Self::BLS_SIGNATURE.to_string())
    }

    fn encrypt(
        &self,
        public_key: &str,
        message: &[u8],
        identity: &[u8],
    ) -> Result<String, CryptoError> {
        Ok(format!(
            "{public_key}|{}|{}",
            alloy::hex::encode(identity),
            alloy::hex::encode(message)
        ))
    }

    fn verify_and_decrypt_with_signature_shares(
        &self,
        _public_key: &str,
        identity: &[u8],
        ciphertext: &str,
        shares: &[BlsShare],
    ) -> Result<Vec<u8>, CryptoError> {
        self.bls_calls
            .lock()
            .unwrap()
            .push(shares.iter().map(|s| s.share_index).collect());

        let mut parts = ciphertext.split('|');
        let _key = parts.next();
        let bound_identity = parts.next().unwrap_or_default();
        if bound_identity != alloy::hex::encode(identity) {
            return Err(CryptoError::Decrypt("identity mismatch".into()));
        }
        alloy::hex::decode(parts.next().unwrap_or_default())
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }

    fn combine_legacy_ecdsa(
        &self,
        r_x: &str,
        r_y: &str,
        shares: &[String],
    ) -> Result<String, CryptoError> {
        Ok(format!("{r_x}:{r_y}:{}", shares.join(",")))
    }

    fn compute_hd_pub_key(
        &self,
        root_pubkeys: &[String],
        key_id: &str,
        _sig_type: EcdsaSigType,
    ) -> Result<String, CryptoError> {
        if root_pubkeys.is_empty() {
            return Err(CryptoError::Derive("no root keys".into()));
        }
        Ok(format!("04{}", alloy::hex::encode(Sha256::digest(key_id))))
    }
}
