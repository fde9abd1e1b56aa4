// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ephemeral Ed25519 session key.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthSig, SESSION_SIG_DERIVED_VIA};
use crate::storage::{get_json, set_json, KeyValueStore, SESSION_KEY_STORAGE_KEY};

/// Persisted form: hex public key and hex 64-byte keypair.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSessionKey {
    public_key: String,
    secret_key: String,
}

#[derive(Debug, Clone)]
pub struct SessionKeyPair {
    signing_key: SigningKey,
}

impl SessionKeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild from a hex secret (32-byte seed or 64-byte keypair).
    ///
    /// A 64-byte keypair must carry a public half matching the seed.
    pub fn from_secret_hex(secret: &str) -> Option<Self> {
        let bytes = alloy::hex::decode(secret.trim_start_matches("0x")).ok()?;
        let signing_key = match bytes.len() {
            32 => SigningKey::from_bytes(bytes.as_slice().try_into().ok()?),
            64 => SigningKey::from_keypair_bytes(bytes.as_slice().try_into().ok()?).ok()?,
            _ => return None,
        };
        Some(Self { signing_key })
    }

    pub fn public_key_hex(&self) -> String {
        alloy::hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn secret_key_hex(&self) -> String {
        alloy::hex::encode(self.signing_key.to_keypair_bytes())
    }

    /// `lit:session:{public key}`
    pub fn session_key_uri(&self) -> String {
        format!("lit:session:{}", self.public_key_hex())
    }

    /// Hex Ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> String {
        alloy::hex::encode(self.signing_key.sign(message).to_bytes())
    }

    /// Load the persisted key, or generate and persist a new one.
    ///
    /// Storage failures and corrupt entries fall back to a fresh key; the
    /// new key is stored best-effort.
    pub fn load_or_generate(store: &dyn KeyValueStore) -> Self {
        match get_json::<StoredSessionKey>(store, SESSION_KEY_STORAGE_KEY) {
            Ok(Some(stored)) => match Self::from_secret_hex(&stored.secret_key) {
                Some(key) if key.public_key_hex() == stored.public_key.to_lowercase() => {
                    debug!("Reusing stored session key");
                    return key;
                }
                _ => warn!("Stored session key is corrupt, generating a new one"),
            },
            Ok(None) => debug!("No stored session key, generating one"),
            Err(e) => warn!(error = %e, "Failed to read session key, generating a new one"),
        }

        let key = Self::generate();
        let stored = StoredSessionKey {
            public_key: key.public_key_hex(),
            secret_key: key.secret_key_hex(),
        };
        if let Err(e) = set_json(store, SESSION_KEY_STORAGE_KEY, &stored) {
            warn!(error = %e, "Failed to persist session key");
        }
        key
    }
}

/// Verify a per-node session sig against the session key in its `address`.
pub fn verify_session_sig(auth_sig: &AuthSig) -> bool {
    if auth_sig.derived_via != SESSION_SIG_DERIVED_VIA {
        return false;
    }

    let Some(public) = alloy::hex::decode(&auth_sig.address)
        .ok()
        .and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok())
        .and_then(|b| VerifyingKey::from_bytes(&b).ok())
    else {
        return false;
    };
    let Some(signature) = alloy::hex::decode(&auth_sig.sig)
        .ok()
        .and_then(|b| <[u8; 64]>::try_from(b.as_slice()).ok())
        .map(|b| Signature::from_bytes(&b))
    else {
        return false;
    };

    public
        .verify(auth_sig.signed_message.as_bytes(), &signature)
        .is_ok()
}
