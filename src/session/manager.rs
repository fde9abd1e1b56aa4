// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Wallet Sig Lifecycle and Session Signing
//!
//! A wallet sig is read from storage, or obtained from the auth callback on a
//! miss. It is then checked against the current session key and requested
//! capabilities; a stale sig is replaced by a fresh callback invocation.
//!
//! ## Resign Order
//!
//! Checks short-circuit in this order:
//!
//! 1. signature does not verify against its own signed message
//! 2. message URI differs from the session key URI
//! 3. message carries no recap resource
//! 4. decoded recap does not grant every requested `(resource, ability)`
//!
//! Per-node session sigs are then produced locally by signing one template
//! per node with the session key.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::keypair::SessionKeyPair;
use super::recap::RecapCapabilityObject;
use super::resources::ResourceAbilityRequest;
use super::siwe::{iso_timestamp, verify_wallet_sig, SiweMessage};
use super::{AuthCallback, AuthCallbackParams, AuthSig, SessionSigs, SESSION_SIG_DERIVED_VIA};
use crate::error::{ClientError, ClientResult};
use crate::storage::{get_json, set_json, KeyValueStore, WALLET_SIG_STORAGE_KEY};

/// Lifetime of per-node session sigs.
pub const SESSION_SIG_TTL: chrono::Duration = chrono::Duration::minutes(5);

/// Default lifetime of a wallet sig delegation.
pub const WALLET_SIG_TTL: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResignReason {
    InvalidSignature,
    UriMismatch,
    MissingResources,
    InsufficientCapabilities,
}

impl ResignReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::UriMismatch => "uri_mismatch",
            Self::MissingResources => "missing_resources",
            Self::InsufficientCapabilities => "insufficient_capabilities",
        }
    }
}

/// Resign decision table.
pub fn needs_resign(
    valid_sig: bool,
    matching_uri: bool,
    has_resources: bool,
    capabilities_cover: bool,
) -> Option<ResignReason> {
    if !valid_sig {
        Some(ResignReason::InvalidSignature)
    } else if !matching_uri {
        Some(ResignReason::UriMismatch)
    } else if !has_resources {
        Some(ResignReason::MissingResources)
    } else if !capabilities_cover {
        Some(ResignReason::InsufficientCapabilities)
    } else {
        None
    }
}

/// Decide whether `auth_sig` must be replaced before use.
pub fn check_need_to_resign(
    auth_sig: &AuthSig,
    session_key_uri: &str,
    requests: &[ResourceAbilityRequest],
    now: DateTime<Utc>,
) -> Option<ResignReason> {
    let siwe = match verify_wallet_sig(auth_sig, now) {
        Ok(siwe) => siwe,
        Err(e) => {
            debug!(error = %e, "Wallet sig failed verification");
            return needs_resign(false, false, false, false);
        }
    };

    let recap = RecapCapabilityObject::find_in_siwe(&siwe);
    let capabilities_cover = recap
        .and_then(|urn| RecapCapabilityObject::decode(urn).ok())
        .is_some_and(|recap| covers(&recap, requests));

    needs_resign(
        true,
        siwe.uri == session_key_uri,
        recap.is_some(),
        capabilities_cover,
    )
}

fn covers(recap: &RecapCapabilityObject, requests: &[ResourceAbilityRequest]) -> bool {
    requests
        .iter()
        .all(|r| recap.verify_capabilities_for_resource(&r.resource, r.ability))
}

/// Build the capability object for a request list, verifying every grant.
pub fn build_capability_object(
    requests: &[ResourceAbilityRequest],
) -> ClientResult<RecapCapabilityObject> {
    let mut recap = RecapCapabilityObject::new();
    for request in requests {
        recap.add_capability_for_resource(&request.resource, request.ability, None)?;
        if !recap.verify_capabilities_for_resource(&request.resource, request.ability) {
            return Err(ClientError::unknown(format!(
                "failed to verify capability {} for {}",
                request.ability, request.resource
            )));
        }
    }
    Ok(recap)
}

/// Obtain a usable wallet sig: cached, fresh, or re-signed.
pub async fn resolve_wallet_sig(
    store: &dyn KeyValueStore,
    callback: Option<&dyn AuthCallback>,
    params: AuthCallbackParams,
) -> ClientResult<AuthSig> {
    let cached = match get_json::<AuthSig>(store, WALLET_SIG_STORAGE_KEY) {
        Ok(cached) => cached,
        Err(e) => {
            warn!(error = %e, "Failed to read cached wallet sig, treating as absent");
            None
        }
    };

    let wallet_sig = match cached {
        Some(sig) => {
            debug!(address = %sig.address, "Using cached wallet sig");
            sig
        }
        None => authenticate_and_store(store, callback, params.clone()).await?,
    };

    match check_need_to_resign(
        &wallet_sig,
        &params.uri,
        &params.resource_ability_requests,
        Utc::now(),
    ) {
        None => Ok(wallet_sig),
        Some(reason) => {
            info!(reason = reason.as_str(), "Wallet sig must be re-signed");
            authenticate_and_store(store, callback, params).await
        }
    }
}

async fn authenticate_and_store(
    store: &dyn KeyValueStore,
    callback: Option<&dyn AuthCallback>,
    params: AuthCallbackParams,
) -> ClientResult<AuthSig> {
    let callback = callback.ok_or_else(|| {
        ClientError::params_missing("No auth callback provided and no default auth callback set")
    })?;

    let wallet_sig = callback.authenticate(params).await?;
    if let Some(field) = wallet_sig.missing_field() {
        return Err(ClientError::wallet_signature_not_found(format!(
            "auth callback returned a wallet sig without {field}"
        )));
    }

    if let Err(e) = set_json(store, WALLET_SIG_STORAGE_KEY, &wallet_sig) {
        warn!(error = %e, "Failed to persist wallet sig");
        if let Err(e) = store.remove(WALLET_SIG_STORAGE_KEY) {
            warn!(error = %e, "Failed to remove stale wallet sig");
        }
    }

    Ok(wallet_sig)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSigningTemplate<'a> {
    session_key: &'a str,
    resource_ability_requests: &'a [ResourceAbilityRequest],
    capabilities: &'a [AuthSig],
    issued_at: &'a str,
    expiration: &'a str,
    node_address: &'a str,
}

/// Sign one session template per node with the session key.
///
/// `capabilities` are the capacity delegations followed by the wallet sig.
pub fn sign_session_sigs(
    session_key: &SessionKeyPair,
    node_urls: &[String],
    capabilities: &[AuthSig],
    requests: &[ResourceAbilityRequest],
    issued_at: DateTime<Utc>,
    expiration: DateTime<Utc>,
) -> ClientResult<SessionSigs> {
    if capabilities.is_empty() {
        return Err(ClientError::wallet_signature_not_found(
            "session sigs need at least one capability",
        ));
    }
    if let Some(field) = capabilities.iter().find_map(AuthSig::missing_field) {
        return Err(ClientError::wallet_signature_not_found(format!(
            "capability auth sig is missing {field}"
        )));
    }

    let public_key = session_key.public_key_hex();
    let issued_at = iso_timestamp(issued_at);
    let expiration = iso_timestamp(expiration);

    let mut sigs = SessionSigs::new();
    for node in node_urls {
        let template = SessionSigningTemplate {
            session_key: &public_key,
            resource_ability_requests: requests,
            capabilities,
            issued_at: &issued_at,
            expiration: &expiration,
            node_address: node,
        };
        let signed_message = serde_json::to_string(&template)
            .map_err(|e| {
                ClientError::unknown(format!("failed to serialize session template: {e}"))
            })?;

        sigs.insert(
            node.clone(),
            AuthSig {
                sig: session_key.sign(signed_message.as_bytes()),
                derived_via: SESSION_SIG_DERIVED_VIA.to_string(),
                signed_message,
                address: public_key.clone(),
                algo: Some("ed25519".to_string()),
            },
        );
    }

    debug!(nodes = sigs.len(), "Signed session sigs");
    Ok(sigs)
}

/// The SIWE inside a wallet sig, if it parses.
pub fn wallet_sig_message(auth_sig: &AuthSig) -> Option<SiweMessage> {
    auth_sig.signed_message.parse().ok()
}
