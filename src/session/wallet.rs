// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Local wallet signing: an [`AuthCallback`] backed by a private key, and
//! capacity credit delegation.

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::recap::RecapCapabilityObject;
use super::resources::{LitAbility, LitResource};
use super::siwe::{iso_timestamp, SiweMessage};
use super::{
    AuthCallback, AuthCallbackParams, AuthError, AuthSig, SIWE_DELEGATION_URI,
    WALLET_SIG_DERIVED_VIA,
};
use crate::error::{ClientError, ClientResult};

const DEFAULT_DOMAIN: &str = "localhost";
const DEFAULT_DELEGATION_DOMAIN: &str = "example.com";
const DEFAULT_DELEGATION_USES: &str = "1";
const DEFAULT_DELEGATION_EXPIRY_MINUTES: i64 = 7;

/// Sign a SIWE message with EIP-191 and wrap it as a wallet [`AuthSig`].
fn sign_siwe(signer: &PrivateKeySigner, siwe: &SiweMessage) -> Result<AuthSig, AuthError> {
    let message = siwe
        .prepare()
        .map_err(|e| AuthError::InvalidParams(e.to_string()))?;
    let signature = signer
        .sign_message_sync(message.as_bytes())
        .map_err(|e| AuthError::Signing(e.to_string()))?;

    Ok(AuthSig {
        sig: alloy::hex::encode_prefixed(signature.as_bytes()),
        derived_via: WALLET_SIG_DERIVED_VIA.to_string(),
        signed_message: message,
        address: signer.address().to_checksum(None),
        algo: None,
    })
}

/// Auth callback signing delegations with a local private key.
pub struct LocalWalletAuthCallback {
    signer: PrivateKeySigner,
    domain: String,
    chain_id: u64,
}

impl LocalWalletAuthCallback {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self {
            signer,
            domain: DEFAULT_DOMAIN.to_string(),
            chain_id: 1,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn address(&self) -> String {
        self.signer.address().to_checksum(None)
    }
}

#[async_trait]
impl AuthCallback for LocalWalletAuthCallback {
    async fn authenticate(&self, params: AuthCallbackParams) -> Result<AuthSig, AuthError> {
        if params.uri.is_empty() {
            return Err(AuthError::InvalidParams("missing session key uri".into()));
        }

        let mut siwe = SiweMessage::new(
            &self.domain,
            self.address(),
            params.uri,
            self.chain_id,
            params.nonce,
        );
        siwe.statement = params.statement;
        siwe.expiration_time = Some(params.expiration);
        siwe.resources = params.resources;
        if !params.session_capability_object.is_empty() {
            params
                .session_capability_object
                .add_to_siwe(&mut siwe)
                .map_err(|e| AuthError::InvalidParams(e.message))?;
        }

        debug!(chain = %params.chain, address = %siwe.address, "Signing wallet delegation");
        sign_siwe(&self.signer, &siwe)
    }
}

/// Parameters of a capacity credit delegation.
#[derive(Debug, Clone, Default)]
pub struct CapacityDelegationRequest {
    /// Capacity credit token; `None` delegates every token the signer owns
    pub capacity_token_id: Option<String>,
    pub delegatee_addresses: Vec<String>,
    /// Number of uses granted (default `"1"`)
    pub uses: Option<String>,
    pub domain: Option<String>,
    /// ISO-8601 expiration (default now + 7 minutes)
    pub expiration: Option<String>,
    pub statement: Option<String>,
}

/// Sign a delegation letting `delegatee_addresses` spend a capacity credit.
///
/// `nonce` is the latest blockhash observed by the client.
pub fn create_capacity_delegation_auth_sig(
    signer: &PrivateKeySigner,
    request: &CapacityDelegationRequest,
    nonce: &str,
) -> ClientResult<AuthSig> {
    if nonce.trim().is_empty() {
        return Err(ClientError::invalid_eth_blockhash(
            "a blockhash nonce is required for capacity delegation",
        ));
    }

    let resource = LitResource::rate_limit_increase(request.capacity_token_id.as_deref());
    let mut restriction = Map::new();
    if let Some(token_id) = &request.capacity_token_id {
        restriction.insert("nft_id".into(), json!([token_id]));
    }
    if !request.delegatee_addresses.is_empty() {
        let delegates: Vec<Value> = request
            .delegatee_addresses
            .iter()
            .map(|a| Value::String(a.trim_start_matches("0x").to_string()))
            .collect();
        restriction.insert("delegate_to".into(), Value::Array(delegates));
    }
    restriction.insert(
        "uses".into(),
        Value::String(
            request
                .uses
                .clone()
                .unwrap_or_else(|| DEFAULT_DELEGATION_USES.to_string()),
        ),
    );

    let mut recap = RecapCapabilityObject::new();
    recap.add_capability_for_resource(
        &resource,
        LitAbility::RateLimitIncreaseAuth,
        Some(restriction),
    )?;
    if !recap.verify_capabilities_for_resource(&resource, LitAbility::RateLimitIncreaseAuth) {
        return Err(ClientError::unknown(
            "failed to verify capabilities for capacity delegation",
        ));
    }

    let mut siwe = SiweMessage::new(
        request
            .domain
            .as_deref()
            .unwrap_or(DEFAULT_DELEGATION_DOMAIN),
        signer.address().to_checksum(None),
        SIWE_DELEGATION_URI,
        1,
        nonce,
    );
    siwe.statement = request.statement.clone();
    siwe.expiration_time = Some(request.expiration.clone().unwrap_or_else(|| {
        iso_timestamp(Utc::now() + Duration::minutes(DEFAULT_DELEGATION_EXPIRY_MINUTES))
    }));
    recap.add_to_siwe(&mut siwe)?;

    Ok(sign_siwe(signer, &siwe)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::siwe::verify_wallet_sig;

    fn params(recap: RecapCapabilityObject) -> AuthCallbackParams {
        AuthCallbackParams {
            chain: "ethereum".into(),
            statement: None,
            resources: vec![recap.encode_as_siwe_resource().unwrap()],
            switch_chain: false,
            expiration: iso_timestamp(Utc::now() + Duration::hours(24)),
            uri: "lit:session:abcd".into(),
            nonce: "0xblockhash".into(),
            resource_ability_requests: Vec::new(),
            session_capability_object: recap,
        }
    }

    #[tokio::test]
    async fn local_wallet_signs_verifiable_delegation() {
        let mut recap = RecapCapabilityObject::new();
        recap
            .add_capability_for_resource(&LitResource::pkp("*"), LitAbility::PkpSigning, None)
            .unwrap();
        let callback = LocalWalletAuthCallback::new(PrivateKeySigner::random());

        let auth_sig = callback.authenticate(params(recap.clone())).await.unwrap();
        assert_eq!(auth_sig.address, callback.address());
        assert_eq!(auth_sig.derived_via, WALLET_SIG_DERIVED_VIA);

        let siwe = verify_wallet_sig(&auth_sig, Utc::now()).unwrap();
        assert_eq!(siwe.uri, "lit:session:abcd");
        assert_eq!(siwe.nonce, "0xblockhash");
        assert_eq!(siwe.resources, vec![recap.encode_as_siwe_resource().unwrap()]);
        assert_eq!(siwe.statement, Some(recap.statement()));
    }

    #[tokio::test]
    async fn local_wallet_requires_uri() {
        let callback = LocalWalletAuthCallback::new(PrivateKeySigner::random());
        let mut p = params(RecapCapabilityObject::new());
        p.uri.clear();
        assert!(matches!(
            callback.authenticate(p).await,
            Err(AuthError::InvalidParams(_))
        ));
    }

    #[test]
    fn capacity_delegation_embeds_restrictions() {
        let signer = PrivateKeySigner::random();
        let request = CapacityDelegationRequest {
            capacity_token_id: Some("77".into()),
            delegatee_addresses: vec!["0xAbC0000000000000000000000000000000000001".into()],
            ..Default::default()
        };

        let auth_sig =
            create_capacity_delegation_auth_sig(&signer, &request, "0xblockhash").unwrap();
        let siwe = verify_wallet_sig(&auth_sig, Utc::now()).unwrap();
        assert_eq!(siwe.uri, SIWE_DELEGATION_URI);
        assert_eq!(siwe.domain, "example.com");
        assert_eq!(siwe.chain_id, 1);
        assert!(siwe.expiration_time.is_some());

        let recap =
            RecapCapabilityObject::decode(RecapCapabilityObject::find_in_siwe(&siwe).unwrap())
                .unwrap();
        let grants = &recap.attenuations()["lit-ratelimitincrease://77"]["Auth/Auth"];
        assert_eq!(
            grants[0],
            json!({
                "nft_id": ["77"],
                "delegate_to": ["AbC0000000000000000000000000000000000001"],
                "uses": "1",
            })
        );
    }

    #[test]
    fn capacity_delegation_without_token_is_wildcard() {
        let signer = PrivateKeySigner::random();
        let auth_sig = create_capacity_delegation_auth_sig(
            &signer,
            &CapacityDelegationRequest {
                uses: Some("10".into()),
                ..Default::default()
            },
            "0xblockhash",
        )
        .unwrap();

        let siwe: SiweMessage = auth_sig.signed_message.parse().unwrap();
        let recap =
            RecapCapabilityObject::decode(RecapCapabilityObject::find_in_siwe(&siwe).unwrap())
                .unwrap();
        assert!(recap.verify_capabilities_for_resource(
            &LitResource::rate_limit_increase(Some("5")),
            LitAbility::RateLimitIncreaseAuth
        ));
        assert_eq!(
            recap.attenuations()["lit-ratelimitincrease://*"]["Auth/Auth"][0]["uses"],
            "10"
        );
    }

    #[test]
    fn capacity_delegation_requires_nonce() {
        let err = create_capacity_delegation_auth_sig(
            &PrivateKeySigner::random(),
            &CapacityDelegationRequest::default(),
            "",
        )
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_eth_blockhash");
    }
}
