// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session signatures and capacity delegation on a connected client.

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use chrono::Utc;
use tracing::info;

use super::NodeClient;
use crate::error::{ClientError, ClientResult};
use crate::session::siwe::iso_timestamp;
use crate::session::{
    build_capability_object, create_capacity_delegation_auth_sig, resolve_wallet_sig,
    sign_session_sigs, AuthCallback, AuthCallbackParams, AuthSig, CapacityDelegationRequest,
    ResourceAbilityRequest, SessionKeyPair, SessionSigs, SESSION_SIG_TTL, WALLET_SIG_TTL,
};

#[derive(Clone, Default)]
pub struct SessionSigsParams {
    pub chain: String,
    pub resource_ability_requests: Vec<ResourceAbilityRequest>,
    /// ISO-8601 expiration of the wallet delegation; defaults to 24 hours
    pub expiration: Option<String>,
    pub switch_chain: bool,
    pub statement: Option<String>,
    /// Overrides the client's default callback for this call
    pub auth_callback: Option<Arc<dyn AuthCallback>>,
    /// Capacity delegations placed before the wallet sig in the capabilities
    pub capacity_delegation_auth_sigs: Vec<AuthSig>,
}

impl NodeClient {
    /// Sign one session sig per connected node with the local session key.
    ///
    /// The wallet sig delegating to the session key is taken from the store
    /// when still valid, else requested from the auth callback.
    pub async fn get_session_sigs(&self, params: SessionSigsParams) -> ClientResult<SessionSigs> {
        if params.resource_ability_requests.is_empty() {
            return Err(ClientError::params_missing(
                "resourceAbilityRequests must not be empty",
            ));
        }

        let state = self.network().await?;
        let session_key = SessionKeyPair::load_or_generate(self.store());
        let session_capability_object =
            build_capability_object(&params.resource_ability_requests)?;
        let recap_resource = session_capability_object.encode_as_siwe_resource()?;

        let callback_params = AuthCallbackParams {
            chain: params.chain.clone(),
            statement: params.statement.clone(),
            resources: vec![recap_resource],
            switch_chain: params.switch_chain,
            expiration: params
                .expiration
                .clone()
                .unwrap_or_else(|| iso_timestamp(Utc::now() + WALLET_SIG_TTL)),
            uri: session_key.session_key_uri(),
            nonce: state.latest_blockhash.clone(),
            resource_ability_requests: params.resource_ability_requests.clone(),
            session_capability_object,
        };

        let callback = self.auth_callback(params.auth_callback.as_ref());
        let wallet_sig = resolve_wallet_sig(self.store(), callback, callback_params).await?;

        let mut capabilities = params.capacity_delegation_auth_sigs.clone();
        capabilities.push(wallet_sig);

        let issued_at = Utc::now();
        let sigs = sign_session_sigs(
            &session_key,
            &state.connected_nodes,
            &capabilities,
            &params.resource_ability_requests,
            issued_at,
            issued_at + SESSION_SIG_TTL,
        )?;

        info!(
            nodes = sigs.len(),
            capabilities = capabilities.len(),
            "Session sigs created"
        );
        Ok(sigs)
    }

    /// Delegate capacity credits, using the latest blockhash as nonce.
    pub async fn create_capacity_delegation_auth_sig(
        &self,
        signer: &PrivateKeySigner,
        request: &CapacityDelegationRequest,
    ) -> ClientResult<AuthSig> {
        let state = self.network().await?;
        create_capacity_delegation_auth_sig(signer, request, &state.latest_blockhash)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::*;
    use crate::client::test_support::*;
    use crate::session::{
        verify_session_sig, verify_wallet_sig, AuthError, LitAbility, LitResource,
        LocalWalletAuthCallback,
    };
    use crate::testing::RecordingCrypto;

    struct CountingWallet {
        inner: LocalWalletAuthCallback,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AuthCallback for CountingWallet {
        async fn authenticate(&self, params: AuthCallbackParams) -> Result<AuthSig, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.authenticate(params).await
        }
    }

    fn requests() -> Vec<ResourceAbilityRequest> {
        vec![ResourceAbilityRequest::new(
            LitResource::lit_action("*"),
            LitAbility::LitActionExecution,
        )]
    }

    async fn client_with_wallet(nodes: &[String]) -> (NodeClient, Arc<CountingWallet>) {
        let wallet = Arc::new(CountingWallet {
            inner: LocalWalletAuthCallback::new(PrivateKeySigner::random()),
            calls: AtomicUsize::new(0),
        });
        let client = NodeClient::builder(config(nodes, 2), Arc::new(RecordingCrypto::new()))
            .transport(Arc::new(stub_with_handshakes(nodes)))
            .default_auth_callback(wallet.clone())
            .build()
            .unwrap();
        client.connect().await.unwrap();
        (client, wallet)
    }

    #[tokio::test]
    async fn session_sigs_cover_every_node_and_reuse_wallet_sig() {
        let nodes = node_urls(3);
        let (client, wallet) = client_with_wallet(&nodes).await;

        let sigs = client
            .get_session_sigs(SessionSigsParams {
                chain: "ethereum".into(),
                resource_ability_requests: requests(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(sigs.len(), 3);
        for node in &nodes {
            let sig = &sigs[node];
            assert!(verify_session_sig(sig));
            let template: Value = serde_json::from_str(&sig.signed_message).unwrap();
            assert_eq!(template["nodeAddress"], node.as_str());
            let wallet_sig: AuthSig =
                serde_json::from_value(template["capabilities"][0].clone()).unwrap();
            let siwe = verify_wallet_sig(&wallet_sig, Utc::now()).unwrap();
            assert_eq!(siwe.nonce, BLOCKHASH);
            assert_eq!(siwe.address, wallet.inner.address());
        }

        client
            .get_session_sigs(SessionSigsParams {
                chain: "ethereum".into(),
                resource_ability_requests: requests(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(wallet.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn capacity_delegation_precedes_wallet_sig() {
        let nodes = node_urls(2);
        let (client, wallet) = client_with_wallet(&nodes).await;

        let owner = PrivateKeySigner::random();
        let delegation = client
            .create_capacity_delegation_auth_sig(
                &owner,
                &CapacityDelegationRequest {
                    capacity_token_id: Some("42".into()),
                    delegatee_addresses: vec![wallet.inner.address()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let delegation_siwe = verify_wallet_sig(&delegation, Utc::now()).unwrap();
        assert_eq!(delegation_siwe.nonce, BLOCKHASH);

        let sigs = client
            .get_session_sigs(SessionSigsParams {
                chain: "ethereum".into(),
                resource_ability_requests: requests(),
                capacity_delegation_auth_sigs: vec![delegation.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        let template: Value = serde_json::from_str(&sigs[&nodes[0]].signed_message).unwrap();
        let capabilities = template["capabilities"].as_array().unwrap();
        assert_eq!(capabilities.len(), 2);
        assert_eq!(capabilities[0]["address"], delegation.address.as_str());
        assert_eq!(capabilities[1]["address"], wallet.inner.address().as_str());
    }

    #[tokio::test]
    async fn per_call_callback_overrides_default_and_empty_requests_fail() {
        let nodes = node_urls(2);
        let (client, default_wallet) = client_with_wallet(&nodes).await;

        let err = client
            .get_session_sigs(SessionSigsParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "params_missing_error");

        let per_call = Arc::new(CountingWallet {
            inner: LocalWalletAuthCallback::new(PrivateKeySigner::random()),
            calls: AtomicUsize::new(0),
        });
        client
            .get_session_sigs(SessionSigsParams {
                resource_ability_requests: requests(),
                auth_callback: Some(per_call.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(per_call.calls.load(Ordering::SeqCst), 1);
        assert_eq!(default_wallet.calls.load(Ordering::SeqCst), 0);
    }
}
