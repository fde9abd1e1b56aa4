// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Node Client
//!
//! [`NodeClient`] is the entry point for every network operation. It is
//! cheap to clone; clones share the transport, the combination primitive,
//! the local store and the agreed network state.
//!
//! ## Lifecycle
//!
//! ```text
//! NotReady --connect()--> Ready --sync_network()--> Ready (refreshed)
//! ```
//!
//! Operations called before [`NodeClient::connect`] fail with `NotReady`.
//!
//! ## Operations
//!
//! - [`execute`] - Lit Action execution, full or targeted
//! - [`pkp`] - PKP signing, session key signing, key claiming
//! - [`conditions`] - condition-gated tokens, encryption and decryption
//! - [`session`] - session sigs and capacity delegation

pub mod conditions;
pub mod execute;
pub mod pkp;
pub mod session;

pub use conditions::{
    ConditionParts, ConditionSignature, DecryptParams, EncryptParams, EncryptResponse,
    SignedTokenParams, ValidateAndSignEcdsaParams,
};
pub use execute::{ExecuteJsParams, ExecuteJsResponse};
pub use pkp::{PkpSignParams, SignSessionKeyParams, SignSessionKeyResponse};
pub use session::SessionSigsParams;

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::node::handshake::handshake;
use crate::node::{fan_out, HttpTransport, NetworkState, NetworkSync, NodeTransport, RoundResult};
use crate::retry::execute_with_retry;
use crate::session::{AuthCallback, AuthSig, SessionSigs};
use crate::shares::ThresholdCrypto;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};

/// JWT validity window sent with condition-signing requests.
const JWT_LIFETIME_SECS: i64 = 12 * 60 * 60;

/// Fresh per-operation request id.
pub(crate) fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `(iat, exp)` for condition-signing requests.
pub(crate) fn jwt_params() -> (i64, i64) {
    let iat = Utc::now().timestamp();
    (iat, iat + JWT_LIFETIME_SECS)
}

/// The auth material to send to one node.
///
/// Session sigs take priority and are looked up per node.
pub(crate) fn auth_for_node(
    auth_sig: Option<&AuthSig>,
    session_sigs: Option<&SessionSigs>,
    node: &str,
) -> ClientResult<Option<AuthSig>> {
    match session_sigs {
        Some(sigs) => sigs.get(node).cloned().map(Some).ok_or_else(|| {
            ClientError::wallet_signature_not_found(format!(
                "You passed sessionSigs but we could not find session sig for node {node}"
            ))
        }),
        None => Ok(auth_sig.cloned()),
    }
}

/// Build one request body per node.
pub(crate) fn per_node_bodies<F>(
    nodes: &[String],
    mut build: F,
) -> ClientResult<Vec<(String, Value)>>
where
    F: FnMut(&str) -> ClientResult<Value>,
{
    nodes
        .iter()
        .map(|node| Ok((node.clone(), build(node)?)))
        .collect()
}

/// Shared client for one node network.
#[derive(Clone)]
pub struct NodeClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn NodeTransport>,
    crypto: Arc<dyn ThresholdCrypto>,
    store: Arc<dyn KeyValueStore>,
    default_auth_callback: Option<Arc<dyn AuthCallback>>,
    network: Arc<RwLock<Option<Arc<NetworkState>>>>,
}

impl NodeClient {
    pub fn builder(config: ClientConfig, crypto: Arc<dyn ThresholdCrypto>) -> NodeClientBuilder {
        NodeClientBuilder::new(config, crypto)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn crypto(&self) -> &dyn ThresholdCrypto {
        self.crypto.as_ref()
    }

    pub(crate) fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Per-call callback if given, else the client default.
    pub(crate) fn auth_callback<'a>(
        &'a self,
        per_call: Option<&'a Arc<dyn AuthCallback>>,
    ) -> Option<&'a dyn AuthCallback> {
        per_call
            .or(self.default_auth_callback.as_ref())
            .map(|cb| cb.as_ref())
    }

    /// Handshake with the bootstrap nodes and become ready.
    pub async fn connect(&self) -> ClientResult<()> {
        let state = self.sync_network().await?;
        info!(
            connected = state.connected_nodes.len(),
            min_node_count = self.config.min_node_count,
            "Node client is ready"
        );
        Ok(())
    }

    /// Re-run the handshake and replace the network view.
    pub async fn sync_network(&self) -> ClientResult<Arc<NetworkState>> {
        let request_id = new_request_id();
        let state = Arc::new(handshake(&self.transport, &self.config, &request_id).await?);
        *self.network.write().await = Some(Arc::clone(&state));
        Ok(state)
    }

    pub async fn is_ready(&self) -> bool {
        self.network.read().await.is_some()
    }

    /// Current network view, or `NotReady`.
    pub async fn network(&self) -> ClientResult<Arc<NetworkState>> {
        let state = self.network.read().await.clone().ok_or_else(|| {
            ClientError::not_ready(
                "LitNodeClient is not ready. Please call await litNodeClient.connect() first.",
            )
        })?;

        if state.connected_nodes.len() < self.config.min_node_count {
            return Err(ClientError::not_ready(format!(
                "only {} of {} required nodes are connected",
                state.connected_nodes.len(),
                self.config.min_node_count
            )));
        }
        Ok(state)
    }

    /// Spawn the periodic re-handshake task.
    pub fn spawn_network_sync(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let sync = NetworkSync::new(self.clone(), self.config.network_sync_interval);
        tokio::spawn(sync.run(shutdown))
    }

    /// Send one prepared body per node, with retries, and collect the
    /// structurally valid responses in node order.
    pub(crate) async fn send_round<T: DeserializeOwned>(
        &self,
        operation: &str,
        endpoint: &str,
        bodies: Vec<(String, Value)>,
        threshold: usize,
        request_id: &str,
    ) -> ClientResult<Vec<T>> {
        let nodes: Vec<String> = bodies.iter().map(|(node, _)| node.clone()).collect();
        let nodes = &nodes;
        let bodies = &bodies;
        let transport = &self.transport;
        let timeout = self.config.request_timeout;

        let round = move || async move {
            let result = fan_out::<T, _, _>(nodes, threshold, request_id, timeout, |node| {
                let transport = Arc::clone(transport);
                let body = bodies
                    .iter()
                    .find(|(n, _)| *n == node)
                    .map(|(_, body)| body.clone())
                    .unwrap_or(Value::Null);
                async move {
                    transport
                        .post_json(&format!("{node}{endpoint}"), &body, request_id)
                        .await
                }
            })
            .await;
            Ok(result)
        };

        let result = execute_with_retry(&self.config.retry_tolerance, round, |failure, id, last| {
            warn!(
                request_id = %id,
                operation,
                responded = failure.successes,
                required = failure.threshold,
                error = %failure.error,
                is_final = last,
                "Round failed"
            );
        })
        .await?;

        match result {
            RoundResult::Success { values, .. } => Ok(values),
            RoundResult::Failure { error, request_id } => {
                Err(error.into_client_error(&request_id))
            }
        }
    }
}

/// Builder for [`NodeClient`].
pub struct NodeClientBuilder {
    config: ClientConfig,
    crypto: Arc<dyn ThresholdCrypto>,
    transport: Option<Arc<dyn NodeTransport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    default_auth_callback: Option<Arc<dyn AuthCallback>>,
}

impl NodeClientBuilder {
    pub fn new(config: ClientConfig, crypto: Arc<dyn ThresholdCrypto>) -> Self {
        Self {
            config,
            crypto,
            transport: None,
            store: None,
            default_auth_callback: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn NodeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn default_auth_callback(mut self, callback: Arc<dyn AuthCallback>) -> Self {
        self.default_auth_callback = Some(callback);
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// Without an explicit store, session material is kept in a
    /// [`FileStore`] under `storage_dir` when configured, else in memory.
    pub fn build(self) -> ClientResult<NodeClient> {
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(self.config.request_timeout).map_err(|e| {
                ClientError::new(ErrorKind::InitError, format!("failed to build transport: {e}"))
            })?),
        };

        let store: Arc<dyn KeyValueStore> = match (self.store, &self.config.storage_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::open(dir).map_err(|e| {
                ClientError::new(ErrorKind::InitError, format!("failed to open storage: {e}"))
            })?),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        Ok(NodeClient {
            config: Arc::new(self.config),
            transport,
            crypto: self.crypto,
            store,
            default_auth_callback: self.default_auth_callback,
            network: Arc::new(RwLock::new(None)),
        })
    }
}
