// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Node handshake and network key agreement.
//!
//! Every bootstrap node is contacted concurrently. The nodes that answer
//! become the connected set, and each network-wide value (subnet key,
//! network key, root keys, latest blockhash) is taken as the most common
//! value across the responses.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::transport::HANDSHAKE_ENDPOINT;
use super::{fan_out, NodeTransport, RoundResult};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::retry::execute_with_retry;
use crate::shares::most_common;

/// Value nodes report for a key they failed to compute.
const ERR_SENTINEL: &str = "ERR";

/// Raw handshake response of one node.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResponse {
    pub server_public_key: String,
    pub subnet_public_key: String,
    pub network_public_key: String,
    pub network_public_key_set: String,
    #[serde(default)]
    pub hd_root_pubkeys: Vec<String>,
    #[serde(default)]
    pub latest_blockhash: Option<String>,
    #[serde(default)]
    pub attestation: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct NodeHandshake {
    node: String,
    keys: HandshakeResponse,
}

/// Network view agreed during a handshake.
#[derive(Debug, Clone)]
pub struct NetworkState {
    /// Nodes that answered, in bootstrap order
    pub connected_nodes: Vec<String>,
    pub subnet_pub_key: String,
    pub network_pub_key: String,
    pub network_pub_key_set: String,
    pub hd_root_pubkeys: Vec<String>,
    pub latest_blockhash: String,
    pub synced_at: DateTime<Utc>,
}

/// Handshake with every bootstrap node.
///
/// Fails with `NotReady` when fewer than `min_node_count` nodes answer
/// within `connect_timeout`, and with `InvalidEthBlockhash` when no node
/// reports a blockhash.
pub async fn handshake(
    transport: &Arc<dyn NodeTransport>,
    config: &ClientConfig,
    request_id: &str,
) -> ClientResult<NetworkState> {
    let challenge = alloy::hex::encode(rand::random::<[u8; 32]>());
    let body = json!({
        "clientPublicKey": "test",
        "challenge": challenge,
    });

    let round = || {
        let body = body.clone();
        async move {
            let result = fan_out::<NodeHandshake, _, _>(
                &config.bootstrap_urls,
                config.min_node_count,
                request_id,
                config.request_timeout,
                |node| {
                    let transport = Arc::clone(transport);
                    let body = body.clone();
                    async move {
                        let keys = transport
                            .post_json(&format!("{node}{HANDSHAKE_ENDPOINT}"), &body, request_id)
                            .await?;
                        Ok(json!({ "node": node, "keys": keys }))
                    }
                },
            )
            .await;
            Ok(result)
        }
    };

    let retried = execute_with_retry(&config.retry_tolerance, round, |failure, id, last| {
        warn!(
            request_id = %id,
            responded = failure.successes,
            required = failure.threshold,
            is_final = last,
            "Handshake round failed"
        );
    });

    let result = tokio::time::timeout(config.connect_timeout, retried)
        .await
        .map_err(|_| {
            ClientError::not_ready(format!(
                "handshake did not complete within {} ms",
                config.connect_timeout.as_millis()
            ))
            .with_request_id(request_id)
        })??;

    let responses = match result {
        RoundResult::Success { values, .. } => values,
        RoundResult::Failure { error, .. } => {
            let mut err = error.into_client_error(request_id);
            err.kind = ErrorKind::NotReady;
            return Err(err);
        }
    };

    agree_on_network_state(&config.bootstrap_urls, responses, request_id)
}

fn agree_on_network_state(
    bootstrap_urls: &[String],
    responses: Vec<NodeHandshake>,
    request_id: &str,
) -> ClientResult<NetworkState> {
    for response in &responses {
        let keys = &response.keys;
        for (name, value) in [
            ("serverPublicKey", &keys.server_public_key),
            ("subnetPublicKey", &keys.subnet_public_key),
            ("networkPublicKey", &keys.network_public_key),
            ("networkPublicKeySet", &keys.network_public_key_set),
        ] {
            if value == ERR_SENTINEL {
                warn!(
                    request_id = %request_id,
                    node = %response.node,
                    key = name,
                    "Node returned ERR for network key"
                );
            }
        }
    }

    let connected_nodes: Vec<String> = bootstrap_urls
        .iter()
        .filter(|url| responses.iter().any(|r| &r.node == *url))
        .cloned()
        .collect();

    let latest_blockhash = most_common(
        responses
            .iter()
            .filter_map(|r| r.keys.latest_blockhash.clone())
            .filter(|h| !h.is_empty()),
    )
    .ok_or_else(|| {
        ClientError::invalid_eth_blockhash("no node reported a latest blockhash")
            .with_request_id(request_id)
    })?;

    let state = NetworkState {
        subnet_pub_key: pick(&responses, |k| &k.subnet_public_key),
        network_pub_key: pick(&responses, |k| &k.network_public_key),
        network_pub_key_set: pick(&responses, |k| &k.network_public_key_set),
        hd_root_pubkeys: most_common(responses.iter().map(|r| r.keys.hd_root_pubkeys.clone()))
            .unwrap_or_default(),
        latest_blockhash,
        connected_nodes,
        synced_at: Utc::now(),
    };

    info!(
        request_id = %request_id,
        connected = state.connected_nodes.len(),
        latest_blockhash = %state.latest_blockhash,
        "Handshake complete"
    );

    Ok(state)
}

fn pick(responses: &[NodeHandshake], field: impl Fn(&HandshakeResponse) -> &String) -> String {
    most_common(responses.iter().map(|r| field(&r.keys).clone())).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryTolerance;
    use crate::testing::StubTransport;
    use std::time::Duration;

    fn handshake_body(blockhash: Option<&str>, subnet: &str) -> Value {
        json!({
            "serverPublicKey": "server",
            "subnetPublicKey": subnet,
            "networkPublicKey": "network",
            "networkPublicKeySet": "set",
            "hdRootPubkeys": ["root1", "root2"],
            "latestBlockhash": blockhash,
        })
    }

    fn config(n: usize, min: usize) -> ClientConfig {
        ClientConfig::new((0..n).map(|i| format!("https://node{i}")).collect())
            .with_min_node_count(min)
            .with_retry_tolerance(RetryTolerance {
                max_attempts: 1,
                interval: Duration::from_millis(1),
            })
            .with_request_timeout(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn agrees_on_majority_keys_and_skips_down_nodes() {
        let transport = StubTransport::new()
            .respond("https://node0/web/handshake", handshake_body(Some("0xabc"), "subnet"))
            .respond("https://node1/web/handshake", handshake_body(Some("0xabc"), "subnet"))
            .respond("https://node2/web/handshake", handshake_body(Some("0xold"), "ERR"))
            .fail("https://node3/web/handshake");
        let transport: Arc<dyn NodeTransport> = Arc::new(transport);

        let state = handshake(&transport, &config(4, 2), "req").await.unwrap();

        assert_eq!(
            state.connected_nodes,
            vec!["https://node0", "https://node1", "https://node2"]
        );
        assert_eq!(state.subnet_pub_key, "subnet");
        assert_eq!(state.latest_blockhash, "0xabc");
        assert_eq!(state.hd_root_pubkeys, vec!["root1", "root2"]);
    }

    #[tokio::test]
    async fn too_few_nodes_is_not_ready() {
        let transport = StubTransport::new()
            .respond("https://node0/web/handshake", handshake_body(Some("0xabc"), "subnet"))
            .fail("https://node1/web/handshake")
            .fail("https://node2/web/handshake");
        let transport: Arc<dyn NodeTransport> = Arc::new(transport);

        let err = handshake(&transport, &config(3, 2), "req").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotReady);
        assert_eq!(err.request_id.as_deref(), Some("req"));
    }

    #[tokio::test]
    async fn missing_blockhash_is_fatal() {
        let transport = StubTransport::new()
            .respond("https://node0/web/handshake", handshake_body(None, "subnet"))
            .respond("https://node1/web/handshake", handshake_body(None, "subnet"));
        let transport: Arc<dyn NodeTransport> = Arc::new(transport);

        let err = handshake(&transport, &config(2, 2), "req").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidEthBlockhash);
    }
}
