// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Concurrent per-node requests resolved into a [`RoundResult`].

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::transport::rejection_in_success_body;
use super::{NodeError, NodeRejection, RoundFailure, RoundResult};

/// Issue one request per node concurrently and wait for all to settle.
///
/// `request(node_url)` builds the future for one node. Each future is
/// bounded by `timeout`; a timeout is an ordinary per-node failure. A
/// response counts toward `threshold` only if it does not report
/// `success: false` and it deserializes into `T`. Values are returned in
/// node order.
pub async fn fan_out<T, F, Fut>(
    nodes: &[String],
    threshold: usize,
    request_id: &str,
    timeout: Duration,
    request: F,
) -> RoundResult<T>
where
    T: DeserializeOwned,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<Value, NodeError>>,
{
    let pending = nodes.iter().map(|node| {
        let call = request(node.clone());
        async move {
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(value)) => match rejection_in_success_body(&value) {
                    Some(rejection) => Err(rejection),
                    None => serde_json::from_value::<T>(value)
                        .map_err(|e| NodeError::InvalidResponse(e.to_string())),
                },
                Ok(Err(e)) => Err(e),
                Err(_) => Err(NodeError::Timeout),
            };
            (node, outcome)
        }
    });

    let settled = join_all(pending).await;

    let mut values = Vec::new();
    let mut rejections = Vec::new();
    for (node, outcome) in settled {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => {
                warn!(
                    request_id = %request_id,
                    node = %node,
                    error = %error,
                    "Node request failed"
                );
                rejections.push(NodeRejection {
                    node: node.clone(),
                    error,
                });
            }
        }
    }

    debug!(
        request_id = %request_id,
        successes = values.len(),
        failures = rejections.len(),
        threshold,
        "Round settled"
    );

    if values.len() >= threshold {
        RoundResult::Success {
            values,
            request_id: request_id.to_string(),
        }
    } else {
        let successes = values.len();
        RoundResult::Failure {
            error: RoundFailure::from_rejections(rejections, successes, threshold),
            request_id: request_id.to_string(),
        }
    }
}
