// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Node Fan-out and Quorum
//!
//! Everything that talks to the network's nodes:
//!
//! - `transport` - the HTTP seam ([`NodeTransport`]) and endpoint paths
//! - `fanout` - concurrent per-node requests resolved into a [`RoundResult`]
//! - `selection` - deterministic subset selection for targeted rounds
//! - `handshake` - initial node discovery and network key agreement
//! - `sync` - background re-handshake keeping the blockhash fresh
//!
//! ## Round Semantics
//!
//! A round is a [`RoundResult::Success`] iff the number of structurally
//! well-formed responses reaches the operation's threshold. Cryptographic
//! validity is not judged here; that happens in [`crate::shares`].

pub mod fanout;
pub mod handshake;
pub mod selection;
pub mod sync;
pub mod transport;

pub use fanout::fan_out;
pub use handshake::{HandshakeResponse, NetworkState};
pub use selection::select_target_nodes;
pub use sync::NetworkSync;
pub use transport::{HttpTransport, NodeTransport};

use serde_json::json;

use crate::error::{ClientError, ErrorKind};
use crate::shares::most_common;

/// Failure of one request to one node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("Node request failed: {0}")]
    Request(String),

    #[error("Node request timed out")]
    Timeout,

    #[error("Node rejected request with status {status}: {message}")]
    Rejected {
        status: u16,
        error_kind: Option<String>,
        error_code: Option<String>,
        message: String,
    },

    #[error("Node response was invalid: {0}")]
    InvalidResponse(String),
}

/// One node's failed slot in a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRejection {
    pub node: String,
    pub error: NodeError,
}

/// Aggregate failure of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundFailure {
    /// The most common per-node error
    pub error: NodeError,
    /// Every rejecting node, for diagnostics
    pub rejections: Vec<NodeRejection>,
    /// Number of structurally valid responses that were received
    pub successes: usize,
    /// Number of responses that were required
    pub threshold: usize,
}

impl RoundFailure {
    pub(crate) fn from_rejections(
        rejections: Vec<NodeRejection>,
        successes: usize,
        threshold: usize,
    ) -> Self {
        let error = most_common(rejections.iter().map(|r| r.error.to_string()))
            .and_then(|headline| {
                rejections
                    .iter()
                    .find(|r| r.error.to_string() == headline)
                    .map(|r| r.error.clone())
            })
            .unwrap_or_else(|| {
                NodeError::InvalidResponse(format!(
                    "only {successes} of {threshold} required responses received"
                ))
            });

        Self {
            error,
            rejections,
            successes,
            threshold,
        }
    }

    /// Convert into the caller-facing error, annotated with the request id.
    pub fn into_client_error(self, request_id: &str) -> ClientError {
        let (node_kind, node_code) = match &self.error {
            NodeError::Rejected {
                error_kind,
                error_code,
                ..
            } => (error_kind.clone(), error_code.clone()),
            _ => (None, None),
        };
        let rejections: Vec<_> = self
            .rejections
            .iter()
            .map(|r| json!({ "node": r.node, "error": r.error.to_string() }))
            .collect();

        ClientError::new(
            ErrorKind::NodeRejected,
            format!(
                "{} of {} required nodes responded: {}",
                self.successes, self.threshold, self.error
            ),
        )
        .with_request_id(request_id)
        .with_details(json!({
            "nodeErrorKind": node_kind,
            "nodeErrorCode": node_code,
            "rejections": rejections,
        }))
    }
}

/// Outcome of one fan-out round.
#[derive(Debug, Clone)]
pub enum RoundResult<T> {
    Success { values: Vec<T>, request_id: String },
    Failure { error: RoundFailure, request_id: String },
}

impl<T> RoundResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RoundResult::Success { .. })
    }

    pub fn request_id(&self) -> &str {
        match self {
            RoundResult::Success { request_id, .. } | RoundResult::Failure { request_id, .. } => {
                request_id
            }
        }
    }

    /// Unwrap the successful values or surface the aggregate failure.
    pub fn into_values(self) -> Result<Vec<T>, ClientError> {
        match self {
            RoundResult::Success { values, .. } => Ok(values),
            RoundResult::Failure { error, request_id } => Err(error.into_client_error(&request_id)),
        }
    }
}

/// Threshold policy of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quorum {
    /// Every connected node must answer
    AllConnected,
    /// `min_node_count` answers suffice
    MinNodeCount,
    /// A deterministically chosen subset of `k` nodes must all answer
    Target(usize),
}

impl Quorum {
    pub fn threshold(&self, connected: usize, min_node_count: usize) -> usize {
        match self {
            Quorum::AllConnected => connected,
            Quorum::MinNodeCount => min_node_count,
            Quorum::Target(k) => *k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_thresholds() {
        assert_eq!(Quorum::AllConnected.threshold(5, 3), 5);
        assert_eq!(Quorum::MinNodeCount.threshold(5, 3), 3);
        assert_eq!(Quorum::Target(1).threshold(5, 3), 1);
    }

    #[test]
    fn failure_headline_is_most_common_node_error() {
        let failure = RoundFailure::from_rejections(
            vec![
                NodeRejection {
                    node: "a".into(),
                    error: NodeError::Timeout,
                },
                NodeRejection {
                    node: "b".into(),
                    error: NodeError::Request("refused".into()),
                },
                NodeRejection {
                    node: "c".into(),
                    error: NodeError::Timeout,
                },
            ],
            2,
            5,
        );
        assert_eq!(failure.error, NodeError::Timeout);
    }

    #[test]
    fn failure_converts_with_request_id_and_node_codes() {
        let failure = RoundFailure::from_rejections(
            vec![NodeRejection {
                node: "https://n1".into(),
                error: NodeError::Rejected {
                    status: 401,
                    error_kind: Some("Validation".into()),
                    error_code: Some("NodeNotAuthorized".into()),
                    message: "bad sig".into(),
                },
            }],
            0,
            1,
        );

        let err = RoundResult::<()>::Failure {
            error: failure,
            request_id: "r-1".into(),
        }
        .into_values()
        .unwrap_err();

        assert_eq!(err.kind, ErrorKind::NodeRejected);
        assert_eq!(err.request_id.as_deref(), Some("r-1"));
        let details = err.details.unwrap();
        assert_eq!(details["nodeErrorCode"], "NodeNotAuthorized");
        assert_eq!(details["rejections"][0]["node"], "https://n1");
    }

    #[test]
    fn empty_rejections_still_produce_a_headline() {
        let failure = RoundFailure::from_rejections(vec![], 1, 2);
        assert!(matches!(failure.error, NodeError::InvalidResponse(_)));
    }
}
