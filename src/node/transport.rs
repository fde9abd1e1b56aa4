// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP transport to the nodes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::NodeError;

pub const EXECUTE_ENDPOINT: &str = "/web/execute";
pub const PKP_SIGN_ENDPOINT: &str = "/web/pkp/sign";
pub const PKP_CLAIM_ENDPOINT: &str = "/web/pkp/claim";
pub const SIGN_ACC_ENDPOINT: &str = "/web/signing/access_control_condition";
pub const ENCRYPTION_SIGN_ENDPOINT: &str = "/web/encryption/sign";
pub const SIGN_ECDSA_ENDPOINT: &str = "/web/signing/signConditionEcdsa";
pub const SIGN_SESSION_KEY_ENDPOINT: &str = "/web/sign_session_key";
pub const HANDSHAKE_ENDPOINT: &str = "/web/handshake";

pub const SDK_TYPE: &str = "Rust";

/// Sends one JSON request to one node.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// POST `body` to `url` and return the parsed JSON response.
    async fn post_json(&self, url: &str, body: &Value, request_id: &str)
        -> Result<Value, NodeError>;
}

/// Error body returned by nodes on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeErrorBody {
    error_kind: Option<String>,
    error_code: Option<String>,
    message: Option<String>,
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, NodeError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NodeError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl NodeTransport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        request_id: &str,
    ) -> Result<Value, NodeError> {
        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-Lit-SDK-Version", env!("CARGO_PKG_VERSION"))
            .header("X-Lit-SDK-Type", SDK_TYPE)
            .header("X-Request-Id", format!("lit_{request_id}"))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NodeError::Timeout
                } else {
                    NodeError::Request(format!("POST {url} failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rejection_from_body(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| NodeError::InvalidResponse(format!("POST {url} invalid JSON: {e}")))
    }
}

/// Rejection reported inside a 2xx body as `{"success": false, "error": {..}}`.
///
/// The error fields may sit under `error` or at the top level.
pub(crate) fn rejection_in_success_body(body: &Value) -> Option<NodeError> {
    if body.get("success") != Some(&Value::Bool(false)) {
        return None;
    }

    let source = match body.get("error") {
        Some(error @ Value::Object(_)) => error,
        _ => body,
    };
    let parsed: NodeErrorBody = serde_json::from_value(source.clone()).unwrap_or_default();
    let message = parsed
        .message
        .or_else(|| match body.get("error") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "node reported success: false".to_string());

    Some(NodeError::Rejected {
        status: 200,
        error_kind: parsed.error_kind,
        error_code: parsed.error_code,
        message,
    })
}

fn rejection_from_body(status: u16, body: &str) -> NodeError {
    let parsed: NodeErrorBody = serde_json::from_str(body).unwrap_or_default();
    NodeError::Rejected {
        status,
        error_kind: parsed.error_kind,
        error_code: parsed.error_code,
        message: parsed.message.unwrap_or_else(|| body.to_string()),
    }
}
