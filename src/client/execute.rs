// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Lit Action execution.
//!
//! Without a target range the action runs on every connected node and the
//! round needs `min_node_count` answers. With `target_node_range = k` the
//! action runs on `k` nodes derived from its IPFS id, and all `k` must
//! answer. When only code is given, the IPFS id is computed by the network
//! itself through a hashing action.

use std::collections::BTreeMap;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{auth_for_node, new_request_id, per_node_bodies, NodeClient};
use crate::claim::AuthMethod;
use crate::error::{ClientError, ClientResult};
use crate::node::transport::EXECUTE_ENDPOINT;
use crate::node::{select_target_nodes, NetworkState, Quorum};
use crate::session::{AuthSig, SessionSigs};
use crate::shares::model::clean;
use crate::shares::{get_claims, get_signatures, most_common, ClaimResult, CombinedSignature};

/// IPFS id of the action that hashes `jsParams.dataToHash` into an IPFS id.
pub const LIT_ACTION_IPFS_HASH: &str = "QmUjX8MW6StQ7NKNdaS6g4RMkvN5hcgtKmEi8Mca6oX4t3";

#[derive(Debug, Clone, Default)]
pub struct ExecuteJsParams {
    pub code: Option<String>,
    pub ipfs_id: Option<String>,
    pub auth_sig: Option<AuthSig>,
    pub session_sigs: Option<SessionSigs>,
    pub auth_methods: Vec<AuthMethod>,
    pub js_params: Option<Value>,
    /// Number of nodes to run on; 0 runs on every connected node
    pub target_node_range: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteJsResponse {
    pub signatures: BTreeMap<String, CombinedSignature>,
    /// Parsed as JSON when possible, else the raw string
    pub response: Value,
    pub logs: String,
    pub claims: BTreeMap<String, ClaimResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeExecuteResponse {
    #[serde(default)]
    signed_data: Option<Map<String, Value>>,
    #[serde(default)]
    claim_data: Option<Map<String, Value>>,
    #[serde(default)]
    response: Value,
    #[serde(default)]
    logs: Option<String>,
}

/// What a round executes.
struct ActionSource<'a> {
    code: Option<&'a str>,
    ipfs_id: Option<&'a str>,
    js_params: &'a Value,
}

fn response_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl NodeClient {
    /// Run a Lit Action and combine whatever it signed.
    pub async fn execute_js(&self, params: ExecuteJsParams) -> ClientResult<ExecuteJsResponse> {
        if params.code.is_none() && params.ipfs_id.is_none() {
            return Err(ClientError::invalid_argument(
                "You must pass either code or ipfsId",
            ));
        }
        if params.auth_sig.is_none()
            && params.session_sigs.is_none()
            && params.auth_methods.is_empty()
        {
            return Err(ClientError::params_missing(
                "You must pass either authSig, sessionSigs or authMethods",
            ));
        }

        let state = self.network().await?;
        let request_id = new_request_id();
        let js_params = params.js_params.clone().unwrap_or_else(|| json!({}));
        let connected = state.connected_nodes.len();

        let (nodes, threshold, ipfs_id) = if params.target_node_range > 0 {
            let ipfs_id = match &params.ipfs_id {
                Some(id) => id.clone(),
                None => self.get_ipfs_id(&state, &params, &request_id).await?,
            };
            let indices = select_target_nodes(&ipfs_id, params.target_node_range, connected)?;
            let nodes: Vec<String> = indices
                .into_iter()
                .map(|i| state.connected_nodes[i].clone())
                .collect();
            info!(
                request_id = %request_id,
                ipfs_id = %ipfs_id,
                nodes = ?nodes,
                "Running targeted Lit Action"
            );
            let threshold = Quorum::Target(params.target_node_range)
                .threshold(connected, self.config().min_node_count);
            (nodes, threshold, Some(ipfs_id))
        } else {
            let threshold = Quorum::MinNodeCount.threshold(connected, self.config().min_node_count);
            (state.connected_nodes.clone(), threshold, params.ipfs_id.clone())
        };

        let source = ActionSource {
            code: params.code.as_deref(),
            ipfs_id: ipfs_id.as_deref(),
            js_params: &js_params,
        };
        let responses = self
            .run_action(&nodes, threshold, &params, &source, &request_id)
            .await?;

        self.assemble_execution(responses, &request_id)
    }

    /// Ask the network for the IPFS id of `params.code`.
    async fn get_ipfs_id(
        &self,
        state: &NetworkState,
        params: &ExecuteJsParams,
        request_id: &str,
    ) -> ClientResult<String> {
        let code = params.code.as_deref().ok_or_else(|| {
            ClientError::invalid_argument("code is required to compute an ipfs id")
        })?;

        let js_params = json!({ "dataToHash": code });
        let source = ActionSource {
            code: None,
            ipfs_id: Some(LIT_ACTION_IPFS_HASH),
            js_params: &js_params,
        };
        let threshold = Quorum::MinNodeCount
            .threshold(state.connected_nodes.len(), self.config().min_node_count);
        let responses = self
            .run_action(&state.connected_nodes, threshold, params, &source, request_id)
            .await?;

        let text = most_common(responses.iter().map(|r| response_text(&r.response)))
            .unwrap_or_default();
        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            ClientError::unknown(format!("ipfs id response is not JSON: {e}"))
                .with_request_id(request_id)
        })?;

        let ipfs_id = parsed["res"]["data"]
            .as_str()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ClientError::unknown("ipfs id response has no res.data").with_request_id(request_id)
            })?;
        debug!(request_id = %request_id, ipfs_id, "Computed ipfs id");
        Ok(ipfs_id.to_string())
    }

    async fn run_action(
        &self,
        nodes: &[String],
        threshold: usize,
        params: &ExecuteJsParams,
        source: &ActionSource<'_>,
        request_id: &str,
    ) -> ClientResult<Vec<NodeExecuteResponse>> {
        let bodies = per_node_bodies(nodes, |node| {
            let mut body = Map::new();
            if let Some(auth_sig) =
                auth_for_node(params.auth_sig.as_ref(), params.session_sigs.as_ref(), node)?
            {
                body.insert("authSig".into(), json!(auth_sig));
            }
            body.insert("jsParams".into(), source.js_params.clone());
            body.insert("authMethods".into(), json!(params.auth_methods));
            if let Some(code) = source.code {
                body.insert("code".into(), json!(Base64::encode_string(code.as_bytes())));
            }
            if let Some(ipfs_id) = source.ipfs_id {
                body.insert("ipfsId".into(), json!(ipfs_id));
            }
            if params.target_node_range > 0 {
                body.insert("targetNodeRange".into(), json!(params.target_node_range));
            }
            Ok(Value::Object(body))
        })?;

        self.send_round("execute_js", EXECUTE_ENDPOINT, bodies, threshold, request_id)
            .await
    }

    fn assemble_execution(
        &self,
        responses: Vec<NodeExecuteResponse>,
        request_id: &str,
    ) -> ClientResult<ExecuteJsResponse> {
        let signed: Vec<Map<String, Value>> = responses
            .iter()
            .map(|r| r.signed_data.clone().unwrap_or_default())
            .collect();
        let claimed: Vec<Map<String, Value>> = responses
            .iter()
            .filter_map(|r| r.claim_data.clone())
            .filter(|c| !c.is_empty())
            .collect();
        let has_signatures = signed.iter().any(|m| !m.is_empty());

        if !has_signatures && claimed.is_empty() {
            let first = responses.first();
            return Ok(ExecuteJsResponse {
                signatures: BTreeMap::new(),
                response: first.map(|r| r.response.clone()).unwrap_or(Value::Null),
                logs: first.and_then(|r| r.logs.clone()).unwrap_or_default(),
                claims: BTreeMap::new(),
            });
        }

        let signatures = if has_signatures {
            get_signatures(&signed, self.config().min_node_count, self.crypto(), request_id)?
        } else {
            BTreeMap::new()
        };

        let text = most_common(responses.iter().map(|r| response_text(&r.response)))
            .unwrap_or_default();
        let response = serde_json::from_str(&text).unwrap_or(Value::String(text));
        let logs = most_common(responses.iter().map(|r| r.logs.clone().unwrap_or_default()))
            .unwrap_or_default();

        let claims = if claimed.is_empty() {
            BTreeMap::new()
        } else {
            get_claims(&claimed)?
        };

        Ok(ExecuteJsResponse {
            signatures,
            response,
            logs: clean(&logs),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::client::test_support::*;
    use crate::testing::RecordingCrypto;

    fn auth_sig() -> AuthSig {
        AuthSig {
            sig: "0xsig".into(),
            derived_via: "web3.eth.personal.sign".into(),
            signed_message: "msg".into(),
            address: "0xabc".into(),
            algo: None,
        }
    }

    fn share(index: u32) -> Value {
        json!({
            "sigType": "K256",
            "dataSigned": "\"0xdigest\"",
            "signatureShare": format!("\"share{index}\""),
            "shareIndex": index,
            "bigR": "\"0xbigr\"",
            "publicKey": "\"0x04pub\"",
            "sigName": "sig1",
        })
    }

    fn signing_response(index: u32) -> Value {
        json!({
            "success": true,
            "signedData": { "sig1": share(index) },
            "claimData": {},
            "response": "{\"ok\":true}",
            "logs": "signed",
        })
    }

    #[tokio::test]
    async fn quorum_tolerant_round_sorts_shares_before_combination() {
        let nodes = node_urls(5);
        let mut stub = stub_with_handshakes(&nodes);
        for (node, index) in nodes.iter().zip([2u32, 0, 3, 1]) {
            stub = stub.respond(&format!("{node}{EXECUTE_ENDPOINT}"), signing_response(index));
        }
        stub = stub.hang(&format!("{}{EXECUTE_ENDPOINT}", nodes[4]));
        let transport = Arc::new(stub);
        let crypto = Arc::new(RecordingCrypto::new());
        let client = connected_client(&nodes, 3, transport.clone(), crypto.clone()).await;

        let result = client
            .execute_js(ExecuteJsParams {
                code: Some("signEcdsa()".into()),
                auth_sig: Some(auth_sig()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(crypto.ecdsa_calls(), vec![vec![0, 1, 2, 3]]);
        let sig = &result.signatures["sig1"];
        assert_eq!(sig.public_key, "0x04pub");
        assert_eq!(sig.data_signed, "0xdigest");
        assert!(sig.signature.starts_with("0x"));
        assert_eq!(result.response, json!({ "ok": true }));
        assert_eq!(result.logs, "signed");

        let sent = transport.requests_to(EXECUTE_ENDPOINT);
        assert_eq!(sent.len(), 5);
        assert_eq!(
            sent[0].body["code"],
            Base64::encode_string(b"signEcdsa()").as_str()
        );
        assert_eq!(sent[0].body["authSig"]["sig"], "0xsig");
        assert!(sent.iter().all(|r| r.request_id == sent[0].request_id));
    }

    #[tokio::test]
    async fn plain_response_is_returned_without_combination() {
        let nodes = node_urls(3);
        let mut stub = stub_with_handshakes(&nodes);
        for node in &nodes {
            stub = stub.respond(
                &format!("{node}{EXECUTE_ENDPOINT}"),
                json!({
                    "success": true,
                    "signedData": {},
                    "claimData": {},
                    "response": "hello",
                    "logs": "",
                }),
            );
        }
        let crypto = Arc::new(RecordingCrypto::new());
        let client = connected_client(&nodes, 2, Arc::new(stub), crypto.clone()).await;

        let result = client
            .execute_js(ExecuteJsParams {
                ipfs_id: Some("QmAction".into()),
                auth_methods: vec![AuthMethod::google("token")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.response, json!("hello"));
        assert!(result.signatures.is_empty());
        assert!(crypto.ecdsa_calls().is_empty());
    }

    #[tokio::test]
    async fn too_few_shares_is_no_valid_shares() {
        let nodes = node_urls(3);
        let mut stub = stub_with_handshakes(&nodes);
        stub = stub.respond(&format!("{}{EXECUTE_ENDPOINT}", nodes[0]), signing_response(0));
        stub = stub.respond(&format!("{}{EXECUTE_ENDPOINT}", nodes[1]), signing_response(1));
        stub = stub.respond(
            &format!("{}{EXECUTE_ENDPOINT}", nodes[2]),
            json!({ "signedData": {}, "response": "", "logs": "" }),
        );
        let crypto = Arc::new(RecordingCrypto::new());
        let client = connected_client(&nodes, 3, Arc::new(stub), crypto).await;

        let err = client
            .execute_js(ExecuteJsParams {
                code: Some("x".into()),
                auth_sig: Some(auth_sig()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "no_valid_shares");
        assert_eq!(err.details.unwrap()["required"], 3);
    }

    #[tokio::test]
    async fn nodes_reporting_failure_reject_the_round() {
        let nodes = node_urls(3);
        let mut stub = stub_with_handshakes(&nodes);
        for node in &nodes {
            stub = stub.respond(
                &format!("{node}{EXECUTE_ENDPOINT}"),
                json!({ "success": false, "error": { "errorCode": "NodeJsExecutionError" } }),
            );
        }
        let crypto = Arc::new(RecordingCrypto::new());
        let client = connected_client(&nodes, 3, Arc::new(stub), crypto.clone()).await;

        let err = client
            .execute_js(ExecuteJsParams {
                code: Some("throw new Error()".into()),
                auth_sig: Some(auth_sig()),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "node_rejected");
        assert!(err.request_id.is_some());
        let details = err.details.unwrap();
        assert_eq!(details["nodeErrorCode"], "NodeJsExecutionError");
        assert_eq!(details["rejections"].as_array().unwrap().len(), 3);
        assert!(crypto.ecdsa_calls().is_empty());
    }

    #[tokio::test]
    async fn targeted_run_uses_derived_subset() {
        let nodes = node_urls(4);
        let mut stub = stub_with_handshakes(&nodes);
        for node in &nodes {
            stub = stub.respond(
                &format!("{node}{EXECUTE_ENDPOINT}"),
                json!({ "response": "done", "logs": "" }),
            );
        }
        let transport = Arc::new(stub);
        let client =
            connected_client(&nodes, 2, transport.clone(), Arc::new(RecordingCrypto::new())).await;

        client
            .execute_js(ExecuteJsParams {
                ipfs_id: Some("QmTarget".into()),
                auth_sig: Some(auth_sig()),
                target_node_range: 2,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut expected: Vec<String> = select_target_nodes("QmTarget", 2, 4)
            .unwrap()
            .into_iter()
            .map(|i| format!("{}{EXECUTE_ENDPOINT}", nodes[i]))
            .collect();
        let mut sent: Vec<String> = transport
            .requests_to(EXECUTE_ENDPOINT)
            .into_iter()
            .map(|r| r.url)
            .collect();
        expected.sort();
        sent.sort();
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn targeted_run_computes_ipfs_id_from_code() {
        let nodes = node_urls(3);
        let mut stub = stub_with_handshakes(&nodes);
        for node in &nodes {
            stub = stub.respond(
                &format!("{node}{EXECUTE_ENDPOINT}"),
                json!({ "response": "{\"res\":{\"data\":\"QmComputed\"}}", "logs": "" }),
            );
        }
        let transport = Arc::new(stub);
        let client =
            connected_client(&nodes, 2, transport.clone(), Arc::new(RecordingCrypto::new())).await;

        client
            .execute_js(ExecuteJsParams {
                code: Some("go()".into()),
                auth_sig: Some(auth_sig()),
                target_node_range: 1,
                ..Default::default()
            })
            .await
            .unwrap();

        let sent = transport.requests_to(EXECUTE_ENDPOINT);
        // one hashing round on every node, then the targeted run
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].body["ipfsId"], LIT_ACTION_IPFS_HASH);
        assert_eq!(sent[0].body["jsParams"]["dataToHash"], "go()");
        assert_eq!(sent[3].body["ipfsId"], "QmComputed");
        assert_eq!(sent[3].body["targetNodeRange"], 1);
    }

    #[tokio::test]
    async fn missing_code_or_auth_fails_before_any_round() {
        let nodes = node_urls(2);
        let transport = Arc::new(stub_with_handshakes(&nodes));
        let client =
            connected_client(&nodes, 2, transport.clone(), Arc::new(RecordingCrypto::new())).await;

        let err = client
            .execute_js(ExecuteJsParams {
                auth_sig: Some(auth_sig()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "invalid_argument_exception");

        let err = client
            .execute_js(ExecuteJsParams {
                code: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "params_missing_error");
        assert!(transport.requests_to(EXECUTE_ENDPOINT).is_empty());
    }
}
