// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Share records and the unwrap step that extracts them from raw node JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node's ECDSA signature share, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub sig_type: String,
    pub data_signed: String,
    pub signature_share: String,
    /// Ordering key only; not a cryptographic weight
    pub share_index: u32,
    pub big_r: String,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sig_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub siwe_message: Option<String>,
}

/// One node's BLS signature share (JWT signing and decryption rounds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlsShare {
    pub share_index: u32,
    pub signature_share: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned_jwt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_type: Option<String>,
}

/// Where a share was found in a raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ShareShape {
    /// The payload itself is a share
    Flat(Share),
    /// The share sits one level down under `key`
    Nested { key: String, share: Share },
    /// No share found; the payload is returned unchanged
    Passthrough(Value),
}

impl ShareShape {
    pub fn into_share(self) -> Option<Share> {
        match self {
            ShareShape::Flat(share) | ShareShape::Nested { share, .. } => Some(share),
            ShareShape::Passthrough(_) => None,
        }
    }
}

const SIG_TYPE: &[&str] = &["sigType", "sig_type"];
const DATA_SIGNED: &[&str] = &["dataSigned", "data_signed", "digest"];
const SIGNATURE_SHARE: &[&str] = &["signatureShare", "signature_share"];
const SHARE_INDEX: &[&str] = &["shareIndex", "share_index"];
const BIG_R: &[&str] = &["bigR", "bigr", "big_r"];
const PUBLIC_KEY: &[&str] = &["publicKey", "public_key"];
const SIG_NAME: &[&str] = &["sigName", "sig_name"];
const SIWE_MESSAGE: &[&str] = &["siweMessage", "siwe_message"];

/// Locate a share in a raw payload.
pub fn classify(raw: &Value) -> ShareShape {
    let Some(object) = as_object(raw) else {
        return ShareShape::Passthrough(raw.clone());
    };

    if let Some(share) = share_from_object(&object) {
        return ShareShape::Flat(share);
    }

    for (key, value) in &object {
        if let Some(share) = as_object(value).and_then(|inner| share_from_object(&inner)) {
            return ShareShape::Nested {
                key: key.clone(),
                share,
            };
        }
    }

    ShareShape::Passthrough(raw.clone())
}

/// Extract the share from a raw payload, if it carries one.
pub fn unwrap_candidate(raw: &Value) -> Option<Share> {
    classify(raw).into_share()
}

/// Remove quote and escape characters left by double encoding.
pub(crate) fn clean(value: &str) -> String {
    value.replace(['"', '\\'], "")
}

/// Objects may arrive double-encoded as JSON strings.
fn as_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn field<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| object.get(*name))
        .filter(|v| !v.is_null())
}

fn string_field(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    let value = match field(object, names)? {
        Value::String(s) => clean(s),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!value.is_empty()).then_some(value)
}

fn index_field(object: &Map<String, Value>, names: &[&str]) -> Option<u32> {
    match field(object, names)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => clean(s).trim().parse().ok(),
        _ => None,
    }
}

fn share_from_object(object: &Map<String, Value>) -> Option<Share> {
    Some(Share {
        sig_type: string_field(object, SIG_TYPE)?,
        data_signed: string_field(object, DATA_SIGNED)?,
        signature_share: string_field(object, SIGNATURE_SHARE)?,
        share_index: index_field(object, SHARE_INDEX)?,
        big_r: string_field(object, BIG_R)?,
        public_key: string_field(object, PUBLIC_KEY)?,
        sig_name: string_field(object, SIG_NAME),
        siwe_message: string_field(object, SIWE_MESSAGE),
    })
}
