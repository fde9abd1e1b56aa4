// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Sign-In With Ethereum
//!
//! [`SiweMessage`] is the editable form of an EIP-4361 message. Rendering,
//! parsing and EIP-191 verification go through the `siwe` crate; this
//! module converts between the two and adds the expiry check used when
//! deciding whether a wallet sig is still usable.
//!
//! ## Layout
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: 1
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}
//! Resources:
//! - {resource}
//! ```
//!
//! Optional lines are omitted when unset. Without a statement the address is
//! followed by three line feeds.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use siwe::{Message, VerificationError, Version};

use super::AuthSig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SiweError {
    #[error("Malformed SIWE message: {0}")]
    Parse(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signer does not match message address {expected}")]
    AddressMismatch { expected: String },

    #[error("Message expired at {0}")]
    Expired(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    pub domain: String,
    pub address: String,
    pub statement: Option<String>,
    pub uri: String,
    pub version: String,
    pub chain_id: u64,
    pub nonce: String,
    pub issued_at: String,
    pub expiration_time: Option<String>,
    pub not_before: Option<String>,
    pub request_id: Option<String>,
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// A version-1 message issued now.
    pub fn new(
        domain: impl Into<String>,
        address: impl Into<String>,
        uri: impl Into<String>,
        chain_id: u64,
        nonce: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            address: address.into(),
            statement: None,
            uri: uri.into(),
            version: "1".to_string(),
            chain_id,
            nonce: nonce.into(),
            issued_at: iso_timestamp(Utc::now()),
            expiration_time: None,
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    /// Render the EIP-4361 text that gets signed.
    pub fn prepare(&self) -> Result<String, SiweError> {
        Ok(self.to_message()?.to_string())
    }

    /// Whether the expiration time has passed. Unparseable timestamps count
    /// as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match &self.expiration_time {
            None => false,
            Some(exp) => DateTime::parse_from_rfc3339(exp)
                .map(|exp| exp.with_timezone(&Utc) <= now)
                .unwrap_or(true),
        }
    }

    fn to_message(&self) -> Result<Message, SiweError> {
        if self.version != "1" {
            return Err(SiweError::Parse(format!("unsupported version {}", self.version)));
        }
        let address = Address::from_str(&self.address)
            .map_err(|e| SiweError::Parse(format!("bad address {}: {e}", self.address)))?;

        Ok(Message {
            domain: parse_field("domain", &self.domain)?,
            address: address.0.0,
            statement: self.statement.clone(),
            uri: parse_field("uri", &self.uri)?,
            version: Version::V1,
            chain_id: self.chain_id,
            nonce: self.nonce.clone(),
            issued_at: parse_field("issued at", &self.issued_at)?,
            expiration_time: parse_optional("expiration time", self.expiration_time.as_deref())?,
            not_before: parse_optional("not before", self.not_before.as_deref())?,
            request_id: self.request_id.clone(),
            resources: self
                .resources
                .iter()
                .map(|resource| parse_field("resource", resource))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl From<Message> for SiweMessage {
    fn from(message: Message) -> Self {
        let version = match message.version {
            Version::V1 => "1",
        };
        Self {
            domain: message.domain.to_string(),
            address: Address::from(message.address).to_checksum(None),
            statement: message.statement,
            uri: message.uri.to_string(),
            version: version.to_string(),
            chain_id: message.chain_id,
            nonce: message.nonce,
            issued_at: message.issued_at.to_string(),
            expiration_time: message.expiration_time.map(|t| t.to_string()),
            not_before: message.not_before.map(|t| t.to_string()),
            request_id: message.request_id,
            resources: message.resources.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl FromStr for SiweMessage {
    type Err = SiweError;

    fn from_str(message: &str) -> Result<Self, Self::Err> {
        Message::from_str(message)
            .map(SiweMessage::from)
            .map_err(|e| SiweError::Parse(e.to_string()))
    }
}

fn parse_field<T>(name: &str, value: &str) -> Result<T, SiweError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| SiweError::Parse(format!("bad {name} {value}: {e}")))
}

fn parse_optional<T>(name: &str, value: Option<&str>) -> Result<Option<T>, SiweError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.map(|value| parse_field(name, value)).transpose()
}

/// Parse the SIWE message of a wallet sig and verify it.
///
/// The EIP-191 signer of `signed_message` must equal the message's address,
/// and the message must not be expired.
pub fn verify_wallet_sig(auth_sig: &AuthSig, now: DateTime<Utc>) -> Result<SiweMessage, SiweError> {
    let message =
        Message::from_str(&auth_sig.signed_message).map_err(|e| SiweError::Parse(e.to_string()))?;

    let bytes = alloy::hex::decode(auth_sig.sig.trim_start_matches("0x"))
        .map_err(|e| SiweError::InvalidSignature(e.to_string()))?;
    let signature = <[u8; 65]>::try_from(bytes.as_slice()).map_err(|_| {
        SiweError::InvalidSignature(format!("expected 65 bytes, got {}", bytes.len()))
    })?;

    match message.verify_eip191(&signature) {
        Ok(_) => {}
        Err(VerificationError::Signer) => {
            return Err(SiweError::AddressMismatch {
                expected: Address::from(message.address).to_checksum(None),
            })
        }
        Err(e) => return Err(SiweError::InvalidSignature(e.to_string())),
    }

    let message = SiweMessage::from(message);
    if message.is_expired(now) {
        return Err(SiweError::Expired(
            message.expiration_time.clone().unwrap_or_default(),
        ));
    }

    Ok(message)
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::SignerSync;
    use chrono::Duration;

    fn sample() -> SiweMessage {
        let mut msg = SiweMessage::new(
            "example.com",
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
            "lit:session:abcd",
            1,
            "0xblockhash",
        );
        msg.issued_at = "2026-01-01T00:00:00.000Z".into();
        msg
    }

    #[test]
    fn prepare_renders_statement_and_resources() {
        let mut msg = sample();
        msg.statement = Some("Hello".into());
        msg.expiration_time = Some("2026-01-02T00:00:00.000Z".into());
        msg.resources = vec!["urn:recap:abc".into()];

        assert_eq!(
            msg.prepare().unwrap(),
            "example.com wants you to sign in with your Ethereum account:\n\
             0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2\n\
             \n\
             Hello\n\
             \n\
             URI: lit:session:abcd\n\
             Version: 1\n\
             Chain ID: 1\n\
             Nonce: 0xblockhash\n\
             Issued At: 2026-01-01T00:00:00.000Z\n\
             Expiration Time: 2026-01-02T00:00:00.000Z\n\
             Resources:\n\
             - urn:recap:abc"
        );
    }

    #[test]
    fn missing_statement_leaves_blank_lines() {
        let rendered = sample().prepare().unwrap();
        assert!(rendered.contains("Cc2\n\n\nURI: lit:session:abcd"));
        assert_eq!(rendered.parse::<SiweMessage>().unwrap(), sample());
    }

    #[test]
    fn parse_recovers_all_fields() {
        let mut msg = sample();
        msg.statement = Some("Sign in".into());
        msg.expiration_time = Some("2026-01-02T00:00:00.000Z".into());
        msg.request_id = Some("req".into());
        msg.resources = vec!["urn:recap:one".into(), "lit-pkp://1".into()];

        let parsed: SiweMessage = msg.prepare().unwrap().parse().unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn prepare_rejects_unrenderable_fields() {
        let mut msg = sample();
        msg.address = "0xnot-an-address".into();
        assert!(matches!(msg.prepare(), Err(SiweError::Parse(_))));

        let mut msg = sample();
        msg.issued_at = "yesterday".into();
        assert!(matches!(msg.prepare(), Err(SiweError::Parse(_))));
    }

    #[test]
    fn parse_rejects_non_siwe_text() {
        assert!("hello world".parse::<SiweMessage>().is_err());
        let truncated = concat!(
            "example.com wants you to sign in with your Ethereum account:\n",
            "0xabc\n\nNonce: 1"
        );
        assert!(truncated.parse::<SiweMessage>().is_err());
    }

    #[test]
    fn expiry() {
        let mut msg = sample();
        let now = Utc::now();
        assert!(!msg.is_expired(now));

        msg.expiration_time = Some(iso_timestamp(now + Duration::minutes(5)));
        assert!(!msg.is_expired(now));
        msg.expiration_time = Some(iso_timestamp(now - Duration::minutes(5)));
        assert!(msg.is_expired(now));
        msg.expiration_time = Some("not a date".into());
        assert!(msg.is_expired(now));
    }

    fn signed(signer: &PrivateKeySigner, msg: &SiweMessage) -> AuthSig {
        let text = msg.prepare().unwrap();
        let sig = signer.sign_message_sync(text.as_bytes()).unwrap();
        AuthSig {
            sig: alloy::hex::encode_prefixed(sig.as_bytes()),
            derived_via: super::super::WALLET_SIG_DERIVED_VIA.into(),
            signed_message: text,
            address: signer.address().to_checksum(None),
            algo: None,
        }
    }

    #[test]
    fn verify_accepts_matching_signer() {
        let signer = PrivateKeySigner::random();
        let mut msg = sample();
        msg.address = signer.address().to_checksum(None);
        msg.expiration_time = Some(iso_timestamp(Utc::now() + Duration::hours(1)));

        let parsed = verify_wallet_sig(&signed(&signer, &msg), Utc::now()).unwrap();
        assert_eq!(parsed.uri, "lit:session:abcd");
    }

    #[test]
    fn verify_rejects_other_signer_and_expired() {
        let signer = PrivateKeySigner::random();
        let other = PrivateKeySigner::random();
        let mut msg = sample();
        msg.address = signer.address().to_checksum(None);

        let err = verify_wallet_sig(&signed(&other, &msg), Utc::now()).unwrap_err();
        assert!(matches!(err, SiweError::AddressMismatch { .. }));

        msg.expiration_time = Some(iso_timestamp(Utc::now() - Duration::minutes(1)));
        let err = verify_wallet_sig(&signed(&signer, &msg), Utc::now()).unwrap_err();
        assert!(matches!(err, SiweError::Expired(_)));
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let signer = PrivateKeySigner::random();
        let mut msg = sample();
        msg.address = signer.address().to_checksum(None);
        let mut auth_sig = signed(&signer, &msg);
        auth_sig.signed_message = auth_sig
            .signed_message
            .replace("Nonce: 0xblockhash", "Nonce: 0xotherhash");

        assert!(verify_wallet_sig(&auth_sig, Utc::now()).is_err());
    }
}
