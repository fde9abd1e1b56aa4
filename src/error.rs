// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client error taxonomy.
//!
//! Every fatal error surfaced by a public operation is a [`ClientError`]
//! carrying a stable machine-readable kind/code and, once a round has
//! started, the request id that was sent to the nodes.

use serde::Serialize;
use serde_json::Value;

/// Coarse classification reported alongside each error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorClass {
    Validation,
    Unexpected,
    Unknown,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Validation => write!(f, "Validation"),
            ErrorClass::Unexpected => write!(f, "Unexpected"),
            ErrorClass::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kind of a fatal client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client used before the node-set handshake completed
    NotReady,
    /// Caller supplied insufficient input
    ParamsMissing,
    /// A required parameter was empty
    ParamNull,
    /// A parameter had the wrong shape or range
    InvalidParamType,
    /// Resource/ability mismatch or other invalid argument
    InvalidArgument,
    /// Quorum not met or the signature-name set shrank
    NoValidShares,
    /// Unrecognized or inconsistent signature type
    UnknownSignatureType,
    /// Combination primitive produced no usable signature
    UnknownSignatureError,
    /// Wallet or session signature missing required fields
    WalletSignatureNotFound,
    /// Latest blockhash unavailable
    InvalidEthBlockhash,
    /// Nodes rejected the round
    NodeRejected,
    /// Client could not be initialized
    InitError,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Get the stable error code for this kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            ErrorKind::NotReady => "lit_node_client_not_ready_error",
            ErrorKind::ParamsMissing => "params_missing_error",
            ErrorKind::ParamNull => "param_null_error",
            ErrorKind::InvalidParamType => "invalid_param_type",
            ErrorKind::InvalidArgument => "invalid_argument_exception",
            ErrorKind::NoValidShares => "no_valid_shares",
            ErrorKind::UnknownSignatureType => "unknown_signature_type",
            ErrorKind::UnknownSignatureError => "unknown_signature_error",
            ErrorKind::WalletSignatureNotFound => "wallet_signature_not_found_error",
            ErrorKind::InvalidEthBlockhash => "invalid_eth_blockhash",
            ErrorKind::NodeRejected => "node_rejected",
            ErrorKind::InitError => "init_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }

    /// Get the error class for this kind.
    pub fn error_class(&self) -> ErrorClass {
        match self {
            ErrorKind::ParamsMissing
            | ErrorKind::ParamNull
            | ErrorKind::InvalidParamType
            | ErrorKind::InvalidArgument
            | ErrorKind::UnknownSignatureType
            | ErrorKind::UnknownSignatureError
            | ErrorKind::WalletSignatureNotFound => ErrorClass::Validation,
            ErrorKind::NotReady
            | ErrorKind::NoValidShares
            | ErrorKind::InvalidEthBlockhash
            | ErrorKind::NodeRejected
            | ErrorKind::InitError => ErrorClass::Unexpected,
            ErrorKind::Unknown => ErrorClass::Unknown,
        }
    }
}

/// Fatal error returned by client operations.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ErrorKind,
    pub message: String,
    pub request_id: Option<String>,
    pub details: Option<Value>,
}

/// Serializable view of a [`ClientError`], suitable for structured logs.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_kind: ErrorClass,
    pub error_code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotReady, message)
    }

    pub fn params_missing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParamsMissing, message)
    }

    pub fn param_null(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParamNull, message)
    }

    pub fn invalid_param_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParamType, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn no_valid_shares(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoValidShares, message)
    }

    pub fn unknown_signature_type(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownSignatureType, message)
    }

    pub fn unknown_signature_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownSignatureError, message)
    }

    pub fn wallet_signature_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WalletSignatureNotFound, message)
    }

    pub fn invalid_eth_blockhash(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidEthBlockhash, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Attach the request id of the operation that failed.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach structured diagnostics (e.g. attempted vs. required counts).
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.error_code()
    }

    pub fn error_class(&self) -> ErrorClass {
        self.kind.error_class()
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error_kind: self.error_class(),
            error_code: self.error_code(),
            message: self.message.clone(),
            request_id: self.request_id.clone(),
            details: self.details.clone(),
        }
    }
}

impl From<crate::storage::StorageError> for ClientError {
    fn from(e: crate::storage::StorageError) -> Self {
        ClientError::unknown(format!("storage error: {e}"))
    }
}

impl From<crate::session::AuthError> for ClientError {
    fn from(e: crate::session::AuthError) -> Self {
        ClientError::unknown(format!("auth callback failed: {e}"))
    }
}

impl From<crate::shares::CryptoError> for ClientError {
    fn from(e: crate::shares::CryptoError) -> Self {
        ClientError::unknown_signature_error(format!("combination primitive failed: {e}"))
    }
}
