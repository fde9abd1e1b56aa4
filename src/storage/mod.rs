// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Storage
//!
//! Local persistence for the two pieces of client state that survive across
//! operations: the Ed25519 session keypair and the cached wallet signature.
//!
//! ## Storage Layout
//!
//! ```text
//! {storage_dir}/
//!   lit-session-key.json   # {"publicKey": "...", "secretKey": "..."}
//!   lit-wallet-sig.json    # AuthSig JSON
//! ```
//!
//! ## Failure Policy
//!
//! Storage is best-effort. A read failure is treated as a miss and a write
//! failure is logged and ignored; neither ever fails a client operation.

pub mod file_store;
pub mod memory;

pub use file_store::FileStore;
pub use memory::MemoryStore;

use std::io;

use serde::{de::DeserializeOwned, Serialize};

/// Storage key of the persisted session keypair.
pub const SESSION_KEY_STORAGE_KEY: &str = "lit-session-key";

/// Storage key of the cached wallet signature.
pub const WALLET_SIG_STORAGE_KEY: &str = "lit-wallet-sig";

/// Error type for session storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Key is not a valid storage key
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    /// Backend lock was poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// String key-value store holding JSON documents.
///
/// Writes are last-writer-wins on a single key; no cross-key transactions.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Insert or replace a value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Read and deserialize a JSON value.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(raw) if !raw.trim().is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub fn set_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw)
}
