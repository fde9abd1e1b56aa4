// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Threshold Node Client - quorum client for a threshold-cryptography network
//!
//! A fixed set of independent nodes jointly hold shares of signing and
//! decryption keys. Every operation fans a request out to the nodes,
//! resolves a quorum of well-formed answers, and combines the partial
//! results into one artifact: a signature, a JWT, a plaintext or a claim.
//!
//! ## Modules
//!
//! - `client` - [`client::NodeClient`] and the public operations
//! - `node` - transport, fan-out/quorum, targeted selection, handshake
//! - `retry` - bounded re-execution of failed rounds
//! - `shares` - share validation, ordering and combination
//! - `session` - session keys, SIWE, capability objects, session sigs
//! - `access_control` - conditions and the identity parameter
//! - `claim` - key claiming and the mint seam
//! - `storage` - session key and wallet sig persistence
//! - `config` / `logging` / `error` - ambient configuration, tracing, errors

pub mod access_control;
pub mod claim;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod node;
pub mod retry;
pub mod session;
pub mod shares;
pub mod storage;

#[cfg(test)]
mod testing;

pub use client::{NodeClient, NodeClientBuilder};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, ErrorKind};
