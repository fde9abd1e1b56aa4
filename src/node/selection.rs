// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Deterministic node subset selection for targeted rounds.
//!
//! Nodes run the same derivation, so a client and the network agree on which
//! `k` nodes serve a given action without coordination:
//!
//! ```text
//! index_i = sha256("{counter}:{ipfs_id}") as big-endian integer mod node_count
//! ```
//!
//! `counter` starts at 0 and increments until `k` distinct indices are found.

use sha2::{Digest, Sha256};

use crate::error::{ClientError, ClientResult};

/// Select `target_node_range` distinct node indices below `node_count`.
pub fn select_target_nodes(
    ipfs_id: &str,
    target_node_range: usize,
    node_count: usize,
) -> ClientResult<Vec<usize>> {
    if target_node_range == 0 {
        return Err(ClientError::invalid_param_type("targetNodeRange is required"));
    }
    if target_node_range > node_count {
        return Err(ClientError::invalid_param_type(format!(
            "targetNodeRange {target_node_range} exceeds the {node_count} available nodes"
        )));
    }

    let mut selected = Vec::with_capacity(target_node_range);
    let mut counter: u64 = 0;
    while selected.len() < target_node_range {
        let digest = Sha256::digest(format!("{counter}:{ipfs_id}").as_bytes());
        let index = digest_mod(&digest, node_count);
        if !selected.contains(&index) {
            selected.push(index);
        }
        counter += 1;
    }

    Ok(selected)
}

/// Reduce a big-endian byte string modulo `modulus`.
fn digest_mod(bytes: &[u8], modulus: usize) -> usize {
    let modulus = modulus as u128;
    let rem = bytes
        .iter()
        .fold(0u128, |acc, b| ((acc << 8) | u128::from(*b)) % modulus);
    rem as usize
}
