// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Network Sync
//!
//! Background task that periodically re-runs the node handshake so the
//! client's latest blockhash (used as SIWE nonce) and connected node set stay
//! current for long-lived processes.
//!
//! ## Strategy
//!
//! Every `interval` (default 30 s) the task calls
//! [`NodeClient::sync_network`]. A failed sync is logged and the previous
//! network view is kept; the client never drops back to `NotReady`.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::NodeClient;

/// Background re-handshake loop.
pub struct NetworkSync {
    client: NodeClient,
    interval: Duration,
}

impl NetworkSync {
    pub fn new(client: NodeClient, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Run the sync loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sync.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Network sync starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Network sync shutting down");
                    return;
                }
            }

            self.sync_step().await;
        }
    }

    async fn sync_step(&self) {
        match self.client.sync_network().await {
            Ok(state) => {
                info!(
                    connected = state.connected_nodes.len(),
                    latest_blockhash = %state.latest_blockhash,
                    "Network sync: refreshed network state"
                );
            }
            Err(e) => {
                warn!(
                    error = %e,
                    error_code = e.error_code(),
                    "Network sync: handshake failed, keeping previous state"
                );
            }
        }
    }
}
