// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Fixed-interval retry around one fan-out round.
//!
//! A round is re-run on [`RoundResult::Failure`] until it succeeds or the
//! attempt budget is spent. Rounds never overlap: the next attempt starts
//! only after the previous one has fully settled and the interval elapsed.

use std::future::Future;

use tracing::debug;

use crate::config::RetryTolerance;
use crate::error::ClientResult;
use crate::node::{RoundFailure, RoundResult};

/// Run `round` with retries.
///
/// `on_retry(failure, request_id, is_final_attempt)` is called once per
/// failed attempt. The last [`RoundResult`] is returned verbatim; an `Err`
/// from `round` itself is a caller bug and is propagated without retrying.
/// A zero `max_attempts` still runs the round once.
pub async fn execute_with_retry<T, F, Fut, R>(
    tolerance: &RetryTolerance,
    mut round: F,
    mut on_retry: R,
) -> ClientResult<RoundResult<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<RoundResult<T>>>,
    R: FnMut(&RoundFailure, &str, bool),
{
    let max_attempts = tolerance.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = round().await?;
        if result.is_success() {
            return Ok(result);
        }

        let is_final = attempt >= max_attempts;
        if let RoundResult::Failure { error, request_id } = &result {
            on_retry(error, request_id, is_final);
        }

        if is_final {
            return Ok(result);
        }

        debug!(
            request_id = %result.request_id(),
            attempt,
            max_attempts,
            interval_ms = tolerance.interval.as_millis() as u64,
            "Round failed, retrying"
        );
        tokio::time::sleep(tolerance.interval).await;
        attempt += 1;
    }
}
