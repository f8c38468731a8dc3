// Copyright 2023 ICON Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Retry policy for source-chain RPC calls.

use std::time::Duration;

use backoff::backoff::Backoff;

/// How many times a transient source-chain RPC call is retried before the
/// batch entry is abandoned and the pipeline reconnects.
pub const RPC_CALL_RETRY: usize = 5;

/// Interval between transient RPC retries.
pub const RPC_CALL_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// The retry budget applied to every header, votes, validators and proof
/// fetch inside the receive pipeline: a fixed number of attempts at a
/// constant interval. The pipeline never waits longer than the budget
/// allows; an exhausted fetch surfaces as a missing batch entry and a
/// reconnect, which refetches the height from scratch.
#[derive(Debug, Clone)]
pub struct RpcCallBackoff {
    interval: Duration,
    budget: usize,
    remaining: usize,
}

impl RpcCallBackoff {
    /// The pipeline's standard budget: [`RPC_CALL_RETRY`] attempts spaced
    /// [`RPC_CALL_RETRY_INTERVAL`] apart.
    pub fn new() -> Self {
        Self::with_budget(RPC_CALL_RETRY_INTERVAL, RPC_CALL_RETRY)
    }

    /// A policy with a custom interval and attempt budget.
    pub fn with_budget(interval: Duration, attempts: usize) -> Self {
        Self {
            interval,
            budget: attempts,
            remaining: attempts,
        }
    }
}

impl Default for RpcCallBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff for RpcCallBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.remaining = self.remaining.checked_sub(1)?;
        Some(self.interval)
    }

    fn reset(&mut self) {
        self.remaining = self.budget;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_the_attempt_budget() {
        let mut policy = RpcCallBackoff::with_budget(Duration::from_millis(10), 3);
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(10)));
        assert_eq!(policy.next_backoff(), None);
        // and stays exhausted
        assert_eq!(policy.next_backoff(), None);
    }

    #[test]
    fn reset_restores_the_budget() {
        let mut policy = RpcCallBackoff::with_budget(Duration::from_millis(1), 1);
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        policy.reset();
        assert!(policy.next_backoff().is_some());
    }

    #[test]
    fn standard_policy_matches_the_pipeline_budget() {
        let mut policy = RpcCallBackoff::new();
        let mut attempts = 0;
        while let Some(interval) = policy.next_backoff() {
            assert_eq!(interval, RPC_CALL_RETRY_INTERVAL);
            attempts += 1;
        }
        assert_eq!(attempts, RPC_CALL_RETRY);
    }
}
