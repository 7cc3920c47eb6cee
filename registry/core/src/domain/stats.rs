// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Usage and success statistics shared by components and workflows.
//!
//! The success rate is an exponential moving average over recorded execution
//! outcomes: `new = old + alpha * (outcome - old)`, starting at 1.0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Smoothing factor applied when no explicit alpha is configured.
pub const DEFAULT_SUCCESS_ALPHA: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub usage_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub success_rate: f64,
    pub last_used: DateTime<Utc>,
}

impl UsageStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            success_rate: 1.0,
            last_used: now,
        }
    }

    pub fn record_use(&mut self, at: DateTime<Utc>) {
        self.usage_count = self.usage_count.saturating_add(1);
        if at > self.last_used {
            self.last_used = at;
        }
    }

    /// Fold one execution outcome into the moving average.
    pub fn record_outcome(&mut self, succeeded: bool, alpha: f64) {
        let target = if succeeded { 1.0 } else { 0.0 };
        let alpha = alpha.clamp(0.0, 1.0);
        self.success_rate = (self.success_rate + alpha * (target - self.success_rate)).clamp(0.0, 1.0);

        if succeeded {
            self.success_count = self.success_count.saturating_add(1);
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
    }

    pub fn invocations(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Retrieval ranking: `(success_rate, usage_count)` descending, then most
    /// recently used first. Sorting with this comparator puts the best entry first.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .success_rate
            .partial_cmp(&self.success_rate)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.usage_count.cmp(&self.usage_count))
            .then_with(|| other.last_used.cmp(&self.last_used))
    }
}

/// Atomic statistics update applied by repositories under their row lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatsMutation {
    MarkUsed { at: DateTime<Utc> },
    RecordOutcome { succeeded: bool, alpha: f64 },
}

impl StatsMutation {
    pub fn apply(&self, stats: &mut UsageStats) {
        match *self {
            StatsMutation::MarkUsed { at } => stats.record_use(at),
            StatsMutation::RecordOutcome { succeeded, alpha } => stats.record_outcome(succeeded, alpha),
        }
    }
}
