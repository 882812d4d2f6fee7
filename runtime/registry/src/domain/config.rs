// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational knobs for the registry and its reconciliation sweeper.
///
/// Loaded from the backend's configuration file alongside the rest of
/// the runtime section, e.g.:
///
/// ```yaml
/// registry:
///   sweep_interval: 60s
///   max_entries: 256
///   sweep_concurrency: 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// How often the sweeper re-checks cached keys against the store.
    /// Shorter intervals reduce staleness at the cost of store load.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    /// Soft upper bound on cached entries; least-recently-accessed
    /// entries are evicted to make room. Unbounded when absent.
    /// Concurrent build completions may transiently overshoot the
    /// bound by an entry each.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// How many per-key descriptor checks a sweep runs in parallel
    #[serde(default = "default_sweep_concurrency")]
    pub sweep_concurrency: usize,
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_sweep_concurrency() -> usize {
    8
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: default_sweep_interval(),
            max_entries: None,
            sweep_concurrency: default_sweep_concurrency(),
        }
    }
}
