// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0
//! Reconciliation Sweeper - Periodic Cache/Store Consistency Pass
//!
//! Walks the registry's cached keys on a fixed interval and evicts
//! entries whose backing descriptor is missing or no longer enabled.
//! Purely a proactive memory/staleness bound: a cache miss always
//! re-validates descriptor status itself, so correctness never depends
//! on the sweep having run.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::application::registry::ResourceRegistry;
use crate::domain::config::RegistryConfig;
use crate::domain::resource::ConfigStore;

/// Outcome of one sweep, for logs and admin diagnostics. Informational
/// only — an errored check leaves its key cached until the next sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Keys whose descriptor was re-checked
    pub checked: usize,
    /// Entries evicted because the descriptor was missing or not enabled
    pub evicted: usize,
    /// Per-key checks that failed and were skipped
    pub failed: usize,
}

/// Periodic reconciliation task for a [`ResourceRegistry`].
pub struct ReconciliationSweeper<R> {
    registry: ResourceRegistry<R>,
    store: Arc<dyn ConfigStore>,
    interval: Duration,
    concurrency: usize,
}

impl<R: Send + Sync + 'static> ReconciliationSweeper<R> {
    pub fn new(
        registry: ResourceRegistry<R>,
        store: Arc<dyn ConfigStore>,
        config: &RegistryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            interval: config.sweep_interval,
            concurrency: config.sweep_concurrency.max(1),
        }
    }

    /// Spawn the sweep loop. The task runs until the handle is aborted
    /// (backend shutdown).
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the first sweep should wait a
            // full period after startup warm-up
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let report = self.sweep().await;
                if report.evicted > 0 || report.failed > 0 {
                    info!(
                        checked = report.checked,
                        evicted = report.evicted,
                        failed = report.failed,
                        "reconciliation sweep finished"
                    );
                } else {
                    debug!(checked = report.checked, "reconciliation sweep found nothing to evict");
                }
            }
        })
    }

    /// Run one reconciliation pass.
    ///
    /// The cached key set is snapshotted up front so no registry lock is
    /// held for the duration of the sweep. Per-key descriptor checks run
    /// with bounded concurrency — one slow or hung store call cannot
    /// block eviction of unrelated keys beyond the concurrency budget.
    pub async fn sweep(&self) -> SweepReport {
        let keys = self.registry.cached_keys();

        let mut checks = stream::iter(keys)
            .map(|key| {
                let store = Arc::clone(&self.store);
                async move {
                    let lookup = store.get(&key).await;
                    (key, lookup)
                }
            })
            .buffer_unordered(self.concurrency);

        let mut report = SweepReport::default();
        while let Some((key, lookup)) = checks.next().await {
            report.checked += 1;
            match lookup {
                Ok(Some(descriptor)) if descriptor.is_servable() => {}
                Ok(_) => {
                    if self.registry.unregister(&key) {
                        report.evicted += 1;
                        info!(key = %key, "evicted resource with no enabled descriptor");
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(key = %key, error = %err, "descriptor check failed, leaving entry until next sweep");
                }
            }
        }

        report
    }
}
