// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0
//! Collaborator contracts for the resource registry.
//!
//! The registry itself holds no durable state. It reads descriptor
//! snapshots through [`ConfigStore`] and delegates construction to a
//! [`ResourceFactory`]; both are injected so the registry stays
//! independent of where descriptors live and what the resource is.

use async_trait::async_trait;

use crate::domain::descriptor::Descriptor;

/// Read-side contract over the durable descriptor store.
///
/// Implemented in `crate::infrastructure::store` for in-memory use;
/// production backends implement the same trait over their database.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the current descriptor snapshot for a key, if any
    async fn get(&self, key: &str) -> Result<Option<Descriptor>, StoreError>;

    /// List all descriptors currently in `Enabled` status
    async fn list_enabled(&self) -> Result<Vec<Descriptor>, StoreError>;
}

/// Builds the expensive runtime resource from a descriptor snapshot.
///
/// Construction may be slow (network, model initialization) and may
/// fail; it must be safe to retry and must not touch registry state.
#[async_trait]
pub trait ResourceFactory<R>: Send + Sync {
    async fn build(&self, descriptor: &Descriptor) -> anyhow::Result<R>;
}

/// Errors surfaced by a descriptor store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store error: {0}")]
    Internal(String),
}

/// Errors surfaced by registry lookups.
///
/// `Clone` because a single build outcome fans out to every caller
/// waiting on the same in-flight construction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// No enabled descriptor exists for the key. Expected during normal
    /// operation (deleted/disabled entries), not an error condition worth
    /// logging above debug.
    #[error("No enabled descriptor for key '{key}'")]
    NotFound { key: String },

    /// Descriptor fetch or factory construction failed. Never cached;
    /// the next lookup retries from scratch.
    #[error("Failed to build resource for key '{key}': {reason}")]
    BuildFailed { key: String, reason: String },
}

impl RegistryError {
    pub fn build_failed(key: &str, err: impl std::fmt::Display) -> Self {
        RegistryError::BuildFailed {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}
