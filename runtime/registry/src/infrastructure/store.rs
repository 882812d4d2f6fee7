// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Descriptor Store
//!
//! Map-backed [`ConfigStore`] used in development and tests, and as the
//! write-side handle the admin CRUD layer mutates. Production backends
//! implement the same trait over their database; the registry and
//! sweeper only ever see the trait.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::descriptor::{Descriptor, DescriptorStatus};
use crate::domain::resource::{ConfigStore, StoreError};

#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    descriptors: Arc<DashMap<String, Descriptor>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a descriptor. Replacement bumps the stored
    /// version so the registry can tell rebuilt entries apart.
    pub fn upsert(&self, mut descriptor: Descriptor) {
        let next_version = self
            .descriptors
            .get(&descriptor.key)
            .map(|existing| existing.version + 1);
        if let Some(version) = next_version {
            descriptor.version = version;
        }
        descriptor.updated_at = Utc::now();
        self.descriptors.insert(descriptor.key.clone(), descriptor);
    }

    /// Flip a descriptor's status in place (admin enable/disable path).
    /// Returns false when the key does not exist.
    pub fn set_status(&self, key: &str, status: DescriptorStatus) -> bool {
        match self.descriptors.get_mut(key) {
            Some(mut descriptor) => {
                descriptor.status = status;
                descriptor.version += 1;
                descriptor.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Hard-delete a descriptor. Returns whether one was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.descriptors.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Option<Descriptor>, StoreError> {
        Ok(self.descriptors.get(key).map(|entry| entry.value().clone()))
    }

    async fn list_enabled(&self) -> Result<Vec<Descriptor>, StoreError> {
        Ok(self
            .descriptors
            .iter()
            .filter(|entry| entry.value().status.is_enabled())
            .map(|entry| entry.value().clone())
            .collect())
    }
}
