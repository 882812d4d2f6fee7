// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0
//! Chat runtime resource registry.
//!
//! The admin backend builds expensive, stateful chat clients from
//! agent/workflow descriptors. This crate keeps those clients cached
//! in memory with single-flight construction, explicit invalidation,
//! and a periodic reconciliation sweep that evicts entries whose
//! backing descriptor was disabled or deleted by the admin write path.
//!
//! # Architecture
//!
//! - **domain** — descriptor/value types, collaborator traits, errors
//! - **application** — `ResourceRegistry` and `ReconciliationSweeper`
//! - **infrastructure** — in-memory store and the sample chat factory

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use application::registry::ResourceRegistry;
pub use application::sweeper::{ReconciliationSweeper, SweepReport};
pub use domain::config::RegistryConfig;
pub use domain::descriptor::{Descriptor, DescriptorStatus};
pub use domain::resource::{ConfigStore, RegistryError, ResourceFactory, StoreError};
