// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod registry;
pub mod sweeper;

pub use registry::{CachedResourceInfo, ResourceRegistry};
pub use sweeper::{ReconciliationSweeper, SweepReport};
