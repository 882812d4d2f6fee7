// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod descriptor;
pub mod resource;
