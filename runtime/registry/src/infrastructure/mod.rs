// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0

pub mod chat;
pub mod store;

pub use chat::{ChatClient, ChatClientFactory, ChatClientSettings};
pub use store::InMemoryConfigStore;
