// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0
//! Chat Client Factory - Descriptor-to-Runtime Glue
//!
//! Turns a descriptor's opaque config blob into a typed chat runtime
//! handle. The handle here is deliberately thin — transport and model
//! wiring live in the gateway crates — but the parsing and validation
//! seam is exactly what the registry's factory slot expects, so this
//! doubles as the reference factory for tests and local development.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use anyhow::Context;

use crate::domain::descriptor::Descriptor;
use crate::domain::resource::ResourceFactory;

/// Typed settings parsed from `Descriptor::config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatClientSettings {
    /// Provider kind ("openai", "anthropic", "ollama", "openai-compatible")
    pub provider: String,

    /// Model identifier passed through to the provider
    pub model: String,

    /// Override endpoint for self-hosted/compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// Constructed chat runtime handle cached by the registry
#[derive(Debug)]
pub struct ChatClient {
    key: String,
    settings: ChatClientSettings,
}

impl ChatClient {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn settings(&self) -> &ChatClientSettings {
        &self.settings
    }
}

/// Builds [`ChatClient`]s from descriptors
#[derive(Debug, Default)]
pub struct ChatClientFactory;

const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic", "ollama", "openai-compatible"];

#[async_trait]
impl ResourceFactory<ChatClient> for ChatClientFactory {
    async fn build(&self, descriptor: &Descriptor) -> anyhow::Result<ChatClient> {
        let settings: ChatClientSettings = serde_json::from_value(descriptor.config.clone())
            .with_context(|| format!("invalid chat config for '{}'", descriptor.key))?;

        if !SUPPORTED_PROVIDERS.contains(&settings.provider.as_str()) {
            anyhow::bail!("Unsupported provider type: {}", settings.provider);
        }

        Ok(ChatClient {
            key: descriptor.key.clone(),
            settings,
        })
    }
}
