// Copyright (c) 2026 Atrium Labs
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a descriptor, as written by the admin paths.
///
/// The registry treats anything other than `Enabled` (including an
/// absent descriptor) as "not currently servable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorStatus {
    Enabled,
    Disabled,
    Deleted,
}

impl DescriptorStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, DescriptorStatus::Enabled)
    }
}

/// Durable configuration record describing how to build a runtime resource.
///
/// Owned by the [`ConfigStore`](crate::domain::resource::ConfigStore); the
/// registry only ever reads snapshots and never writes one back. The admin
/// write path may edit, disable, or delete a descriptor at any time,
/// asynchronously with respect to the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    /// Stable key the resource is cached under (e.g. agent or workflow id)
    pub key: String,

    /// Current lifecycle status
    pub status: DescriptorStatus,

    /// Monotonic version, bumped on every edit
    pub version: u64,

    /// Opaque construction parameters, interpreted by the factory
    #[serde(default)]
    pub config: serde_json::Value,

    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Descriptor {
    pub fn new(key: impl Into<String>, status: DescriptorStatus, config: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            status,
            version: 1,
            config,
            updated_at: Utc::now(),
        }
    }

    /// Whether the registry may serve a resource built from this descriptor
    pub fn is_servable(&self) -> bool {
        self.status.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_enabled_descriptors_are_servable() {
        let mut descriptor = Descriptor::new("agent-1", DescriptorStatus::Enabled, json!({}));
        assert!(descriptor.is_servable());

        descriptor.status = DescriptorStatus::Disabled;
        assert!(!descriptor.is_servable());

        descriptor.status = DescriptorStatus::Deleted;
        assert!(!descriptor.is_servable());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let status = serde_json::to_string(&DescriptorStatus::Enabled).unwrap();
        assert_eq!(status, "\"enabled\"");

        let parsed: DescriptorStatus = serde_json::from_str("\"deleted\"").unwrap();
        assert_eq!(parsed, DescriptorStatus::Deleted);
    }

    #[test]
    fn test_descriptor_roundtrip_with_opaque_config() {
        let descriptor = Descriptor::new(
            "workflow-7",
            DescriptorStatus::Enabled,
            json!({ "model": "gpt-4o", "temperature": 0.2 }),
        );

        let serialized = serde_json::to_string(&descriptor).unwrap();
        let parsed: Descriptor = serde_json::from_str(&serialized).unwrap();

        assert_eq!(parsed.key, "workflow-7");
        assert_eq!(parsed.config["model"], "gpt-4o");
    }
}
