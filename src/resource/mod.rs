// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mesh configuration resource types and the untyped document model.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A decoded, kind-tagged unit of configuration.
///
/// Produced by the visitor pipeline and consumed by either the cluster apply
/// path or the mesh REST client. Identity is `(kind, name[, namespace])`;
/// the full decoded document is preserved in `body`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDocument {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub body: serde_yaml::Value,
}

/// A mesh configuration resource kind managed through the REST API.
pub trait MeshResource: Serialize + DeserializeOwned {
    /// The `kind` discriminator used on the wire
    const KIND: &'static str;

    fn name(&self) -> &str;
}

macro_rules! mesh_resource {
    ($ty:ident, $kind:literal) => {
        impl MeshResource for $ty {
            const KIND: &'static str = $kind;

            fn name(&self) -> &str {
                &self.name
            }
        }

        impl $ty {
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    kind: $kind.to_string(),
                    name: name.into(),
                    ..Default::default()
                }
            }
        }
    };
}

/// A tenant groups mesh services into one isolation unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(Tenant, "Tenant");

/// A service registered with the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshService {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register_tenant: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(MeshService, "Service");

/// Load-balance policy for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalance {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(LoadBalance, "LoadBalance");

/// Canary release rules for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canary {
    pub kind: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(Canary, "Canary");

/// Distributed-tracing settings for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityTracings {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(ObservabilityTracings, "ObservabilityTracings");

/// Metrics collection settings for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityMetrics {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(ObservabilityMetrics, "ObservabilityMetrics");

/// Observability output-server settings for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityOutputServer {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_server: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(ObservabilityOutputServer, "ObservabilityOutputServer");

/// Resilience policy (circuit breaker, rate limiter, retryer) for a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resilience {
    pub kind: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(Resilience, "Resilience");

/// Ingress rule routing external traffic into the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    pub kind: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
mesh_resource!(Ingress, "Ingress");
