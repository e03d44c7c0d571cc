// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cluster apply/delete/status primitives used by the install stages.

use std::fmt;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Service};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{
    api::{DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument};

use crate::constants::FIELD_MANAGER;
use crate::error::{MeshctlError, Result};

/// Apply a namespaced resource via server-side apply (create or update)
pub async fn apply_namespaced<K>(client: &Client, namespace: &str, resource: &K) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug,
{
    let name = resource.name_any();
    debug!("Applying {} {}/{}", K::kind(&()), namespace, name);

    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &pp, &Patch::Apply(resource)).await?;
    Ok(())
}

/// Apply a cluster-scoped resource via server-side apply (create or update)
pub async fn apply_cluster<K>(client: &Client, resource: &K) -> Result<()>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug,
{
    let name = resource.name_any();
    debug!("Applying {} {}", K::kind(&()), name);

    let api: Api<K> = Api::all(client.clone());
    let pp = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &pp, &Patch::Apply(resource)).await?;
    Ok(())
}

/// Resource categories the teardown manifests can name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ConfigMap,
    Service,
    Deployment,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Service => "Service",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
        };
        f.write_str(name)
    }
}

/// Delete a resource by kind and name. A missing resource is not an error.
pub async fn delete_resource(
    client: &Client,
    namespace: &str,
    kind: ResourceKind,
    name: &str,
) -> Result<()> {
    match kind {
        ResourceKind::ConfigMap => delete_namespaced::<ConfigMap>(client, namespace, name).await,
        ResourceKind::Service => delete_namespaced::<Service>(client, namespace, name).await,
        ResourceKind::Deployment => delete_namespaced::<Deployment>(client, namespace, name).await,
        ResourceKind::Role => delete_namespaced::<Role>(client, namespace, name).await,
        ResourceKind::RoleBinding => delete_namespaced::<RoleBinding>(client, namespace, name).await,
        ResourceKind::ClusterRole => delete_cluster::<ClusterRole>(client, name).await,
        ResourceKind::ClusterRoleBinding => {
            delete_cluster::<ClusterRoleBinding>(client, name).await
        }
    }
}

async fn delete_namespaced<K>(client: &Client, namespace: &str, name: &str) -> Result<()>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn delete_cluster<K>(client: &Client, name: &str) -> Result<()>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
{
    let api: Api<K> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Query whether a deployment's replicas have all become ready
pub async fn deployment_ready(client: &Client, namespace: &str, name: &str) -> Result<bool> {
    let api: Api<Deployment> = Api::namespaced(client.clone(), namespace);
    let deployment = api.get(name).await?;
    Ok(is_deployment_ready(&deployment))
}

/// Readiness predicate: every desired replica reports ready
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    desired > 0 && ready >= desired
}

/// List pods in a namespace matching a label selector
pub async fn list_pods(client: &Client, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().labels(label_selector);
    Ok(api.list(&lp).await?.items)
}

/// Render a human-readable pod status table for a label selector.
///
/// Rendering never fails; listing errors become part of the output.
pub async fn format_pod_status(client: &Client, namespace: &str, label_selector: &str) -> String {
    match list_pods(client, namespace, label_selector).await {
        Ok(pods) if pods.is_empty() => "no pods found".to_string(),
        Ok(pods) => {
            let mut out = format!("{:<40} {:<8} {}", "NAME", "READY", "STATUS");
            for pod in pods {
                let name = pod.name_any();
                let statuses = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.container_statuses.as_ref());
                let total = statuses.map(|s| s.len()).unwrap_or(0);
                let ready = statuses
                    .map(|s| s.iter().filter(|c| c.ready).count())
                    .unwrap_or(0);
                let phase = pod
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.clone())
                    .unwrap_or_else(|| "Unknown".to_string());
                out.push_str(&format!("\n{:<40} {:<8} {}", name, format!("{}/{}", ready, total), phase));
            }
            out
        }
        Err(e) => format!("unable to list pods: {}", e),
    }
}

/// Ensure a namespace exists in the cluster, create if it doesn't
#[instrument(skip(client))]
pub async fn ensure_namespace_exists(client: &Client, namespace: &str) -> Result<()> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    match namespaces.get(namespace).await {
        Ok(_) => {
            debug!("Namespace {} already exists", namespace);
            Ok(())
        }
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!("Creating namespace {}", namespace);
            let ns = Namespace {
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            };
            namespaces.create(&PostParams::default(), &ns).await?;
            Ok(())
        }
        Err(e) => Err(MeshctlError::Kube(e)),
    }
}
