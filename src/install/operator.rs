// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mesh operator stage: config, RBAC, and the operator deployment.

use std::collections::BTreeMap;

use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::api::ObjectMeta;

use crate::config::InstallConfig;
use crate::constants::{names, rbac};
use crate::error::Result;
use crate::install::{
    batch_deploy_resources, clear_stage_resources, wait_until_ready, workload_deployment,
    InstallFunc, InstallPhase, PollPolicy, StageContext,
};
use crate::kubernetes::{self, ResourceKind};

const VERB_GET: &str = "get";
const VERB_LIST: &str = "list";
const VERB_WATCH: &str = "watch";
const VERB_CREATE: &str = "create";
const VERB_UPDATE: &str = "update";
const VERB_PATCH: &str = "patch";
const VERB_DELETE: &str = "delete";

pub const LABEL_SELECTOR: &str = "app=mesh-operator";

/// Resources removed when this stage is cleared, in deletion order
pub const TEARDOWN: &[(ResourceKind, &str)] = &[
    (ResourceKind::Deployment, names::OPERATOR),
    (ResourceKind::Service, names::OPERATOR_METRICS_SERVICE),
    (ResourceKind::ConfigMap, names::OPERATOR_CONFIG),
    (ResourceKind::RoleBinding, rbac::LEADER_ELECTION_ROLE_BINDING),
    (ResourceKind::Role, rbac::LEADER_ELECTION_ROLE),
    (ResourceKind::ClusterRoleBinding, rbac::MANAGER_CLUSTER_ROLE_BINDING),
    (ResourceKind::ClusterRole, rbac::MANAGER_CLUSTER_ROLE),
    (ResourceKind::ClusterRoleBinding, rbac::METRICS_READER_CLUSTER_ROLE_BINDING),
    (ResourceKind::ClusterRole, rbac::METRICS_READER_CLUSTER_ROLE),
    (ResourceKind::ClusterRoleBinding, rbac::PROXY_CLUSTER_ROLE_BINDING),
    (ResourceKind::ClusterRole, rbac::PROXY_CLUSTER_ROLE),
];

fn operator_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), names::OPERATOR.to_string())])
}

/// Check prerequisites for installing the mesh operator.
///
/// The operator has none; installation starts from an empty namespace.
pub async fn pre_check(_ctx: &StageContext) -> Result<()> {
    Ok(())
}

/// Apply all operator resources in order, then wait for the operator
/// deployment to converge.
pub async fn deploy(ctx: &StageContext) -> Result<()> {
    batch_deploy_resources(
        ctx,
        vec![
            config_map_spec(&ctx.config),
            service_spec(&ctx.config),
            role_spec(&ctx.config),
            cluster_role_spec(),
            role_binding_spec(&ctx.config),
            cluster_role_binding_spec(&ctx.config),
            deployment_spec(&ctx.config),
        ],
    )
    .await?;

    wait_until_ready(&PollPolicy::default(), names::OPERATOR, || {
        kubernetes::deployment_ready(&ctx.client, &ctx.namespace, names::OPERATOR)
    })
    .await
}

/// Remove all operator resources, best-effort.
pub async fn clear(ctx: &StageContext) {
    clear_stage_resources(ctx, TEARDOWN).await;
}

/// Human-readable description of the given phase of this stage.
pub async fn describe(ctx: &StageContext, phase: InstallPhase) -> String {
    match phase {
        InstallPhase::Begin => format!(
            "Begin to install mesh operator in the namespace: {}",
            ctx.namespace
        ),
        InstallPhase::End => format!(
            "\nMesh operator deployed successfully, deployment: {}\n{}",
            names::OPERATOR,
            kubernetes::format_pod_status(&ctx.client, &ctx.namespace, LABEL_SELECTOR).await
        ),
        InstallPhase::Error => format!(
            "Failed to install mesh operator in the namespace: {}",
            ctx.namespace
        ),
    }
}

pub(crate) fn build_config_map(config: &InstallConfig) -> ConfigMap {
    let operator_config = format!(
        "mesh-namespace: {}\ncontrol-plane-service: {}\nadmin-port: {}\n",
        config.mesh_namespace,
        names::CONTROL_PLANE_PUBLIC_SERVICE,
        config.admin_port,
    );

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::OPERATOR_CONFIG.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "operator-config.yaml".to_string(),
            operator_config,
        )])),
        ..Default::default()
    }
}

fn config_map_spec(config: &InstallConfig) -> InstallFunc {
    let cm = build_config_map(config);
    Box::new(move |ctx| {
        let cm = cm.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &cm).await }.boxed()
    })
}

pub(crate) fn build_metrics_service(config: &InstallConfig) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(names::OPERATOR_METRICS_SERVICE.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            labels: Some(operator_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(operator_labels()),
            ports: Some(vec![ServicePort {
                name: Some("https".to_string()),
                port: 8443,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_spec(config: &InstallConfig) -> InstallFunc {
    let service = build_metrics_service(config);
    Box::new(move |ctx| {
        let service = service.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &service).await }
            .boxed()
    })
}

pub(crate) fn build_leader_election_role(config: &InstallConfig) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(rbac::LEADER_ELECTION_ROLE.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["configmaps".to_string(), "leases".to_string()]),
                verbs: all_verbs(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new(), "coordination.k8s.io".to_string()]),
                resources: Some(vec!["events".to_string()]),
                verbs: vec![VERB_CREATE.to_string(), VERB_PATCH.to_string()],
                ..Default::default()
            },
        ]),
    }
}

fn role_spec(config: &InstallConfig) -> InstallFunc {
    let role = build_leader_election_role(config);
    Box::new(move |ctx| {
        let role = role.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &role).await }
            .boxed()
    })
}

pub(crate) fn build_cluster_roles() -> Vec<ClusterRole> {
    let manager = ClusterRole {
        metadata: ObjectMeta {
            name: Some(rbac::MANAGER_CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["apps".to_string()]),
                resources: Some(vec!["deployments".to_string()]),
                verbs: all_verbs(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["pods".to_string()]),
                verbs: vec![VERB_GET.to_string(), VERB_LIST.to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![rbac::MESH_API_GROUP.to_string()]),
                resources: Some(vec!["meshdeployments".to_string()]),
                verbs: all_verbs(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![rbac::MESH_API_GROUP.to_string()]),
                resources: Some(vec!["meshdeployments/finalizers".to_string()]),
                verbs: vec![VERB_UPDATE.to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![rbac::MESH_API_GROUP.to_string()]),
                resources: Some(vec!["meshdeployments/status".to_string()]),
                verbs: vec![
                    VERB_GET.to_string(),
                    VERB_PATCH.to_string(),
                    VERB_UPDATE.to_string(),
                ],
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let metrics_reader = ClusterRole {
        metadata: ObjectMeta {
            name: Some(rbac::METRICS_READER_CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            non_resource_urls: Some(vec!["/metrics".to_string()]),
            verbs: vec![VERB_GET.to_string()],
            ..Default::default()
        }]),
        ..Default::default()
    };

    let proxy = ClusterRole {
        metadata: ObjectMeta {
            name: Some(rbac::PROXY_CLUSTER_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["authentication.k8s.io".to_string()]),
                resources: Some(vec!["tokenreviews".to_string()]),
                verbs: vec![VERB_CREATE.to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec!["authorization.k8s.io".to_string()]),
                resources: Some(vec!["subjectaccessreviews".to_string()]),
                verbs: vec![VERB_CREATE.to_string()],
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    vec![manager, metrics_reader, proxy]
}

fn cluster_role_spec() -> InstallFunc {
    let cluster_roles = build_cluster_roles();
    Box::new(move |ctx| {
        let cluster_roles = cluster_roles.clone();
        async move {
            for cluster_role in &cluster_roles {
                kubernetes::apply_cluster(&ctx.client, cluster_role).await?;
            }
            Ok(())
        }
        .boxed()
    })
}

pub(crate) fn build_leader_election_role_binding(config: &InstallConfig) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(rbac::LEADER_ELECTION_ROLE_BINDING.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: rbac::LEADER_ELECTION_ROLE.to_string(),
        },
        subjects: Some(vec![default_service_account(&config.mesh_namespace)]),
    }
}

fn role_binding_spec(config: &InstallConfig) -> InstallFunc {
    let binding = build_leader_election_role_binding(config);
    Box::new(move |ctx| {
        let binding = binding.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &binding).await }
            .boxed()
    })
}

pub(crate) fn build_cluster_role_bindings(config: &InstallConfig) -> Vec<ClusterRoleBinding> {
    [
        (rbac::MANAGER_CLUSTER_ROLE_BINDING, rbac::MANAGER_CLUSTER_ROLE),
        (rbac::PROXY_CLUSTER_ROLE_BINDING, rbac::PROXY_CLUSTER_ROLE),
        (
            rbac::METRICS_READER_CLUSTER_ROLE_BINDING,
            rbac::METRICS_READER_CLUSTER_ROLE,
        ),
    ]
    .into_iter()
    .map(|(binding_name, role_name)| ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(binding_name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![default_service_account(&config.mesh_namespace)]),
    })
    .collect()
}

fn cluster_role_binding_spec(config: &InstallConfig) -> InstallFunc {
    let bindings = build_cluster_role_bindings(config);
    Box::new(move |ctx| {
        let bindings = bindings.clone();
        async move {
            for binding in &bindings {
                kubernetes::apply_cluster(&ctx.client, binding).await?;
            }
            Ok(())
        }
        .boxed()
    })
}

fn deployment_spec(config: &InstallConfig) -> InstallFunc {
    let deployment = workload_deployment(
        names::OPERATOR,
        &config.mesh_namespace,
        operator_labels(),
        &config.operator_image,
        &[("metrics", 8443)],
        1,
    );
    Box::new(move |ctx| {
        let deployment = deployment.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &deployment).await }
            .boxed()
    })
}

fn default_service_account(namespace: &str) -> Subject {
    Subject {
        kind: "ServiceAccount".to_string(),
        name: "default".to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn all_verbs() -> Vec<String> {
    [
        VERB_GET,
        VERB_LIST,
        VERB_WATCH,
        VERB_CREATE,
        VERB_UPDATE,
        VERB_PATCH,
        VERB_DELETE,
    ]
    .iter()
    .map(|v| v.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{deployment_json, resource_json, MockService};

    fn test_config() -> InstallConfig {
        InstallConfig {
            mesh_namespace: "mesh-system".to_string(),
            operator_image: "ghcr.io/meshctl/mesh-operator:test".to_string(),
            control_plane_image: "cp:test".to_string(),
            ingress_image: "in:test".to_string(),
            control_plane_replicas: 1,
            client_port: 2379,
            peer_port: 2380,
            admin_port: 2381,
        }
    }

    #[test]
    fn test_cluster_roles_cover_manager_metrics_and_proxy() {
        let roles = build_cluster_roles();
        let names: Vec<_> = roles
            .iter()
            .map(|r| r.metadata.name.clone().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                rbac::MANAGER_CLUSTER_ROLE,
                rbac::METRICS_READER_CLUSTER_ROLE,
                rbac::PROXY_CLUSTER_ROLE,
            ]
        );
    }

    #[test]
    fn test_teardown_removes_deployment_first() {
        assert_eq!(TEARDOWN[0], (ResourceKind::Deployment, names::OPERATOR));
        // Bindings are removed before the roles they reference.
        let binding_pos = TEARDOWN
            .iter()
            .position(|(_, n)| *n == rbac::MANAGER_CLUSTER_ROLE_BINDING)
            .unwrap();
        let role_pos = TEARDOWN
            .iter()
            .position(|(_, n)| *n == rbac::MANAGER_CLUSTER_ROLE)
            .unwrap();
        assert!(binding_pos < role_pos);
    }

    #[tokio::test]
    async fn test_describe_phases() {
        let ctx = StageContext::new(test_config(), MockService::new().into_client());

        let begin = describe(&ctx, InstallPhase::Begin).await;
        assert!(begin.contains("mesh-system"));
        assert!(begin.starts_with("Begin"));

        let error = describe(&ctx, InstallPhase::Error).await;
        assert!(error.contains("Failed"));
    }

    #[tokio::test]
    async fn test_deploy_applies_resources_then_polls_readiness() {
        let ns = "/api/v1/namespaces/mesh-system";
        let rbac_ns = "/apis/rbac.authorization.k8s.io/v1/namespaces/mesh-system";
        let mock = MockService::new()
            .on_patch(
                &format!("{}/configmaps/", ns),
                200,
                &resource_json("v1", "ConfigMap", names::OPERATOR_CONFIG, Some("mesh-system")),
            )
            .on_patch(
                &format!("{}/services/", ns),
                200,
                &resource_json("v1", "Service", names::OPERATOR_METRICS_SERVICE, Some("mesh-system")),
            )
            .on_patch(
                &format!("{}/roles/", rbac_ns),
                200,
                &resource_json(
                    "rbac.authorization.k8s.io/v1",
                    "Role",
                    rbac::LEADER_ELECTION_ROLE,
                    Some("mesh-system"),
                ),
            )
            .on_patch(
                &format!("{}/rolebindings/", rbac_ns),
                200,
                &resource_json(
                    "rbac.authorization.k8s.io/v1",
                    "RoleBinding",
                    rbac::LEADER_ELECTION_ROLE_BINDING,
                    Some("mesh-system"),
                ),
            )
            .on_patch(
                "/apis/rbac.authorization.k8s.io/v1/clusterroles/",
                200,
                &resource_json(
                    "rbac.authorization.k8s.io/v1",
                    "ClusterRole",
                    rbac::MANAGER_CLUSTER_ROLE,
                    None,
                ),
            )
            .on_patch(
                "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings/",
                200,
                &resource_json(
                    "rbac.authorization.k8s.io/v1",
                    "ClusterRoleBinding",
                    rbac::MANAGER_CLUSTER_ROLE_BINDING,
                    None,
                ),
            )
            .on_patch(
                "/apis/apps/v1/namespaces/mesh-system/deployments/",
                200,
                &deployment_json(names::OPERATOR, "mesh-system", 1, 1),
            )
            .on_get(
                &format!(
                    "/apis/apps/v1/namespaces/mesh-system/deployments/{}",
                    names::OPERATOR
                ),
                200,
                &deployment_json(names::OPERATOR, "mesh-system", 1, 1),
            );
        let ctx = StageContext::new(test_config(), mock.clone().into_client());

        deploy(&ctx).await.unwrap();

        let requests = mock.requests();
        // Seven apply batches followed by at least one readiness query.
        let patches = requests.iter().filter(|(m, _)| m == "PATCH").count();
        assert_eq!(patches, 11); // 1 cm + 1 svc + 1 role + 3 cluster roles + 1 binding + 3 cluster bindings + 1 deployment
        assert!(requests
            .iter()
            .any(|(m, p)| m == "GET" && p.ends_with(names::OPERATOR)));
    }
}
