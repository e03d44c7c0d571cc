// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mesh control-plane stage: cluster config, services, and the control
//! plane deployment.

use std::collections::BTreeMap;

use futures::FutureExt;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;

use crate::config::InstallConfig;
use crate::constants::{names, ports};
use crate::error::Result;
use crate::install::{
    batch_deploy_resources, clear_stage_resources, wait_until_ready, workload_deployment,
    InstallFunc, InstallPhase, PollPolicy, StageContext,
};
use crate::kubernetes::{self, ResourceKind};

pub const LABEL_SELECTOR: &str = "app=mesh-control-plane";

/// Resources removed when this stage is cleared, in deletion order
pub const TEARDOWN: &[(ResourceKind, &str)] = &[
    (ResourceKind::Deployment, names::CONTROL_PLANE),
    (ResourceKind::Service, names::CONTROL_PLANE_PUBLIC_SERVICE),
    (ResourceKind::Service, names::CONTROL_PLANE_HEADLESS_SERVICE),
    (ResourceKind::ConfigMap, names::CONTROL_PLANE_CONFIG),
];

fn control_plane_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), names::CONTROL_PLANE.to_string())])
}

/// Check prerequisites for installing the control plane.
///
/// None beyond the namespace itself; the operator stage runs first in a
/// full install but a standalone control plane is valid too.
pub async fn pre_check(_ctx: &StageContext) -> Result<()> {
    Ok(())
}

/// Apply all control-plane resources in order, then wait for the control
/// plane deployment to converge.
pub async fn deploy(ctx: &StageContext) -> Result<()> {
    batch_deploy_resources(
        ctx,
        vec![
            config_map_spec(&ctx.config),
            public_service_spec(&ctx.config),
            headless_service_spec(&ctx.config),
            deployment_spec(&ctx.config),
        ],
    )
    .await?;

    wait_until_ready(&PollPolicy::default(), names::CONTROL_PLANE, || {
        kubernetes::deployment_ready(&ctx.client, &ctx.namespace, names::CONTROL_PLANE)
    })
    .await
}

/// Remove all control-plane resources, best-effort.
pub async fn clear(ctx: &StageContext) {
    clear_stage_resources(ctx, TEARDOWN).await;
}

/// Human-readable description of the given phase of this stage.
pub async fn describe(ctx: &StageContext, phase: InstallPhase) -> String {
    match phase {
        InstallPhase::Begin => format!(
            "Begin to install mesh control plane in the namespace: {}",
            ctx.namespace
        ),
        InstallPhase::End => format!(
            "\nMesh control plane deployed successfully, deployment: {}\n{}",
            names::CONTROL_PLANE,
            kubernetes::format_pod_status(&ctx.client, &ctx.namespace, LABEL_SELECTOR).await
        ),
        InstallPhase::Error => format!(
            "Failed to install mesh control plane in the namespace: {}",
            ctx.namespace
        ),
    }
}

pub(crate) fn build_config_map(config: &InstallConfig) -> ConfigMap {
    let cluster_config = format!(
        "name: {}\nlisten-client-urls: http://0.0.0.0:{}\nlisten-peer-urls: http://0.0.0.0:{}\nadmin-port: {}\n",
        names::CONTROL_PLANE,
        config.client_port,
        config.peer_port,
        config.admin_port,
    );

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::CONTROL_PLANE_CONFIG.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "cluster.yaml".to_string(),
            cluster_config,
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

/// The public service exposes the client and admin ports to mesh users.
pub(crate) fn build_public_service(config: &InstallConfig) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(names::CONTROL_PLANE_PUBLIC_SERVICE.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            labels: Some(control_plane_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(control_plane_labels()),
            ports: Some(vec![
                ServicePort {
                    name: Some(ports::CLIENT_PORT_NAME.to_string()),
                    port: config.client_port,
                    ..Default::default()
                },
                ServicePort {
                    name: Some(ports::ADMIN_PORT_NAME.to_string()),
                    port: config.admin_port,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn public_service_spec(config: &InstallConfig) -> InstallFunc {
    let service = build_public_service(config);
    Box::new(move |ctx| {
        let service = service.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &service).await }
            .boxed()
    })
}

/// The headless service lets control-plane members discover their peers.
pub(crate) fn build_headless_service(config: &InstallConfig) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(names::CONTROL_PLANE_HEADLESS_SERVICE.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            labels: Some(control_plane_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            selector: Some(control_plane_labels()),
            ports: Some(vec![ServicePort {
                name: Some(ports::PEER_PORT_NAME.to_string()),
                port: config.peer_port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn headless_service_spec(config: &InstallConfig) -> InstallFunc {
    let service = build_headless_service(config);
    Box::new(move |ctx| {
        let service = service.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &service).await }
            .boxed()
    })
}

fn deployment_spec(config: &InstallConfig) -> InstallFunc {
    let deployment = workload_deployment(
        names::CONTROL_PLANE,
        &config.mesh_namespace,
        control_plane_labels(),
        &config.control_plane_image,
        &[
            (ports::CLIENT_PORT_NAME, config.client_port),
            (ports::PEER_PORT_NAME, config.peer_port),
            (ports::ADMIN_PORT_NAME, config.admin_port),
        ],
        config.control_plane_replicas,
    );
    Box::new(move |ctx| {
        let deployment = deployment.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &deployment).await }
            .boxed()
    })
}
