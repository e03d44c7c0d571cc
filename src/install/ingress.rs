// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mesh ingress stage: ingress controller config, service, and deployment.

use std::collections::BTreeMap;

use futures::FutureExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServicePort, ServiceSpec};
use kube::api::ObjectMeta;
use kube::Api;

use crate::config::InstallConfig;
use crate::constants::names;
use crate::error::{MeshctlError, Result};
use crate::install::{
    batch_deploy_resources, clear_stage_resources, wait_until_ready, workload_deployment,
    InstallFunc, InstallPhase, PollPolicy, StageContext,
};
use crate::kubernetes::{self, ResourceKind};

pub const LABEL_SELECTOR: &str = "app=mesh-ingress-controller";

const INGRESS_PORT: i32 = 19527;

/// Resources removed when this stage is cleared, in deletion order
pub const TEARDOWN: &[(ResourceKind, &str)] = &[
    (ResourceKind::Deployment, names::INGRESS_CONTROLLER),
    (ResourceKind::Service, names::INGRESS_SERVICE),
    (ResourceKind::ConfigMap, names::INGRESS_CONFIG),
];

fn ingress_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), names::INGRESS_CONTROLLER.to_string())])
}

/// The ingress controller joins the control plane as a client, so the
/// control-plane deployment must already exist.
pub async fn pre_check(ctx: &StageContext) -> Result<()> {
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), &ctx.namespace);
    match api.get_opt(names::CONTROL_PLANE).await? {
        Some(_) => Ok(()),
        None => Err(MeshctlError::NotFound {
            kind: "Deployment".to_string(),
            name: names::CONTROL_PLANE.to_string(),
        }),
    }
}

/// Apply all ingress resources in order, then wait for the ingress
/// controller deployment to converge.
pub async fn deploy(ctx: &StageContext) -> Result<()> {
    batch_deploy_resources(
        ctx,
        vec![
            config_map_spec(&ctx.config),
            service_spec(&ctx.config),
            deployment_spec(&ctx.config),
        ],
    )
    .await?;

    wait_until_ready(&PollPolicy::default(), names::INGRESS_CONTROLLER, || {
        kubernetes::deployment_ready(&ctx.client, &ctx.namespace, names::INGRESS_CONTROLLER)
    })
    .await
}

/// Remove all ingress resources, best-effort.
pub async fn clear(ctx: &StageContext) {
    clear_stage_resources(ctx, TEARDOWN).await;
}

/// Human-readable description of the given phase of this stage.
pub async fn describe(ctx: &StageContext, phase: InstallPhase) -> String {
    match phase {
        InstallPhase::Begin => format!(
            "Begin to install mesh ingress controller in the namespace: {}",
            ctx.namespace
        ),
        InstallPhase::End => format!(
            "\nMesh ingress controller deployed successfully, deployment: {}\n{}",
            names::INGRESS_CONTROLLER,
            kubernetes::format_pod_status(&ctx.client, &ctx.namespace, LABEL_SELECTOR).await
        ),
        InstallPhase::Error => format!(
            "Failed to install mesh ingress controller in the namespace: {}",
            ctx.namespace
        ),
    }
}

pub(crate) fn build_config_map(config: &InstallConfig) -> ConfigMap {
    let ingress_config = format!(
        "control-plane-service: {}\nclient-port: {}\ningress-port: {}\n",
        names::CONTROL_PLANE_PUBLIC_SERVICE,
        config.client_port,
        INGRESS_PORT,
    );

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(names::INGRESS_CONFIG.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "ingress.yaml".to_string(),
            ingress_config,
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

pub(crate) fn build_service(config: &InstallConfig) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(names::INGRESS_SERVICE.to_string()),
            namespace: Some(config.mesh_namespace.clone()),
            labels: Some(ingress_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(ingress_labels()),
            ports: Some(vec![ServicePort {
                name: Some("ingress-port".to_string()),
                port: INGRESS_PORT,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_spec(config: &InstallConfig) -> InstallFunc {
    let service = build_service(config);
    Box::new(move |ctx| {
        let service = service.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &service).await }
            .boxed()
    })
}

fn deployment_spec(config: &InstallConfig) -> InstallFunc {
    let deployment = workload_deployment(
        names::INGRESS_CONTROLLER,
        &config.mesh_namespace,
        ingress_labels(),
        &config.ingress_image,
        &[("ingress-port", INGRESS_PORT)],
        1,
    );
    Box::new(move |ctx| {
        let deployment = deployment.clone();
        async move { kubernetes::apply_namespaced(&ctx.client, &ctx.namespace, &deployment).await }
            .boxed()
    })
}
