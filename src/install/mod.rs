// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Stage-based installation lifecycle: batch apply, readiness polling,
//! declarative teardown, and the stage ordering for a full install.

pub mod controlplane;
pub mod ingress;
pub mod operator;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::Client;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::InstallConfig;
use crate::constants::poll;
use crate::error::{MeshctlError, Result};
use crate::kubernetes::{self, ResourceKind};

/// Per-stage execution context; immutable for one stage invocation.
#[derive(Clone)]
pub struct StageContext {
    pub namespace: String,
    pub config: InstallConfig,
    pub client: Client,
}

impl StageContext {
    pub fn new(config: InstallConfig, client: Client) -> Self {
        StageContext {
            namespace: config.mesh_namespace.clone(),
            config,
            client,
        }
    }
}

/// Phase of a stage, used for human-readable reporting only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Begin,
    End,
    Error,
}

/// One idempotent "ensure resource X matches spec" operation
pub type InstallFunc = Box<dyn for<'a> Fn(&'a StageContext) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Apply an ordered list of install functions, stopping at the first
/// failure. Resources already applied stay applied; re-running the batch
/// re-applies them idempotently.
pub async fn batch_deploy_resources(ctx: &StageContext, funcs: Vec<InstallFunc>) -> Result<()> {
    for func in funcs {
        func(ctx).await?;
    }
    Ok(())
}

/// Readiness polling policy: fixed interval, bounded attempts.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_millis(poll::INTERVAL_MS),
            max_attempts: poll::MAX_ATTEMPTS,
        }
    }
}

/// Poll a readiness predicate until it reports ready or the attempt budget
/// is exhausted.
///
/// Predicate errors are retried within the same budget; the terminal error
/// carries the last predicate error if one occurred.
pub async fn wait_until_ready<F, Fut>(policy: &PollPolicy, target: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut last_error: Option<MeshctlError> = None;

    for attempt in 1..=policy.max_attempts {
        match check().await {
            Ok(true) => {
                debug!("{} ready after {} attempts", target, attempt);
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => {
                debug!("readiness check for {} failed (attempt {}): {}", target, attempt, e);
                last_error = Some(e);
            }
        }
        if attempt < policy.max_attempts {
            sleep(policy.interval).await;
        }
    }

    Err(MeshctlError::NotReady(match last_error {
        Some(e) => format!(
            "{} not ready after {} attempts, last error: {}",
            target, policy.max_attempts, e
        ),
        None => format!("{} not ready after {} attempts", target, policy.max_attempts),
    }))
}

/// Delete every resource named in a stage's teardown manifest, best-effort.
///
/// Failures are logged and not surfaced; teardown must proceed past them.
pub async fn clear_stage_resources(ctx: &StageContext, manifest: &[(ResourceKind, &str)]) {
    for (kind, name) in manifest {
        if let Err(e) = kubernetes::delete_resource(&ctx.client, &ctx.namespace, *kind, name).await
        {
            warn!("failed to delete {} {:?}: {}", kind, name, e);
        }
    }
}

/// Build a single-container workload deployment, shared by the stages.
pub(crate) fn workload_deployment(
    name: &str,
    namespace: &str,
    labels: BTreeMap<String, String>,
    image: &str,
    container_ports: &[(&str, i32)],
    replicas: i32,
) -> Deployment {
    let ports: Vec<ContainerPort> = container_ports
        .iter()
        .map(|(port_name, port)| ContainerPort {
            name: Some(port_name.to_string()),
            container_port: *port,
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: name.to_string(),
                        image: Some(image.to_string()),
                        ports: if ports.is_empty() { None } else { Some(ports) },
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Install all mesh stages in order: operator, control plane, ingress.
///
/// A stage failure aborts the remaining stages after reporting the Error
/// phase for the failed stage.
pub async fn install_all(ctx: &StageContext) -> Result<()> {
    info!("{}", operator::describe(ctx, InstallPhase::Begin).await);
    operator::pre_check(ctx).await?;
    if let Err(e) = operator::deploy(ctx).await {
        warn!("{}", operator::describe(ctx, InstallPhase::Error).await);
        return Err(e);
    }
    info!("{}", operator::describe(ctx, InstallPhase::End).await);

    info!("{}", controlplane::describe(ctx, InstallPhase::Begin).await);
    controlplane::pre_check(ctx).await?;
    if let Err(e) = controlplane::deploy(ctx).await {
        warn!("{}", controlplane::describe(ctx, InstallPhase::Error).await);
        return Err(e);
    }
    info!("{}", controlplane::describe(ctx, InstallPhase::End).await);

    info!("{}", ingress::describe(ctx, InstallPhase::Begin).await);
    ingress::pre_check(ctx).await?;
    if let Err(e) = ingress::deploy(ctx).await {
        warn!("{}", ingress::describe(ctx, InstallPhase::Error).await);
        return Err(e);
    }
    info!("{}", ingress::describe(ctx, InstallPhase::End).await);

    Ok(())
}

/// Tear all mesh stages down, best-effort, in reverse install order.
///
/// Reachable from any state; a prior successful install is not required.
pub async fn clear_all(ctx: &StageContext) {
    info!("Removing mesh components from namespace: {}", ctx.namespace);
    ingress::clear(ctx).await;
    controlplane::clear(ctx).await;
    operator::clear(ctx).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn test_config() -> InstallConfig {
        InstallConfig {
            mesh_namespace: "mesh-system".to_string(),
            operator_image: "op:test".to_string(),
            control_plane_image: "cp:test".to_string(),
            ingress_image: "in:test".to_string(),
            control_plane_replicas: 1,
            client_port: 2379,
            peer_port: 2380,
            admin_port: 2381,
        }
    }

    fn test_context() -> StageContext {
        StageContext::new(test_config(), MockService::new().into_client())
    }

    fn recording_func(log: Arc<Mutex<Vec<u32>>>, id: u32, fail: bool) -> InstallFunc {
        Box::new(move |_ctx| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(id);
                if fail {
                    Err(MeshctlError::NotReady(format!("func {} failed", id)))
                } else {
                    Ok(())
                }
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_batch_runs_in_order() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));

        let funcs = vec![
            recording_func(log.clone(), 1, false),
            recording_func(log.clone(), 2, false),
            recording_func(log.clone(), 3, false),
        ];
        batch_deploy_resources(&ctx, funcs).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_batch_stops_at_first_failure() {
        let ctx = test_context();
        let log = Arc::new(Mutex::new(Vec::new()));

        let funcs = vec![
            recording_func(log.clone(), 1, false),
            recording_func(log.clone(), 2, true),
            recording_func(log.clone(), 3, false),
        ];
        let err = batch_deploy_resources(&ctx, funcs).await.unwrap_err();

        // Funcs 1 and 2 ran, func 3 never did, and the error is func 2's.
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert!(err.to_string().contains("func 2 failed"));
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(1),
            max_attempts,
        }
    }

    #[tokio::test]
    async fn test_wait_ready_on_fifth_attempt_uses_five_queries() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        wait_until_ready(&fast_policy(600), "workload", move || {
            let counter = counter.clone();
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1 >= 5) }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_wait_never_ready_exhausts_attempt_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = wait_until_ready(&fast_policy(30), "workload", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 30);
        assert!(err.to_string().contains("not ready after 30 attempts"));
    }

    #[tokio::test]
    async fn test_wait_retries_predicate_errors_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        wait_until_ready(&fast_policy(10), "workload", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(MeshctlError::NotReady("transient".to_string()))
                } else {
                    Ok(true)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_reports_last_predicate_error_on_timeout() {
        let err = wait_until_ready(&fast_policy(3), "workload", || async {
            Err(MeshctlError::NotReady("boom".to_string()))
        })
        .await
        .unwrap_err();

        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_clear_stage_resources_is_best_effort() {
        let mock = MockService::new();
        let ctx = StageContext::new(test_config(), mock.clone().into_client());

        // Nothing is registered, so every delete gets a 404; none may abort.
        clear_stage_resources(
            &ctx,
            &[
                (ResourceKind::Deployment, "a"),
                (ResourceKind::Service, "b"),
                (ResourceKind::ClusterRole, "c"),
            ],
        )
        .await;

        let methods: Vec<String> = mock.requests().into_iter().map(|(m, _)| m).collect();
        assert_eq!(methods, vec!["DELETE", "DELETE", "DELETE"]);
    }
}
