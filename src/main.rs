// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use tracing::info;

use meshctl::config::InstallConfig;
use meshctl::constants::DEFAULT_SERVER;
use meshctl::install::{clear_all, install_all, StageContext};
use meshctl::kubernetes::ensure_namespace_exists;
use meshctl::meshapi::MeshClient;
use meshctl::rcfile::RcFile;
use meshctl::resource::ResourceDocument;
use meshctl::visit::{resolve, CommandSource, SourceConfig, Visitor};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = args.first().map(String::as_str).unwrap_or("install");

    match mode {
        "install" => {
            let ctx = stage_context().await?;
            ensure_namespace_exists(&ctx.client, &ctx.namespace).await?;
            install_all(&ctx).await?;
            info!("Mesh installed in namespace: {}", ctx.namespace);
        }
        "reset" => {
            let ctx = stage_context().await?;
            clear_all(&ctx).await;
            info!("Mesh removed from namespace: {}", ctx.namespace);
        }
        "apply" => {
            let filenames = args[1..].to_vec();
            if filenames.is_empty() {
                anyhow::bail!("apply requires at least one file, directory, URL, or \"-\"");
            }
            let sources = SourceConfig {
                filenames,
                ..Default::default()
            };
            let docs = collect_documents(resolve(&sources).into_visitors()?).await?;
            let mesh = MeshClient::new(&server_address()?)?;
            mesh.apply_documents(&docs).await?;
            info!("Applied {} resource(s)", docs.len());
        }
        "get" => {
            let kind = args
                .get(1)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("get requires a resource kind"))?;
            let name = args.get(2).cloned().unwrap_or_default();
            let sources = SourceConfig {
                command: Some(CommandSource { kind, name }),
                ..Default::default()
            };
            let docs = collect_documents(resolve(&sources).into_visitors()?).await?;
            let mesh = MeshClient::new(&server_address()?)?;
            for value in mesh.fetch_documents(&docs).await? {
                println!("---\n{}", serde_yaml::to_string(&value)?);
            }
        }
        other => anyhow::bail!(
            "unknown mode {:?}, expected \"install\", \"reset\", \"apply\", or \"get\"",
            other
        ),
    }

    Ok(())
}

async fn stage_context() -> Result<StageContext> {
    let config = InstallConfig::from_env()?;
    info!("Configuration loaded: mesh_namespace={}", config.mesh_namespace);

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    Ok(StageContext::new(config, client))
}

async fn collect_documents(visitors: Vec<Visitor>) -> Result<Vec<ResourceDocument>> {
    let mut docs = Vec::new();
    for visitor in &visitors {
        docs.extend(visitor.documents().await?);
    }
    Ok(docs)
}

/// The mesh API endpoint: the rc-file's server if one is set, the default
/// local endpoint otherwise.
fn server_address() -> Result<String> {
    Ok(match RcFile::load()? {
        Some(rc) if !rc.server.is_empty() => rc.server,
        _ => DEFAULT_SERVER.to_string(),
    })
}
